//! Token handling for the EKZ backend
//!
//! [`AuthenticatedSender`] decorates every request with the session token
//! and, on a 401, asks a [`TokenRefresher`] for a new token under the
//! bounds of a [`RefreshPolicy`] before replaying the request once.

use crate::config::ConfigStore;
use crate::error::{EkzError, Result};
use crate::http::{HttpRequest, HttpResponse, HttpSender};
use crate::logging::{StructuredLogger, get_logger};
use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, HeaderName, USER_AGENT};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

/// Attempts allowed before re-authentication gives up
pub const MAX_REFRESH_ATTEMPTS: u32 = 3;

/// Minimum wait after a failed refresh before the next one
pub const REFRESH_COOLDOWN: Duration = Duration::from_secs(5 * 60);

pub const CLIENT_USER_AGENT: &str = concat!("ekz-tesla/", env!("CARGO_PKG_VERSION"));

/// The backend distinguishes web and app clients by this header
pub const DEVICE_HEADER: &str = "device";
pub const DEVICE_NAME: &str = "WEB";

/// Set the client identification headers on `request`
pub fn identify(request: &mut HttpRequest) -> Result<()> {
    request.set_header(USER_AGENT, CLIENT_USER_AGENT)?;
    request.set_header(HeaderName::from_static(DEVICE_HEADER), DEVICE_NAME)
}

/// Read-mostly holder of the bearer token
#[derive(Debug, Default)]
pub struct TokenStore {
    token: RwLock<String>,
}

impl TokenStore {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: RwLock::new(token.into()),
        }
    }

    /// Current token, `None` when empty
    pub fn get(&self) -> Option<String> {
        let guard = self.token.read().unwrap_or_else(|e| e.into_inner());
        if guard.is_empty() {
            None
        } else {
            Some(guard.clone())
        }
    }

    pub fn set(&self, token: &str) {
        let mut guard = self.token.write().unwrap_or_else(|e| e.into_inner());
        *guard = token.to_string();
    }

    pub fn clear(&self) {
        self.set("");
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshState {
    pub attempts: u32,
    pub last_refresh: Option<Instant>,
}

/// Bounds how often re-authentication may be attempted
#[derive(Debug)]
pub struct RefreshPolicy {
    max_attempts: u32,
    cooldown: Duration,
    state: Mutex<RefreshState>,
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        Self::new(MAX_REFRESH_ATTEMPTS, REFRESH_COOLDOWN)
    }
}

impl RefreshPolicy {
    pub fn new(max_attempts: u32, cooldown: Duration) -> Self {
        Self {
            max_attempts,
            cooldown,
            state: Mutex::new(RefreshState::default()),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Reserve an attempt, returning its 1-based number
    pub fn begin_attempt(&self) -> Result<u32> {
        self.begin_attempt_at(Instant::now())
    }

    pub fn begin_attempt_at(&self, now: Instant) -> Result<u32> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        if state.attempts >= self.max_attempts {
            return Err(EkzError::auth_exhausted(format!(
                "exceeded maximum token refresh attempts ({}); check your credentials",
                self.max_attempts
            )));
        }

        // attempts > 0 means the previous refresh failed
        if state.attempts > 0
            && let Some(last) = state.last_refresh
            && now.saturating_duration_since(last) < self.cooldown
        {
            return Err(EkzError::auth_exhausted(format!(
                "token refresh failed recently; retry after {}s",
                self.cooldown
                    .saturating_sub(now.saturating_duration_since(last))
                    .as_secs()
            )));
        }

        state.attempts += 1;
        state.last_refresh = Some(now);
        Ok(state.attempts)
    }

    pub fn reset(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        *state = RefreshState::default();
    }

    pub fn state(&self) -> RefreshState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Token, refresh bookkeeping and the store the token is persisted to
pub struct Session {
    token: TokenStore,
    policy: RefreshPolicy,
    store: Arc<ConfigStore>,
}

impl Session {
    pub fn new(token: impl Into<String>, policy: RefreshPolicy, store: Arc<ConfigStore>) -> Self {
        Self {
            token: TokenStore::new(token),
            policy,
            store,
        }
    }

    pub fn token(&self) -> Option<String> {
        self.token.get()
    }

    pub fn clear_token(&self) {
        self.token.clear();
    }

    pub fn policy(&self) -> &RefreshPolicy {
        &self.policy
    }

    /// Adopt a freshly issued token.
    ///
    /// The token is in effect and the attempt counter reset even when
    /// writing it to the config file fails.
    pub fn accept(&self, token: &str) -> Result<()> {
        self.token.set(token);
        self.policy.reset();
        self.store.persist_token(token)
    }
}

/// Obtains a new token, typically by logging in again
#[async_trait::async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self) -> Result<String>;
}

/// `HttpSender` that authenticates requests and recovers from expired tokens
pub struct AuthenticatedSender {
    inner: Arc<dyn HttpSender>,
    session: Arc<Session>,
    refresher: Option<Arc<dyn TokenRefresher>>,
    logger: StructuredLogger,
}

impl AuthenticatedSender {
    /// Without a refresher a 401 is handed back to the caller untouched
    pub fn new(
        inner: Arc<dyn HttpSender>,
        session: Arc<Session>,
        refresher: Option<Arc<dyn TokenRefresher>>,
    ) -> Self {
        Self {
            inner,
            session,
            refresher,
            logger: get_logger("ekz_auth"),
        }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    fn decorate(&self, mut request: HttpRequest, token: Option<&str>) -> Result<HttpRequest> {
        match token {
            Some(token) => request.set_header(AUTHORIZATION, &format!("Token {}", token))?,
            None => {
                request.headers.remove(AUTHORIZATION);
            }
        }
        identify(&mut request)?;
        Ok(request)
    }

    async fn refresh_token(&self, refresher: &dyn TokenRefresher) -> Result<String> {
        let policy = self.session.policy();
        let attempt = policy.begin_attempt()?;
        self.logger.info(&format!(
            "Received 401, refreshing token (attempt {}/{})",
            attempt,
            policy.max_attempts()
        ));

        let token = refresher.refresh().await?;
        if let Err(e) = self.session.accept(&token) {
            self.logger
                .warn(&format!("Token refreshed but could not be saved: {}", e));
        }
        self.logger.info("Token refreshed");
        Ok(token)
    }
}

#[async_trait::async_trait]
impl HttpSender for AuthenticatedSender {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let sent_with = self.session.token();
        let response = self
            .inner
            .send(self.decorate(request.clone(), sent_with.as_deref())?)
            .await?;

        if response.status != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }
        let Some(refresher) = &self.refresher else {
            return Ok(response);
        };

        // Another request refreshed while this one was in flight
        if let Some(current) = self.session.token()
            && sent_with.as_deref() != Some(current.as_str())
        {
            self.logger.debug("Token changed in flight, replaying request");
            return self
                .inner
                .send(self.decorate(request, Some(&current))?)
                .await;
        }

        match self.refresh_token(refresher.as_ref()).await {
            Ok(token) => {
                self.inner
                    .send(self.decorate(request, Some(&token))?)
                    .await
            }
            Err(e @ EkzError::AuthExhausted { .. }) => Err(e),
            Err(e) => {
                self.logger.error(&format!("Token refresh failed: {}", e));
                Ok(response)
            }
        }
    }
}
