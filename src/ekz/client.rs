use crate::config::{Config, ConfigStore, Credentials};
use crate::ekz::auth::{
    AuthenticatedSender, RefreshPolicy, Session, TokenRefresher, DEVICE_NAME, identify,
};
use crate::ekz::types::{
    ApiResponse, ChargingStation, ChargingStationResult, ConnectorStatus, ErrorResponse, LiveData,
    LiveDataRequest, LoginRequest, LoginResponse, Profile, RemoteOpRequest, RemoteOpResult,
};
use crate::error::{EkzError, Result, TRANSACTION_NOT_FOUND_MESSAGE};
use crate::http::{HttpRequest, HttpSender, ReqwestSender};
use crate::logging::{StructuredLogger, get_logger};
use reqwest::StatusCode;
use std::sync::Arc;
use std::time::Duration;

/// How `start_charge` waits for the session to deliver power
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartChargePolling {
    pub max_attempts: u32,
    /// Wait while the backend has not created the transaction yet
    pub pending_delay: Duration,
    /// Wait while the transaction exists but no power flows
    pub idle_delay: Duration,
}

impl Default for StartChargePolling {
    fn default() -> Self {
        Self {
            max_attempts: 30,
            pending_delay: Duration::from_secs(5),
            idle_delay: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone)]
pub enum StartChargeOutcome {
    /// A transaction was already running; nothing was sent
    AlreadyCharging(LiveData),
    /// Remote start was issued and power is flowing
    Started(LiveData),
}

/// Log in through the plain transport and return the issued token
pub async fn login_with(
    sender: &dyn HttpSender,
    base_url: &str,
    credentials: &Credentials,
) -> Result<String> {
    let mut request = HttpRequest::post(format!("{}/users/log-in", base_url)).json(&LoginRequest {
        device: DEVICE_NAME,
        email: &credentials.username,
        password: &credentials.password,
        is_social_login: false,
        provider: None,
        token: None,
    })?;
    identify(&mut request)?;

    let response = sender.send(request).await?;
    if response.status != StatusCode::OK {
        return Err(EkzError::auth(format!("login failed: {}", response.status)));
    }

    let login: LoginResponse = response.json()?;
    if login.token.is_empty() {
        return Err(EkzError::auth("login response did not contain a token"));
    }
    Ok(login.token)
}

/// Re-authenticates with the configured username and password
pub struct LoginRefresher {
    plain: Arc<dyn HttpSender>,
    base_url: String,
    credentials: Credentials,
}

impl LoginRefresher {
    pub fn new(plain: Arc<dyn HttpSender>, base_url: String, credentials: Credentials) -> Self {
        Self {
            plain,
            base_url,
            credentials,
        }
    }
}

#[async_trait::async_trait]
impl TokenRefresher for LoginRefresher {
    async fn refresh(&self) -> Result<String> {
        login_with(self.plain.as_ref(), &self.base_url, &self.credentials).await
    }
}

/// Client for the EKZ e-mobility backend
pub struct EkzClient {
    base_url: String,
    http: AuthenticatedSender,
    plain: Arc<dyn HttpSender>,
    credentials: Option<Credentials>,
    polling: StartChargePolling,
    logger: StructuredLogger,
}

impl EkzClient {
    /// Client talking to the real backend over reqwest
    pub fn new(config: &Config, store: Arc<ConfigStore>) -> Result<Self> {
        let transport: Arc<dyn HttpSender> = Arc::new(ReqwestSender::new()?);
        Ok(Self::with_transport(config, store, transport))
    }

    /// Client over an arbitrary transport
    pub fn with_transport(
        config: &Config,
        store: Arc<ConfigStore>,
        transport: Arc<dyn HttpSender>,
    ) -> Self {
        let base_url = config.backend_url.trim_end_matches('/').to_string();
        let credentials = config.credentials();
        let session = Arc::new(Session::new(
            config.token.clone(),
            RefreshPolicy::default(),
            store,
        ));
        let refresher = credentials.clone().map(|c| {
            Arc::new(LoginRefresher::new(transport.clone(), base_url.clone(), c))
                as Arc<dyn TokenRefresher>
        });

        Self {
            http: AuthenticatedSender::new(transport.clone(), session, refresher),
            plain: transport,
            base_url,
            credentials,
            polling: StartChargePolling::default(),
            logger: get_logger("ekz"),
        }
    }

    pub fn with_polling(mut self, polling: StartChargePolling) -> Self {
        self.polling = polling;
        self
    }

    pub fn session(&self) -> &Arc<Session> {
        self.http.session()
    }

    pub fn token(&self) -> Option<String> {
        self.session().token()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Make sure the client holds a working token
    pub async fn init(&self) -> Result<()> {
        if self.token().is_some() {
            match self.get_profile().await {
                Ok(_) => {
                    self.logger.debug("Cached token is valid");
                    return Ok(());
                }
                Err(e) => {
                    self.logger
                        .info(&format!("Cached token rejected ({}), logging in", e));
                    self.session().clear_token();
                }
            }
        }
        self.login().await
    }

    /// Log in with username and password and persist the token
    pub async fn login(&self) -> Result<()> {
        let credentials = self.credentials.as_ref().ok_or_else(|| {
            EkzError::validation("username", "username and password are required to log in")
        })?;

        let token = login_with(self.plain.as_ref(), &self.base_url, credentials).await?;
        self.session().accept(&token)?;
        self.logger.info("Logged in");
        Ok(())
    }

    pub async fn get_profile(&self) -> Result<Profile> {
        let response = self
            .http
            .send(HttpRequest::get(self.url("/users/profile")))
            .await?
            .error_for_status()?;
        let profile: ApiResponse<Profile> = response.json()?;
        Ok(profile.data)
    }

    pub async fn get_user_charging_stations(&self) -> Result<Vec<ChargingStation>> {
        let request = HttpRequest::post(self.url("/charging-stations/user-charging-stations"))
            .json(&serde_json::json!({}))?;
        let response = self.http.send(request).await?.error_for_status()?;
        let result: ApiResponse<ChargingStationResult> = response.json()?;
        Ok(result.data.charging_stations)
    }

    pub async fn remote_start(&self, box_id: &str, connector_id: u32) -> Result<RemoteOpResult> {
        self.remote_op("start", box_id, connector_id).await
    }

    pub async fn remote_stop(&self, box_id: &str, connector_id: u32) -> Result<RemoteOpResult> {
        self.remote_op("stop", box_id, connector_id).await
    }

    async fn remote_op(&self, op: &str, box_id: &str, connector_id: u32) -> Result<RemoteOpResult> {
        let request = HttpRequest::post(self.url(&format!("/saascharge/remote-{}", op))).json(
            &RemoteOpRequest {
                charge_box_id: box_id,
                connector_id,
            },
        )?;

        let response = self.http.send(request).await?;
        if response.status != StatusCode::OK {
            return Err(EkzError::api(format!(
                "remote {} failed: {}",
                op, response.status
            )));
        }
        let result: ApiResponse<RemoteOpResult> = response.json()?;
        self.logger
            .with_field("box_id", box_id)
            .with_field("connector_id", connector_id)
            .info(&format!("Remote {} accepted", op));
        Ok(result.data)
    }

    /// Live telemetry of the transaction on `box_id`/`connector_id`
    pub async fn get_live_data(
        &self,
        box_id: &str,
        connector_id: u32,
        status: ConnectorStatus,
    ) -> Result<LiveData> {
        let request = HttpRequest::post(self.url("/charging-stations/charging-live-data")).json(
            &LiveDataRequest {
                charge_box_id: box_id,
                connector_id,
                connector_status: status,
            },
        )?;

        let response = self.http.send(request).await?;
        if response.status == StatusCode::NOT_FOUND {
            let body: ErrorResponse = response.json()?;
            if body.message == TRANSACTION_NOT_FOUND_MESSAGE {
                return Err(EkzError::TransactionNotFound);
            }
            return Err(EkzError::api(body.message));
        }
        response.error_for_status()?.json()
    }

    /// Start a session unless one is running, then wait until power flows
    pub async fn start_charge(&self, box_id: &str, connector_id: u32) -> Result<StartChargeOutcome> {
        let logger = self
            .logger
            .with_field("box_id", box_id)
            .with_field("connector_id", connector_id);

        match self
            .get_live_data(box_id, connector_id, ConnectorStatus::Charging)
            .await
        {
            Ok(live) if live.is_active() => {
                logger.info("Charging session already active");
                return Ok(StartChargeOutcome::AlreadyCharging(live));
            }
            Ok(live) => {
                logger.debug(&format!(
                    "Last transaction is {} with no power, starting a new one",
                    dash_status(&live.status)
                ));
            }
            Err(e) if e.is_transaction_not_found() => {}
            Err(e) => return Err(e),
        }

        self.remote_start(box_id, connector_id).await?;
        logger.info("Waiting for the charging session to draw power");

        for attempt in 1..=self.polling.max_attempts {
            let delay = match self
                .get_live_data(box_id, connector_id, ConnectorStatus::Charging)
                .await
            {
                Ok(live) if live.power > 0.0 => {
                    logger.info(&format!("Charging with {:.2} kW", live.power));
                    return Ok(StartChargeOutcome::Started(live));
                }
                Ok(_) => {
                    logger.debug(&format!("No power yet (attempt {})", attempt));
                    self.polling.idle_delay
                }
                Err(e) if e.is_transaction_not_found() => {
                    logger.debug(&format!("Transaction not visible yet (attempt {})", attempt));
                    self.polling.pending_delay
                }
                Err(e) => return Err(e),
            };

            if attempt < self.polling.max_attempts {
                tokio::time::sleep(delay).await;
            }
        }

        Err(EkzError::timeout(format!(
            "charging did not start after {} checks",
            self.polling.max_attempts
        )))
    }
}

fn dash_status(status: &str) -> &str {
    if status.is_empty() { "-" } else { status }
}

#[async_trait::async_trait]
impl crate::autostart::ChargingBackend for EkzClient {
    async fn start_charge(&self, box_id: &str, connector_id: u32) -> Result<StartChargeOutcome> {
        EkzClient::start_charge(self, box_id, connector_id).await
    }
}
