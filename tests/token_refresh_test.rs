mod common;

use common::{ScriptedSender, login_ok, profile_ok, unauthorized};
use ekz_tesla::config::{Config, ConfigStore};
use ekz_tesla::ekz::EkzClient;
use ekz_tesla::error::EkzError;
use reqwest::header::{HeaderName, USER_AGENT};
use std::sync::Arc;

fn config(token: &str, with_credentials: bool) -> Config {
    let mut cfg = Config {
        token: token.to_string(),
        backend_url: "http://ekz.test/".to_string(),
        ..Default::default()
    };
    if with_credentials {
        cfg.username = "ada@example.com".to_string();
        cfg.password = "secret".to_string();
    }
    cfg
}

fn client(cfg: &Config, transport: &Arc<ScriptedSender>) -> EkzClient {
    EkzClient::with_transport(cfg, Arc::new(ConfigStore::in_memory()), transport.clone())
}

#[tokio::test]
async fn refresh_then_replay_succeeds() {
    let transport = Arc::new(ScriptedSender::new(vec![
        unauthorized(),
        login_ok("fresh"),
        profile_ok(),
    ]));
    let client = client(&config("stale", true), &transport);

    let profile = client.get_profile().await.unwrap();
    assert_eq!(profile.personal.first_name, "Ada");
    assert_eq!(client.token().as_deref(), Some("fresh"));

    assert_eq!(
        transport.paths(),
        vec!["/users/profile", "/users/log-in", "/users/profile"]
    );
    assert_eq!(
        transport.authorizations(),
        vec![
            Some("Token stale".to_string()),
            None,
            Some("Token fresh".to_string())
        ]
    );
    assert_eq!(client.session().policy().state().attempts, 0);
}

#[tokio::test]
async fn login_request_carries_credentials_and_client_headers() {
    let transport = Arc::new(ScriptedSender::new(vec![
        unauthorized(),
        login_ok("fresh"),
        profile_ok(),
    ]));
    let client = client(&config("stale", true), &transport);
    client.get_profile().await.unwrap();

    let login = &transport.requests()[1];
    let body: serde_json::Value = serde_json::from_slice(login.body.as_deref().unwrap()).unwrap();
    assert_eq!(body["email"], "ada@example.com");
    assert_eq!(body["password"], "secret");
    assert_eq!(body["device"], "WEB");
    assert_eq!(body["isSocialLogin"], false);
    assert!(body["provider"].is_null());

    for request in transport.requests() {
        assert_eq!(
            request.header_str(&HeaderName::from_static("device")),
            Some("WEB")
        );
        assert!(request.header_str(&USER_AGENT).is_some());
    }
}

#[tokio::test]
async fn failed_refresh_surfaces_error_and_keeps_token() {
    let transport = Arc::new(ScriptedSender::new(vec![unauthorized(), unauthorized()]));
    let client = client(&config("stale", true), &transport);

    let err = client.get_profile().await.unwrap_err();
    assert!(err.is_unauthorized(), "unexpected error: {err}");
    assert_eq!(err.to_string(), "unexpected status 401 Unauthorized");
    assert_eq!(client.token().as_deref(), Some("stale"));
    assert_eq!(transport.requests().len(), 2);
    assert_eq!(client.session().policy().state().attempts, 1);
}

#[tokio::test]
async fn refresh_within_cooldown_is_exhausted() {
    let transport = Arc::new(ScriptedSender::new(vec![
        unauthorized(),
        unauthorized(),
        unauthorized(),
    ]));
    let client = client(&config("stale", true), &transport);

    assert!(client.get_profile().await.is_err());
    let err = client.get_profile().await.unwrap_err();
    assert!(matches!(err, EkzError::AuthExhausted { .. }), "{err}");
    // the second call never reached the login endpoint
    assert_eq!(
        transport.paths(),
        vec!["/users/profile", "/users/log-in", "/users/profile"]
    );
}

#[tokio::test]
async fn without_credentials_401_passes_through() {
    let transport = Arc::new(ScriptedSender::new(vec![unauthorized()]));
    let client = client(&config("stale", false), &transport);

    let err = client.get_profile().await.unwrap_err();
    assert!(err.is_unauthorized());
    assert_eq!(transport.paths(), vec!["/users/profile"]);
}

#[tokio::test]
async fn second_401_after_refresh_is_not_retried() {
    let transport = Arc::new(ScriptedSender::new(vec![
        unauthorized(),
        login_ok("fresh"),
        unauthorized(),
    ]));
    let client = client(&config("stale", true), &transport);

    let err = client.get_profile().await.unwrap_err();
    assert!(err.is_unauthorized());
    assert_eq!(client.token().as_deref(), Some("fresh"));
    assert_eq!(transport.remaining(), 0);
    assert_eq!(transport.requests().len(), 3);
}

#[tokio::test]
async fn request_without_token_omits_authorization() {
    let transport = Arc::new(ScriptedSender::new(vec![profile_ok()]));
    let client = client(&config("", false), &transport);

    client.get_profile().await.unwrap();
    assert_eq!(transport.authorizations(), vec![None]);
}

#[tokio::test]
async fn refreshed_token_is_persisted_without_overrides() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.yaml");
    let on_disk = Config {
        username: "file@example.com".to_string(),
        ..Default::default()
    };
    on_disk.save_to_file(&path).unwrap();

    // flags replaced the username for this run only
    let mut effective = on_disk.clone();
    effective.username = "flag@example.com".to_string();
    effective.password = "secret".to_string();
    effective.token = "stale".to_string();
    effective.backend_url = "http://ekz.test".to_string();

    let transport = Arc::new(ScriptedSender::new(vec![
        unauthorized(),
        login_ok("fresh"),
        profile_ok(),
    ]));
    let store = Arc::new(ConfigStore::new(path.clone(), on_disk));
    let client = EkzClient::with_transport(&effective, store, transport.clone());
    client.get_profile().await.unwrap();

    let saved = Config::from_file(&path).unwrap();
    assert_eq!(saved.token, "fresh");
    assert_eq!(saved.username, "file@example.com");
    assert!(saved.password.is_empty());
}
