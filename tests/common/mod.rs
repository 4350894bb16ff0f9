#![allow(dead_code)]

use ekz_tesla::error::{EkzError, Result};
use ekz_tesla::http::{HttpRequest, HttpResponse, HttpSender};
use reqwest::StatusCode;
use reqwest::header::AUTHORIZATION;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Answers requests from a fixed script and records what was sent
#[derive(Default)]
pub struct ScriptedSender {
    responses: Mutex<VecDeque<HttpResponse>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedSender {
    pub fn new(responses: Vec<HttpResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn paths(&self) -> Vec<String> {
        self.requests()
            .iter()
            .map(|r| {
                r.url
                    .split_once("://")
                    .and_then(|(_, rest)| rest.find('/').map(|i| rest[i..].to_string()))
                    .unwrap_or_default()
            })
            .collect()
    }

    pub fn authorizations(&self) -> Vec<Option<String>> {
        self.requests()
            .iter()
            .map(|r| r.header_str(&AUTHORIZATION).map(str::to_string))
            .collect()
    }

    pub fn remaining(&self) -> usize {
        self.responses.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl HttpSender for ScriptedSender {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        self.requests.lock().unwrap().push(request);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| EkzError::network("no scripted response left"))
    }
}

pub fn json(status: StatusCode, body: serde_json::Value) -> HttpResponse {
    HttpResponse::new(status, body.to_string())
}

pub fn unauthorized() -> HttpResponse {
    json(
        StatusCode::UNAUTHORIZED,
        serde_json::json!({"message": "Unauthorized"}),
    )
}

pub fn login_ok(token: &str) -> HttpResponse {
    json(
        StatusCode::OK,
        serde_json::json!({"status_code": 200, "message": "ok", "token": token, "is_verified": true}),
    )
}

pub fn profile_ok() -> HttpResponse {
    json(
        StatusCode::OK,
        serde_json::json!({"data": {"personal": {"first_name": "Ada", "email": "ada@example.com"}}}),
    )
}

pub fn live_data(power: f64) -> HttpResponse {
    json(
        StatusCode::OK,
        serde_json::json!({
            "chargeBoxId": "CH-1",
            "connectorId": 1,
            "power": power,
            "charged_energy": 1.5,
            "status": "CHARGING",
            "transaction_id": 77
        }),
    )
}

pub fn transaction_not_found() -> HttpResponse {
    json(
        StatusCode::NOT_FOUND,
        serde_json::json!({"message": "transaction not found in table"}),
    )
}

pub fn remote_ok() -> HttpResponse {
    json(
        StatusCode::OK,
        serde_json::json!({"data": {"charging_status": "STARTED", "current_power": 0}}),
    )
}
