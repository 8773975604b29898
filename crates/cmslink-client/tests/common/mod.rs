//! Shared fixtures: a mock service with admin login, and a scripted health check.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cmslink_client::{ClientConfig, CmsClient, HealthCheck, HealthStatus, ReloadConfig};
use parking_lot::Mutex;
use serde_json::{Value, json};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const EMAIL: &str = "editor@example.com";
pub const PASSWORD: &str = "s3cret";

/// Route `tracing` output through the test harness; set `RUST_LOG` to see it.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Answer the admin login with `token`, at most `times` times.
pub async fn mount_login(server: &MockServer, token: &str, times: u64) {
    Mock::given(method("POST"))
        .and(path("/admin/login"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "data": { "token": token } })),
        )
        .up_to_n_times(times)
        .mount(server)
        .await;
}

/// Reject every admin login.
pub async fn mount_login_rejected(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/admin/login"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "data": null,
            "error": { "status": 400, "name": "ApplicationError", "message": "Invalid credentials" }
        })))
        .mount(server)
        .await;
}

/// Requests the server received on `request_path`.
pub async fn requests_to(server: &MockServer, request_path: &str) -> Vec<wiremock::Request> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|r| r.url.path() == request_path)
        .collect()
}

/// JSON bodies the server received on `request_path`.
pub async fn bodies_to(server: &MockServer, request_path: &str) -> Vec<Value> {
    requests_to(server, request_path)
        .await
        .iter()
        .map(|r| r.body_json::<Value>().unwrap())
        .collect()
}

/// Health check replaying a fixed script, repeating the final status.
#[derive(Debug)]
pub struct ScriptedHealth {
    script: Mutex<VecDeque<HealthStatus>>,
    last: Mutex<HealthStatus>,
    calls: Mutex<u32>,
}

impl ScriptedHealth {
    pub fn new(script: impl IntoIterator<Item = HealthStatus>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into_iter().collect()),
            last: Mutex::new(HealthStatus::Healthy),
            calls: Mutex::new(0),
        })
    }

    pub fn healthy() -> Arc<Self> {
        Self::new([HealthStatus::Healthy])
    }

    pub fn calls(&self) -> u32 {
        *self.calls.lock()
    }
}

#[async_trait]
impl HealthCheck for ScriptedHealth {
    async fn check(&self) -> HealthStatus {
        *self.calls.lock() += 1;
        let next = self.script.lock().pop_front();
        match next {
            Some(status) => {
                *self.last.lock() = status.clone();
                status
            }
            None => self.last.lock().clone(),
        }
    }
}

/// Reload timing with no delays and a short deadline.
pub fn fast_reload(max_wait: Duration) -> ReloadConfig {
    ReloadConfig {
        max_wait,
        ..ReloadConfig::immediate()
    }
}

/// Admin-authenticated client against `server` with a scripted health check.
pub fn admin_client(server: &MockServer, health: Arc<ScriptedHealth>) -> CmsClient {
    admin_client_with(server, health, Duration::from_secs(2))
}

pub fn admin_client_with(
    server: &MockServer,
    health: Arc<ScriptedHealth>,
    max_wait: Duration,
) -> CmsClient {
    let config = ClientConfig::new(server.uri())
        .with_admin(EMAIL, PASSWORD)
        .with_reload(&fast_reload(max_wait));
    CmsClient::with_health_check(config, health).unwrap()
}
