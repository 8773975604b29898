//! Admin session manager
//!
//! Owns the login exchange, 401-triggered re-authentication and token renewal.
//! Every write to the session JWT goes through this type; request code only
//! reads snapshots and reports failures back via [`SessionManager::handle_auth_error`].

use std::sync::Arc;

use parking_lot::RwLock;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

use crate::credentials::{CredentialStore, Session};
use crate::error::{AuthError, Result};
use crate::endpoint_url;

/// Paths of the admin authentication endpoints, relative to the base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEndpoints {
    /// Login exchange (`POST {email, password}` -> JWT)
    pub login_path: String,
    /// Token renewal (`POST {token}` -> fresh JWT)
    pub renew_path: String,
}

impl Default for SessionEndpoints {
    fn default() -> Self {
        Self {
            login_path: "/admin/login".to_string(),
            renew_path: "/admin/renew-token".to_string(),
        }
    }
}

/// Context of a request that was answered with 401.
#[derive(Debug, Clone)]
pub struct FailedRequest {
    /// Operation label, for logs
    pub operation: String,
    /// Token the failed request was sent with
    pub token: Option<SecretString>,
}

impl FailedRequest {
    /// Describe a failed request.
    pub fn new(operation: impl Into<String>, token: Option<SecretString>) -> Self {
        Self {
            operation: operation.into(),
            token,
        }
    }
}

/// Admin session manager.
///
/// Logins are serialized: concurrent 401s on the same stale token produce a
/// single login, and later callers observe the replaced token instead of
/// logging in again.
#[derive(Debug)]
pub struct SessionManager {
    http: reqwest::Client,
    base_url: Url,
    endpoints: SessionEndpoints,
    store: Arc<CredentialStore>,
    login_lock: Mutex<()>,
    last_failure: RwLock<Option<String>>,
    fatal: RwLock<Option<String>>,
}

impl SessionManager {
    /// Create a session manager for the service at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidUrl`] if `base_url` does not parse.
    pub fn new(
        http: reqwest::Client,
        base_url: &str,
        store: Arc<CredentialStore>,
    ) -> Result<Self> {
        Ok(Self {
            http,
            base_url: Url::parse(base_url)?,
            endpoints: SessionEndpoints::default(),
            store,
            login_lock: Mutex::new(()),
            last_failure: RwLock::new(None),
            fatal: RwLock::new(None),
        })
    }

    /// Override the authentication endpoint paths.
    #[must_use]
    pub fn with_endpoints(mut self, endpoints: SessionEndpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    /// The credential store backing this session.
    pub fn store(&self) -> &Arc<CredentialStore> {
        &self.store
    }

    /// Whether an admin login pair is configured.
    pub fn has_admin(&self) -> bool {
        self.store.credentials().has_admin()
    }

    /// Current JWT, if authenticated.
    pub fn jwt(&self) -> Option<SecretString> {
        self.store.jwt()
    }

    /// Snapshot of the current session.
    pub fn session(&self) -> Session {
        self.store.session()
    }

    /// Reason the most recent login or renewal failed.
    pub fn last_failure(&self) -> Option<String> {
        self.last_failure.read().clone()
    }

    /// Set once the refresh loop has given up; cleared by a successful [`login`](Self::login).
    pub fn fatal_reason(&self) -> Option<String> {
        self.fatal.read().clone()
    }

    pub(crate) fn mark_fatal(&self, reason: String) {
        self.store.clear_session();
        *self.fatal.write() = Some(reason);
    }

    /// Perform the admin login exchange.
    ///
    /// Returns `Ok(true)` and stores the JWT on success. Rejected credentials,
    /// missing admin credentials and malformed responses return `Ok(false)` and
    /// leave the session unauthenticated.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Unreachable`] when the service cannot be reached.
    pub async fn login(&self) -> Result<bool> {
        let _guard = self.login_lock.lock().await;
        self.login_locked().await
    }

    /// Recover from a 401 by discarding the session and logging in again.
    ///
    /// Called once per failed request. If another task already replaced the
    /// token the failed request used, no second login is made and `Ok(true)`
    /// is returned. The original request is never retried here.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Unreachable`] when the service cannot be reached.
    pub async fn handle_auth_error(&self, failed: &FailedRequest) -> Result<bool> {
        let _guard = self.login_lock.lock().await;

        if let Some(current) = self.store.jwt() {
            let replaced = failed
                .token
                .as_ref()
                .is_none_or(|used| used.expose_secret() != current.expose_secret());
            if replaced {
                debug!(
                    operation = %failed.operation,
                    "session already re-authenticated by another request"
                );
                return Ok(true);
            }
        }

        warn!(operation = %failed.operation, "admin token rejected; re-authenticating");
        self.store.clear_session();
        self.login_locked().await
    }

    /// Renew the current JWT without re-sending the password.
    ///
    /// Returns `Ok(false)` when there is no token to renew or the service
    /// refuses the renewal.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Unreachable`] when the service cannot be reached.
    pub async fn renew(&self) -> Result<bool> {
        let _guard = self.login_lock.lock().await;

        let Some(current) = self.store.jwt() else {
            self.record_failure("no session token to renew");
            return Ok(false);
        };

        let url = endpoint_url(&self.base_url, &self.endpoints.renew_path)?;
        let response = self
            .http
            .post(url)
            .json(&json!({ "token": current.expose_secret() }))
            .send()
            .await;

        match self.read_token(response, "renew").await? {
            Some(token) => {
                // A login may have replaced the token while the renewal was in flight.
                if !self.store.holds(&current) {
                    debug!("session replaced during renewal; keeping newer token");
                    return Ok(true);
                }
                self.store.replace_session(Session::issued(token));
                debug!(expires_at = ?self.store.session().expires_at(), "admin token renewed");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn login_locked(&self) -> Result<bool> {
        let Some(admin) = self.store.credentials().admin() else {
            self.record_failure("no admin credentials configured");
            return Ok(false);
        };

        let url = endpoint_url(&self.base_url, &self.endpoints.login_path)?;
        debug!(email = %admin.email(), "logging in to admin API");

        let response = self
            .http
            .post(url)
            .json(&json!({
                "email": admin.email(),
                "password": admin.password().expose_secret(),
            }))
            .send()
            .await;

        let token = match self.read_token(response, "login").await {
            Ok(token) => token,
            Err(e) => {
                self.store.clear_session();
                return Err(e);
            }
        };

        match token {
            Some(token) => {
                self.store.replace_session(Session::issued(token));
                *self.last_failure.write() = None;
                *self.fatal.write() = None;
                info!(
                    email = %admin.email(),
                    expires_at = ?self.store.session().expires_at(),
                    "admin login succeeded"
                );
                Ok(true)
            }
            None => {
                self.store.clear_session();
                Ok(false)
            }
        }
    }

    /// Read a JWT out of a login/renew response.
    ///
    /// `Ok(None)` covers every non-transport failure; the reason is recorded.
    async fn read_token(
        &self,
        response: std::result::Result<reqwest::Response, reqwest::Error>,
        operation: &'static str,
    ) -> Result<Option<String>> {
        let response = match response {
            Ok(response) => response,
            Err(e) if e.is_connect() || e.is_timeout() => {
                self.record_failure(format!("{operation}: service unreachable: {e}"));
                return Err(AuthError::unreachable(operation, e));
            }
            Err(e) => {
                self.record_failure(format!("{operation}: request failed: {e}"));
                return Ok(None);
            }
        };

        let status = response.status();
        let body: Value = match response.json().await {
            Ok(body) => body,
            Err(e) => {
                self.record_failure(format!("{operation}: unreadable response ({status}): {e}"));
                return Ok(None);
            }
        };

        if !status.is_success() {
            let message = body
                .pointer("/error/message")
                .and_then(Value::as_str)
                .unwrap_or("no error message");
            self.record_failure(format!("{operation} rejected ({status}): {message}"));
            return Ok(None);
        }

        match extract_token(&body) {
            Some(token) => Ok(Some(token.to_string())),
            None => {
                self.record_failure(format!("{operation}: response carried no token"));
                Ok(None)
            }
        }
    }

    fn record_failure(&self, reason: impl Into<String>) {
        let reason = reason.into();
        warn!(%reason, "admin authentication failed");
        *self.last_failure.write() = Some(reason);
    }
}

/// Locate the JWT in a login or renew response body.
fn extract_token(body: &Value) -> Option<&str> {
    ["/data/token", "/token", "/jwt", "/data/jwt"]
        .iter()
        .find_map(|pointer| body.pointer(pointer).and_then(Value::as_str))
        .filter(|token| !token.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_token_shapes() {
        assert_eq!(
            extract_token(&json!({ "data": { "token": "abc", "user": {} } })),
            Some("abc")
        );
        assert_eq!(extract_token(&json!({ "jwt": "xyz" })), Some("xyz"));
        assert_eq!(extract_token(&json!({ "data": { "token": "" } })), None);
        assert_eq!(extract_token(&json!({ "data": null })), None);
    }

    #[test]
    fn test_default_endpoints() {
        let endpoints = SessionEndpoints::default();
        assert_eq!(endpoints.login_path, "/admin/login");
        assert_eq!(endpoints.renew_path, "/admin/renew-token");
    }
}
