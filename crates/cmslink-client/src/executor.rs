//! Authenticated request execution
//!
//! Every higher-level operation goes through [`RequestExecutor::execute`] and
//! inherits its retry depth: a 401 on an admin-scoped request triggers exactly
//! one re-authentication and exactly one repeat of the same request. A caller
//! therefore observes at most two physical requests per logical call.

use std::sync::Arc;

use cmslink_auth::{AuthError, FailedRequest, SessionManager, bearer_header, endpoint_url};
use reqwest::StatusCode;
use reqwest::header::AUTHORIZATION;
use secrecy::SecretString;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::request::{Authority, RequestSpec};

/// Status and body of one physical request.
#[derive(Debug)]
struct RawResponse {
    status: StatusCode,
    body: String,
}

/// Authenticated request wrapper shared by schema mutation and plain CRUD.
#[derive(Debug)]
pub struct RequestExecutor {
    http: reqwest::Client,
    base_url: Url,
    session: Arc<SessionManager>,
}

impl RequestExecutor {
    /// Create an executor for the service at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `base_url` does not parse.
    pub fn new(http: reqwest::Client, base_url: &str, session: Arc<SessionManager>) -> Result<Self> {
        Ok(Self {
            http,
            base_url: Url::parse(base_url)?,
            session,
        })
    }

    /// The session manager consulted for admin credentials.
    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    /// Service base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Execute a request and return its JSON body.
    ///
    /// Non-JSON success bodies are returned as a JSON string; empty bodies as `null`.
    ///
    /// # Errors
    ///
    /// - [`Error::AuthenticationFailed`] if no credential could be obtained, re-login
    ///   failed, or the repeated request was rejected again
    /// - [`Error::Unreachable`] on connection failure (not retried)
    /// - [`Error::Validation`] when the body carries an application error envelope
    /// - [`Error::Http`] for any other non-2xx status
    pub async fn execute(&self, spec: &RequestSpec) -> Result<Value> {
        let token = self.credential_for(spec).await?;
        let first = self.send(spec, &token).await?;

        if first.status != StatusCode::UNAUTHORIZED {
            return interpret(spec, first);
        }

        if spec.authority == Authority::Static {
            return Err(auth_failed(spec, "static API token was rejected"));
        }

        let failed = FailedRequest::new(spec.operation.clone(), Some(token));
        let recovered = self
            .session
            .handle_auth_error(&failed)
            .await
            .map_err(|e| self.map_auth_error(spec, e))?;

        if !recovered {
            return Err(auth_failed(spec, &self.login_failure("re-authentication failed")));
        }

        let token = self
            .session
            .jwt()
            .ok_or_else(|| auth_failed(spec, "session was cleared before retry"))?;

        debug!(operation = %spec.operation, path = %spec.path, "retrying once after re-authentication");
        let retry = self.send(spec, &token).await?;
        interpret(spec, retry)
    }

    /// Resolve the bearer token for the request's authority.
    async fn credential_for(&self, spec: &RequestSpec) -> Result<SecretString> {
        match spec.authority {
            Authority::Static => self
                .session
                .store()
                .credentials()
                .static_token()
                .cloned()
                .ok_or_else(|| auth_failed(spec, "no static API token configured")),
            Authority::Admin => {
                if let Some(reason) = self.session.fatal_reason() {
                    return Err(auth_failed(spec, &format!("admin session lost: {reason}")));
                }
                if let Some(jwt) = self.session.jwt() {
                    return Ok(jwt);
                }

                debug!(operation = %spec.operation, "no admin session; logging in");
                let logged_in = self
                    .session
                    .login()
                    .await
                    .map_err(|e| self.map_auth_error(spec, e))?;
                if !logged_in {
                    return Err(auth_failed(spec, &self.login_failure("admin login failed")));
                }
                self.session
                    .jwt()
                    .ok_or_else(|| auth_failed(spec, "login succeeded without a session token"))
            }
        }
    }

    async fn send(&self, spec: &RequestSpec, token: &SecretString) -> Result<RawResponse> {
        let url = endpoint_url(&self.base_url, &spec.path)
            .map_err(|e| Error::InvalidRequest(format!("{}: {e}", spec.path)))?;
        let authorization = bearer_header(token).map_err(|_| {
            auth_failed(spec, "credential contains characters not allowed in a header")
        })?;

        let mut request = self
            .http
            .request(spec.method.clone(), url)
            .header(AUTHORIZATION, authorization);
        if !spec.query.is_empty() {
            request = request.query(&spec.query);
        }
        if let Some(body) = &spec.body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            warn!(operation = %spec.operation, path = %spec.path, error = %e, "request failed");
            if e.is_builder() {
                Error::InvalidRequest(format!("{} {}: {e}", spec.operation, spec.path))
            } else {
                unreachable_error(spec, &e)
            }
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| Error::Decode {
            operation: spec.operation.clone(),
            target: spec.path.clone(),
            message: format!("failed to read body: {e}"),
        })?;

        debug!(operation = %spec.operation, path = %spec.path, status = status.as_u16(), "response received");
        Ok(RawResponse { status, body })
    }

    fn map_auth_error(&self, spec: &RequestSpec, err: AuthError) -> Error {
        match err {
            AuthError::Unreachable { source, .. } => unreachable_error(spec, &source),
            other => auth_failed(spec, &other.to_string()),
        }
    }

    fn login_failure(&self, fallback: &str) -> String {
        self.session
            .last_failure()
            .unwrap_or_else(|| fallback.to_string())
    }
}

fn auth_failed(spec: &RequestSpec, reason: &str) -> Error {
    Error::AuthenticationFailed {
        operation: spec.operation.clone(),
        target: spec.path.clone(),
        reason: reason.to_string(),
    }
}

fn unreachable_error(spec: &RequestSpec, err: &reqwest::Error) -> Error {
    let message = if err.is_timeout() {
        format!("timed out: {err}")
    } else if err.is_connect() {
        format!("connection failed: {err}")
    } else {
        err.to_string()
    };
    Error::Unreachable {
        operation: spec.operation.clone(),
        target: spec.path.clone(),
        message,
    }
}

/// Turn a raw response into the caller-visible result.
fn interpret(spec: &RequestSpec, raw: RawResponse) -> Result<Value> {
    let status = raw.status;
    let parsed: Option<Value> = if raw.body.trim().is_empty() {
        None
    } else {
        serde_json::from_str(&raw.body).ok()
    };

    if status == StatusCode::UNAUTHORIZED {
        return Err(auth_failed(spec, "credentials rejected after re-authentication"));
    }

    if !status.is_server_error()
        && let Some(envelope) = parsed.as_ref().and_then(ErrorEnvelope::from_body)
    {
        return Err(Error::Validation {
            operation: spec.operation.clone(),
            target: spec.path.clone(),
            status: envelope.status.unwrap_or(status.as_u16()),
            name: envelope.name,
            message: envelope.message,
            details: envelope.details,
        });
    }

    if !status.is_success() {
        return Err(Error::Http {
            operation: spec.operation.clone(),
            target: spec.path.clone(),
            status: status.as_u16(),
            body: raw.body,
        });
    }

    Ok(match parsed {
        Some(json) => json,
        None if raw.body.trim().is_empty() => Value::Null,
        None => Value::String(raw.body),
    })
}

/// Application-level error envelope: `{"data": null, "error": {...}}`.
#[derive(Debug, PartialEq)]
struct ErrorEnvelope {
    status: Option<u16>,
    name: Option<String>,
    message: String,
    details: Option<Value>,
}

impl ErrorEnvelope {
    fn from_body(body: &Value) -> Option<Self> {
        match body.get("error")? {
            Value::Object(error) => {
                let message = error
                    .get("message")
                    .and_then(Value::as_str)
                    .or_else(|| error.get("name").and_then(Value::as_str))?
                    .to_string();
                Some(Self {
                    status: error
                        .get("status")
                        .and_then(Value::as_u64)
                        .and_then(|s| u16::try_from(s).ok()),
                    name: error.get("name").and_then(Value::as_str).map(String::from),
                    message,
                    details: error
                        .get("details")
                        .filter(|d| !d.is_null() && d.as_object().is_none_or(|o| !o.is_empty()))
                        .cloned(),
                })
            }
            Value::String(message) => Some(Self {
                status: None,
                name: None,
                message: body
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or(message.as_str())
                    .to_string(),
                details: None,
            }),
            _ => None,
        }
    }
}
