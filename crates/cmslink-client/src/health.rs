//! Service health probing
//!
//! A probe issues one bounded-timeout request to the service's status endpoint
//! and classifies the answer. Results are produced fresh on every call and never
//! cached.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::trace;
use url::Url;

/// Why the service is considered unhealthy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnhealthyReason {
    /// Connection refused: the service is down.
    Refused,
    /// Timeout, unexpected status or any other network issue.
    Other,
}

/// Classified result of a single probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Service answered OK.
    Healthy,
    /// Service answered "temporarily unavailable" (restarting).
    Reloading,
    /// Service is down or answered unexpectedly.
    Unhealthy {
        /// Failure class
        reason: UnhealthyReason,
        /// Diagnostic message
        message: String,
    },
}

impl HealthStatus {
    /// Whether the service is ready for requests.
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }

    /// Diagnostic message, if any.
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Unhealthy { message, .. } => Some(message),
            _ => None,
        }
    }

    fn unhealthy(reason: UnhealthyReason, message: impl Into<String>) -> Self {
        Self::Unhealthy {
            reason,
            message: message.into(),
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => f.write_str("healthy"),
            Self::Reloading => f.write_str("reloading"),
            Self::Unhealthy {
                reason: UnhealthyReason::Refused,
                message,
            } => write!(f, "unhealthy (refused): {message}"),
            Self::Unhealthy { message, .. } => write!(f, "unhealthy: {message}"),
        }
    }
}

/// Something that can report the service's health. Never fails.
#[async_trait]
pub trait HealthCheck: Send + Sync + fmt::Debug {
    /// Probe the service once.
    async fn check(&self) -> HealthStatus;
}

/// HTTP probe against the service's lightweight status endpoint.
#[derive(Debug, Clone)]
pub struct HttpHealthProbe {
    http: reqwest::Client,
    url: Url,
    timeout: Duration,
}

impl HttpHealthProbe {
    /// Default probe timeout.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

    /// Probe `url` with the default timeout.
    pub fn new(http: reqwest::Client, url: Url) -> Self {
        Self {
            http,
            url,
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }

    /// Set the per-probe timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Probed URL.
    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl HealthCheck for HttpHealthProbe {
    async fn check(&self) -> HealthStatus {
        let result = self
            .http
            .get(self.url.clone())
            .timeout(self.timeout)
            .send()
            .await;

        let status = match result {
            Ok(response) => classify(response.status()),
            // a connect-phase timeout is also a connect error
            Err(e) if e.is_timeout() => HealthStatus::unhealthy(
                UnhealthyReason::Other,
                format!("no answer within {:?}", self.timeout),
            ),
            Err(e) if e.is_connect() => {
                HealthStatus::unhealthy(UnhealthyReason::Refused, format!("connection refused: {e}"))
            }
            Err(e) => HealthStatus::unhealthy(UnhealthyReason::Other, e.to_string()),
        };

        trace!(url = %self.url, %status, "health probe");
        status
    }
}

fn classify(status: StatusCode) -> HealthStatus {
    if status.is_success() {
        HealthStatus::Healthy
    } else if status == StatusCode::SERVICE_UNAVAILABLE {
        HealthStatus::Reloading
    } else {
        HealthStatus::unhealthy(
            UnhealthyReason::Other,
            format!("unexpected status {status}"),
        )
    }
}
