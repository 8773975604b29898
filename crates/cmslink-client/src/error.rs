//! Error types for client operations.

use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

use crate::reload::ReloadTimeout;
use crate::schema::MutationResult;

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while talking to the content-management service.
///
/// Every variant names the operation and the target (path or schema UID) it
/// concerns, plus the server's status and message where one exists.
#[derive(Debug, Error)]
pub enum Error {
    /// Connection refused, DNS failure or timeout. Never retried automatically.
    #[error("{operation} {target}: service unreachable: {message}")]
    Unreachable {
        /// Operation label
        operation: String,
        /// Request path or schema UID
        target: String,
        /// Transport diagnostic
        message: String,
    },

    /// Login or re-login failed, or a token was rejected after the single re-authentication.
    #[error("{operation} {target}: authentication failed: {reason}")]
    AuthenticationFailed {
        /// Operation label
        operation: String,
        /// Request path or schema UID
        target: String,
        /// Why authentication could not be established
        reason: String,
    },

    /// The server answered with an application error envelope.
    #[error("{operation} {target}: rejected by server ({status}): {message}")]
    Validation {
        /// Operation label
        operation: String,
        /// Request path or schema UID
        target: String,
        /// HTTP status of the response
        status: u16,
        /// Server-side error name (e.g. `ValidationError`)
        name: Option<String>,
        /// Server message, verbatim
        message: String,
        /// Structured validation details, verbatim
        details: Option<Value>,
    },

    /// A schema update would implicitly delete more than one attribute.
    #[error(
        "refusing to update {uid}: attributes [{}] are missing from the change set and would be deleted; \
         include every attribute to keep, or delete attributes one at a time",
        .attributes.join(", ")
    )]
    SafetyBlocked {
        /// Schema UID
        uid: String,
        /// Every attribute that would have been lost
        attributes: Vec<String>,
    },

    /// The requested schema or entry does not exist.
    #[error("{operation}: {target} not found")]
    NotFound {
        /// Operation label
        operation: String,
        /// Request path or schema UID
        target: String,
    },

    /// The mutation was submitted and accepted, but the service did not report
    /// healthy within the reload deadline.
    #[error("{operation} {target}: change applied but service not confirmed healthy: {timeout}")]
    ReloadTimeout {
        /// Operation label
        operation: String,
        /// Schema UID
        target: String,
        /// Details of the expired wait
        #[source]
        timeout: ReloadTimeout,
        /// What was submitted and how the server answered
        applied: Box<MutationResult>,
    },

    /// Non-2xx status without an application error envelope.
    #[error("{operation} {target}: HTTP {status}: {body}")]
    Http {
        /// Operation label
        operation: String,
        /// Request path or schema UID
        target: String,
        /// HTTP status
        status: u16,
        /// Raw response body
        body: String,
    },

    /// Response body did not have the expected shape.
    #[error("{operation} {target}: malformed response: {message}")]
    Decode {
        /// Operation label
        operation: String,
        /// Request path or schema UID
        target: String,
        /// What was wrong
        message: String,
    },

    /// Invalid or incomplete configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// The caller supplied an unusable request.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl Error {
    /// HTTP status associated with this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Validation { status, .. } | Self::Http { status, .. } => Some(*status),
            Self::NotFound { .. } => Some(404),
            Self::AuthenticationFailed { .. } => Some(401),
            _ => None,
        }
    }

    /// Whether the server accepted a mutation even though this error was returned.
    pub fn mutation_applied(&self) -> bool {
        matches!(self, Self::ReloadTimeout { .. })
    }

    /// How long the reload wait lasted before giving up.
    pub fn reload_waited(&self) -> Option<Duration> {
        match self {
            Self::ReloadTimeout { timeout, .. } => Some(timeout.waited),
            _ => None,
        }
    }

    /// Whether repeating the whole call later may succeed.
    ///
    /// Transport faults, server-side failures and unconfirmed reloads are
    /// transient. Auth, validation and safety errors are not.
    pub fn is_retryable_by_caller(&self) -> bool {
        match self {
            Self::Unreachable { .. } | Self::ReloadTimeout { .. } => true,
            Self::Http { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    /// Whether this error means the service could not be reached.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, Self::Unreachable { .. })
    }

    /// Rewrite a 404 from the executor into [`Error::NotFound`] for a schema UID.
    pub(crate) fn into_not_found(self, operation: &str, target: &str) -> Self {
        match self.status() {
            Some(404) if !matches!(self, Self::NotFound { .. }) => Self::NotFound {
                operation: operation.to_string(),
                target: target.to_string(),
            },
            _ => self,
        }
    }
}

impl From<crate::config::ConfigError> for Error {
    fn from(err: crate::config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Self::Config(format!("invalid URL: {err}"))
    }
}
