//! Error types for credential and session operations.

use thiserror::Error;

/// Result type for authentication operations.
pub type Result<T> = std::result::Result<T, AuthError>;

/// Errors raised by the credential store and session manager.
///
/// Rejected credentials and malformed login responses are *not* errors: the
/// login exchange reports them as `Ok(false)`. Only configuration mistakes and
/// transport-level faults surface here.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Neither a static token nor an admin login pair was supplied.
    #[error("no authority configured: provide a static API token or an admin email/password pair")]
    NoAuthority,

    /// Only half of the admin login pair was supplied.
    #[error("incomplete admin credentials: {0} is missing")]
    IncompleteAdminLogin(&'static str),

    /// The service could not be reached (connection refused, DNS failure, timeout).
    #[error("{operation}: service unreachable: {source}")]
    Unreachable {
        /// Operation that was being attempted
        operation: &'static str,
        /// Underlying transport error
        #[source]
        source: reqwest::Error,
    },

    /// Invalid base URL.
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl AuthError {
    /// Wrap a transport failure for the given operation.
    pub(crate) fn unreachable(operation: &'static str, source: reqwest::Error) -> Self {
        Self::Unreachable { operation, source }
    }

    /// Whether this error was caused by the service being unreachable.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, Self::Unreachable { .. })
    }
}
