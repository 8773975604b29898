//! # cmslink-auth
//!
//! Authentication for the two authority surfaces of a headless content-management
//! service:
//!
//! - **Static authority** - a long-lived bearer API token with scoped permissions.
//! - **Admin authority** - an email/password pair exchanged for a session JWT with
//!   full schema and content privileges.
//!
//! ## Architecture
//!
//! - [`credentials`] - [`Credentials`] (immutable authorities), [`Session`] and the
//!   [`CredentialStore`] that holds both
//! - [`session`] - [`SessionManager`]: login, 401-triggered re-authentication, renewal
//! - [`refresh`] - background token refresh loop and its [`RefreshHandle`]
//!
//! The session JWT is the only mutable shared state. It is written exclusively by
//! [`SessionManager`] and read by any number of concurrent request tasks, which must
//! tolerate it changing between read and use.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use cmslink_auth::{CredentialStore, Credentials, SessionManager};
//!
//! # async fn example() -> cmslink_auth::Result<()> {
//! let credentials = Credentials::admin_only("editor@example.com", "s3cret")?;
//! let store = Arc::new(CredentialStore::new(credentials));
//! let session = SessionManager::new(reqwest::Client::new(), "http://localhost:1337", store)?;
//!
//! if session.login().await? {
//!     println!("authenticated, expires at {:?}", session.session().expires_at());
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod credentials;
mod error;
mod jwt;
pub mod refresh;
pub mod session;

pub use credentials::{AdminLogin, CredentialStore, Credentials, Session};
pub use error::{AuthError, Result};
pub use refresh::RefreshHandle;
pub use session::{FailedRequest, SessionEndpoints, SessionManager};

use reqwest::header::HeaderValue;
use secrecy::{ExposeSecret, SecretString};
use url::Url;

/// Join a service-relative path onto a base URL.
///
/// Unlike [`Url::join`], the base path is always kept (a base of
/// `https://cms.example.com/strapi` and a path of `/admin/login` yields
/// `https://cms.example.com/strapi/admin/login`) and segments containing `:`
/// (such as `api::article.article`) are never mistaken for a scheme.
///
/// # Errors
///
/// Returns [`url::ParseError::RelativeUrlWithCannotBeABaseBase`] if `base`
/// cannot carry path segments (e.g. `mailto:` URLs).
pub fn endpoint_url(base: &Url, path: &str) -> std::result::Result<Url, url::ParseError> {
    let mut url = base.clone();
    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|()| url::ParseError::RelativeUrlWithCannotBeABaseBase)?;
        segments
            .pop_if_empty()
            .extend(path.split('/').filter(|segment| !segment.is_empty()));
    }
    Ok(url)
}

/// Build a sensitive `Authorization: Bearer ...` header value.
///
/// # Errors
///
/// Returns an error if the token contains characters that are not valid in a header.
pub fn bearer_header(
    token: &SecretString,
) -> std::result::Result<HeaderValue, reqwest::header::InvalidHeaderValue> {
    let mut value = HeaderValue::from_str(&format!("Bearer {}", token.expose_secret()))?;
    value.set_sensitive(true);
    Ok(value)
}
