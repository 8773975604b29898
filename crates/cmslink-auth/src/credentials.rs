//! Authorities and the live admin session.

use std::fmt;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use secrecy::{ExposeSecret, SecretString};

use crate::error::{AuthError, Result};

/// Admin login pair exchanged for a session JWT.
#[derive(Clone)]
pub struct AdminLogin {
    email: String,
    password: SecretString,
}

impl AdminLogin {
    /// Admin account email.
    pub fn email(&self) -> &str {
        &self.email
    }

    /// Admin account password.
    pub fn password(&self) -> &SecretString {
        &self.password
    }
}

impl fmt::Debug for AdminLogin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdminLogin")
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// The two authority surfaces. Immutable after construction.
///
/// At least one authority must be present; empty or whitespace-only values
/// count as absent.
#[derive(Clone)]
pub struct Credentials {
    static_token: Option<SecretString>,
    admin: Option<AdminLogin>,
}

fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl Credentials {
    /// Build credentials from optional parts.
    ///
    /// # Errors
    ///
    /// - [`AuthError::IncompleteAdminLogin`] if only one of email/password is given
    /// - [`AuthError::NoAuthority`] if neither authority is usable
    pub fn new(
        static_token: Option<String>,
        admin_email: Option<String>,
        admin_password: Option<String>,
    ) -> Result<Self> {
        let static_token = present(static_token).map(SecretString::new);
        let admin = match (present(admin_email), present(admin_password)) {
            (Some(email), Some(password)) => Some(AdminLogin {
                email,
                password: SecretString::new(password),
            }),
            (Some(_), None) => return Err(AuthError::IncompleteAdminLogin("admin password")),
            (None, Some(_)) => return Err(AuthError::IncompleteAdminLogin("admin email")),
            (None, None) => None,
        };

        if static_token.is_none() && admin.is_none() {
            return Err(AuthError::NoAuthority);
        }

        Ok(Self {
            static_token,
            admin,
        })
    }

    /// Credentials carrying only a static API token.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::NoAuthority`] if the token is empty.
    pub fn static_only(token: impl Into<String>) -> Result<Self> {
        Self::new(Some(token.into()), None, None)
    }

    /// Credentials carrying only an admin login pair.
    ///
    /// # Errors
    ///
    /// Returns an error if either part is empty.
    pub fn admin_only(email: impl Into<String>, password: impl Into<String>) -> Result<Self> {
        Self::new(None, Some(email.into()), Some(password.into()))
    }

    /// Static API token, if configured.
    pub fn static_token(&self) -> Option<&SecretString> {
        self.static_token.as_ref()
    }

    /// Admin login pair, if configured.
    pub fn admin(&self) -> Option<&AdminLogin> {
        self.admin.as_ref()
    }

    /// Whether a static token is configured.
    pub fn has_static_token(&self) -> bool {
        self.static_token.is_some()
    }

    /// Whether an admin login pair is configured.
    pub fn has_admin(&self) -> bool {
        self.admin.is_some()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field(
                "static_token",
                &self.static_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("admin", &self.admin)
            .finish()
    }
}

/// Live admin session. `jwt == None` means "not currently authenticated".
#[derive(Clone, Default)]
pub struct Session {
    jwt: Option<SecretString>,
    issued_at: Option<DateTime<Utc>>,
    expires_at: Option<DateTime<Utc>>,
}

impl Session {
    pub(crate) fn issued(jwt: String) -> Self {
        let expires_at = crate::jwt::expiry(&jwt);
        Self {
            jwt: Some(SecretString::new(jwt)),
            issued_at: Some(Utc::now()),
            expires_at,
        }
    }

    /// Current JWT.
    pub fn jwt(&self) -> Option<&SecretString> {
        self.jwt.as_ref()
    }

    /// Whether a JWT is held.
    pub fn is_authenticated(&self) -> bool {
        self.jwt.is_some()
    }

    /// When the current JWT was obtained.
    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        self.issued_at
    }

    /// `exp` claim of the current JWT, when it carries one.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("jwt", &self.jwt.as_ref().map(|_| "[REDACTED]"))
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Holds the authorities and the live session.
///
/// Readers get snapshots; only [`SessionManager`](crate::SessionManager)
/// writes the session.
#[derive(Debug)]
pub struct CredentialStore {
    credentials: Credentials,
    session: RwLock<Session>,
}

impl CredentialStore {
    /// Create a store with no active session.
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            session: RwLock::new(Session::default()),
        }
    }

    /// The configured authorities.
    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Snapshot of the current session.
    pub fn session(&self) -> Session {
        self.session.read().clone()
    }

    /// Current JWT, if authenticated.
    pub fn jwt(&self) -> Option<SecretString> {
        self.session.read().jwt.clone()
    }

    /// Whether `token` is the JWT currently held.
    pub(crate) fn holds(&self, token: &SecretString) -> bool {
        self.session
            .read()
            .jwt
            .as_ref()
            .is_some_and(|current| current.expose_secret() == token.expose_secret())
    }

    pub(crate) fn replace_session(&self, session: Session) {
        *self.session.write() = session;
    }

    pub(crate) fn clear_session(&self) {
        *self.session.write() = Session::default();
    }
}
