//! Client configuration
//!
//! Loaded from a TOML, YAML or JSON file and/or `CMSLINK_`-prefixed
//! environment variables. Nested keys use `__` in variable names:
//!
//! ```text
//! CMSLINK_BASE_URL=https://cms.example.com
//! CMSLINK_API_TOKEN=...
//! CMSLINK_RELOAD__MAX_WAIT_MS=90000
//! ```

use std::path::PathBuf;
use std::time::Duration;

use cmslink_auth::{Credentials, SessionEndpoints};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::reload::ReloadConfig;
use crate::schema::SchemaPaths;

/// Default environment variable prefix.
pub const ENV_PREFIX: &str = "CMSLINK";

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file not found
    #[error("configuration file not found: {0}")]
    FileNotFound(PathBuf),

    /// Unsupported file format
    #[error("unsupported configuration file format; use .toml, .yaml, .yml or .json")]
    UnsupportedFormat,

    /// File or environment could not be parsed
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] ::config::ConfigError),

    /// Values parsed but do not form a usable configuration
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Connection and behavior settings for [`CmsClient`](crate::CmsClient).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Service base URL
    pub base_url: String,
    /// Static API token (static authority)
    pub api_token: Option<SecretString>,
    /// Admin email (admin authority)
    pub admin_email: Option<String>,
    /// Admin password (admin authority)
    pub admin_password: Option<SecretString>,
    /// Timeout for every API request, in milliseconds
    pub request_timeout_ms: u64,
    /// Health probe endpoint and timeout
    pub health: HealthSettings,
    /// Reload wait timing
    pub reload: ReloadSettings,
    /// Admin session endpoints and refresh
    pub session: SessionSettings,
    /// Schema builder endpoints
    pub schema: SchemaSettings,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:1337".to_string(),
            api_token: None,
            admin_email: None,
            admin_password: None,
            request_timeout_ms: 30_000,
            health: HealthSettings::default(),
            reload: ReloadSettings::default(),
            session: SessionSettings::default(),
            schema: SchemaSettings::default(),
        }
    }
}

/// Health probe settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HealthSettings {
    /// Status endpoint path
    pub path: String,
    /// Per-probe timeout
    pub timeout_ms: u64,
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            path: "/_health".to_string(),
            timeout_ms: 5_000,
        }
    }
}

/// Reload wait timing, in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ReloadSettings {
    /// Delay before the first probe
    pub initial_delay_ms: u64,
    /// Delay before polling starts
    pub restart_delay_ms: u64,
    /// Interval between polls
    pub poll_interval_ms: u64,
    /// Settle time once healthy
    pub settle_delay_ms: u64,
    /// Deadline for the whole wait
    pub max_wait_ms: u64,
}

impl Default for ReloadSettings {
    fn default() -> Self {
        Self {
            initial_delay_ms: 1_000,
            restart_delay_ms: 2_000,
            poll_interval_ms: 2_000,
            settle_delay_ms: 1_000,
            max_wait_ms: 60_000,
        }
    }
}

impl ReloadSettings {
    /// Timing as a [`ReloadConfig`].
    pub fn to_reload_config(&self) -> ReloadConfig {
        ReloadConfig {
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            restart_delay: Duration::from_millis(self.restart_delay_ms),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            settle_delay: Duration::from_millis(self.settle_delay_ms),
            max_wait: Duration::from_millis(self.max_wait_ms),
        }
    }
}

/// Admin session settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Admin login endpoint
    pub login_path: String,
    /// Token renewal endpoint
    pub renew_path: String,
    /// Start the background refresh loop with this interval when set
    pub refresh_interval_secs: Option<u64>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        let endpoints = SessionEndpoints::default();
        Self {
            login_path: endpoints.login_path,
            renew_path: endpoints.renew_path,
            refresh_interval_secs: None,
        }
    }
}

impl SessionSettings {
    /// Paths for the session manager.
    pub fn endpoints(&self) -> SessionEndpoints {
        SessionEndpoints {
            login_path: self.login_path.clone(),
            renew_path: self.renew_path.clone(),
        }
    }

    /// Refresh interval; `None` (or zero) disables the loop.
    pub fn refresh_interval(&self) -> Option<Duration> {
        self.refresh_interval_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

/// Schema builder endpoints and mutation behavior.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SchemaSettings {
    /// Content-type collection endpoint
    pub content_types_path: String,
    /// Component collection endpoint
    pub components_path: String,
    /// Endpoint accepting schema updates
    pub update_schema_path: String,
    /// Wait for the service to reload after every schema mutation
    pub wait_for_reload: bool,
}

impl Default for SchemaSettings {
    fn default() -> Self {
        let paths = SchemaPaths::default();
        Self {
            content_types_path: paths.content_types,
            components_path: paths.components,
            update_schema_path: paths.update_schema,
            wait_for_reload: true,
        }
    }
}

impl SchemaSettings {
    /// Paths for the schema mutator.
    pub fn paths(&self) -> SchemaPaths {
        SchemaPaths {
            content_types: self.content_types_path.clone(),
            components: self.components_path.clone(),
            update_schema: self.update_schema_path.clone(),
        }
    }
}

impl ClientConfig {
    /// Configuration for the service at `base_url`, everything else default.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Load configuration from a file (TOML, YAML, or JSON)
    ///
    /// The format is picked from the extension. `CMSLINK_`-prefixed
    /// environment variables override file settings.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file doesn't exist
    /// - The file format is unsupported
    /// - The file contains invalid configuration
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        Self::from_file_with_prefix(path, ENV_PREFIX)
    }

    /// Load configuration from a file with a custom environment prefix.
    ///
    /// # Errors
    ///
    /// See [`from_file`](Self::from_file).
    pub fn from_file_with_prefix(
        path: impl AsRef<std::path::Path>,
        env_prefix: &str,
    ) -> Result<Self, ConfigError> {
        use ::config::{Config, File, FileFormat};

        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let format = match path.extension().and_then(|s| s.to_str()) {
            Some("toml") => FileFormat::Toml,
            Some("yaml" | "yml") => FileFormat::Yaml,
            Some("json") => FileFormat::Json,
            _ => return Err(ConfigError::UnsupportedFormat),
        };

        let config = Config::builder()
            .add_source(File::new(
                path.to_str().ok_or(ConfigError::UnsupportedFormat)?,
                format,
            ))
            .add_source(environment(env_prefix))
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Load configuration from `CMSLINK_`-prefixed environment variables only.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if a variable has the wrong type.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = ::config::Config::builder()
            .add_source(environment(ENV_PREFIX))
            .build()?;
        Ok(config.try_deserialize()?)
    }

    /// Build the credential set from the configured authorities.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if no authority is configured or the
    /// admin pair is incomplete.
    pub fn credentials(&self) -> Result<Credentials, ConfigError> {
        let expose = |secret: &Option<SecretString>| {
            secret.as_ref().map(|s| s.expose_secret().clone())
        };
        Credentials::new(
            expose(&self.api_token),
            self.admin_email.clone(),
            expose(&self.admin_password),
        )
        .map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    /// Timeout for API requests.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Timeout for one health probe.
    pub fn health_timeout(&self) -> Duration {
        Duration::from_millis(self.health.timeout_ms)
    }

    /// Set the static API token.
    #[must_use]
    pub fn with_api_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = Some(SecretString::new(token.into()));
        self
    }

    /// Set the admin login.
    #[must_use]
    pub fn with_admin(mut self, email: impl Into<String>, password: impl Into<String>) -> Self {
        self.admin_email = Some(email.into());
        self.admin_password = Some(SecretString::new(password.into()));
        self
    }

    /// Set the API request timeout.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_ms = duration_ms(timeout);
        self
    }

    /// Replace the reload wait timing.
    #[must_use]
    pub fn with_reload(mut self, reload: &ReloadConfig) -> Self {
        self.reload = ReloadSettings {
            initial_delay_ms: duration_ms(reload.initial_delay),
            restart_delay_ms: duration_ms(reload.restart_delay),
            poll_interval_ms: duration_ms(reload.poll_interval),
            settle_delay_ms: duration_ms(reload.settle_delay),
            max_wait_ms: duration_ms(reload.max_wait),
        };
        self
    }

    /// Whether schema mutations wait for the reload.
    #[must_use]
    pub fn with_wait_for_reload(mut self, wait: bool) -> Self {
        self.schema.wait_for_reload = wait;
        self
    }

    /// Enable the background session refresh loop.
    #[must_use]
    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.session.refresh_interval_secs = Some(interval.as_secs());
        self
    }
}

fn environment(prefix: &str) -> ::config::Environment {
    ::config::Environment::with_prefix(prefix)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
