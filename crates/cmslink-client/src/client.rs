//! Client facade wiring every component to one shared session.

use std::sync::Arc;
use std::time::Duration;

use cmslink_auth::{CredentialStore, RefreshHandle, SessionManager, endpoint_url};
use serde_json::Value;
use tracing::{info, warn};

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::executor::RequestExecutor;
use crate::health::{HealthCheck, HealthStatus, HttpHealthProbe, UnhealthyReason};
use crate::reload::{ReloadCoordinator, ReloadOutcome, ReloadTimeout};
use crate::request::RequestSpec;
use crate::schema::SchemaMutator;

/// Which authorities were usable when [`CmsClient::connect`] ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionReport {
    /// Health at connect time
    pub health: HealthStatus,
    /// Admin login result; `None` when no admin credentials are configured
    pub admin: Option<bool>,
    /// Whether a static API token is configured
    pub static_token: bool,
}

impl ConnectionReport {
    /// Whether at least one authority can be used.
    pub fn is_usable(&self) -> bool {
        self.admin == Some(true) || self.static_token
    }
}

/// Client for one content-management service.
///
/// All components share a single [`SessionManager`], so a re-login triggered
/// by one request is observed by every other.
#[derive(Debug)]
pub struct CmsClient {
    config: ClientConfig,
    session: Arc<SessionManager>,
    executor: Arc<RequestExecutor>,
    health: Arc<dyn HealthCheck>,
    reload: Arc<ReloadCoordinator>,
    schema: SchemaMutator,
}

impl CmsClient {
    /// Build a client that probes the configured health endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if no authority is configured, the base URL
    /// is invalid or the HTTP client cannot be built.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let http = http_client(&config)?;
        let base = url::Url::parse(&config.base_url)?;
        let probe = HttpHealthProbe::new(http.clone(), endpoint_url(&base, &config.health.path)?)
            .with_timeout(config.health_timeout());
        Self::assemble(config, http, Arc::new(probe))
    }

    /// Build a client with a custom health check.
    ///
    /// # Errors
    ///
    /// See [`new`](Self::new).
    pub fn with_health_check(config: ClientConfig, health: Arc<dyn HealthCheck>) -> Result<Self> {
        let http = http_client(&config)?;
        Self::assemble(config, http, health)
    }

    fn assemble(
        config: ClientConfig,
        http: reqwest::Client,
        health: Arc<dyn HealthCheck>,
    ) -> Result<Self> {
        let store = Arc::new(CredentialStore::new(config.credentials()?));
        let session = Arc::new(
            SessionManager::new(http.clone(), &config.base_url, store)
                .map_err(|e| Error::Config(e.to_string()))?
                .with_endpoints(config.session.endpoints()),
        );
        let executor = Arc::new(RequestExecutor::new(
            http,
            &config.base_url,
            Arc::clone(&session),
        )?);
        let reload = Arc::new(ReloadCoordinator::new(
            Arc::clone(&health),
            config.reload.to_reload_config(),
        ));
        let schema = SchemaMutator::new(Arc::clone(&executor), Arc::clone(&reload))
            .with_paths(config.schema.paths())
            .with_wait_for_reload(config.schema.wait_for_reload);

        Ok(Self {
            config,
            session,
            executor,
            health,
            reload,
            schema,
        })
    }

    /// Probe the service and log in with the admin authority if configured.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unreachable`] if the service refuses connections.
    pub async fn connect(&self) -> Result<ConnectionReport> {
        let health = self.health.check().await;
        if let HealthStatus::Unhealthy {
            reason: UnhealthyReason::Refused,
            message,
        } = &health
        {
            return Err(Error::Unreachable {
                operation: "connect".to_string(),
                target: self.config.base_url.clone(),
                message: message.clone(),
            });
        }

        let admin = if self.session.has_admin() {
            let logged_in = self.session.login().await.map_err(|e| Error::Unreachable {
                operation: "connect".to_string(),
                target: self.config.base_url.clone(),
                message: e.to_string(),
            })?;
            if !logged_in {
                warn!(
                    reason = self.session.last_failure().as_deref().unwrap_or("unknown"),
                    "admin login failed; only the static authority is available"
                );
            }
            Some(logged_in)
        } else {
            None
        };

        let report = ConnectionReport {
            health,
            admin,
            static_token: self.session.store().credentials().has_static_token(),
        };
        info!(
            base_url = %self.config.base_url,
            health = %report.health,
            admin = ?report.admin,
            static_token = report.static_token,
            "connected"
        );
        Ok(report)
    }

    /// Execute a request with single-retry 401 recovery.
    ///
    /// # Errors
    ///
    /// See [`RequestExecutor::execute`].
    pub async fn execute(&self, spec: &RequestSpec) -> Result<Value> {
        self.executor.execute(spec).await
    }

    /// Schema operations.
    pub fn schema(&self) -> &SchemaMutator {
        &self.schema
    }

    /// Wait until the service is healthy again.
    ///
    /// # Errors
    ///
    /// Returns [`ReloadTimeout`] if it is not healthy within `max_wait`.
    pub async fn wait_for_healthy(
        &self,
        max_wait: Duration,
    ) -> std::result::Result<ReloadOutcome, ReloadTimeout> {
        self.reload.wait_for_healthy(max_wait).await
    }

    /// Probe the service once.
    pub async fn health(&self) -> HealthStatus {
        self.health.check().await
    }

    /// Shared admin session.
    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    /// Underlying request executor.
    pub fn executor(&self) -> &Arc<RequestExecutor> {
        &self.executor
    }

    /// Reload coordinator shared with the schema mutator.
    pub fn reload(&self) -> &Arc<ReloadCoordinator> {
        &self.reload
    }

    /// Configuration the client was built from.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Start the session refresh loop if an interval is configured and the
    /// admin authority is available.
    pub fn start_auto_refresh(&self) -> Option<RefreshHandle> {
        let interval = self.config.session.refresh_interval()?;
        if !self.session.has_admin() {
            return None;
        }
        Some(self.session.start_auto_refresh(interval))
    }
}

fn http_client(config: &ClientConfig) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(config.request_timeout())
        .build()
        .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_requires_an_authority() {
        let err = CmsClient::new(ClientConfig::new("http://cms.test")).unwrap_err();
        assert!(matches!(err, Error::Config(ref m) if m.contains("no authority")));
    }

    #[test]
    fn test_new_rejects_bad_base_url() {
        let config = ClientConfig::new("not a url").with_api_token("t");
        assert!(matches!(CmsClient::new(config), Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_auto_refresh_needs_interval_and_admin() {
        let client = CmsClient::new(ClientConfig::new("http://cms.test").with_api_token("t")).unwrap();
        assert!(client.start_auto_refresh().is_none());

        let client = CmsClient::new(
            ClientConfig::new("http://cms.test")
                .with_api_token("t")
                .with_refresh_interval(Duration::from_secs(60)),
        )
        .unwrap();
        assert!(client.start_auto_refresh().is_none());
    }

    #[test]
    fn test_report_usable() {
        let report = ConnectionReport {
            health: HealthStatus::Healthy,
            admin: Some(false),
            static_token: false,
        };
        assert!(!report.is_usable());
        assert!(ConnectionReport { static_token: true, ..report }.is_usable());
    }
}
