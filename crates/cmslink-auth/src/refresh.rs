//! Background token refresh
//!
//! On a fixed interval the loop renews the admin JWT; if renewal fails it falls
//! back to a full login. When both fail the session cannot heal itself: the loop
//! marks the manager fatal, publishes the reason on the handle and exits instead
//! of carrying on with a stale token.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::session::SessionManager;

/// Handle to a running refresh loop. Dropping it stops the loop.
#[derive(Debug)]
pub struct RefreshHandle {
    task: JoinHandle<()>,
    fatal: watch::Receiver<Option<String>>,
}

impl RefreshHandle {
    /// Reason the loop gave up, if it has.
    pub fn fatal(&self) -> Option<String> {
        self.fatal.borrow().clone()
    }

    /// Wait until the loop reports a fatal condition.
    ///
    /// Returns `None` if the loop ended without one (it was stopped).
    pub async fn wait_fatal(&mut self) -> Option<String> {
        match self.fatal.wait_for(Option::is_some).await {
            Ok(reason) => reason.clone(),
            Err(_) => None,
        }
    }

    /// Whether the loop has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop the loop.
    pub fn stop(self) {}
}

impl Drop for RefreshHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl SessionManager {
    /// Start renewing the admin JWT every `interval`.
    ///
    /// The first renewal happens one interval from now.
    pub fn start_auto_refresh(self: &Arc<Self>, interval: Duration) -> RefreshHandle {
        let (tx, rx) = watch::channel(None);
        let manager = Arc::clone(self);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(interval_secs = interval.as_secs_f64(), "admin token refresh started");

            loop {
                ticker.tick().await;
                if let Err(reason) = manager.refresh_once().await {
                    error!(%reason, "admin session cannot be refreshed; admin operations disabled");
                    manager.mark_fatal(reason.clone());
                    let _ = tx.send(Some(reason));
                    break;
                }
            }
        });

        RefreshHandle { task, fatal: rx }
    }

    /// One refresh cycle: renew, else log in again.
    async fn refresh_once(&self) -> Result<(), String> {
        let renew_failure = match self.renew().await {
            Ok(true) => return Ok(()),
            Ok(false) => self
                .last_failure()
                .unwrap_or_else(|| "renewal refused".to_string()),
            Err(e) => e.to_string(),
        };
        warn!(reason = %renew_failure, "token renewal failed; falling back to login");

        match self.login().await {
            Ok(true) => {
                debug!("re-login after failed renewal succeeded");
                Ok(())
            }
            Ok(false) => Err(format!(
                "renewal failed ({renew_failure}) and re-login failed ({})",
                self.last_failure()
                    .unwrap_or_else(|| "credentials rejected".to_string())
            )),
            Err(e) => Err(format!(
                "renewal failed ({renew_failure}) and re-login failed ({e})"
            )),
        }
    }
}
