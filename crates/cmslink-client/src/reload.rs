//! Reload coordination
//!
//! Accepting a schema mutation makes the service restart asynchronously. The
//! coordinator waits that restart out so the caller's next request does not
//! race a service that is mid-reload:
//!
//! ```text
//! NotWaiting -> WaitingInitial --healthy--> Settled
//!                    |
//!                    +--> Polling --healthy--> Settled
//!                            |
//!                            +--deadline--> TimedOut
//! ```
//!
//! Only one wait loop runs at a time. A call made while a wait is in flight
//! issues no probes of its own; it waits for the in-flight loop and returns
//! the same outcome, or times out on its own deadline first. If the
//! in-flight wait is cancelled, the joined caller carries on polling itself.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, info, warn};

use crate::health::{HealthCheck, HealthStatus, UnhealthyReason};

/// Timing of the reload wait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReloadConfig {
    /// Delay before the first probe, so the restart has begun.
    pub initial_delay: Duration,
    /// Delay after a non-healthy first probe, before polling starts.
    pub restart_delay: Duration,
    /// Interval between polls.
    pub poll_interval: Duration,
    /// Settle time after the service reports healthy again.
    pub settle_delay: Duration,
    /// Default deadline for [`ReloadCoordinator::wait_for_healthy`] callers that have none.
    pub max_wait: Duration,
}

impl Default for ReloadConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            restart_delay: Duration::from_secs(2),
            poll_interval: Duration::from_secs(2),
            settle_delay: Duration::from_secs(1),
            max_wait: Duration::from_secs(60),
        }
    }
}

impl ReloadConfig {
    /// No delays at all; the first healthy probe ends the wait.
    pub fn immediate() -> Self {
        Self {
            initial_delay: Duration::ZERO,
            restart_delay: Duration::ZERO,
            poll_interval: Duration::from_millis(10),
            settle_delay: Duration::ZERO,
            max_wait: Duration::from_secs(5),
        }
    }
}

/// Where the coordinator is in its wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadState {
    /// No wait is running and none has finished.
    NotWaiting,
    /// Initial delay and first probe.
    WaitingInitial,
    /// Restart observed; polling until healthy or deadline.
    Polling,
    /// Last wait ended with the service healthy.
    Settled,
    /// Last wait hit its deadline.
    TimedOut,
}

/// Successful end of a wait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReloadOutcome {
    /// The first probe was already healthy; no restart was observed.
    AlreadyHealthy,
    /// The service restarted and came back.
    Settled {
        /// Time from the start of the wait until it returned
        elapsed: Duration,
        /// Probes issued
        probes: u32,
    },
}

/// The service did not return to healthy before the deadline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("service not healthy after {waited:?} ({probes} probes, last status: {last_status})")]
pub struct ReloadTimeout {
    /// Time spent waiting
    pub waited: Duration,
    /// Probes issued
    pub probes: u32,
    /// Status reported by the final probe
    pub last_status: HealthStatus,
}

/// Bounded-wait polling around service restarts.
#[derive(Debug)]
pub struct ReloadCoordinator {
    probe: Arc<dyn HealthCheck>,
    config: ReloadConfig,
    gate: tokio::sync::Mutex<()>,
    state: Mutex<ReloadState>,
    last_result: Mutex<Option<Result<ReloadOutcome, ReloadTimeout>>>,
    last_status: Mutex<Option<HealthStatus>>,
    probes_issued: AtomicU32,
}

impl ReloadCoordinator {
    /// Create a coordinator around a health check.
    pub fn new(probe: Arc<dyn HealthCheck>, config: ReloadConfig) -> Self {
        Self {
            probe,
            config,
            gate: tokio::sync::Mutex::new(()),
            state: Mutex::new(ReloadState::NotWaiting),
            last_result: Mutex::new(None),
            last_status: Mutex::new(None),
            probes_issued: AtomicU32::new(0),
        }
    }

    /// Timing configuration.
    pub fn config(&self) -> &ReloadConfig {
        &self.config
    }

    /// Current state of the wait state machine.
    pub fn state(&self) -> ReloadState {
        *self.state.lock()
    }

    /// Whether a wait loop is running.
    pub fn is_waiting(&self) -> bool {
        matches!(
            self.state(),
            ReloadState::WaitingInitial | ReloadState::Polling
        )
    }

    /// Total probes issued by this coordinator.
    pub fn probes_issued(&self) -> u32 {
        self.probes_issued.load(Ordering::Relaxed)
    }

    /// Probe once, outside of any wait.
    pub async fn check(&self) -> HealthStatus {
        self.probe().await
    }

    /// Wait until the service reports healthy, or fail after `max_wait`.
    ///
    /// `max_wait` bounds the whole call, including a probe that hangs and the
    /// time spent joining a wait already in flight.
    ///
    /// # Errors
    ///
    /// Returns [`ReloadTimeout`] if the service is not healthy within `max_wait`.
    pub async fn wait_for_healthy(&self, max_wait: Duration) -> Result<ReloadOutcome, ReloadTimeout> {
        let _guard = match self.gate.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                debug!("reload wait already in progress; joining it");
                let started = Instant::now();
                let Ok(guard) = timeout(max_wait, self.gate.lock()).await else {
                    return Err(ReloadTimeout {
                        waited: started.elapsed(),
                        probes: 0,
                        last_status: self.last_status(),
                    });
                };
                if let Some(result) = self.last_result.lock().clone() {
                    return result;
                }
                // the wait we joined was cancelled before it finished
                debug!("joined reload wait was cancelled; waiting here instead");
                let result = self.lead(max_wait.saturating_sub(started.elapsed())).await;
                drop(guard);
                return result;
            }
        };

        self.lead(max_wait).await
    }

    /// Run the wait loop while holding the gate.
    async fn lead(&self, max_wait: Duration) -> Result<ReloadOutcome, ReloadTimeout> {
        *self.last_result.lock() = None;
        let _reset = ResetOnCancel(&self.state);
        let result = self.run(max_wait).await;
        *self.last_result.lock() = Some(result.clone());
        result
    }

    async fn run(&self, max_wait: Duration) -> Result<ReloadOutcome, ReloadTimeout> {
        let started = Instant::now();
        let remaining = |elapsed: Duration| max_wait.saturating_sub(elapsed);

        self.set_state(ReloadState::WaitingInitial);
        sleep(self.config.initial_delay.min(max_wait)).await;

        let mut probes = 1;
        let mut status = self.probe_within(remaining(started.elapsed())).await;
        if status.is_healthy() {
            self.set_state(ReloadState::Settled);
            debug!("service healthy on first probe; no reload observed");
            return Ok(ReloadOutcome::AlreadyHealthy);
        }
        if started.elapsed() >= max_wait {
            return Err(self.timed_out(started, probes, status));
        }

        info!(%status, max_wait_secs = max_wait.as_secs_f64(), "waiting for service reload");
        self.set_state(ReloadState::Polling);
        sleep(self.config.restart_delay.min(remaining(started.elapsed()))).await;

        loop {
            status = self.probe_within(remaining(started.elapsed())).await;
            probes += 1;

            if status.is_healthy() {
                sleep(self.config.settle_delay.min(remaining(started.elapsed()))).await;
                let elapsed = started.elapsed();
                self.set_state(ReloadState::Settled);
                info!(elapsed_ms = elapsed.as_millis() as u64, probes, "service reloaded");
                return Ok(ReloadOutcome::Settled { elapsed, probes });
            }

            let elapsed = started.elapsed();
            if elapsed >= max_wait {
                return Err(self.timed_out(started, probes, status));
            }

            debug!(%status, probes, "service still reloading");
            sleep(self.config.poll_interval.min(remaining(elapsed))).await;
        }
    }

    fn timed_out(&self, started: Instant, probes: u32, status: HealthStatus) -> ReloadTimeout {
        self.set_state(ReloadState::TimedOut);
        warn!(%status, probes, "service did not become healthy before the deadline");
        ReloadTimeout {
            waited: started.elapsed(),
            probes,
            last_status: status,
        }
    }

    /// Probe, giving up once `budget` runs out.
    async fn probe_within(&self, budget: Duration) -> HealthStatus {
        match timeout(budget, self.probe()).await {
            Ok(status) => status,
            Err(_) => {
                let status = HealthStatus::Unhealthy {
                    reason: UnhealthyReason::Other,
                    message: format!("health check gave no answer within {budget:?}"),
                };
                *self.last_status.lock() = Some(status.clone());
                status
            }
        }
    }

    fn last_status(&self) -> HealthStatus {
        self.last_status
            .lock()
            .clone()
            .unwrap_or_else(|| HealthStatus::Unhealthy {
                reason: UnhealthyReason::Other,
                message: "no health check completed yet".to_string(),
            })
    }

    async fn probe(&self) -> HealthStatus {
        self.probes_issued.fetch_add(1, Ordering::Relaxed);
        let status = self.probe.check().await;
        *self.last_status.lock() = Some(status.clone());
        status
    }

    fn set_state(&self, state: ReloadState) {
        *self.state.lock() = state;
    }
}

/// Puts an abandoned wait back to `NotWaiting` when its future is dropped.
struct ResetOnCancel<'a>(&'a Mutex<ReloadState>);

impl Drop for ResetOnCancel<'_> {
    fn drop(&mut self) {
        let mut state = self.0.lock();
        if matches!(*state, ReloadState::WaitingInitial | ReloadState::Polling) {
            *state = ReloadState::NotWaiting;
        }
    }
}
