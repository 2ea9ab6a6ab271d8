//! Periodic reconciliation loop.
//!
//! Runs [`ReconcileService::tick`] once immediately and then once per
//! configured interval, until stopped or until a tick returns a fatal error.
//!
//! - Non-fatal tick errors (retrieval, parse, provider) are logged and the
//!   loop waits for the next tick.
//! - A fatal error ends the loop; [`ReconcileScheduler::stop`] then reports it
//!   as [`SchedulerError::Aborted`].
//! - Stopping never interrupts a tick in progress. Cancellation is only
//!   observed between ticks, so a half-finished deactivation cannot be cut
//!   off mid-way.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use servertide_core::ReconcileService;
//! use servertide_infra::scheduling::{ReconcileScheduler, ReconcileSchedulerConfig};
//!
//! # async fn example(service: Arc<ReconcileService>) -> Result<(), Box<dyn std::error::Error>> {
//! let mut scheduler = ReconcileScheduler::new(
//!     service,
//!     ReconcileSchedulerConfig { tick: Duration::from_secs(60) },
//! );
//!
//! scheduler.start().await?;
//! tokio::signal::ctrl_c().await?;
//! scheduler.stop().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use servertide_core::{ActionOutcome, LoopState, ReconcileService, TickReport};
use servertide_domain::{ReconcileConfig, Result};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::scheduling::error::{SchedulerError, SchedulerResult};

/// Type alias for task handle to avoid complexity warnings
type TaskHandle = Arc<Mutex<Option<JoinHandle<Result<()>>>>>;

/// Configuration for the reconcile scheduler
#[derive(Debug, Clone)]
pub struct ReconcileSchedulerConfig {
    /// Delay between the end of one tick and the start of the next
    pub tick: Duration,
}

impl Default for ReconcileSchedulerConfig {
    fn default() -> Self {
        Self { tick: Duration::from_secs(60) }
    }
}

impl From<&ReconcileConfig> for ReconcileSchedulerConfig {
    fn from(config: &ReconcileConfig) -> Self {
        Self { tick: config.tick() }
    }
}

/// Reconcile scheduler
pub struct ReconcileScheduler {
    service: Arc<ReconcileService>,
    config: ReconcileSchedulerConfig,
    state: Arc<Mutex<LoopState>>,
    cancellation_token: CancellationToken,
    finished: CancellationToken,
    task_handle: TaskHandle,
}

impl ReconcileScheduler {
    pub fn new(service: Arc<ReconcileService>, config: ReconcileSchedulerConfig) -> Self {
        Self {
            service,
            config,
            state: Arc::new(Mutex::new(LoopState::default())),
            cancellation_token: CancellationToken::new(),
            finished: CancellationToken::new(),
            task_handle: Arc::new(Mutex::new(None)),
        }
    }

    /// Spawn the loop. The first tick runs right away.
    ///
    /// # Errors
    ///
    /// Returns error if scheduler is already running
    #[instrument(skip(self), fields(identity = %self.service.identity()))]
    pub async fn start(&mut self) -> SchedulerResult<()> {
        if self.is_running() {
            return Err(SchedulerError::AlreadyRunning);
        }

        info!(tick_secs = self.config.tick.as_secs(), "Starting reconcile scheduler");

        // Fresh tokens so the scheduler can be restarted after stop
        self.cancellation_token = CancellationToken::new();
        self.finished = CancellationToken::new();

        let service = Arc::clone(&self.service);
        let state = Arc::clone(&self.state);
        let config = self.config.clone();
        let cancel = self.cancellation_token.clone();
        let finished = self.finished.clone();

        let handle = tokio::spawn(async move {
            let result = Self::reconcile_loop(service, state, config, cancel).await;
            finished.cancel();
            result
        });

        *self.task_handle.lock().await = Some(handle);

        info!("Reconcile scheduler started");
        Ok(())
    }

    /// Stop the loop after the tick in progress, if any, and join it.
    ///
    /// # Errors
    ///
    /// - [`SchedulerError::NotRunning`] if the scheduler was never started
    /// - [`SchedulerError::Aborted`] if the loop had already ended on a fatal error
    /// - [`SchedulerError::TaskJoinFailed`] if the loop task panicked
    #[instrument(skip(self))]
    pub async fn stop(&mut self) -> SchedulerResult<()> {
        let Some(handle) = self.task_handle.lock().await.take() else {
            return Err(SchedulerError::NotRunning);
        };

        info!("Stopping reconcile scheduler");
        self.cancellation_token.cancel();

        handle.await?.map_err(SchedulerError::Aborted)?;

        info!("Reconcile scheduler stopped");
        Ok(())
    }

    /// Resolves once the loop has ended, either through [`Self::stop`] or on
    /// a fatal error.
    pub async fn finished(&self) {
        self.finished.cancelled().await;
    }

    /// Check if scheduler is running
    ///
    /// A scheduler is considered running if it has an active task handle that
    /// hasn't finished.
    pub fn is_running(&self) -> bool {
        self.task_handle
            .try_lock()
            .ok()
            .and_then(|guard| guard.as_ref().map(|h| !h.is_finished()))
            .unwrap_or(false)
    }

    /// Copy of the loop bookkeeping. Waits for a tick in progress.
    pub async fn state(&self) -> LoopState {
        self.state.lock().await.clone()
    }

    async fn reconcile_loop(
        service: Arc<ReconcileService>,
        state: Arc<Mutex<LoopState>>,
        config: ReconcileSchedulerConfig,
        cancel: CancellationToken,
    ) -> Result<()> {
        loop {
            if cancel.is_cancelled() {
                debug!("Reconcile loop cancelled");
                return Ok(());
            }

            let started = Instant::now();
            let result = {
                let mut state = state.lock().await;
                service.tick(&mut state).await
            };

            match result {
                Ok(report) => log_report(&report, started.elapsed()),
                Err(e) if e.is_fatal() => {
                    error!(error = %e, kind = e.label(), "fatal error, stopping reconcile loop");
                    return Err(e);
                }
                Err(e) => {
                    warn!(error = %e, kind = e.label(), "tick failed, retrying next tick");
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Reconcile loop cancelled");
                    return Ok(());
                }
                _ = tokio::time::sleep(config.tick) => {}
            }
        }
    }
}

impl Drop for ReconcileScheduler {
    fn drop(&mut self) {
        self.cancellation_token.cancel();
    }
}

fn log_report(report: &TickReport, elapsed: Duration) {
    let phase_after = report.after.as_ref().map(|s| s.phase.to_string()).unwrap_or_default();
    match &report.outcome {
        ActionOutcome::Failed(reason) => warn!(
            action = %report.action,
            %reason,
            elapsed_ms = elapsed.as_millis() as u64,
            "tick finished with failed transition"
        ),
        _ => debug!(
            action = %report.action,
            observed = %report.observed.phase,
            after = %phase_after,
            elapsed_ms = elapsed.as_millis() as u64,
            "tick finished"
        ),
    }
}
