//! Bounded polling for long-running remote operations
//!
//! Cloud providers acknowledge a request immediately and finish the work
//! later. [`poll_until`] re-runs a check at a fixed interval until it reports
//! completion, a hard failure, or the retry budget runs out. There is no
//! backoff: the provider dictates the pace, and the caller's own cadence
//! bounds the total wait.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

/// Errors that end a polling run
#[derive(Debug, Error)]
pub enum PollError<E> {
    /// The check never reported completion within the budget
    #[error("operation still pending after {attempts} polls")]
    Exhausted { attempts: u32 },

    /// The check itself failed
    #[error("polling failed: {source}")]
    Failed { source: E },
}

/// What a single check observed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStatus<T> {
    Ready(T),
    Pending,
}

/// Fixed-interval polling budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    /// Delay between two checks
    pub interval: Duration,
    /// Maximum number of checks, including the first one
    pub max_attempts: u32,
}

impl PollConfig {
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self { interval, max_attempts: max_attempts.max(1) }
    }

    /// Upper bound on the time spent sleeping between checks.
    pub fn max_wait(&self) -> Duration {
        self.interval.saturating_mul(self.max_attempts.saturating_sub(1))
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), 300)
    }
}

/// Check until it returns [`PollStatus::Ready`].
///
/// The first check runs immediately. A check error aborts right away; it is
/// up to the check to turn transient conditions into `Pending`.
///
/// # Errors
/// - [`PollError::Failed`] when the check returns an error
/// - [`PollError::Exhausted`] when `max_attempts` checks all returned `Pending`
pub async fn poll_until<F, Fut, T, E>(config: PollConfig, mut check: F) -> Result<T, PollError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<PollStatus<T>, E>>,
    E: fmt::Display,
{
    let attempts = config.max_attempts.max(1);

    for attempt in 1..=attempts {
        match check().await {
            Ok(PollStatus::Ready(value)) => {
                if attempt > 1 {
                    debug!(attempt, "operation finished after polling");
                }
                return Ok(value);
            }
            Ok(PollStatus::Pending) => {
                if attempt < attempts {
                    tokio::time::sleep(config.interval).await;
                }
            }
            Err(source) => {
                warn!(attempt, error = %source, "check failed, giving up");
                return Err(PollError::Failed { source });
            }
        }
    }

    warn!(attempts, "operation did not finish within polling budget");
    Err(PollError::Exhausted { attempts })
}
