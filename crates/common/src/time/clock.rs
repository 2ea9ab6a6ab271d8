//! Wall-clock abstraction
//!
//! Scheduling decisions depend on the current calendar time, not on a
//! monotonic instant, so the clock hands out `DateTime<Utc>` values.
//!
//! # Examples
//!
//! ```
//! use servertide_common::time::{Clock, SystemClock};
//!
//! let clock = SystemClock;
//! let now = clock.now();
//! assert!(now.timestamp() > 0);
//! ```

use std::time::SystemTime;

use chrono::{DateTime, Utc};

/// Source of the current wall-clock time.
pub trait Clock: Send + Sync {
    /// Current time in UTC.
    fn now(&self) -> DateTime<Utc>;

    /// Current time as a `SystemTime`, for comparison with file metadata.
    fn system_time(&self) -> SystemTime {
        SystemTime::from(self.now())
    }
}

/// Real system clock; use this in production code.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_moves_forward() {
        let clock = SystemClock;
        let first = clock.now();
        let second = clock.now();
        assert!(second >= first);
    }

    #[test]
    fn system_time_matches_now() {
        let clock = SystemClock;
        let diff = clock
            .system_time()
            .duration_since(SystemTime::from(clock.now() - chrono::Duration::seconds(5)))
            .unwrap();
        assert!(diff.as_secs() <= 6);
    }
}
