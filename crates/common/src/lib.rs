//! Runtime utilities shared across servertide crates.
//!
//! - [`time`]: wall-clock abstraction so schedule decisions can be tested
//!   against fixed instants
//! - [`resilience`]: bounded polling of long-running remote operations
//! - `testing` (feature `test-utils`): controllable clocks

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]

pub mod resilience;
pub mod time;

#[cfg(any(feature = "test-utils", test))]
pub mod testing;

pub use resilience::poll::{poll_until, PollConfig, PollError, PollStatus};
pub use time::clock::{Clock, SystemClock};
