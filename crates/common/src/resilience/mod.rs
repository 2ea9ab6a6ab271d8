//! Resilience patterns for remote operations

pub mod poll;

pub use poll::{poll_until, PollConfig, PollError, PollStatus};
