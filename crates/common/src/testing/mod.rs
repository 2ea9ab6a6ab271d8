//! Test helpers for downstream crates (feature `test-utils`)

pub mod time;

pub use time::MockClock;
