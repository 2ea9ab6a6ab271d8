//! # servertide Infrastructure
//!
//! Infrastructure implementations of core ports.
//!
//! This crate contains:
//! - Configuration loading (environment, TOML/JSON files)
//! - The retrying HTTP client
//! - The file-backed calendar cache
//! - The Hetzner Cloud resource driver
//! - The reconciliation scheduler
//!
//! ## Architecture
//! - Implements traits defined in `servertide-core`
//! - Contains all "impure" code (filesystem, network, background tasks)

pub mod calendar;
pub mod config;
pub mod errors;
pub mod hcloud;
pub mod http;
pub mod scheduling;

// Re-export commonly used items
pub use calendar::{CachePolicy, CachedCalendarSource, CalendarCache, HttpCalendarFetcher};
pub use errors::InfraError;
pub use hcloud::{HcloudClient, HcloudDriver};
pub use http::HttpClient;
pub use scheduling::{ReconcileScheduler, ReconcileSchedulerConfig, SchedulerError};
