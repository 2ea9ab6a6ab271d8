//! # servertide Domain
//!
//! Business domain types for servertide.
//!
//! This crate contains:
//! - Calendar, grid and resource state types
//! - Domain error types and Result definitions
//! - Configuration structures
//! - Domain constants
//!
//! ## Architecture
//! - No dependencies on other servertide crates
//! - Pure data structures and small parsing helpers

pub mod config;
pub mod constants;
pub mod errors;
pub mod macros;
pub mod types;
pub mod utils;

// Re-export commonly used items
pub use config::*;
pub use errors::*;
pub use types::*;
pub use utils::variant_parser::parse_variant;
