//! Infrastructure error plumbing

pub mod conversions;

pub use conversions::{status_error, InfraError};
