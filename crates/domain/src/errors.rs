//! Error types used throughout the application

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for servertide
///
/// The first four variants are the failure kinds a reconciliation tick can
/// surface. Only [`ServerTideError::Invariant`] is fatal; the loop logs every
/// other kind and retries on the next tick.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
pub enum ServerTideError {
    /// Calendar unreachable and no cache entry young enough to serve.
    #[error("Calendar retrieval error: {0}")]
    Retrieval(String),

    /// Calendar bytes could not be read as a recurring-event document.
    #[error("Calendar parse error: {0}")]
    CalendarParse(String),

    /// A single remote resource operation failed or timed out.
    #[error("Driver operation error: {0}")]
    Driver(String),

    /// Programming or configuration error, e.g. an empty grid.
    #[error("Invariant violated: {0}")]
    Invariant(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServerTideError {
    /// Whether the error must stop the reconciliation loop.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Invariant(_))
    }

    /// Stable label suitable for structured logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Retrieval(_) => "retrieval",
            Self::CalendarParse(_) => "calendar_parse",
            Self::Driver(_) => "driver_operation",
            Self::Invariant(_) => "invariant",
            Self::Config(_) => "config",
            Self::Network(_) => "network",
            Self::NotFound(_) => "not_found",
            Self::InvalidInput(_) => "invalid_input",
            Self::Internal(_) => "internal",
        }
    }
}

/// Result type alias for servertide operations
pub type Result<T> = std::result::Result<T, ServerTideError>;
