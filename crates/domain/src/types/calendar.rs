//! Calendar documents and the events expanded from them

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Raw calendar bytes plus the moment they were retrieved.
///
/// Owned by the calendar cache and never modified after construction; a
/// refresh produces a new document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarDocument {
    bytes: Vec<u8>,
    retrieved_at: DateTime<Utc>,
}

impl CalendarDocument {
    pub fn new(bytes: Vec<u8>, retrieved_at: DateTime<Utc>) -> Self {
        Self { bytes, retrieved_at }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn retrieved_at(&self) -> DateTime<Utc> {
        self.retrieved_at
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// One concrete occurrence of a (possibly recurring) calendar event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleEvent {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Requested server variant, empty when the event does not name one.
    pub variant: String,
}

impl ScheduleEvent {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>, variant: impl Into<String>) -> Self {
        Self { start, end, variant: variant.into() }
    }
}
