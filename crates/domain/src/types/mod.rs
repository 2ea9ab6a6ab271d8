//! Domain types and models

pub mod calendar;
pub mod grid;
pub mod resource;

pub use calendar::{CalendarDocument, ScheduleEvent};
pub use grid::{GridSlot, TimeGrid};
pub use resource::{ActualState, DesiredState, ResourceId, ResourcePhase, SnapshotRef};
