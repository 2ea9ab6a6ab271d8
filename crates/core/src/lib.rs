//! # servertide Core
//!
//! Pure scheduling logic - no infrastructure dependencies.
//!
//! This crate contains:
//! - The iCalendar reader and recurrence expansion
//! - The grid compiler and desired-state evaluator
//! - The reconciliation tick and its port interfaces (traits)
//!
//! ## Architecture Principles
//! - Only depends on `servertide-common` and `servertide-domain`
//! - No filesystem, HTTP, or provider code
//! - Calendar retrieval and the cloud provider are reached through traits

pub mod reconcile;
pub mod schedule;

pub use reconcile::ports::{CalendarSource, ResourceDriver};
pub use reconcile::{Action, ActionOutcome, LoopState, ReconcileService, TickReport};
pub use schedule::{compile, evaluate, GridSettings};
