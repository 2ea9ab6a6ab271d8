//! Reconciliation: desired state from the calendar, actual state from the
//! provider, and the single transition that aligns them.

pub mod ports;
pub mod service;

#[cfg(test)]
pub(crate) mod mocks;

pub use ports::{CalendarSource, ResourceDriver};
pub use service::{decide, Action, ActionOutcome, LoopState, Plan, ReconcileService, TickReport};
