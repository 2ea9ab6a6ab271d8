//! Desired and observed state of the managed server

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::impl_domain_status_conversions;

/// Provider-assigned identifier of a running (or stopped) server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceId(pub u64);

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What the schedule says should hold right now.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredState {
    pub active: bool,
    pub variant: String,
}

impl DesiredState {
    pub fn active(variant: impl Into<String>) -> Self {
        Self { active: true, variant: variant.into() }
    }

    pub fn inactive() -> Self {
        Self::default()
    }
}

/// Coarse lifecycle phase of the server as reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourcePhase {
    /// No server carries the identity label.
    Absent,
    /// Initializing, starting or running.
    Active,
    /// Exists but is powered off.
    Stopped,
    /// Stopping, deleting, migrating, rebuilding or any other in-between state.
    Transitioning,
}

impl_domain_status_conversions!(ResourcePhase {
    Absent => "absent",
    Active => "active",
    Stopped => "stopped",
    Transitioning => "transitioning",
});

/// Server state observed at the start of (or during) one tick.
///
/// Only valid for the tick that fetched it; providers are eventually
/// consistent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActualState {
    pub phase: ResourcePhase,
    /// Server type of the observed server, empty when absent.
    pub variant: String,
    pub resource_id: Option<ResourceId>,
}

impl ActualState {
    pub fn absent() -> Self {
        Self { phase: ResourcePhase::Absent, variant: String::new(), resource_id: None }
    }

    pub fn new(phase: ResourcePhase, variant: impl Into<String>, resource_id: ResourceId) -> Self {
        Self { phase, variant: variant.into(), resource_id: Some(resource_id) }
    }

    /// Running or on its way to running.
    pub fn is_active(&self) -> bool {
        self.phase == ResourcePhase::Active
    }

    /// A server exists, whatever its power state.
    pub fn is_present(&self) -> bool {
        self.phase != ResourcePhase::Absent
    }
}

/// Reference to a provider snapshot used as a restore point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRef {
    pub id: u64,
    pub description: String,
    /// Delete protection set independently of this tool.
    pub protected: bool,
    pub created: Option<DateTime<Utc>>,
}

impl SnapshotRef {
    pub fn new(id: u64, description: impl Into<String>) -> Self {
        Self { id, description: description.into(), protected: false, created: None }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn phase_round_trips_through_strings() {
        assert_eq!(ResourcePhase::Transitioning.to_string(), "transitioning");
        assert_eq!(ResourcePhase::from_str("STOPPED").unwrap(), ResourcePhase::Stopped);
        assert!(ResourcePhase::from_str("paused").is_err());
    }

    #[test]
    fn stopped_server_is_present_but_not_active() {
        let state = ActualState::new(ResourcePhase::Stopped, "cx21", ResourceId(7));
        assert!(state.is_present());
        assert!(!state.is_active());
        assert!(!ActualState::absent().is_present());
    }

    #[test]
    fn desired_state_defaults_to_off() {
        let desired = DesiredState::default();
        assert!(!desired.active);
        assert!(desired.variant.is_empty());
        assert_eq!(DesiredState::inactive(), desired);
    }
}
