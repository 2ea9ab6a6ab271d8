//! In-memory port implementations for tests

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use servertide_domain::{
    ActualState, CalendarDocument, ResourceId, ResourcePhase, Result, ServerTideError, SnapshotRef,
};

use super::ports::{CalendarSource, ResourceDriver};

/// Calendar source serving fixed bytes or a fixed error.
pub struct StaticCalendar {
    result: Result<Vec<u8>>,
}

impl StaticCalendar {
    pub fn new(text: &str) -> Self {
        Self { result: Ok(text.as_bytes().to_vec()) }
    }

    pub fn failing(error: ServerTideError) -> Self {
        Self { result: Err(error) }
    }
}

#[async_trait]
impl CalendarSource for StaticCalendar {
    async fn fetch_calendar(&self) -> Result<CalendarDocument> {
        self.result.clone().map(|bytes| CalendarDocument::new(bytes, Utc::now()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Query,
    Create,
    PowerOn,
    PowerOff,
    Snapshot,
    ListSnapshots,
    DeleteSnapshot,
    DeleteResource,
}

#[derive(Debug, Default)]
struct Inner {
    state: Option<ActualState>,
    next_id: u64,
    snapshots: Vec<SnapshotRef>,
    failing: HashSet<Op>,
    calls: Vec<Op>,
}

/// Driver simulating one server with snapshot bookkeeping.
pub struct MockDriver {
    inner: Mutex<Inner>,
}

impl MockDriver {
    pub fn absent() -> Self {
        Self { inner: Mutex::new(Inner { next_id: 100, ..Inner::default() }) }
    }

    pub fn with_phase(phase: ResourcePhase, variant: &str) -> Self {
        let driver = Self::absent();
        driver.inner.lock().unwrap().state = Some(ActualState::new(phase, variant, ResourceId(1)));
        driver
    }

    pub fn running(variant: &str) -> Self {
        Self::with_phase(ResourcePhase::Active, variant)
    }

    pub fn stopped(variant: &str) -> Self {
        Self::with_phase(ResourcePhase::Stopped, variant)
    }

    pub fn add_snapshot(&self, id: u64, protected: bool) {
        let mut snapshot = SnapshotRef::new(id, "build-box");
        snapshot.protected = protected;
        self.inner.lock().unwrap().snapshots.insert(0, snapshot);
    }

    pub fn fail_on(&self, op: Op) {
        self.inner.lock().unwrap().failing.insert(op);
    }

    pub fn clear_failures(&self) {
        self.inner.lock().unwrap().failing.clear();
    }

    pub fn calls(&self, op: Op) -> usize {
        self.inner.lock().unwrap().calls.iter().filter(|call| **call == op).count()
    }

    pub fn state(&self) -> ActualState {
        self.inner.lock().unwrap().state.clone().unwrap_or_else(ActualState::absent)
    }

    pub fn snapshot_ids(&self) -> Vec<u64> {
        self.inner.lock().unwrap().snapshots.iter().map(|s| s.id).collect()
    }

    fn enter(&self, op: Op) -> Result<std::sync::MutexGuard<'_, Inner>> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(op);
        if inner.failing.contains(&op) {
            return Err(ServerTideError::Driver(format!("{op:?} failed")));
        }
        Ok(inner)
    }
}

#[async_trait]
impl ResourceDriver for MockDriver {
    async fn query_actual_state(&self, _identity: &str) -> Result<ActualState> {
        let inner = self.enter(Op::Query)?;
        Ok(inner.state.clone().unwrap_or_else(ActualState::absent))
    }

    async fn create_from_snapshot(&self, _identity: &str, variant: &str) -> Result<ResourceId> {
        let mut inner = self.enter(Op::Create)?;
        inner.next_id += 1;
        let id = ResourceId(inner.next_id);
        inner.state = Some(ActualState::new(ResourcePhase::Active, variant, id));
        Ok(id)
    }

    async fn power_on(&self, _id: ResourceId) -> Result<()> {
        let mut inner = self.enter(Op::PowerOn)?;
        if let Some(state) = inner.state.as_mut() {
            state.phase = ResourcePhase::Active;
        }
        Ok(())
    }

    async fn power_off(&self, _id: ResourceId) -> Result<()> {
        let mut inner = self.enter(Op::PowerOff)?;
        if let Some(state) = inner.state.as_mut() {
            state.phase = ResourcePhase::Stopped;
        }
        Ok(())
    }

    async fn create_snapshot(&self, identity: &str, _id: ResourceId) -> Result<SnapshotRef> {
        let mut inner = self.enter(Op::Snapshot)?;
        inner.next_id += 1;
        let snapshot = SnapshotRef::new(inner.next_id, identity);
        inner.snapshots.insert(0, snapshot.clone());
        Ok(snapshot)
    }

    async fn list_active_snapshots(&self, _identity: &str) -> Result<Vec<SnapshotRef>> {
        let inner = self.enter(Op::ListSnapshots)?;
        Ok(inner.snapshots.clone())
    }

    async fn delete_snapshot(&self, snapshot: &SnapshotRef) -> Result<()> {
        let mut inner = self.enter(Op::DeleteSnapshot)?;
        inner.snapshots.retain(|s| s.id != snapshot.id);
        Ok(())
    }

    async fn delete_resource(&self, _id: ResourceId) -> Result<()> {
        let mut inner = self.enter(Op::DeleteResource)?;
        inner.state = None;
        Ok(())
    }
}
