//! Port interfaces for reconciliation
//!
//! These traits define the boundaries between the reconciliation logic and
//! the calendar retrieval and cloud provider implementations.

use async_trait::async_trait;
use servertide_domain::{
    ActualState, CalendarDocument, ResourceId, ResourcePhase, Result, ServerTideError, SnapshotRef,
};
use tracing::{debug, info, instrument, warn};

/// Source of the calendar document, usually backed by a cache
#[async_trait]
pub trait CalendarSource: Send + Sync {
    /// Return the current calendar document
    async fn fetch_calendar(&self) -> Result<CalendarDocument>;
}

/// Cloud provider operations on the server identified by a label.
///
/// Implementors provide the primitive remote calls; `activate`,
/// `deactivate` and `prune_snapshots` compose them and gate every step on
/// freshly observed state so repeated calls are safe.
#[async_trait]
pub trait ResourceDriver: Send + Sync {
    /// Observe the server carrying `identity`. A missing server is
    /// [`ActualState::absent`], not an error.
    async fn query_actual_state(&self, identity: &str) -> Result<ActualState>;

    /// Create a new server from the newest snapshot for `identity`.
    /// An empty `variant` selects the provider-side default.
    async fn create_from_snapshot(&self, identity: &str, variant: &str) -> Result<ResourceId>;

    async fn power_on(&self, id: ResourceId) -> Result<()>;

    /// Stop the server cleanly; returns only once it is reported off.
    async fn power_off(&self, id: ResourceId) -> Result<()>;

    /// Snapshot the server's disk as the newest restore point.
    async fn create_snapshot(&self, identity: &str, id: ResourceId) -> Result<SnapshotRef>;

    /// Snapshots belonging to `identity`, newest first.
    async fn list_active_snapshots(&self, identity: &str) -> Result<Vec<SnapshotRef>>;

    async fn delete_snapshot(&self, snapshot: &SnapshotRef) -> Result<()>;

    async fn delete_resource(&self, id: ResourceId) -> Result<()>;

    /// Bring the server up, as `variant` when it has to be created.
    ///
    /// A running server is left alone and a stopped one is powered on, so
    /// calling this twice never provisions a second server.
    #[instrument(skip(self))]
    async fn activate(&self, identity: &str, variant: &str) -> Result<ResourceId> {
        let actual = self.query_actual_state(identity).await?;

        match (actual.phase, actual.resource_id) {
            (ResourcePhase::Active, Some(id)) => {
                debug!(%id, "server already active");
                Ok(id)
            }
            (ResourcePhase::Stopped, Some(id)) => {
                info!(%id, "powering on stopped server");
                self.power_on(id).await?;
                Ok(id)
            }
            (ResourcePhase::Transitioning, _) => Err(ServerTideError::Driver(format!(
                "server for '{identity}' is transitioning, not activating"
            ))),
            _ => {
                info!(variant, "creating server from latest snapshot");
                self.create_from_snapshot(identity, variant).await
            }
        }
    }

    /// Power off, snapshot, prune older snapshots, delete the server.
    ///
    /// A failed power-off or snapshot aborts before anything is deleted.
    /// Pruning and deletion failures are logged only. A server found already
    /// stopped resumes at the snapshot step.
    #[instrument(skip(self))]
    async fn deactivate(&self, identity: &str) -> Result<()> {
        let actual = self.query_actual_state(identity).await?;
        let id = match (actual.phase, actual.resource_id) {
            (ResourcePhase::Absent, _) | (_, None) => {
                debug!("no server to deactivate");
                return Ok(());
            }
            (ResourcePhase::Transitioning, _) => {
                return Err(ServerTideError::Driver(format!(
                    "server for '{identity}' is transitioning, not deactivating"
                )))
            }
            (ResourcePhase::Active, Some(id)) => {
                info!(%id, "powering off server");
                self.power_off(id).await?;
                id
            }
            (ResourcePhase::Stopped, Some(id)) => id,
        };

        info!(%id, "creating snapshot");
        let snapshot = self.create_snapshot(identity, id).await?;

        if let Err(e) = self.prune_snapshots(identity, Some(&snapshot)).await {
            warn!(error = %e, kind = e.label(), "snapshot pruning failed");
        }

        info!(%id, snapshot = snapshot.id, "deleting server");
        if let Err(e) = self.delete_resource(id).await {
            warn!(
                %id,
                error = %e,
                kind = e.label(),
                "server deletion failed, will retry next tick"
            );
        }

        Ok(())
    }

    /// Delete every snapshot of `identity` except `keep` and protected ones.
    ///
    /// Returns how many were deleted; individual failures are logged.
    async fn prune_snapshots(&self, identity: &str, keep: Option<&SnapshotRef>) -> Result<usize> {
        let snapshots = self.list_active_snapshots(identity).await?;
        let mut deleted = 0;

        for snapshot in snapshots {
            if snapshot.protected || keep.is_some_and(|k| k.id == snapshot.id) {
                continue;
            }
            match self.delete_snapshot(&snapshot).await {
                Ok(()) => deleted += 1,
                Err(e) => warn!(snapshot = snapshot.id, error = %e, "could not delete snapshot"),
            }
        }

        debug!(deleted, "pruned snapshots");
        Ok(deleted)
    }
}
