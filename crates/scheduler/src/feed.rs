//! Notification Fan-out
//!
//! Read-only view served to external pollers: the latest complete tick
//! snapshot plus the incident feed. No push transport; consumers poll.

use crate::Snapshot;
use std::sync::Arc;
use storage::{IncidentLogEntry, IncidentRecord, IncidentRepository, StorageError};
use tokio::sync::watch;

/// Consistent point-in-time view over the driver's output.
///
/// Cheap to clone; every handler task can hold its own copy.
#[derive(Clone)]
pub struct IncidentFeed {
    snapshot_rx: watch::Receiver<Arc<Snapshot>>,
    repository: Arc<IncidentRepository>,
}

impl IncidentFeed {
    /// Build a feed over the driver's snapshot channel and the store
    pub fn new(
        snapshot_rx: watch::Receiver<Arc<Snapshot>>,
        repository: Arc<IncidentRepository>,
    ) -> Self {
        Self {
            snapshot_rx,
            repository,
        }
    }

    /// The most recent completed tick, never a partially-updated one
    pub fn current_snapshot(&self) -> Arc<Snapshot> {
        self.snapshot_rx.borrow().clone()
    }

    /// Incident log entries strictly after `since_ms`, newest first
    pub async fn recent_incidents(
        &self,
        since_ms: i64,
    ) -> Result<Vec<IncidentLogEntry>, StorageError> {
        self.repository.entries_since(since_ms).await
    }

    /// Currently Open incidents, newest first
    pub async fn open_incidents(&self) -> Result<Vec<IncidentRecord>, StorageError> {
        self.repository.list_open().await
    }
}
