//! Incident Store
//!
//! Durable SQLite persistence for incident lifecycle. The `incidents` table
//! caches current state for fast lookup; `incident_log` is the append-only
//! audit trail of every Open/Resolve transition.

mod repository;

pub use repository::{
    IncidentLogEntry, IncidentRecord, IncidentRepository, IncidentStatus, OpenIncident,
    StorageConfig,
};

use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Write exceeded the bounded timeout; retryable by the caller
    #[error("write timed out after {0}ms")]
    Timeout(u64),

    /// A persisted row failed to decode back into domain types
    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error("lock poisoned: {0}")]
    Lock(String),
}
