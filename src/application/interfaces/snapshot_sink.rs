use std::path::PathBuf;

use async_trait::async_trait;

use crate::domain::{DomainError, Snapshot};

/// Persists committed snapshots outside the process, e.g. as versioned
/// JSON artifacts on disk.
#[async_trait]
pub trait SnapshotSink: Send + Sync {
    /// Write the snapshot and return the artifact location.
    async fn write(&self, snapshot: &Snapshot) -> Result<PathBuf, DomainError>;
}
