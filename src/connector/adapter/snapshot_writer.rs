use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::info;

use crate::application::interfaces::SnapshotSink;
use crate::domain::{DomainError, Snapshot};

/// Writes each committed snapshot as `snapshot-v{N}.json` in a directory.
///
/// The file is written to a temp name first and renamed into place, so a
/// crash mid-write never leaves a truncated artifact under the final name.
pub struct FileSnapshotWriter {
    dir: PathBuf,
}

impl FileSnapshotWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn artifact_path(&self, version: u64) -> PathBuf {
        self.dir.join(format!("snapshot-v{version}.json"))
    }
}

#[async_trait]
impl SnapshotSink for FileSnapshotWriter {
    async fn write(&self, snapshot: &Snapshot) -> Result<PathBuf, DomainError> {
        std::fs::create_dir_all(&self.dir)?;

        let body = serde_json::to_vec_pretty(snapshot)
            .map_err(|e| DomainError::storage(format!("snapshot serialization failed: {e}")))?;

        let target = self.artifact_path(snapshot.version);
        let tmp = self.dir.join(format!(".snapshot-v{}.tmp", snapshot.version));
        std::fs::write(&tmp, body)?;
        std::fs::rename(&tmp, &target)?;

        info!(path = %target.display(), version = snapshot.version, "snapshot artifact written");
        Ok(target)
    }
}

/// Load a snapshot artifact back, e.g. to warm the store at startup.
pub fn read_snapshot(path: &Path) -> Result<Snapshot, DomainError> {
    let body = std::fs::read_to_string(path)?;
    serde_json::from_str(&body)
        .map_err(|e| DomainError::storage(format!("invalid snapshot artifact: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DependencyEntity, Entity};

    #[tokio::test]
    async fn writes_versioned_artifact_that_round_trips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let writer = FileSnapshotWriter::new(dir.path());

        let mut snapshot = Snapshot::empty();
        snapshot.version = 3;
        let entity = Entity::Dependency(DependencyEntity {
            name: "requests".to_string(),
            ecosystem: "pypi".to_string(),
            version: "2.31".to_string(),
            dep_kind: "direct".to_string(),
            repo: "svc".to_string(),
        });
        snapshot.entities.insert(entity.key(), entity);

        let path = writer.write(&snapshot).await.expect("write");
        assert!(path.ends_with("snapshot-v3.json"));

        let loaded = read_snapshot(&path).expect("read back");
        assert_eq!(loaded.version, 3);
        assert_eq!(loaded.len(), 1);
    }
}
