use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::DomainError;

/// A repository ready for analysis: already present as a local working tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoSpec {
    pub repo_name: String,
    pub local_path: PathBuf,
    pub git_ref: String,
}

impl RepoSpec {
    pub fn new(repo_name: impl Into<String>, local_path: impl Into<PathBuf>) -> Self {
        Self {
            repo_name: repo_name.into(),
            local_path: local_path.into(),
            git_ref: "HEAD".to_string(),
        }
    }

    pub fn with_ref(mut self, git_ref: impl Into<String>) -> Self {
        self.git_ref = git_ref.into();
        self
    }
}

/// Supplies the ordered list of repositories for a pipeline pass.
///
/// Discovery/cloning mechanics live behind this seam; the pipeline only
/// sees local working trees. A failure for one repository is the
/// implementation's problem to absorb — `discover` errors abort the
/// discover stage.
#[async_trait]
pub trait RepoSource: Send + Sync {
    async fn discover(&self) -> Result<Vec<RepoSpec>, DomainError>;

    /// Whether repositories need a clone/fetch step, or already exist as
    /// local directories. Local sources report `false` and the pipeline
    /// records the clone stage as skipped.
    fn requires_clone(&self) -> bool {
        false
    }
}
