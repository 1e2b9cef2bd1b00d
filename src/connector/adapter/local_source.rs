use std::path::PathBuf;

use async_trait::async_trait;
use tracing::debug;

use crate::application::interfaces::{RepoSource, RepoSpec};
use crate::domain::DomainError;

/// Discovers repositories as directories on the local filesystem.
///
/// Each configured root is scanned one level deep: every non-hidden
/// subdirectory becomes a repository named after its directory. A root
/// with no subdirectories is treated as a single repository itself, so
/// pointing the tool at one project works without extra nesting.
pub struct LocalRepoSource {
    roots: Vec<PathBuf>,
}

impl LocalRepoSource {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self { roots }
    }
}

#[async_trait]
impl RepoSource for LocalRepoSource {
    async fn discover(&self) -> Result<Vec<RepoSpec>, DomainError> {
        if self.roots.is_empty() {
            return Err(DomainError::source_unavailable("no roots configured"));
        }

        let mut specs = Vec::new();
        for root in &self.roots {
            if !root.is_dir() {
                return Err(DomainError::source_unavailable(format!(
                    "{} is not a directory",
                    root.display()
                )));
            }

            let mut children: Vec<PathBuf> = std::fs::read_dir(root)?
                .filter_map(|entry| entry.ok())
                .map(|entry| entry.path())
                .filter(|path| {
                    path.is_dir()
                        && !path
                            .file_name()
                            .and_then(|n| n.to_str())
                            .is_some_and(|n| n.starts_with('.'))
                })
                .collect();
            children.sort();

            if children.is_empty() {
                if let Some(name) = root.file_name().and_then(|n| n.to_str()) {
                    specs.push(RepoSpec::new(name, root.clone()));
                }
                continue;
            }
            for child in children {
                if let Some(name) = child.file_name().and_then(|n| n.to_str()) {
                    specs.push(RepoSpec::new(name, child.clone()));
                }
            }
        }

        debug!(repos = specs.len(), "local discovery finished");
        Ok(specs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[tokio::test]
    async fn subdirectories_become_repositories() {
        let root = tempfile::tempdir().expect("tempdir");
        fs::create_dir(root.path().join("users-svc")).unwrap();
        fs::create_dir(root.path().join("orders-svc")).unwrap();
        fs::create_dir(root.path().join(".git")).unwrap();

        let source = LocalRepoSource::new(vec![root.path().to_path_buf()]);
        let specs = source.discover().await.expect("discover");

        let names: Vec<&str> = specs.iter().map(|s| s.repo_name.as_str()).collect();
        assert_eq!(names, vec!["orders-svc", "users-svc"]);
        assert!(!source.requires_clone());
    }

    #[tokio::test]
    async fn leaf_root_is_a_single_repository() {
        let root = tempfile::tempdir().expect("tempdir");
        fs::write(root.path().join("main.py"), "x = 1\n").unwrap();

        let source = LocalRepoSource::new(vec![root.path().to_path_buf()]);
        let specs = source.discover().await.expect("discover");
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].local_path, root.path());
    }

    #[tokio::test]
    async fn missing_root_is_source_unavailable() {
        let source = LocalRepoSource::new(vec![PathBuf::from("/nonexistent/root")]);
        let result = source.discover().await;
        assert!(matches!(result, Err(DomainError::SourceUnavailable(_))));
    }
}
