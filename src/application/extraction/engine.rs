use std::path::{Path, PathBuf};
use std::sync::Arc;

use ignore::WalkBuilder;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::application::interfaces::{AnalyzerRegistry, RepoSpec};
use crate::domain::{DomainError, Entity, EntityBatch, Provenance};

use super::llm::LlmExtractor;

/// Files larger than this are never analyzed.
const MAX_FILE_BYTES: u64 = 1024 * 1024;

/// Walks a repository working tree and turns supported files into entities.
///
/// Pattern analyzers always run. When an [`LlmExtractor`] is attached and the
/// caller asks for LLM mode, code files additionally go through the model and
/// a repository context summary is generated; the knowledge store's merge
/// rules later prefer LLM descriptions over pattern ones.
pub struct ExtractionEngine {
    registry: AnalyzerRegistry,
    llm: Option<Arc<LlmExtractor>>,
}

impl ExtractionEngine {
    pub fn new(registry: AnalyzerRegistry) -> Self {
        Self {
            registry,
            llm: None,
        }
    }

    pub fn with_llm(mut self, llm: Arc<LlmExtractor>) -> Self {
        self.llm = Some(llm);
        self
    }

    /// Extract every supported file in the repository. Per-file failures are
    /// recorded as warnings; only I/O on the repository root and cancellation
    /// abort the pass.
    pub async fn extract_repo(
        &self,
        spec: &RepoSpec,
        use_llm: bool,
        cancel: &CancellationToken,
    ) -> Result<EntityBatch, DomainError> {
        if !spec.local_path.is_dir() {
            return Err(DomainError::source_unavailable(format!(
                "{} is not a directory",
                spec.local_path.display()
            )));
        }

        let files = self.collect_files(&spec.local_path);
        debug!(repo = %spec.repo_name, files = files.len(), "collected files");

        let mut batch = EntityBatch::new();
        let mut listing = Vec::new();

        for path in &files {
            if cancel.is_cancelled() {
                return Err(DomainError::Cancelled);
            }

            let relative = path
                .strip_prefix(&spec.local_path)
                .unwrap_or(path)
                .to_string_lossy()
                .to_string();
            listing.push(relative.clone());

            let content = match std::fs::read_to_string(path) {
                Ok(c) => c,
                Err(e) => {
                    // Binary or unreadable file.
                    debug!(file = %relative, error = %e, "skipping unreadable file");
                    continue;
                }
            };

            for analyzer in self.registry.analyzers_for(path) {
                match analyzer.analyze(Path::new(&relative), &content, &spec.repo_name) {
                    Ok(found) => batch.merge(found),
                    Err(e) => {
                        warn!(file = %relative, analyzer = analyzer.language(), error = %e, "analyzer failed");
                        batch.warn(format!("{relative}: {e}"));
                    }
                }
            }

            if use_llm && !is_manifest(path) {
                if let Some(llm) = &self.llm {
                    let found = llm
                        .extract(Path::new(&relative), &content, &spec.repo_name)
                        .await;
                    batch.merge(found);
                }
            }
        }

        if use_llm {
            if let Some(llm) = &self.llm {
                if cancel.is_cancelled() {
                    return Err(DomainError::Cancelled);
                }
                if let Some(context) = llm.summarize_repo(&spec.repo_name, &listing).await {
                    batch.push(Entity::Context(context), Provenance::Llm);
                }
            }
        }

        Ok(batch)
    }

    /// Supported files under the root, honoring .gitignore and skipping
    /// hidden directories and oversized files.
    fn collect_files(&self, root: &Path) -> Vec<PathBuf> {
        let mut files = Vec::new();
        for entry in WalkBuilder::new(root).build().flatten() {
            let path = entry.path();
            if !entry.file_type().is_some_and(|t| t.is_file()) {
                continue;
            }
            if !self.registry.supports(path) {
                continue;
            }
            if entry.metadata().map(|m| m.len() > MAX_FILE_BYTES).unwrap_or(true) {
                debug!(file = %path.display(), "skipping oversized file");
                continue;
            }
            files.push(path.to_path_buf());
        }
        files.sort();
        files
    }
}

fn is_manifest(path: &Path) -> bool {
    matches!(
        path.file_name().and_then(|n| n.to_str()).map(str::to_lowercase).as_deref(),
        Some("requirements.txt" | "package.json" | "go.mod" | "cargo.toml")
    )
}
