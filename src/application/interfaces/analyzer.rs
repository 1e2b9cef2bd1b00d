use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::domain::{DomainError, EntityBatch};

/// A pattern-based extractor for one language or file format.
///
/// Analyzers are pure: they read a file's content and emit entities. They
/// never touch the network, so the trait is synchronous; the extraction
/// engine decides how files are scheduled.
pub trait Analyzer: Send + Sync {
    /// Language or format name, e.g. `"python"`.
    fn language(&self) -> &'static str;

    /// File extensions (with dot) and exact file names this analyzer
    /// handles, e.g. `[".py", "requirements.txt"]`.
    fn patterns(&self) -> &'static [&'static str];

    fn analyze(&self, path: &Path, content: &str, repo: &str)
        -> Result<EntityBatch, DomainError>;
}

/// Explicit lookup table from file extension / file name to analyzers.
/// Files with no registered analyzer are skipped, not an error.
#[derive(Default)]
pub struct AnalyzerRegistry {
    by_pattern: HashMap<String, Vec<Arc<dyn Analyzer>>>,
}

impl AnalyzerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, analyzer: Arc<dyn Analyzer>) {
        for pattern in analyzer.patterns() {
            self.by_pattern
                .entry(pattern.to_lowercase())
                .or_default()
                .push(analyzer.clone());
        }
    }

    /// All analyzers applicable to a file, matched by exact file name
    /// first, then by extension.
    pub fn analyzers_for(&self, path: &Path) -> Vec<Arc<dyn Analyzer>> {
        let mut matched = Vec::new();

        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            if let Some(analyzers) = self.by_pattern.get(&name.to_lowercase()) {
                matched.extend(analyzers.iter().cloned());
            }
        }
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            if let Some(analyzers) = self.by_pattern.get(&format!(".{}", ext.to_lowercase())) {
                for analyzer in analyzers {
                    if !matched.iter().any(|a: &Arc<dyn Analyzer>| {
                        std::ptr::eq(Arc::as_ptr(a), Arc::as_ptr(analyzer))
                    }) {
                        matched.push(analyzer.clone());
                    }
                }
            }
        }

        matched
    }

    pub fn supports(&self, path: &Path) -> bool {
        !self.analyzers_for(path).is_empty()
    }
}
