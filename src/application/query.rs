use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::info;

use crate::application::index::{KeywordIndex, SemanticIndex};
use crate::application::interfaces::EmbeddingService;
use crate::application::store::KnowledgeStore;
use crate::domain::{AskAnswer, AskSource, DomainError, SearchHit, SearchQuery};

/// Minimum cosine score for a hit to contribute to an `ask` context.
const RELEVANCE_THRESHOLD: f32 = 0.3;

/// Upper bound on assembled context size.
const MAX_CONTEXT_CHARS: usize = 6000;

const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

/// Read-side facade over the store and both indices.
///
/// Indices are rebuilt as a pair by [`QueryEngine::reindex`] so keyword and
/// semantic results always describe the same snapshot version.
pub struct QueryEngine {
    store: Arc<KnowledgeStore>,
    embedder: Arc<dyn EmbeddingService>,
    indices: RwLock<Indices>,
}

struct Indices {
    keyword: KeywordIndex,
    semantic: SemanticIndex,
    snapshot_version: u64,
}

impl QueryEngine {
    pub fn new(store: Arc<KnowledgeStore>, embedder: Arc<dyn EmbeddingService>) -> Self {
        Self {
            store,
            indices: RwLock::new(Indices {
                keyword: KeywordIndex::default(),
                semantic: SemanticIndex::empty(embedder.clone()),
                snapshot_version: 0,
            }),
            embedder,
        }
    }

    /// Rebuild both indices from the current snapshot.
    pub async fn reindex(&self) -> Result<u64, DomainError> {
        let snapshot = self.store.current().await;
        let keyword = KeywordIndex::build(&snapshot);
        let semantic = SemanticIndex::build(self.embedder.clone(), &snapshot).await?;

        let mut indices = self.indices.write().await;
        *indices = Indices {
            keyword,
            semantic,
            snapshot_version: snapshot.version,
        };
        info!(
            version = snapshot.version,
            entries = snapshot.len(),
            "indices rebuilt"
        );
        Ok(snapshot.version)
    }

    pub async fn indexed_version(&self) -> u64 {
        self.indices.read().await.snapshot_version
    }

    pub async fn search(&self, query: &SearchQuery) -> Vec<SearchHit> {
        self.indices.read().await.keyword.search(query)
    }

    pub async fn semantic_search(&self, query: &SearchQuery) -> Result<Vec<SearchHit>, DomainError> {
        self.indices.read().await.semantic.search(query).await
    }

    /// Assemble a retrieval context for a natural-language question.
    ///
    /// Takes the semantic hits above the relevance threshold, joins their
    /// chunks in rank order up to the context budget, and reports each
    /// included entity as a source. No generation happens here.
    pub async fn ask(&self, question: &str, limit: usize) -> Result<AskAnswer, DomainError> {
        if question.trim().is_empty() {
            return Err(DomainError::invalid_input("question must not be empty"));
        }

        let query = SearchQuery::new(question).with_limit(limit);
        let hits = self.semantic_search(&query).await?;

        let snapshot = self.store.current().await;
        let mut context = String::new();
        let mut sources = Vec::new();

        for hit in hits {
            if hit.score < RELEVANCE_THRESHOLD {
                continue;
            }
            // Context is truncated to the budget; sources always list
            // every relevant hit, even ones squeezed out of the context.
            let remaining = MAX_CONTEXT_CHARS.saturating_sub(context.len());
            if remaining > 0 {
                let addition = if context.is_empty() {
                    hit.snippet.clone()
                } else {
                    format!("{CONTEXT_SEPARATOR}{}", hit.snippet)
                };
                context.push_str(truncate_at_char_boundary(&addition, remaining));
            }

            if let Some(entity) = snapshot.get(&hit.key) {
                sources.push(AskSource {
                    kind: entity.kind(),
                    name: entity.name(),
                    repo: entity.repo().to_string(),
                    score: hit.score,
                });
            }
        }

        Ok(AskAnswer {
            question: question.to_string(),
            context,
            sources,
        })
    }
}

/// Longest prefix of `text` within `limit` bytes that ends on a char
/// boundary.
fn truncate_at_char_boundary(text: &str, limit: usize) -> &str {
    if text.len() <= limit {
        return text;
    }
    let mut end = limit;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
