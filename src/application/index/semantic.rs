use std::sync::Arc;

use tracing::debug;

use crate::application::interfaces::EmbeddingService;
use crate::domain::{DomainError, Entity, EntityKey, SearchHit, SearchQuery, Snapshot};

/// Brute-force vector index over one snapshot. Each entity becomes one
/// text chunk; queries are embedded with the same service and ranked by
/// cosine similarity.
pub struct SemanticIndex {
    embedder: Arc<dyn EmbeddingService>,
    entries: Vec<IndexEntry>,
}

struct IndexEntry {
    key: EntityKey,
    vector: Vec<f32>,
    chunk: String,
}

impl SemanticIndex {
    pub fn empty(embedder: Arc<dyn EmbeddingService>) -> Self {
        Self {
            embedder,
            entries: vec![],
        }
    }

    pub async fn build(
        embedder: Arc<dyn EmbeddingService>,
        snapshot: &Snapshot,
    ) -> Result<Self, DomainError> {
        let keys: Vec<EntityKey> = snapshot.entities.keys().cloned().collect();
        let chunks: Vec<String> = snapshot.entities.values().map(chunk_text).collect();

        let vectors = embedder.embed_batch(&chunks).await?;
        debug!(
            entries = vectors.len(),
            model = embedder.model_name(),
            "semantic index built"
        );

        let entries = keys
            .into_iter()
            .zip(chunks)
            .zip(vectors)
            .map(|((key, chunk), vector)| IndexEntry { key, vector, chunk })
            .collect();

        Ok(Self { embedder, entries })
    }

    pub async fn search(&self, query: &SearchQuery) -> Result<Vec<SearchHit>, DomainError> {
        if self.entries.is_empty() || query.query().trim().is_empty() {
            return Ok(vec![]);
        }

        let needle = self.embedder.embed(query.query()).await?;

        let mut hits: Vec<SearchHit> = self
            .entries
            .iter()
            .filter(|entry| query.matches(&entry.key))
            .map(|entry| {
                SearchHit::new(
                    entry.key.clone(),
                    cosine(&needle, &entry.vector),
                    entry.chunk.clone(),
                )
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.key.name.cmp(&b.key.name))
        });
        hits.truncate(query.limit());
        Ok(hits)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// One paragraph of prose per entity: name, kind, description, and the
/// identifiers a question is most likely to mention.
pub fn chunk_text(entity: &Entity) -> String {
    let mut parts = vec![format!(
        "{} {} in repository {}.",
        entity.kind(),
        entity.name(),
        entity.repo()
    )];
    if !entity.description().is_empty() {
        parts.push(entity.description().to_string());
    }
    match entity {
        Entity::Schema(s) => {
            if !s.fields.is_empty() {
                let names: Vec<&str> = s.fields.iter().map(|f| f.name.as_str()).collect();
                parts.push(format!("Fields: {}.", names.join(", ")));
            }
        }
        Entity::Service(s) => {
            if !s.methods.is_empty() {
                let names: Vec<&str> = s.methods.iter().map(|m| m.name.as_str()).collect();
                parts.push(format!("Methods: {}.", names.join(", ")));
            }
        }
        Entity::Api(a) => {
            if !a.handler.is_empty() {
                parts.push(format!("Handled by {}.", a.handler));
            }
        }
        Entity::Dependency(d) => {
            parts.push(format!("{} package, version {}.", d.ecosystem, d.version));
        }
        Entity::DataFlow(f) => {
            parts.push(format!("{} flow from {} to {}.", f.flow_kind, f.source, f.target));
        }
        Entity::Context(c) => {
            parts.push(c.markdown.clone());
        }
    }
    parts.join(" ")
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::adapter::MockEmbedding;
    use crate::domain::{EntityKind, SchemaEntity};

    fn schema(repo: &str, name: &str, description: &str) -> Entity {
        Entity::Schema(SchemaEntity {
            name: name.to_string(),
            repo: repo.to_string(),
            source_file: "models.py".to_string(),
            description: description.to_string(),
            fields: vec![],
            relationships: vec![],
        })
    }

    fn snapshot() -> Snapshot {
        let mut snapshot = Snapshot::empty();
        for entity in [
            schema("users-svc", "User", "Account record for one person"),
            schema("orders-svc", "Order", "A purchase"),
        ] {
            snapshot.entities.insert(entity.key(), entity);
        }
        snapshot
    }

    #[test]
    fn cosine_handles_degenerate_vectors() {
        assert_eq!(cosine(&[1.0, 0.0], &[1.0]), 0.0);
        assert_eq!(cosine(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
        assert!((cosine(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn identical_text_scores_highest() {
        let embedder = Arc::new(MockEmbedding::new(64));
        let index = SemanticIndex::build(embedder, &snapshot()).await.unwrap();

        let chunk = chunk_text(&schema("users-svc", "User", "Account record for one person"));
        let hits = index.search(&SearchQuery::new(&chunk)).await.unwrap();
        assert_eq!(hits[0].key.name, "User");
        assert!((hits[0].score - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn post_filter_by_repo() {
        let embedder = Arc::new(MockEmbedding::new(64));
        let index = SemanticIndex::build(embedder, &snapshot()).await.unwrap();

        let hits = index
            .search(&SearchQuery::new("purchase").with_repo("users-svc"))
            .await
            .unwrap();
        assert!(hits.iter().all(|h| h.key.repo == "users-svc"));
    }

    #[tokio::test]
    async fn empty_index_returns_no_hits() {
        let embedder: Arc<dyn EmbeddingService> = Arc::new(MockEmbedding::new(64));
        let index = SemanticIndex::empty(embedder);
        assert!(index
            .search(&SearchQuery::new("anything").with_kind(EntityKind::Schema))
            .await
            .unwrap()
            .is_empty());
    }
}
