use async_trait::async_trait;

use crate::domain::DomainError;

/// Produces fixed-length vectors for entity chunks and queries.
///
/// Implementations are swappable without touching the index layer; the
/// only contract is a fixed dimensionality per instance and the same
/// function for indexing and querying.
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, DomainError>;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, DomainError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }

    fn dimensions(&self) -> usize;

    fn model_name(&self) -> &str;
}
