use async_trait::async_trait;

use crate::domain::DomainError;

/// Minimal chat-completion seam used by LLM-mode extraction.
///
/// Credentials and endpoint selection are the implementation's concern;
/// the extraction engine only needs "prompt in, text out" plus a stable
/// model identifier for cache fingerprinting.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, system: &str, user: &str) -> Result<String, DomainError>;

    /// Stable model identifier, part of the extraction cache fingerprint.
    fn model_id(&self) -> &str;
}
