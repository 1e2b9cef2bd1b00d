mod analyzer;
mod embedding_service;
mod llm_client;
mod repo_source;
mod snapshot_sink;

pub use analyzer::{Analyzer, AnalyzerRegistry};
pub use embedding_service::EmbeddingService;
pub use llm_client::LlmClient;
pub use repo_source::{RepoSource, RepoSpec};
pub use snapshot_sink::SnapshotSink;
