pub mod application;
pub mod connector;
pub mod domain;

pub use application::{
    extraction::{ExtractionEngine, LlmExtractor},
    interfaces::{
        Analyzer, AnalyzerRegistry, EmbeddingService, LlmClient, RepoSource, RepoSpec,
        SnapshotSink,
    },
    KnowledgeStore, PipelineOrchestrator, QueryEngine,
};

pub use connector::adapter::{
    AnthropicClient, FileSnapshotWriter, LocalRepoSource, MockEmbedding, MockLlm,
};

pub use domain::{
    AskAnswer, DomainError, Entity, EntityBatch, EntityKey, EntityKind, JobState, JobStatus,
    JobUpdate, Provenance, Relationship, SearchHit, SearchQuery, Snapshot, SnapshotSummary, Stage,
};
