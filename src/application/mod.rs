pub mod extraction;
pub mod index;
pub mod interfaces;
pub mod pipeline;
pub mod query;
pub mod store;

pub use pipeline::PipelineOrchestrator;
pub use query::QueryEngine;
pub use store::KnowledgeStore;
