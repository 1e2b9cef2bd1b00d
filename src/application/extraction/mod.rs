pub mod analyzers;
mod engine;
mod llm;
mod resolve;

pub use engine::ExtractionEngine;
pub use llm::{fingerprint, salvage_json, LlmExtractor};
pub use resolve::resolve_relationships;
