mod anthropic_client;
mod local_source;
mod mock_embedding;
mod mock_llm;
mod snapshot_writer;

pub use anthropic_client::{AnthropicClient, DEFAULT_BASE_URL};
pub use local_source::LocalRepoSource;
pub use mock_embedding::MockEmbedding;
pub use mock_llm::MockLlm;
pub use snapshot_writer::{read_snapshot, FileSnapshotWriter};
