mod keyword;
mod semantic;

pub use keyword::KeywordIndex;
pub use semantic::{chunk_text, SemanticIndex};
