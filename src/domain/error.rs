use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("Analyzer failure: {0}")]
    AnalyzerFailure(String),

    #[error("Provider error: {0}")]
    ProviderError(String),

    #[error("Validation failure: {0}")]
    ValidationFailure(String),

    #[error("Stage failure: {0}")]
    StageFailure(String),

    #[error("A crawl job is already running")]
    JobAlreadyRunning,

    #[error("Job cancelled")]
    Cancelled,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DomainError {
    pub fn source_unavailable(msg: impl Into<String>) -> Self {
        Self::SourceUnavailable(msg.into())
    }

    pub fn analyzer(msg: impl Into<String>) -> Self {
        Self::AnalyzerFailure(msg.into())
    }

    pub fn provider(msg: impl Into<String>) -> Self {
        Self::ProviderError(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ValidationFailure(msg.into())
    }

    pub fn stage(msg: impl Into<String>) -> Self {
        Self::StageFailure(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::StorageError(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn is_provider_error(&self) -> bool {
        matches!(self, Self::ProviderError(_))
    }
}
