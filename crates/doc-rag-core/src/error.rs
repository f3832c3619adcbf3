//! Error types for the retrieval pipeline.
//!
//! Uses `thiserror`. Each failure category the pipeline distinguishes has
//! its own variant so callers can tell a bad argument from a provider
//! outage without string matching.

use thiserror::Error;

/// Top-level error for every core operation.
#[derive(Debug, Error)]
pub enum RagError {
    /// A caller-supplied parameter is out of range. Raised before any work.
    #[error("validation error: {0}")]
    Validation(String),

    /// Input data violates a pipeline precondition (empty chunk text,
    /// missing embedding). Raised before anything is committed.
    #[error("data integrity error: {0}")]
    Integrity(String),

    #[error("embedding provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("tokenizer error: {0}")]
    Tokenizer(String),
}

/// Result type alias using [`RagError`].
pub type Result<T> = std::result::Result<T, RagError>;

impl RagError {
    pub fn validation(msg: impl Into<String>) -> Self {
        RagError::Validation(msg.into())
    }

    pub fn integrity(msg: impl Into<String>) -> Self {
        RagError::Integrity(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        RagError::Storage(msg.into())
    }
}

/// Failure reported by an embedding provider.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProviderError {
    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("malformed request (status {status}): {message}")]
    BadRequest { status: u16, message: String },

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("server error (status {status}): {message}")]
    Server { status: u16, message: String },

    #[error("connection error: {0}")]
    Connection(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    /// Rate limits, server errors, and connection failures are transient.
    /// Everything else propagates on first occurrence.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::RateLimited(_)
                | ProviderError::Server { .. }
                | ProviderError::Connection(_)
        )
    }
}
