//! Error types for retrieval operations

use thiserror::Error;

/// Result type alias using RetrievalError
pub type Result<T> = std::result::Result<T, RetrievalError>;

/// Errors that can occur during indexing and retrieval
#[derive(Debug, Error)]
pub enum RetrievalError {
    /// None of the requested sources has an index
    #[error("No indexed source in scope")]
    NotIndexed,

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Search error: {0}")]
    Search(String),

    #[error("Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid source id '{0}'")]
    InvalidSourceId(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<capabilities::PortError> for RetrievalError {
    fn from(e: capabilities::PortError) -> Self {
        RetrievalError::Embedding(e.to_string())
    }
}
