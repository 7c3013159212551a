//! Error types for the analysis pipeline

use thiserror::Error;

use crate::config::ConfigError;

/// Result type alias using PipelineError
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors raised while assembling or configuring the pipeline
///
/// Failures inside a run are not errors here: nodes degrade into state, and
/// an unhandled node failure becomes the stream's terminal error event.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Graph error: {0}")]
    Engine(#[from] node_engine::NodeEngineError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Capability error: {0}")]
    Port(#[from] capabilities::PortError),

    #[error("Retrieval error: {0}")]
    Retrieval(#[from] retrieval::RetrievalError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}
