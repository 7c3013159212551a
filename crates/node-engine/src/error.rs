//! Error types for the node engine

use thiserror::Error;

use crate::validation::ValidationError;

/// Result type alias using NodeEngineError
pub type Result<T> = std::result::Result<T, NodeEngineError>;

/// Errors that can occur in the node engine
#[derive(Debug, Error)]
pub enum NodeEngineError {
    /// The graph definition is invalid (raised by `compile`, never per run)
    #[error("Graph definition error: {}", format_validation_errors(.0))]
    Definition(Vec<ValidationError>),

    /// A node returned an error it did not handle itself; aborts the run
    #[error("Node '{node}' failed: {message}")]
    NodeFatal { node: String, message: String },

    /// A router produced a key that has no target in its branch table
    #[error("Node '{node}' routed to unmapped branch '{key}'")]
    UnmappedBranch { node: String, key: String },

    /// The run exceeded its step budget (routing loop protection)
    #[error("Execution limit reached ({0} steps)")]
    ExecutionLimit(u32),

    /// Node execution failed
    #[error("Node execution failed: {0}")]
    ExecutionFailed(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl NodeEngineError {
    /// Create an execution failed error with a message
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::ExecutionFailed(msg.into())
    }

    /// Whether this error terminated a run because of a node failure
    pub fn is_node_fatal(&self) -> bool {
        matches!(self, Self::NodeFatal { .. })
    }
}

fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_definition_error_lists_every_problem() {
        let err = NodeEngineError::Definition(vec![
            ValidationError::MissingEntryPoint,
            ValidationError::MissingOutgoingEdge {
                node_id: "a".to_string(),
            },
        ]);
        let text = err.to_string();
        assert!(text.contains("no entry point"));
        assert!(text.contains("'a'"));
    }

    #[test]
    fn test_node_fatal_flag() {
        let err = NodeEngineError::NodeFatal {
            node: "n".to_string(),
            message: "boom".to_string(),
        };
        assert!(err.is_node_fatal());
        assert!(!NodeEngineError::failed("x").is_node_fatal());
    }
}
