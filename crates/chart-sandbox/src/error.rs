//! Internal sandbox errors
//!
//! These never leave the crate through `SandboxExecutor::execute`; they are
//! folded into a `ProcessFailed` result.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("Failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
