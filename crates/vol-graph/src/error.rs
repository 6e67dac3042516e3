// error.rs — Error types for graph definition and execution.
//
// Note what is NOT here: cancellation and timeout. Those are distinguished
// control-flow outcomes (`GraphOutcome::Cancelled` / `GraphOutcome::TimedOut`),
// not errors, and node handler failures surface as `GraphOutcome::Failed`.
// GraphError covers malformed input and infrastructure faults only.

use thiserror::Error;

use crate::node::NodeKind;

/// Errors from graph validation, registry lookup, or event infrastructure.
#[derive(Debug, Error)]
pub enum GraphError {
    /// The graph definition is malformed. Fatal, no retry.
    #[error("invalid graph: {0}")]
    Validation(String),

    /// A node instance references a kind with no registered handler.
    #[error("no handler registered for node kind '{0}'")]
    UnregisteredKind(NodeKind),

    /// A required input slot had no link and no context fallback.
    #[error("node '{node}' is missing required input '{slot}'")]
    MissingInput { node: String, slot: String },

    /// A file I/O operation failed (event log sinks).
    #[error("I/O error at {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    /// Failed to serialize/deserialize graph data.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
