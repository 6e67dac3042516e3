// error.rs — Error types for the desire lifecycle subsystem.

use thiserror::Error;
use uuid::Uuid;

use vol_policy::PolicyViolation;
use vol_provider::ProviderError;

/// Errors from desire persistence and lifecycle operations.
#[derive(Debug, Error)]
pub enum DesireError {
    /// A file I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    /// Failed to serialize/deserialize desire data.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The requested desire was not found.
    #[error("desire not found: {0}")]
    NotFound(Uuid),

    /// Invalid lifecycle transition.
    #[error("invalid transition from {from} to {to} for desire {desire_id}")]
    InvalidTransition {
        desire_id: Uuid,
        from: String,
        to: String,
    },

    /// Another writer holds the desire's lock lease.
    #[error("desire {desire_id} is locked by '{owner}' until {expires_at}")]
    Locked {
        desire_id: Uuid,
        owner: String,
        expires_at: String,
    },

    /// The plan is structurally invalid (empty, out-of-order steps).
    #[error("invalid plan: {0}")]
    InvalidPlan(String),

    /// The configuration file could not be parsed.
    #[error("config error: {0}")]
    Config(String),

    /// The desire is not in a state that allows the requested operation.
    #[error("desire {desire_id} is '{status}': {message}")]
    WrongStatus {
        desire_id: Uuid,
        status: String,
        message: String,
    },

    /// The scratchpad hash chain failed verification.
    #[error("scratchpad integrity violation at line {line}")]
    ScratchpadIntegrity { line: usize },

    /// A structural graph problem (invalid wiring, missing handler).
    #[error(transparent)]
    Graph(#[from] vol_graph::GraphError),

    /// A provider call failed.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// A policy rule blocked the operation.
    #[error(transparent)]
    Policy(#[from] PolicyViolation),
}
