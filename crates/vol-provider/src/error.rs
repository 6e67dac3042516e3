// error.rs — Error types for provider calls.

use thiserror::Error;

/// Errors from model, operator, or memory providers.
///
/// Callers decide severity by stage: review stages treat these as
/// fail-closed (score 0, not approved), planning treats them as fatal.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The model call failed outright (transport, backend, quota).
    #[error("model call failed: {0}")]
    ModelFailed(String),

    /// The model returned empty content — never passed through silently.
    #[error("model returned empty content for role '{role}'")]
    EmptyContent { role: String },

    /// The model's output could not be parsed into the expected shape.
    #[error("unparsable model output: {0}")]
    UnparsableOutput(String),

    /// The operator call failed before producing a step outcome.
    #[error("operator call failed: {0}")]
    OperatorFailed(String),

    /// The memory index was unreachable or errored.
    #[error("memory query failed: {0}")]
    MemoryFailed(String),

    /// A provider call exceeded its per-call timeout.
    #[error("provider call timed out after {seconds}s")]
    Timeout { seconds: u64 },
}
