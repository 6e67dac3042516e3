// operator.rs — The operator execution contract.
//
// The Operator is the external capability that actually performs a plan
// step in the real world (send a message, search the web, file a document).
// The executor node makes exactly one call per step, in ascending step
// order, and treats any non-success as fatal to that step.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use vol_policy::Capabilities;

use crate::error::ProviderError;

/// The outcome of executing one plan step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepOutcome {
    /// Whether the step succeeded. Anything else is fatal to the step.
    pub success: bool,
    /// The step's result payload, when one exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// The operator's reasoning — already sanitized for outward display.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    /// Actions the operator took while executing the step.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<String>,
    /// Error description on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepOutcome {
    pub fn ok(result: serde_json::Value) -> Self {
        Self {
            success: true,
            result: Some(result),
            reasoning: None,
            actions: Vec::new(),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            result: None,
            reasoning: None,
            actions: Vec::new(),
            error: Some(error.into()),
        }
    }
}

/// The operator execution interface.
///
/// `execute_step` is NOT safely repeatable in general — a step may have
/// already produced real-world side effects even when the call errs.
/// Nothing in the runtime retries it automatically.
#[async_trait]
pub trait Operator: Send + Sync {
    /// Execute one plan step described by `goal`, with supporting `context`
    /// and the caller's resolved policy flags.
    async fn execute_step(
        &self,
        goal: &str,
        context: &serde_json::Value,
        flags: &Capabilities,
    ) -> Result<StepOutcome, ProviderError>;
}
