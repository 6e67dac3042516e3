// node.rs — The node executor contract.
//
// A node is a typed processing unit: positional inputs + shared context +
// configured properties → named outputs. The set of kinds is a closed enum
// so dispatch is compile-time exhaustive — adding a kind without wiring a
// handler is a compile error at the registration site, not a runtime lookup
// failure.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::context::ExecutionContext;

/// The closed set of processing-unit kinds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// Classifies free-form input as a goal/non-goal and dedupes.
    Detector,
    /// Pulls relevant memory context for a desire.
    Enricher,
    /// Produces or revises an ordered plan.
    Planner,
    /// Scores a plan against the safety hard rules.
    SafetyReview,
    /// Scores a plan for goal alignment.
    AlignmentReview,
    /// Combines reviews and decides auto-approval vs queueing.
    Verdict,
    /// Persists an approval queue entry for human sign-off.
    ApprovalQueue,
    /// Drives plan steps through the operator.
    Executor,
    /// Finalizes metrics and the terminal status.
    OutcomeReview,
    /// Generic conditional router for custom graphs.
    Router,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeKind::Detector => "detector",
            NodeKind::Enricher => "enricher",
            NodeKind::Planner => "planner",
            NodeKind::SafetyReview => "safety_review",
            NodeKind::AlignmentReview => "alignment_review",
            NodeKind::Verdict => "verdict",
            NodeKind::ApprovalQueue => "approval_queue",
            NodeKind::Executor => "executor",
            NodeKind::OutcomeReview => "outcome_review",
            NodeKind::Router => "router",
        };
        write!(f, "{name}")
    }
}

/// Declaration of one input or output slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotSpec {
    pub name: String,
    pub description: String,
    /// Required inputs must resolve from a link or the context's aux
    /// package; optional inputs default to JSON null.
    pub required: bool,
}

impl SlotSpec {
    pub fn required(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            required: true,
        }
    }

    pub fn optional(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            required: false,
        }
    }
}

/// Declaration of one configurable property.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertySpec {
    pub name: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
}

/// How safely a node's side effects can be repeated.
///
/// Handlers must declare this honestly so neither the engine nor an
/// operator blindly retries something that already touched the world.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SideEffects {
    /// Pure given its inputs.
    None,
    /// Side effects exist but repeating them is safe (idempotent writes).
    Repeatable,
    /// Repeating may duplicate a real-world action. Never auto-retried.
    NotRepeatable,
}

/// The immutable description of a node kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDefinition {
    pub kind: NodeKind,
    /// Grouping label for tooling (e.g., "lifecycle", "flow").
    pub category: String,
    pub description: String,
    pub inputs: Vec<SlotSpec>,
    pub outputs: Vec<SlotSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub properties: Vec<PropertySpec>,
    /// Routing nodes may emit a subset of their declared outputs; consumers
    /// on unemitted slots are skipped rather than failed.
    #[serde(default)]
    pub routing: bool,
}

/// Named outputs produced by one node invocation.
///
/// BTreeMap keeps serialization order stable for logs and tests.
pub type NodeOutputs = BTreeMap<String, serde_json::Value>;

/// Errors a handler may raise — any domain error boxes into this.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// The uniform node handler contract.
///
/// Handlers must be deterministic given their inputs except for the
/// explicitly-allowed side effects: model calls, operator calls, desire
/// store writes, and audit sinks.
#[async_trait]
pub trait NodeHandler: Send + Sync {
    /// The immutable definition of this node kind.
    fn definition(&self) -> &NodeDefinition;

    /// Declared side-effect class (see [`SideEffects`]).
    fn side_effects(&self) -> SideEffects {
        SideEffects::None
    }

    /// Execute the node. `inputs` are positional, in declaration order of
    /// `definition().inputs`; `properties` is the instance's configured
    /// property object.
    async fn run(
        &self,
        inputs: &[serde_json::Value],
        ctx: &ExecutionContext,
        properties: &serde_json::Value,
    ) -> Result<NodeOutputs, HandlerError>;
}

/// Build a `NodeOutputs` map from (slot, value) pairs.
pub fn outputs(pairs: &[(&str, serde_json::Value)]) -> NodeOutputs {
    pairs
        .iter()
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect()
}
