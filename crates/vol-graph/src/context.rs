// context.rs — Execution context and the per-run result table.
//
// The context is the read-mostly value every node receives: who is calling,
// which mode we're in, the conversation so far, and the run's cancellation
// token. Node outputs deliberately do NOT live in the context — they go in
// a separate ResultTable keyed by node instance id, so the context never
// becomes a shared mutable grab-bag.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use vol_policy::{OperatingMode, Role};
use vol_provider::ChatMessage;

use crate::node::NodeOutputs;

/// The caller's identity, passed explicitly — never read from ambient state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CallerIdentity {
    pub user_id: String,
    pub username: String,
    pub role: Role,
    pub is_admin: bool,
}

impl CallerIdentity {
    pub fn new(user_id: impl Into<String>, username: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            username: username.into(),
            role,
            is_admin: matches!(role, Role::Admin),
        }
    }
}

/// The shared, read-mostly context passed to every node in a run.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// Session identifier — also the cancellation key.
    pub session_id: String,
    pub caller: CallerIdentity,
    pub mode: OperatingMode,
    /// Conversation history relevant to this run.
    pub history: Vec<ChatMessage>,
    /// Whether durable memory writes are permitted for this run.
    pub memory_writes_allowed: bool,
    /// Whole-graph timeout budget.
    pub timeout: Duration,
    /// Free-form auxiliary package. Entry nodes (no upstream link) resolve
    /// their inputs from fields of this object by slot name.
    pub aux: serde_json::Value,
    /// Cooperative cancellation token for this run.
    pub cancel: CancellationToken,
}

impl ExecutionContext {
    pub fn new(
        session_id: impl Into<String>,
        caller: CallerIdentity,
        mode: OperatingMode,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            caller,
            mode,
            history: Vec::new(),
            memory_writes_allowed: true,
            timeout: Duration::from_secs(120),
            aux: serde_json::json!({}),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_aux(mut self, aux: serde_json::Value) -> Self {
        self.aux = aux;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_history(mut self, history: Vec<ChatMessage>) -> Self {
        self.history = history;
        self
    }
}

/// Per-run table of node outputs, keyed by node instance id.
#[derive(Debug, Clone, Default)]
pub struct ResultTable {
    outputs: HashMap<String, NodeOutputs>,
}

impl ResultTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a node's outputs. Each node completes at most once per run.
    pub fn insert(&mut self, node_id: impl Into<String>, outputs: NodeOutputs) {
        self.outputs.insert(node_id.into(), outputs);
    }

    /// All outputs of a completed node, if it completed.
    pub fn outputs_of(&self, node_id: &str) -> Option<&NodeOutputs> {
        self.outputs.get(node_id)
    }

    /// One output value of a completed node.
    pub fn value(&self, node_id: &str, slot: &str) -> Option<&serde_json::Value> {
        self.outputs.get(node_id).and_then(|o| o.get(slot))
    }

    /// Whether a node has completed.
    pub fn contains(&self, node_id: &str) -> bool {
        self.outputs.contains_key(node_id)
    }

    /// Number of completed nodes.
    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }
}
