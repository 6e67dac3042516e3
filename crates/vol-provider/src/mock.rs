// mock.rs — Scripted provider implementations for tests.
//
// These live in the library (not behind #[cfg(test)]) because every crate
// in the workspace drives its integration tests through them. None of them
// touch the network.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use vol_policy::{Capabilities, OperatingMode};

use crate::error::ProviderError;
use crate::memory::{MemoryHit, MemoryQuery};
use crate::model::{CallOptions, ChatMessage, ModelProvider, ModelResponse};
use crate::operator::{Operator, StepOutcome};

/// One scripted model reply.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    /// Return this content.
    Content(String),
    /// Fail the call with `ProviderError::ModelFailed`.
    Error(String),
}

/// A model provider that replays a fixed script of responses.
///
/// Replies are consumed in order; an exhausted script is a call failure,
/// which keeps tests honest about how many model calls a flow makes.
pub struct ScriptedModel {
    script: Mutex<VecDeque<ScriptedReply>>,
    /// Roles of the calls made, in order — for assertions.
    calls: Mutex<Vec<String>>,
}

impl ScriptedModel {
    pub fn new(replies: Vec<ScriptedReply>) -> Self {
        Self {
            script: Mutex::new(replies.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Convenience: a script of plain content replies.
    pub fn with_content(replies: &[&str]) -> Self {
        Self::new(
            replies
                .iter()
                .map(|r| ScriptedReply::Content(r.to_string()))
                .collect(),
        )
    }

    /// Roles this model has been called with so far.
    pub fn call_roles(&self) -> Vec<String> {
        self.calls.lock().expect("call log poisoned").clone()
    }
}

#[async_trait]
impl ModelProvider for ScriptedModel {
    async fn call(
        &self,
        role: &str,
        _messages: &[ChatMessage],
        _mode: OperatingMode,
        _options: &CallOptions,
    ) -> Result<ModelResponse, ProviderError> {
        self.calls
            .lock()
            .expect("call log poisoned")
            .push(role.to_string());

        let reply = self
            .script
            .lock()
            .expect("script poisoned")
            .pop_front()
            .ok_or_else(|| ProviderError::ModelFailed("script exhausted".to_string()))?;

        match reply {
            ScriptedReply::Content(content) => {
                // Enforce the contract: empty content is a typed error.
                if content.trim().is_empty() {
                    return Err(ProviderError::EmptyContent {
                        role: role.to_string(),
                    });
                }
                Ok(ModelResponse {
                    content,
                    usage: None,
                })
            }
            ScriptedReply::Error(message) => Err(ProviderError::ModelFailed(message)),
        }
    }
}

/// Hook invoked with the 1-based call index before each operator call runs.
pub type CallHook = Box<dyn Fn(usize) + Send + Sync>;

/// An operator that succeeds every step except an optional failing one.
///
/// Records every goal it is asked to execute so tests can assert which
/// steps ran (and, critically, which never did).
pub struct MockOperator {
    /// 1-based call index that should fail, if any.
    fail_at: Option<usize>,
    call_count: AtomicUsize,
    calls: Mutex<Vec<String>>,
    on_call: Option<CallHook>,
}

impl MockOperator {
    pub fn new() -> Self {
        Self {
            fail_at: None,
            call_count: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
            on_call: None,
        }
    }

    /// Fail the `n`-th call (1-based).
    pub fn failing_at(n: usize) -> Self {
        Self {
            fail_at: Some(n),
            ..Self::new()
        }
    }

    /// Install a hook that fires at the start of each call — used by
    /// cancellation tests to trip a token while a step is in flight.
    pub fn with_hook(mut self, hook: CallHook) -> Self {
        self.on_call = Some(hook);
        self
    }

    /// Goals executed so far, in order.
    pub fn executed_goals(&self) -> Vec<String> {
        self.calls.lock().expect("call log poisoned").clone()
    }

    /// Number of operator calls made.
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }
}

impl Default for MockOperator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Operator for MockOperator {
    async fn execute_step(
        &self,
        goal: &str,
        _context: &serde_json::Value,
        _flags: &Capabilities,
    ) -> Result<StepOutcome, ProviderError> {
        let index = self.call_count.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(hook) = &self.on_call {
            hook(index);
        }
        self.calls
            .lock()
            .expect("call log poisoned")
            .push(goal.to_string());

        if self.fail_at == Some(index) {
            return Ok(StepOutcome::failed(format!(
                "simulated failure at call {index}"
            )));
        }

        Ok(StepOutcome::ok(serde_json::json!({ "completed": goal })))
    }
}

/// A memory index with a fixed set of hits.
pub struct StaticMemory {
    hits: Vec<MemoryHit>,
}

impl StaticMemory {
    pub fn new(hits: Vec<MemoryHit>) -> Self {
        Self { hits }
    }

    /// An index that returns nothing — the common test default.
    pub fn empty() -> Self {
        Self { hits: Vec::new() }
    }
}

#[async_trait]
impl MemoryQuery for StaticMemory {
    async fn query(&self, _text: &str, top_k: usize) -> Result<Vec<MemoryHit>, ProviderError> {
        Ok(self.hits.iter().take(top_k).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps() -> Capabilities {
        vol_policy::PolicyGate::resolve(OperatingMode::Autonomous, vol_policy::Role::Admin, true)
    }

    #[tokio::test]
    async fn scripted_model_replays_in_order() {
        let model = ScriptedModel::with_content(&["first", "second"]);
        let opts = CallOptions::default();

        let r1 = model
            .call("detector", &[], OperatingMode::Autonomous, &opts)
            .await
            .unwrap();
        let r2 = model
            .call("planner", &[], OperatingMode::Autonomous, &opts)
            .await
            .unwrap();

        assert_eq!(r1.content, "first");
        assert_eq!(r2.content, "second");
        assert_eq!(model.call_roles(), vec!["detector", "planner"]);
    }

    #[tokio::test]
    async fn exhausted_script_is_an_error() {
        let model = ScriptedModel::with_content(&[]);
        let result = model
            .call("detector", &[], OperatingMode::Autonomous, &CallOptions::default())
            .await;
        assert!(matches!(result, Err(ProviderError::ModelFailed(_))));
    }

    #[tokio::test]
    async fn empty_content_is_a_typed_error() {
        let model = ScriptedModel::with_content(&["   "]);
        let result = model
            .call("reviewer", &[], OperatingMode::Autonomous, &CallOptions::default())
            .await;
        assert!(matches!(result, Err(ProviderError::EmptyContent { .. })));
    }

    #[tokio::test]
    async fn mock_operator_fails_only_configured_call() {
        let operator = MockOperator::failing_at(2);
        let ctx = serde_json::json!({});

        let o1 = operator.execute_step("step one", &ctx, &caps()).await.unwrap();
        let o2 = operator.execute_step("step two", &ctx, &caps()).await.unwrap();
        let o3 = operator.execute_step("step three", &ctx, &caps()).await.unwrap();

        assert!(o1.success);
        assert!(!o2.success);
        assert!(o3.success);
        assert_eq!(operator.call_count(), 3);
        assert_eq!(
            operator.executed_goals(),
            vec!["step one", "step two", "step three"]
        );
    }

    #[tokio::test]
    async fn static_memory_respects_top_k() {
        let memory = StaticMemory::new(vec![
            MemoryHit {
                item: serde_json::json!("a"),
                score: 0.9,
            },
            MemoryHit {
                item: serde_json::json!("b"),
                score: 0.5,
            },
        ]);

        let hits = memory.query("anything", 1).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].score, 0.9);
    }
}
