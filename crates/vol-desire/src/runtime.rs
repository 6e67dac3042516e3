// runtime.rs — The desire runtime: the one front door to the lifecycle.
//
// Wires the store, providers, and node registry into an engine, then
// exposes the operations callers actually perform: feed input in, run an
// approved desire, revise a criticised plan, approve/reject from the
// queue, discard, cancel.
//
// Concurrency: operations addressed to an existing desire take the
// folder's writer lease for their duration. handle_input doesn't — the
// desire it may create is brand new, and reinforcement is a single
// atomic save.
//
// Error hygiene: stage failures inside a graph run settle the desire as
// Failed and come back as a sanitized report ("stage 'plan' failed");
// the full error text goes to the log and the scratchpad, never to the
// caller.

use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use vol_graph::{
    CallerIdentity, CancelRegistry, Engine, EventDispatcher, EventSink, ExecutionContext,
    GraphOutcome, NodeRegistry, ResultTable,
};
use vol_policy::{OperatingMode, PolicyGate};
use vol_provider::{MemoryQuery, ModelProvider, Operator};

use crate::config::DesireConfig;
use crate::desire::{Desire, DesireStatus};
use crate::error::DesireError;
use crate::graphs::{execution_graph, lifecycle_graph, revision_graph};
use crate::nodes::{register_all, NodeDeps};
use crate::scratchpad::{EntryKind, ScratchpadEntry};
use crate::store::{ApprovalRequest, DesireStore};

/// What a lifecycle run reported back to the caller. Sanitized — internal
/// error text never appears in `detail`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LifecycleReport {
    /// "created", "reinforced", "ignored", "completed", "failed",
    /// "queued", "cancelled", or "timed_out".
    pub outcome: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub desire_id: Option<Uuid>,
    pub detail: String,
}

impl LifecycleReport {
    fn new(outcome: &str, desire_id: Option<Uuid>, detail: impl Into<String>) -> Self {
        Self {
            outcome: outcome.to_string(),
            desire_id,
            detail: detail.into(),
        }
    }
}

/// The assembled desire lifecycle runtime.
pub struct DesireRuntime {
    store: Arc<DesireStore>,
    engine: Engine,
    cancels: Arc<CancelRegistry>,
    events: EventDispatcher,
    config: DesireConfig,
    mode: OperatingMode,
}

impl DesireRuntime {
    pub fn new(
        store: Arc<DesireStore>,
        model: Arc<dyn ModelProvider>,
        operator: Arc<dyn Operator>,
        memory: Arc<dyn MemoryQuery>,
        config: DesireConfig,
        mode: OperatingMode,
    ) -> Self {
        let deps = NodeDeps {
            store: store.clone(),
            model,
            operator,
            memory,
            config: config.clone(),
        };
        let mut registry = NodeRegistry::new();
        register_all(&mut registry, deps);

        Self {
            store,
            engine: Engine::new(Arc::new(registry)),
            cancels: Arc::new(CancelRegistry::new()),
            events: EventDispatcher::new(),
            config,
            mode,
        }
    }

    /// Attach an event sink (audit log, console stream).
    pub fn with_sink(mut self, sink: Box<dyn EventSink>) -> Self {
        self.events.add_sink(sink);
        self
    }

    pub fn mode(&self) -> OperatingMode {
        self.mode
    }

    pub fn store(&self) -> &DesireStore {
        &self.store
    }

    fn context(&self, session_id: &str, caller: CallerIdentity) -> ExecutionContext {
        ExecutionContext::new(session_id, caller, self.mode)
            .with_timeout(std::time::Duration::from_secs(
                self.config.execution.graph_timeout_secs,
            ))
            .with_cancel(self.cancels.token_for(session_id))
    }

    fn lease(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.config.execution.lock_lease_secs as i64)
    }

    // ── Lifecycle entry points ──

    /// Feed free-form input through the lifecycle graph for this mode.
    pub async fn handle_input(
        &self,
        session_id: &str,
        caller: CallerIdentity,
        input: &str,
    ) -> Result<LifecycleReport, DesireError> {
        let graph = lifecycle_graph(self.mode);
        let ctx = self
            .context(session_id, caller)
            .with_aux(serde_json::json!({ "input": input }));

        let outcome = self.engine.execute(&graph, &ctx, &self.events).await?;
        self.settle(outcome, None)
    }

    /// Run (or resume) an approved desire's execution tail.
    pub async fn run_desire(
        &self,
        session_id: &str,
        caller: CallerIdentity,
        id: Uuid,
    ) -> Result<LifecycleReport, DesireError> {
        self.store.acquire_lock(id, session_id, self.lease())?;
        let result = self.run_graph_for(session_id, caller, id, execution_graph(self.mode), None).await;
        self.store.release_lock(id, session_id)?;
        result
    }

    /// Revise a criticised plan: back to planning, then re-review.
    pub async fn revise_plan(
        &self,
        session_id: &str,
        caller: CallerIdentity,
        id: Uuid,
        critique: &str,
    ) -> Result<LifecycleReport, DesireError> {
        self.store.acquire_lock(id, session_id, self.lease())?;
        let result = self
            .revise_locked(session_id, caller, id, critique)
            .await;
        self.store.release_lock(id, session_id)?;
        result
    }

    async fn revise_locked(
        &self,
        session_id: &str,
        caller: CallerIdentity,
        id: Uuid,
        critique: &str,
    ) -> Result<LifecycleReport, DesireError> {
        let mut desire = self.store.load(id)?;
        if !matches!(
            desire.status,
            DesireStatus::Reviewing | DesireStatus::AwaitingApproval
        ) {
            return Err(DesireError::WrongStatus {
                desire_id: id,
                status: desire.status.to_string(),
                message: "revision requires a desire under review or awaiting approval"
                    .to_string(),
            });
        }

        // A queued request for the superseded plan version is stale.
        self.store.remove_approval(id)?;
        desire.transition(DesireStatus::Planning)?;
        self.store.save(&desire)?;
        self.store.append_scratchpad(
            id,
            ScratchpadEntry::new(EntryKind::Note, &caller.user_id, "revision requested")
                .with_data(serde_json::json!({ "critique": critique })),
        )?;

        self.run_graph_for(
            session_id,
            caller,
            id,
            revision_graph(self.mode),
            Some(critique),
        )
        .await
    }

    async fn run_graph_for(
        &self,
        session_id: &str,
        caller: CallerIdentity,
        id: Uuid,
        graph: vol_graph::GraphDefinition,
        critique: Option<&str>,
    ) -> Result<LifecycleReport, DesireError> {
        let mut aux = serde_json::json!({ "desire_id": id.to_string() });
        if let Some(critique) = critique {
            aux["critique"] = serde_json::json!(critique);
        }
        let ctx = self.context(session_id, caller).with_aux(aux);

        let outcome = self.engine.execute(&graph, &ctx, &self.events).await?;
        self.settle(outcome, Some(id))
    }

    // ── Approval queue ──

    /// All requests awaiting a human decision.
    pub fn pending_approvals(&self) -> Result<Vec<ApprovalRequest>, DesireError> {
        self.store.pending_approvals()
    }

    /// Approve a queued desire. The approver must hold the approval
    /// capability for this mode.
    pub fn approve(&self, id: Uuid, approver: &CallerIdentity) -> Result<(), DesireError> {
        let flags = PolicyGate::resolve(self.mode, approver.role, approver.is_admin);
        flags.assert_approver()?;

        let mut desire = self.store.load(id)?;
        self.store.remove_approval(id)?;
        desire.transition(DesireStatus::Approved {
            approved_by: approver.user_id.clone(),
        })?;
        desire.approved_by = Some(approver.user_id.clone());
        self.store.save(&desire)?;
        self.store.append_scratchpad(
            id,
            ScratchpadEntry::new(
                EntryKind::Approved,
                &approver.user_id,
                "plan approved by human reviewer",
            ),
        )?;
        tracing::info!(desire_id = %id, approver = %approver.user_id, "desire approved");
        Ok(())
    }

    /// Reject a queued desire. The desire is discarded, never deleted.
    pub fn reject(
        &self,
        id: Uuid,
        approver: &CallerIdentity,
        reason: &str,
    ) -> Result<(), DesireError> {
        let flags = PolicyGate::resolve(self.mode, approver.role, approver.is_admin);
        flags.assert_approver()?;

        let mut desire = self.store.load(id)?;
        self.store.remove_approval(id)?;
        desire.transition(DesireStatus::Discarded)?;
        self.store.save(&desire)?;
        self.store.append_scratchpad(
            id,
            ScratchpadEntry::new(EntryKind::Discarded, &approver.user_id, "plan rejected")
                .with_data(serde_json::json!({ "reason": reason })),
        )?;
        tracing::info!(desire_id = %id, approver = %approver.user_id, "desire rejected");
        Ok(())
    }

    /// Explicitly discard a desire in any active state.
    pub fn discard(&self, id: Uuid, actor: &CallerIdentity) -> Result<(), DesireError> {
        let mut desire = self.store.load(id)?;
        self.store.remove_approval(id)?;
        desire.transition(DesireStatus::Discarded)?;
        self.store.save(&desire)?;
        self.store.append_scratchpad(
            id,
            ScratchpadEntry::new(EntryKind::Discarded, &actor.user_id, "desire discarded"),
        )?;
        Ok(())
    }

    // ── Cancellation ──

    /// Cancel the named session's in-flight run, if any. Returns whether a
    /// token existed for the session.
    pub fn cancel_session(&self, session_id: &str) -> bool {
        self.cancels.cancel(session_id)
    }

    /// Drop a finished session's token so the registry doesn't grow.
    pub fn clear_session(&self, session_id: &str) {
        self.cancels.clear(session_id);
    }

    // ── Outcome interpretation ──

    /// Turn a graph outcome into a sanitized report, settling the desire's
    /// status when the run failed.
    fn settle(
        &self,
        outcome: GraphOutcome,
        known_id: Option<Uuid>,
    ) -> Result<LifecycleReport, DesireError> {
        let desire_id = known_id.or_else(|| find_desire_id(outcome.results()));

        match outcome {
            GraphOutcome::Completed { results } => {
                Ok(self.report_completed(&results, desire_id))
            }
            GraphOutcome::Failed {
                node_id, message, ..
            } => {
                tracing::error!(node = %node_id, error = %message, "lifecycle stage failed");
                if let Some(id) = desire_id {
                    self.mark_failed(id, &node_id, &message)?;
                }
                Ok(LifecycleReport::new(
                    "failed",
                    desire_id,
                    format!("stage '{node_id}' failed"),
                ))
            }
            GraphOutcome::Cancelled { .. } => Ok(LifecycleReport::new(
                "cancelled",
                desire_id,
                "run cancelled",
            )),
            GraphOutcome::TimedOut { node_id, .. } => {
                tracing::error!(node = %node_id, "lifecycle run timed out");
                if let Some(id) = desire_id {
                    self.mark_failed(id, &node_id, "timeout budget exhausted")?;
                }
                Ok(LifecycleReport::new(
                    "timed_out",
                    desire_id,
                    format!("run timed out at stage '{node_id}'"),
                ))
            }
        }
    }

    fn report_completed(
        &self,
        results: &ResultTable,
        desire_id: Option<Uuid>,
    ) -> LifecycleReport {
        // Detection-side outcomes take precedence: an ignored or
        // reinforced input never reaches later stages.
        if let Some(reason) = results.value("detect", "ignored").and_then(|v| v.as_str()) {
            return LifecycleReport::new("ignored", None, reason);
        }
        if results.value("detect", "reinforced").is_some() {
            return LifecycleReport::new(
                "reinforced",
                desire_id,
                "reinforced an existing desire",
            );
        }
        if let Some(status) = results.value("outcome", "final_status").and_then(|v| v.as_str()) {
            return LifecycleReport::new(status, desire_id, format!("desire {status}"));
        }
        if results.value("execute", "halted").is_some() {
            return LifecycleReport::new("cancelled", desire_id, "execution halted; resumable");
        }
        if results.contains("queue") {
            return LifecycleReport::new("queued", desire_id, "awaiting human approval");
        }
        if results.value("detect", "created").is_some() {
            return LifecycleReport::new("created", desire_id, "desire recorded");
        }
        LifecycleReport::new("completed", desire_id, "run completed")
    }

    /// Settle a desire as Failed after a stage error. Idempotent on
    /// already-terminal desires.
    fn mark_failed(&self, id: Uuid, stage: &str, message: &str) -> Result<(), DesireError> {
        let mut desire = match self.store.load(id) {
            Ok(desire) => desire,
            Err(DesireError::NotFound(_)) => return Ok(()),
            Err(err) => return Err(err),
        };
        if desire.status.is_terminal() {
            return Ok(());
        }

        desire.transition(DesireStatus::Failed {
            reason: format!("stage '{stage}' failed"),
        })?;
        desire.last_error = Some(format!("stage '{stage}' failed"));
        self.store.save(&desire)?;
        self.store.append_scratchpad(
            id,
            ScratchpadEntry::new(
                EntryKind::StageFailed,
                "system",
                format!("stage '{stage}' failed"),
            )
            .with_data(serde_json::json!({ "stage": stage, "error": message })),
        )?;
        Ok(())
    }

    /// Load a desire by id — convenience passthrough.
    pub fn desire(&self, id: Uuid) -> Result<Desire, DesireError> {
        self.store.load(id)
    }
}

/// Fish the desire id out of whatever stage got far enough to emit one.
fn find_desire_id(results: &ResultTable) -> Option<Uuid> {
    for (node, slot) in [
        ("detect", "created"),
        ("detect", "reinforced"),
        ("enrich", "desire_id"),
        ("plan", "desire_id"),
        ("outcome", "desire_id"),
    ] {
        if let Some(id) = results
            .value(node, slot)
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse().ok())
        {
            return Some(id);
        }
    }
    None
}
