// nodes/outcome.rs — OutcomeReview: final bookkeeping for an attempt.
//
// Deterministic by design: metrics and the terminal status follow directly
// from the recorded execution, with no model in the loop.

use async_trait::async_trait;
use uuid::Uuid;

use vol_graph::{
    outputs, ExecutionContext, HandlerError, NodeDefinition, NodeHandler, NodeKind, NodeOutputs,
    SideEffects, SlotSpec,
};

use crate::desire::DesireStatus;
use crate::error::DesireError;
use crate::execution::ExecutionStatus;
use crate::scratchpad::{EntryKind, ScratchpadEntry};

use super::NodeDeps;

pub struct OutcomeHandler {
    deps: NodeDeps,
    definition: NodeDefinition,
}

impl OutcomeHandler {
    pub fn new(deps: NodeDeps) -> Self {
        Self {
            deps,
            definition: NodeDefinition {
                kind: NodeKind::OutcomeReview,
                category: "lifecycle".to_string(),
                description: "Updates metrics and settles the terminal status".to_string(),
                inputs: vec![SlotSpec::required(
                    "finished",
                    "attempt summary from the executor",
                )],
                outputs: vec![
                    SlotSpec::required("desire_id", "the settled desire id"),
                    SlotSpec::required("final_status", "completed or failed"),
                ],
                properties: vec![],
                routing: false,
            },
        }
    }
}

#[async_trait]
impl NodeHandler for OutcomeHandler {
    fn definition(&self) -> &NodeDefinition {
        &self.definition
    }

    fn side_effects(&self) -> SideEffects {
        SideEffects::Repeatable
    }

    async fn run(
        &self,
        inputs: &[serde_json::Value],
        _ctx: &ExecutionContext,
        _properties: &serde_json::Value,
    ) -> Result<NodeOutputs, HandlerError> {
        let summary = &inputs[0];
        let id: Uuid = summary
            .get("desire_id")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .parse()?;

        let mut desire = self.deps.store.load(id)?;
        let execution = desire.execution.clone().ok_or_else(|| DesireError::WrongStatus {
            desire_id: id,
            status: desire.status.to_string(),
            message: "outcome review requires a recorded execution".to_string(),
        })?;

        desire.metrics.attempts += 1;
        desire.metrics.record_stage("outcome_review");

        let final_status = match execution.status {
            ExecutionStatus::Completed => {
                desire.metrics.successes += 1;
                desire.transition(DesireStatus::Completed)?;
                "completed"
            }
            _ => {
                desire.metrics.failures += 1;
                let reason = desire
                    .last_error
                    .clone()
                    .unwrap_or_else(|| "execution did not complete".to_string());
                desire.transition(DesireStatus::Failed { reason })?;
                "failed"
            }
        };

        self.deps.store.save(&desire)?;
        self.deps.store.append_scratchpad(
            id,
            ScratchpadEntry::new(
                EntryKind::OutcomeRecorded,
                "outcome_review",
                format!(
                    "settled as {final_status} ({}/{} steps)",
                    execution.steps_completed, execution.steps_total
                ),
            )
            .with_data(serde_json::json!({
                "final_status": final_status,
                "attempts": desire.metrics.attempts,
                "successes": desire.metrics.successes,
                "failures": desire.metrics.failures,
            })),
        )?;
        tracing::info!(desire_id = %id, final_status, "desire settled");

        Ok(outputs(&[
            ("desire_id", serde_json::json!(id.to_string())),
            ("final_status", serde_json::json!(final_status)),
        ]))
    }
}
