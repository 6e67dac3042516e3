// nodes/approval.rs — ApprovalQueue: park a desire for human sign-off.
//
// Writing the queue entry is idempotent (one file per desire id), so a
// re-run of this node cannot double-queue.

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use vol_graph::{
    outputs, ExecutionContext, HandlerError, NodeDefinition, NodeHandler, NodeKind, NodeOutputs,
    SideEffects, SlotSpec,
};

use crate::desire::DesireStatus;
use crate::error::DesireError;
use crate::scratchpad::{EntryKind, ScratchpadEntry};
use crate::store::ApprovalRequest;

use super::NodeDeps;

pub struct ApprovalQueueHandler {
    deps: NodeDeps,
    definition: NodeDefinition,
}

impl ApprovalQueueHandler {
    pub fn new(deps: NodeDeps) -> Self {
        Self {
            deps,
            definition: NodeDefinition {
                kind: NodeKind::ApprovalQueue,
                category: "lifecycle".to_string(),
                description: "Queues a reviewed desire for human approval".to_string(),
                inputs: vec![SlotSpec::required("desire_id", "the desire to queue")],
                outputs: vec![SlotSpec::required(
                    "desire_id",
                    "the queued desire id, passed through",
                )],
                properties: vec![],
                routing: false,
            },
        }
    }
}

#[async_trait]
impl NodeHandler for ApprovalQueueHandler {
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
        let id: Uuid = inputs[0].as_str().unwrap_or_default().parse()?;
        let mut desire = self.deps.store.load(id)?;

        let plan = desire.plan.clone().ok_or_else(|| DesireError::WrongStatus {
            desire_id: id,
            status: desire.status.to_string(),
            message: "cannot queue a desire with no plan".to_string(),
        })?;

        desire.transition(DesireStatus::AwaitingApproval)?;
        self.deps.store.save(&desire)?;

        self.deps.store.enqueue_approval(&ApprovalRequest {
            desire_id: id,
            title: desire.title.clone(),
            goal: plan.goal.clone(),
            plan_version: plan.version,
            estimated_risk: plan.estimated_risk,
            required_trust: plan.required_trust,
            queued_at: Utc::now(),
        })?;

        self.deps.store.append_scratchpad(
            id,
            ScratchpadEntry::new(
                EntryKind::Queued,
                "approval_queue",
                format!("plan version {} queued for human approval", plan.version),
            )
            .with_data(serde_json::json!({
                "plan_version": plan.version,
                "estimated_risk": plan.estimated_risk,
            })),
        )?;
        tracing::info!(desire_id = %id, "queued for approval");

        Ok(outputs(&[("desire_id", serde_json::json!(id.to_string()))]))
    }
}
