// nodes/verdict.rs — Verdict: combine reviews and decide the path.
//
// Routing node. Emits exactly one of:
//   approved — auto-approval granted; execution may proceed
//   queued   — a human must sign off first
//
// The combined score is the MINIMUM of the two review scores: both
// reviewers must clear the bar. Auto-approval additionally requires
// autonomous mode, both reviewers' approval, and plan risk at or below
// the configured ceiling. Everything else queues.

use async_trait::async_trait;
use uuid::Uuid;

use vol_graph::{
    outputs, ExecutionContext, HandlerError, NodeDefinition, NodeHandler, NodeKind, NodeOutputs,
    SideEffects, SlotSpec,
};
use vol_policy::OperatingMode;

use crate::desire::DesireStatus;
use crate::scratchpad::{EntryKind, ScratchpadEntry};

use super::{ReviewOutput, NodeDeps};

pub struct VerdictHandler {
    deps: NodeDeps,
    definition: NodeDefinition,
}

impl VerdictHandler {
    pub fn new(deps: NodeDeps) -> Self {
        Self {
            deps,
            definition: NodeDefinition {
                kind: NodeKind::Verdict,
                category: "lifecycle".to_string(),
                description: "Combines review scores and routes to auto-approval or the queue"
                    .to_string(),
                inputs: vec![
                    SlotSpec::required("desire_id", "the desire under decision"),
                    SlotSpec::required("safety_review", "the safety reviewer's verdict"),
                    SlotSpec::required("alignment_review", "the alignment reviewer's verdict"),
                ],
                outputs: vec![
                    SlotSpec::optional("approved", "desire id, when auto-approved"),
                    SlotSpec::optional("queued", "desire id, when queued for a human"),
                ],
                properties: vec![],
                routing: true,
            },
        }
    }
}

#[async_trait]
impl NodeHandler for VerdictHandler {
    fn definition(&self) -> &NodeDefinition {
        &self.definition
    }

    fn side_effects(&self) -> SideEffects {
        SideEffects::Repeatable
    }

    async fn run(
        &self,
        inputs: &[serde_json::Value],
        ctx: &ExecutionContext,
        _properties: &serde_json::Value,
    ) -> Result<NodeOutputs, HandlerError> {
        let id: Uuid = inputs[0].as_str().unwrap_or_default().parse()?;
        let safety: ReviewOutput = serde_json::from_value(inputs[1].clone())?;
        let alignment: ReviewOutput = serde_json::from_value(inputs[2].clone())?;

        let mut desire = self.deps.store.load(id)?;
        let combined = safety.score.min(alignment.score);
        let risk_ok = desire
            .plan
            .as_ref()
            .map(|p| p.estimated_risk <= self.deps.config.approval.auto_approve_max_risk)
            .unwrap_or(false);

        let auto_approve = ctx.mode == OperatingMode::Autonomous
            && safety.approved
            && alignment.approved
            && combined >= self.deps.config.approval.auto_approve_min_score
            && risk_ok;

        let decision_data = serde_json::json!({
            "combined_score": combined,
            "safety_score": safety.score,
            "alignment_score": alignment.score,
            "mode": ctx.mode,
            "auto_approved": auto_approve,
        });

        if auto_approve {
            desire.transition(DesireStatus::Approved {
                approved_by: "auto".to_string(),
            })?;
            desire.approved_by = Some("auto".to_string());
            self.deps.store.save(&desire)?;
            self.deps.store.append_scratchpad(
                id,
                ScratchpadEntry::new(
                    EntryKind::Approved,
                    "verdict",
                    format!("auto-approved (combined score {combined:.2})"),
                )
                .with_data(decision_data),
            )?;
            tracing::info!(desire_id = %id, combined, "auto-approved");
            return Ok(outputs(&[("approved", serde_json::json!(id.to_string()))]));
        }

        tracing::info!(desire_id = %id, combined, "queueing for human approval");
        self.deps.store.append_scratchpad(
            id,
            ScratchpadEntry::new(
                EntryKind::Note,
                "verdict",
                format!("not auto-approved (combined score {combined:.2}); queueing"),
            )
            .with_data(decision_data),
        )?;

        Ok(outputs(&[("queued", serde_json::json!(id.to_string()))]))
    }
}
