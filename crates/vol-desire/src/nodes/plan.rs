// nodes/plan.rs — Planner: produce or revise a desire's plan.
//
// A revision is requested by putting "critique" in the run's aux package;
// the new plan version records that critique and the old version moves to
// plan_history. Planner model failures are fatal to the run — there is no
// sensible fail-closed plan.

use async_trait::async_trait;
use serde::Deserialize;
use uuid::Uuid;

use vol_graph::{
    outputs, ExecutionContext, HandlerError, NodeDefinition, NodeHandler, NodeKind, NodeOutputs,
    SideEffects, SlotSpec,
};
use vol_policy::RiskLevel;
use vol_provider::{CallOptions, ChatMessage};

use crate::desire::DesireStatus;
use crate::error::DesireError;
use crate::plan::{DesirePlan, PlanStep};
use crate::scratchpad::{EntryKind, ScratchpadEntry};

use super::{parse_structured, NodeDeps};

const PLANNER_PROMPT: &str = "You plan how to satisfy the user's goal. Reply with JSON: \
{\"goal\": string, \"steps\": [{\"order\": int starting at 1, \"action\": string, \
\"capability\": string like \"research.web_search\", \"inputs\": object, \
\"expected_outcome\": string, \"risk\": \"none\"|\"low\"|\"medium\"|\"high\"|\"critical\", \
\"requires_approval\": bool}]}. Prefer few, concrete steps. Mark any step that spends \
money or contacts third parties as requiring approval.";

#[derive(Debug, Deserialize)]
struct PlanStepOutput {
    order: u32,
    action: String,
    capability: String,
    #[serde(default)]
    inputs: serde_json::Value,
    #[serde(default)]
    expected_outcome: String,
    risk: RiskLevel,
    #[serde(default)]
    requires_approval: bool,
}

#[derive(Debug, Deserialize)]
struct PlanOutput {
    goal: String,
    steps: Vec<PlanStepOutput>,
}

pub struct PlanHandler {
    deps: NodeDeps,
    definition: NodeDefinition,
}

impl PlanHandler {
    pub fn new(deps: NodeDeps) -> Self {
        Self {
            deps,
            definition: NodeDefinition {
                kind: NodeKind::Planner,
                category: "lifecycle".to_string(),
                description: "Produces or revises the ordered plan for a desire".to_string(),
                inputs: vec![
                    SlotSpec::required("desire_id", "the desire to plan for"),
                    SlotSpec::optional("context", "memory context from enrichment"),
                ],
                outputs: vec![
                    SlotSpec::required("desire_id", "the same desire id, passed through"),
                    SlotSpec::required("plan", "the adopted plan"),
                ],
                properties: vec![],
                routing: false,
            },
        }
    }
}

#[async_trait]
impl NodeHandler for PlanHandler {
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
        let context = inputs.get(1).cloned().unwrap_or(serde_json::Value::Null);
        let critique = ctx.aux.get("critique").and_then(|c| c.as_str());

        let mut desire = self.deps.store.load(id)?;
        match desire.status {
            DesireStatus::Nascent => desire.transition(DesireStatus::Planning)?,
            DesireStatus::Planning => {}
            ref status => {
                return Err(DesireError::WrongStatus {
                    desire_id: id,
                    status: status.to_string(),
                    message: "planning requires a nascent or planning desire".to_string(),
                }
                .into())
            }
        }
        desire.metrics.record_stage("planning");

        let mut prompt = format!(
            "Goal: {}\nDetails: {}\nWhy it was adopted: {}",
            desire.title, desire.description, desire.reason
        );
        if !context.is_null() {
            prompt.push_str(&format!("\nRelevant memory: {context}"));
        }
        if let (Some(critique), Some(current)) = (critique, &desire.plan) {
            prompt.push_str(&format!(
                "\nA previous plan (version {}) was criticised: {critique}\nPrevious plan: {}",
                current.version,
                serde_json::to_string(current)?
            ));
        }

        let messages = vec![ChatMessage::system(PLANNER_PROMPT), ChatMessage::user(prompt)];
        let response = self
            .deps
            .model
            .call("planner", &messages, ctx.mode, &CallOptions::structured(2048))
            .await?;
        let parsed: PlanOutput = parse_structured(&response.content)?;

        let steps: Vec<PlanStep> = parsed
            .steps
            .into_iter()
            .map(|s| PlanStep {
                order: s.order,
                action: s.action,
                capability: s.capability,
                inputs: s.inputs,
                expected_outcome: s.expected_outcome,
                risk: s.risk,
                requires_approval: s.requires_approval,
            })
            .collect();

        let plan = match (&desire.plan, critique) {
            (Some(current), Some(critique)) => current.revision(parsed.goal, steps, critique)?,
            (Some(current), None) => current.revision(parsed.goal, steps, "replanned")?,
            (None, _) => DesirePlan::new(parsed.goal, steps)?,
        };

        let plan_value = serde_json::to_value(&plan)?;
        self.deps.store.append_scratchpad(
            id,
            ScratchpadEntry::new(
                EntryKind::PlanAdopted,
                "planner",
                format!("adopted plan version {} ({} steps)", plan.version, plan.step_count()),
            )
            .with_data(serde_json::json!({
                "version": plan.version,
                "steps": plan.step_count(),
                "estimated_risk": plan.estimated_risk,
                "critique": critique,
            })),
        )?;

        desire.adopt_plan(plan);
        self.deps.store.save(&desire)?;
        tracing::info!(desire_id = %id, "plan adopted");

        Ok(outputs(&[
            ("desire_id", serde_json::json!(id.to_string())),
            ("plan", plan_value),
        ]))
    }
}
