// nodes/review.rs — Safety and alignment review of a plan.
//
// One handler, two registrations: the safety variant also enforces
// deterministic hard rules (spending cap, critical risk) before the model
// is even consulted. Review stages fail CLOSED: a reviewer model error or
// unparsable reply scores 0.0 / not approved instead of failing the run,
// so a flaky reviewer can only ever block, never wave through.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use vol_graph::{
    outputs, ExecutionContext, HandlerError, NodeDefinition, NodeHandler, NodeKind, NodeOutputs,
    SideEffects, SlotSpec,
};
use vol_policy::RiskLevel;
use vol_provider::{CallOptions, ChatMessage};

use crate::desire::DesireStatus;
use crate::plan::DesirePlan;
use crate::scratchpad::{EntryKind, ScratchpadEntry};

use super::{parse_structured, NodeDeps};

const SAFETY_PROMPT: &str = "You review a plan for safety: irreversible actions, spending, \
contacting third parties, data exposure. Reply with JSON: {\"score\": 0.0-1.0, \
\"approved\": bool, \"risks\": [string], \"mitigations\": [string], \"reasoning\": string}. \
Score 1.0 means clearly safe.";

const ALIGNMENT_PROMPT: &str = "You review whether a plan actually serves the stated goal and \
the user's interests, without scope creep. Reply with JSON: {\"score\": 0.0-1.0, \
\"approved\": bool, \"risks\": [string], \"mitigations\": [string], \"reasoning\": string}. \
Score 1.0 means clearly aligned.";

/// A reviewer's verdict over one plan version.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReviewOutput {
    pub score: f64,
    pub approved: bool,
    #[serde(default)]
    pub risks: Vec<String>,
    #[serde(default)]
    pub mitigations: Vec<String>,
    #[serde(default)]
    pub reasoning: String,
}

impl ReviewOutput {
    /// The fail-closed verdict used when a reviewer cannot produce one.
    fn rejected(reasoning: impl Into<String>) -> Self {
        Self {
            score: 0.0,
            approved: false,
            risks: Vec::new(),
            mitigations: Vec::new(),
            reasoning: reasoning.into(),
        }
    }
}

pub struct ReviewHandler {
    deps: NodeDeps,
    definition: NodeDefinition,
    role: &'static str,
    prompt: &'static str,
}

impl ReviewHandler {
    pub fn safety(deps: NodeDeps) -> Self {
        Self::build(deps, NodeKind::SafetyReview, "safety_reviewer", SAFETY_PROMPT)
    }

    pub fn alignment(deps: NodeDeps) -> Self {
        Self::build(
            deps,
            NodeKind::AlignmentReview,
            "alignment_reviewer",
            ALIGNMENT_PROMPT,
        )
    }

    fn build(deps: NodeDeps, kind: NodeKind, role: &'static str, prompt: &'static str) -> Self {
        Self {
            deps,
            definition: NodeDefinition {
                kind,
                category: "lifecycle".to_string(),
                description: format!("Scores the current plan ({role})"),
                inputs: vec![
                    SlotSpec::required("desire_id", "the desire under review"),
                    SlotSpec::required("plan", "the plan version to score"),
                ],
                outputs: vec![
                    SlotSpec::required("desire_id", "the same desire id, passed through"),
                    SlotSpec::required("review", "the reviewer's verdict"),
                ],
                properties: vec![],
                routing: false,
            },
            role,
            prompt,
        }
    }

    /// Deterministic rules the safety reviewer enforces before the model.
    /// Returns a rejection verdict when a rule trips.
    fn hard_rules(&self, plan: &DesirePlan) -> Option<ReviewOutput> {
        if self.definition.kind != NodeKind::SafetyReview {
            return None;
        }

        if plan.estimated_risk == RiskLevel::Critical {
            return Some(ReviewOutput::rejected(
                "plan contains a critical-risk step; critical plans are never approved",
            ));
        }

        let cap = self.deps.config.limits.financial_cap_usd;
        let total_usd: f64 = plan
            .steps
            .iter()
            .filter_map(|s| s.inputs.get("cost_usd").and_then(|v| v.as_f64()))
            .sum();
        if total_usd > cap {
            return Some(ReviewOutput::rejected(format!(
                "plan commits to ${total_usd:.2}, over the ${cap:.2} cap"
            )));
        }

        None
    }
}

#[async_trait]
impl NodeHandler for ReviewHandler {
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
        let plan: DesirePlan = serde_json::from_value(inputs[1].clone())?;

        let mut desire = self.deps.store.load(id)?;
        if desire.status == DesireStatus::Planning {
            desire.transition(DesireStatus::Reviewing)?;
            self.deps.store.save(&desire)?;
        }
        desire.metrics.record_stage(&self.definition.kind.to_string());

        let review = if let Some(rejection) = self.hard_rules(&plan) {
            tracing::warn!(desire_id = %id, reason = %rejection.reasoning, "hard rule rejection");
            rejection
        } else {
            let prompt = format!(
                "Goal: {}\nPlan (version {}): {}",
                plan.goal,
                plan.version,
                serde_json::to_string(&plan)?
            );
            let messages = vec![ChatMessage::system(self.prompt), ChatMessage::user(prompt)];
            let verdict = match self
                .deps
                .model
                .call(self.role, &messages, ctx.mode, &CallOptions::structured(1024))
                .await
            {
                Ok(response) => match parse_structured::<ReviewOutput>(&response.content) {
                    Ok(verdict) => verdict,
                    Err(err) => {
                        tracing::warn!(desire_id = %id, error = %err, "reviewer reply unparsable; failing closed");
                        ReviewOutput::rejected("reviewer reply was unparsable")
                    }
                },
                Err(err) => {
                    tracing::warn!(desire_id = %id, error = %err, "reviewer call failed; failing closed");
                    ReviewOutput::rejected("reviewer unavailable")
                }
            };
            verdict
        };

        let review_value = serde_json::to_value(&review)?;
        self.deps.store.save(&desire)?;
        self.deps.store.append_scratchpad(
            id,
            ScratchpadEntry::new(
                EntryKind::ReviewRecorded,
                self.role,
                format!(
                    "score {:.2}, {}",
                    review.score,
                    if review.approved { "approved" } else { "not approved" }
                ),
            )
            .with_data(review_value.clone()),
        )?;

        Ok(outputs(&[
            ("desire_id", serde_json::json!(id.to_string())),
            ("review", review_value),
        ]))
    }
}
