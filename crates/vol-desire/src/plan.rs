// plan.rs — DesirePlan: an ordered, risk-annotated sequence of steps.
//
// Exactly one plan is current per desire; superseded versions move into
// the desire's plan_history and are never mutated again. Revisions carry
// the human critique that prompted them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use vol_policy::{RiskLevel, TrustLevel};

use crate::error::DesireError;

/// One step in a plan.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlanStep {
    /// Execution order, 1-based, strictly ascending within a plan.
    pub order: u32,
    /// What to do, phrased for the operator.
    pub action: String,
    /// The capability ("skill") the step targets, e.g. "research.web_search".
    pub capability: String,
    /// Inputs the operator needs for this step.
    #[serde(default)]
    pub inputs: serde_json::Value,
    /// What success looks like.
    pub expected_outcome: String,
    pub risk: RiskLevel,
    /// Whether this step needs explicit human approval before it runs.
    pub requires_approval: bool,
}

/// An ordered plan proposed to satisfy a desire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DesirePlan {
    pub id: Uuid,
    /// Monotonic version, starting at 1. Each revision increments by one.
    pub version: u32,
    pub steps: Vec<PlanStep>,
    /// Aggregate risk — the maximum over step risks.
    pub estimated_risk: RiskLevel,
    /// Distinct capabilities the plan needs.
    pub required_capabilities: Vec<String>,
    /// Trust tier required to execute — derived from `estimated_risk`.
    pub required_trust: TrustLevel,
    /// Single-sentence statement of what executing this plan achieves.
    pub goal: String,
    /// The human critique that prompted this revision, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision_critique: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl DesirePlan {
    /// Build version 1 of a plan from its steps.
    ///
    /// Aggregate risk, required capabilities, and required trust are all
    /// derived here so they can't drift from the steps.
    pub fn new(goal: impl Into<String>, steps: Vec<PlanStep>) -> Result<Self, DesireError> {
        Self::build(goal, steps, 1, None)
    }

    /// Build the next version of this plan from revised steps and the
    /// critique that prompted the revision.
    pub fn revision(
        &self,
        goal: impl Into<String>,
        steps: Vec<PlanStep>,
        critique: impl Into<String>,
    ) -> Result<Self, DesireError> {
        Self::build(goal, steps, self.version + 1, Some(critique.into()))
    }

    fn build(
        goal: impl Into<String>,
        steps: Vec<PlanStep>,
        version: u32,
        revision_critique: Option<String>,
    ) -> Result<Self, DesireError> {
        if steps.is_empty() {
            return Err(DesireError::InvalidPlan("plan has no steps".to_string()));
        }
        for pair in steps.windows(2) {
            if pair[1].order <= pair[0].order {
                return Err(DesireError::InvalidPlan(format!(
                    "step orders must be strictly ascending ({} then {})",
                    pair[0].order, pair[1].order
                )));
            }
        }

        let estimated_risk = steps
            .iter()
            .map(|s| s.risk)
            .max()
            .unwrap_or(RiskLevel::None);

        let mut required_capabilities: Vec<String> =
            steps.iter().map(|s| s.capability.clone()).collect();
        required_capabilities.sort();
        required_capabilities.dedup();

        Ok(Self {
            id: Uuid::new_v4(),
            version,
            steps,
            estimated_risk,
            required_capabilities,
            required_trust: estimated_risk.required_trust(),
            goal: goal.into(),
            revision_critique,
            created_at: Utc::now(),
        })
    }

    /// Total number of steps.
    pub fn step_count(&self) -> u32 {
        self.steps.len() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn step(order: u32, risk: RiskLevel) -> PlanStep {
        PlanStep {
            order,
            action: format!("do thing {order}"),
            capability: "research.web_search".to_string(),
            inputs: serde_json::json!({}),
            expected_outcome: "thing done".to_string(),
            risk,
            requires_approval: false,
        }
    }

    #[test]
    fn new_plan_derives_aggregates() {
        let plan = DesirePlan::new(
            "learn italian basics",
            vec![
                step(1, RiskLevel::Low),
                step(2, RiskLevel::Medium),
                step(3, RiskLevel::Low),
            ],
        )
        .unwrap();

        assert_eq!(plan.version, 1);
        assert_eq!(plan.estimated_risk, RiskLevel::Medium);
        assert_eq!(plan.required_trust, TrustLevel::Supervised);
        assert_eq!(plan.required_capabilities, vec!["research.web_search"]);
        assert!(plan.revision_critique.is_none());
    }

    #[test]
    fn empty_plan_rejected() {
        let result = DesirePlan::new("nothing", vec![]);
        assert!(matches!(result, Err(DesireError::InvalidPlan(_))));
    }

    #[test]
    fn out_of_order_steps_rejected() {
        let result = DesirePlan::new(
            "bad order",
            vec![step(2, RiskLevel::Low), step(1, RiskLevel::Low)],
        );
        assert!(matches!(result, Err(DesireError::InvalidPlan(_))));
    }

    #[test]
    fn duplicate_order_rejected() {
        let result = DesirePlan::new(
            "dup order",
            vec![step(1, RiskLevel::Low), step(1, RiskLevel::Low)],
        );
        assert!(matches!(result, Err(DesireError::InvalidPlan(_))));
    }

    #[test]
    fn revision_increments_version_and_keeps_critique() {
        let v1 = DesirePlan::new("goal", vec![step(1, RiskLevel::Low)]).unwrap();
        let v2 = v1
            .revision("refined goal", vec![step(1, RiskLevel::Low)], "too vague")
            .unwrap();

        assert_eq!(v2.version, 2);
        assert_eq!(v2.revision_critique.as_deref(), Some("too vague"));
        assert_ne!(v1.id, v2.id);
    }

    #[test]
    fn high_risk_plan_requires_bounded_trust() {
        let plan = DesirePlan::new("risky", vec![step(1, RiskLevel::Critical)]).unwrap();
        assert_eq!(plan.required_trust, TrustLevel::Bounded);
    }

    #[test]
    fn serialization_round_trip() {
        let plan = DesirePlan::new("goal", vec![step(1, RiskLevel::Low)]).unwrap();
        let json = serde_json::to_string(&plan).unwrap();
        let restored: DesirePlan = serde_json::from_str(&json).unwrap();
        assert_eq!(plan, restored);
    }
}
