// desire.rs — Desire: a persisted autonomous goal and its lifecycle.
//
// A Desire moves through a fixed state machine:
//
//   Nascent → Planning → Reviewing → (AwaitingApproval →) Approved
//     → Executing → OutcomeReview → Completed
//   Reviewing/AwaitingApproval → Planning  (revision loop)
//   any active state → Failed               (stage errors land here)
//   any active state → Discarded            (explicit discard, never a delete)
//
// Reinforcement: detecting a near-duplicate of an existing desire bumps its
// strength (bounded) instead of creating a second record. Strength decays
// over time toward zero; a desire below its threshold is dormant, not dead.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use vol_policy::{RiskLevel, TrustLevel};

use crate::error::DesireError;
use crate::execution::DesireExecution;
use crate::plan::DesirePlan;

/// The lifecycle state of a desire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DesireStatus {
    /// Just detected/created — not yet planned.
    Nascent,
    /// A planner is producing (or revising) the plan.
    Planning,
    /// Safety and alignment reviewers are scoring the current plan.
    Reviewing,
    /// Queued for human sign-off.
    AwaitingApproval,
    /// Cleared to execute (auto-approved or human-approved).
    Approved { approved_by: String },
    /// The executor is driving plan steps.
    Executing,
    /// Final bookkeeping after execution.
    OutcomeReview,
    /// Terminal: the desire was satisfied.
    Completed,
    /// Terminal: a stage or step failed.
    Failed { reason: String },
    /// Terminal: explicitly discarded. The folder is retained for audit.
    Discarded,
}

impl fmt::Display for DesireStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DesireStatus::Nascent => write!(f, "nascent"),
            DesireStatus::Planning => write!(f, "planning"),
            DesireStatus::Reviewing => write!(f, "reviewing"),
            DesireStatus::AwaitingApproval => write!(f, "awaiting_approval"),
            DesireStatus::Approved { .. } => write!(f, "approved"),
            DesireStatus::Executing => write!(f, "executing"),
            DesireStatus::OutcomeReview => write!(f, "outcome_review"),
            DesireStatus::Completed => write!(f, "completed"),
            DesireStatus::Failed { .. } => write!(f, "failed"),
            DesireStatus::Discarded => write!(f, "discarded"),
        }
    }
}

impl DesireStatus {
    /// Whether this is a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DesireStatus::Completed | DesireStatus::Failed { .. } | DesireStatus::Discarded
        )
    }

    /// Check whether transitioning from this status to `next` is valid.
    pub fn can_transition_to(&self, next: &DesireStatus) -> bool {
        // Terminal states never transition again.
        if self.is_terminal() {
            return false;
        }
        // Any active state may fail or be explicitly discarded.
        if matches!(next, DesireStatus::Failed { .. } | DesireStatus::Discarded) {
            return true;
        }

        matches!(
            (self, next),
            (DesireStatus::Nascent, DesireStatus::Planning)
                | (DesireStatus::Planning, DesireStatus::Reviewing)
                | (DesireStatus::Reviewing, DesireStatus::AwaitingApproval)
                | (DesireStatus::Reviewing, DesireStatus::Approved { .. })
                // Revision loop: a critique sends the plan back to planning.
                | (DesireStatus::Reviewing, DesireStatus::Planning)
                | (DesireStatus::AwaitingApproval, DesireStatus::Approved { .. })
                | (DesireStatus::AwaitingApproval, DesireStatus::Planning)
                | (DesireStatus::Approved { .. }, DesireStatus::Executing)
                | (DesireStatus::Executing, DesireStatus::OutcomeReview)
                | (DesireStatus::OutcomeReview, DesireStatus::Completed)
        )
    }

    /// Whether execution may begin (or resume) in this status.
    pub fn may_execute(&self) -> bool {
        matches!(
            self,
            DesireStatus::Approved { .. } | DesireStatus::Executing
        )
    }
}

/// Where a desire came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DesireSource {
    /// The detector classified free-form input as a goal.
    Detected,
    /// Created by an equivalent direct call.
    Direct,
}

/// Attempt/success/failure counters plus per-stage iteration counts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct DesireMetrics {
    pub attempts: u32,
    pub successes: u32,
    pub failures: u32,
    /// How many times each stage has run for this desire (revision loops
    /// show up here).
    #[serde(default)]
    pub stage_iterations: BTreeMap<String, u32>,
}

impl DesireMetrics {
    /// Count one iteration of a stage.
    pub fn record_stage(&mut self, stage: &str) {
        *self.stage_iterations.entry(stage.to_string()).or_default() += 1;
    }
}

/// A persisted autonomous goal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Desire {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    /// Why the detector (or caller) believes this is a goal.
    pub reason: String,
    pub status: DesireStatus,
    pub source: DesireSource,

    // ── Reinforcement fields ──
    /// Current strength. Starts at `base_weight`, grows with reinforcement.
    pub strength: f64,
    pub base_weight: f64,
    /// Activation threshold — below it the desire is dormant.
    pub threshold: f64,
    /// Strength lost per day without reinforcement.
    pub decay_rate: f64,
    /// Number of reinforcements received.
    pub reinforcements: u32,

    pub risk: RiskLevel,
    pub required_trust: TrustLevel,

    /// Who approved the current plan: "auto", or a person's id. Survives
    /// the move into Executing, unlike the status payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_by: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<DesirePlan>,
    /// Superseded plan versions, oldest first. Never mutated.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub plan_history: Vec<DesirePlan>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution: Option<DesireExecution>,

    /// Sanitized description of the most recent stage error, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,

    #[serde(default)]
    pub metrics: DesireMetrics,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// When the desire was last reinforced, if ever.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_reinforced_at: Option<DateTime<Utc>>,
}

impl Desire {
    /// Create a new desire in the Nascent state.
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        reason: impl Into<String>,
        source: DesireSource,
        risk: RiskLevel,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            description: description.into(),
            reason: reason.into(),
            status: DesireStatus::Nascent,
            source,
            strength: 0.5,
            base_weight: 0.5,
            threshold: 0.3,
            decay_rate: 0.01,
            reinforcements: 0,
            risk,
            required_trust: risk.required_trust(),
            approved_by: None,
            plan: None,
            plan_history: Vec::new(),
            execution: None,
            last_error: None,
            metrics: DesireMetrics::default(),
            created_at: now,
            updated_at: now,
            last_reinforced_at: None,
        }
    }

    /// Transition to a new status. Errors on an invalid transition.
    pub fn transition(&mut self, next: DesireStatus) -> Result<(), DesireError> {
        if !self.status.can_transition_to(&next) {
            return Err(DesireError::InvalidTransition {
                desire_id: self.id,
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Strengthen this desire instead of duplicating it.
    ///
    /// The applied increase is capped at `max_increase` and total strength
    /// never exceeds 1.0 above the base weight.
    pub fn reinforce(&mut self, amount: f64, max_increase: f64) {
        let applied = amount.min(max_increase).max(0.0);
        let cap = self.base_weight + 1.0;
        self.strength = (self.strength + applied).min(cap);
        self.reinforcements += 1;
        let now = Utc::now();
        self.last_reinforced_at = Some(now);
        self.updated_at = now;
    }

    /// Strength after decay, as of `now`. Never below zero.
    pub fn effective_strength(&self, now: DateTime<Utc>) -> f64 {
        let reference = self.last_reinforced_at.unwrap_or(self.created_at);
        let days = (now - reference).num_seconds() as f64 / 86_400.0;
        (self.strength - self.decay_rate * days.max(0.0)).max(0.0)
    }

    /// Whether the desire is above its activation threshold.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.effective_strength(now) >= self.threshold
    }

    /// Install a new current plan, moving any existing one into history.
    ///
    /// Superseded versions are retained verbatim and never touched again.
    pub fn adopt_plan(&mut self, plan: DesirePlan) {
        if let Some(previous) = self.plan.take() {
            self.plan_history.push(previous);
        }
        self.required_trust = plan.required_trust;
        self.plan = Some(plan);
        self.updated_at = Utc::now();
    }
}
