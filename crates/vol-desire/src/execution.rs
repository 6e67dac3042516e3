// execution.rs — Per-attempt execution records.
//
// One DesireExecution exists per execution attempt. Step results are
// append-only: once recorded, a StepResult is never edited or removed,
// so a halted or cancelled attempt leaves a faithful audit trail.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The status of one execution attempt.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    InProgress,
    Completed,
    /// A step failed; execution halted fail-fast, no rollback.
    Failed,
    /// Cancellation was observed mid-attempt — distinct from failure.
    Cancelled,
}

/// The immutable record of one attempted step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepResult {
    /// The plan step's declared order.
    pub order: u32,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub completed_at: DateTime<Utc>,
}

impl StepResult {
    pub fn success(order: u32, result: serde_json::Value) -> Self {
        Self {
            order,
            success: true,
            result: Some(result),
            error: None,
            completed_at: Utc::now(),
        }
    }

    pub fn failure(order: u32, error: impl Into<String>) -> Self {
        Self {
            order,
            success: false,
            result: None,
            error: Some(error.into()),
            completed_at: Utc::now(),
        }
    }
}

/// One execution attempt over a plan.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DesireExecution {
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub status: ExecutionStatus,
    /// Count of steps that succeeded.
    pub steps_completed: u32,
    pub steps_total: u32,
    /// The step currently running, while in progress.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_step: Option<u32>,
    /// Append-only: one entry per attempted step, in attempt order.
    pub step_results: Vec<StepResult>,
}

impl DesireExecution {
    /// Start a fresh attempt over `steps_total` steps.
    pub fn start(steps_total: u32) -> Self {
        Self {
            started_at: Utc::now(),
            completed_at: None,
            status: ExecutionStatus::InProgress,
            steps_completed: 0,
            steps_total,
            current_step: None,
            step_results: Vec::new(),
        }
    }

    /// Append a step result. Counters update; prior entries never change.
    pub fn record(&mut self, result: StepResult) {
        if result.success {
            self.steps_completed += 1;
        }
        self.step_results.push(result);
    }

    /// Mark the attempt finished with the given terminal status.
    pub fn finish(&mut self, status: ExecutionStatus) {
        self.status = status;
        self.current_step = None;
        self.completed_at = Some(Utc::now());
    }
}
