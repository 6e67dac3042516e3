// nodes/execute.rs — Executor: drive plan steps through the operator.
//
// Routing node with two outputs:
//   finished — the attempt ran to a terminal status (completed or failed)
//   halted   — cancellation was observed; the desire stays resumable
//
// Rules this handler lives by:
//   * Execution only begins with an approved (or already executing) desire.
//   * Every step passes the policy gate before the operator sees it.
//   * Steps run strictly in ascending order, one operator call each.
//   * First failure halts the attempt. No rollback, no auto-retry —
//     operator side effects are not safely repeatable.
//   * A step completed in a previous attempt is never re-run.
//   * Cancellation between steps, or while a step is in flight, records
//     NO result for the interrupted step and leaves the desire Executing.

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use vol_graph::{
    outputs, ExecutionContext, HandlerError, NodeDefinition, NodeHandler, NodeKind, NodeOutputs,
    SideEffects, SlotSpec,
};
use vol_policy::{PolicyGate, StepCheck};

use crate::desire::DesireStatus;
use crate::error::DesireError;
use crate::execution::{DesireExecution, ExecutionStatus, StepResult};
use crate::scratchpad::{EntryKind, ScratchpadEntry};

use super::NodeDeps;

pub struct ExecuteHandler {
    deps: NodeDeps,
    definition: NodeDefinition,
}

impl ExecuteHandler {
    pub fn new(deps: NodeDeps) -> Self {
        Self {
            deps,
            definition: NodeDefinition {
                kind: NodeKind::Executor,
                category: "lifecycle".to_string(),
                description: "Executes approved plan steps through the operator".to_string(),
                inputs: vec![SlotSpec::required("desire_id", "the approved desire to execute")],
                outputs: vec![
                    SlotSpec::optional("finished", "attempt summary when execution terminated"),
                    SlotSpec::optional("halted", "attempt summary when cancellation interrupted"),
                ],
                properties: vec![],
                routing: true,
            },
        }
    }
}

#[async_trait]
impl NodeHandler for ExecuteHandler {
    fn definition(&self) -> &NodeDefinition {
        &self.definition
    }

    fn side_effects(&self) -> SideEffects {
        SideEffects::NotRepeatable
    }

    async fn run(
        &self,
        inputs: &[serde_json::Value],
        ctx: &ExecutionContext,
        _properties: &serde_json::Value,
    ) -> Result<NodeOutputs, HandlerError> {
        let id: Uuid = inputs[0].as_str().unwrap_or_default().parse()?;
        let mut desire = self.deps.store.load(id)?;

        if !desire.status.may_execute() {
            return Err(DesireError::WrongStatus {
                desire_id: id,
                status: desire.status.to_string(),
                message: "execution requires an approved or executing desire".to_string(),
            }
            .into());
        }
        let plan = desire.plan.clone().ok_or_else(|| DesireError::WrongStatus {
            desire_id: id,
            status: desire.status.to_string(),
            message: "cannot execute a desire with no plan".to_string(),
        })?;

        // Pre-flight gate: autonomy and trust are checked once for the whole
        // plan, before any state change and before any operator call.
        let flags = PolicyGate::resolve(ctx.mode, ctx.caller.role, ctx.caller.is_admin);
        flags.assert_autonomy()?;
        flags.assert_trust_at_least(plan.required_trust)?;

        if matches!(desire.status, DesireStatus::Approved { .. }) {
            desire.transition(DesireStatus::Executing)?;
        }
        desire.metrics.record_stage("executing");

        let human_approved = desire.approved_by.as_deref().is_some_and(|by| by != "auto");

        // Steps that succeeded in earlier attempts are never re-run.
        let completed_before: BTreeSet<u32> = self
            .deps
            .store
            .load_executions(id)?
            .iter()
            .flat_map(|attempt| attempt.step_results.iter())
            .filter(|result| result.success)
            .map(|result| result.order)
            .collect();

        let attempt = self.deps.store.next_attempt_number(id)?;
        let mut execution = DesireExecution::start(plan.step_count());
        execution.steps_completed = completed_before.len() as u32;

        self.deps.store.save(&desire)?;
        self.deps.store.append_scratchpad(
            id,
            ScratchpadEntry::new(
                EntryKind::ExecutionStarted,
                "executor",
                format!("attempt {attempt} started ({} steps)", plan.step_count()),
            )
            .with_data(serde_json::json!({
                "attempt": attempt,
                "resumed_past": completed_before,
            })),
        )?;

        let step_timeout = Duration::from_secs(self.deps.config.execution.step_timeout_secs);
        let mut cancelled = false;
        let mut failure: Option<String> = None;

        for step in &plan.steps {
            if completed_before.contains(&step.order) {
                continue;
            }
            if ctx.cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            execution.current_step = Some(step.order);

            if let Err(violation) = flags.check_step(&StepCheck {
                order: step.order,
                capability: &step.capability,
                requires_approval: step.requires_approval,
                human_approved,
            }) {
                execution.record(StepResult::failure(step.order, violation.to_string()));
                failure = Some(violation.to_string());
                break;
            }

            let step_context = serde_json::json!({
                "goal": plan.goal,
                "inputs": step.inputs,
                "expected_outcome": step.expected_outcome,
            });

            // Cancellation beats the step future; an interrupted step
            // records no result at all.
            let outcome = tokio::select! {
                biased;
                _ = ctx.cancel.cancelled() => {
                    cancelled = true;
                    break;
                }
                result = tokio::time::timeout(
                    step_timeout,
                    self.deps.operator.execute_step(&step.action, &step_context, &flags),
                ) => result,
            };

            match outcome {
                Err(_elapsed) => {
                    let message =
                        format!("step timed out after {}s", step_timeout.as_secs());
                    execution.record(StepResult::failure(step.order, message.clone()));
                    failure = Some(message);
                    break;
                }
                Ok(Err(err)) => {
                    execution.record(StepResult::failure(step.order, err.to_string()));
                    failure = Some(err.to_string());
                    break;
                }
                Ok(Ok(result)) if result.success => {
                    execution.record(StepResult::success(
                        step.order,
                        result.result.unwrap_or(serde_json::Value::Null),
                    ));
                    self.deps.store.save_execution(id, attempt, &execution)?;
                    self.deps.store.append_scratchpad(
                        id,
                        ScratchpadEntry::new(
                            EntryKind::StepCompleted,
                            "executor",
                            format!("step {} completed", step.order),
                        ),
                    )?;
                }
                Ok(Ok(result)) => {
                    let message = result
                        .error
                        .unwrap_or_else(|| "step reported failure".to_string());
                    execution.record(StepResult::failure(step.order, message.clone()));
                    failure = Some(message);
                    break;
                }
            }
        }

        if cancelled {
            execution.finish(ExecutionStatus::Cancelled);
            self.deps.store.save_execution(id, attempt, &execution)?;
            desire.execution = Some(execution.clone());
            // Status stays Executing: the desire is resumable.
            self.deps.store.save(&desire)?;
            self.deps.store.append_scratchpad(
                id,
                ScratchpadEntry::new(
                    EntryKind::ExecutionFinished,
                    "executor",
                    format!("attempt {attempt} cancelled"),
                )
                .with_data(serde_json::json!({"attempt": attempt, "status": "cancelled"})),
            )?;
            tracing::info!(desire_id = %id, attempt, "execution cancelled");
            return Ok(outputs(&[(
                "halted",
                serde_json::json!({"desire_id": id.to_string(), "attempt": attempt}),
            )]));
        }

        let status = if failure.is_some() {
            ExecutionStatus::Failed
        } else {
            ExecutionStatus::Completed
        };
        execution.finish(status);
        self.deps.store.save_execution(id, attempt, &execution)?;

        desire.execution = Some(execution);
        desire.last_error = failure.clone();
        desire.transition(DesireStatus::OutcomeReview)?;
        self.deps.store.save(&desire)?;
        self.deps.store.append_scratchpad(
            id,
            ScratchpadEntry::new(
                EntryKind::ExecutionFinished,
                "executor",
                match &failure {
                    Some(message) => format!("attempt {attempt} failed: {message}"),
                    None => format!("attempt {attempt} completed"),
                },
            )
            .with_data(serde_json::json!({"attempt": attempt, "status": status})),
        )?;
        tracing::info!(desire_id = %id, attempt, ?status, "execution finished");

        Ok(outputs(&[(
            "finished",
            serde_json::json!({
                "desire_id": id.to_string(),
                "attempt": attempt,
                "status": status,
            }),
        )]))
    }
}
