// lifecycle_flow.rs — End-to-end lifecycle tests over scripted providers.
//
// Every test drives the real store, graphs, and policy gate; only the
// model, operator, and memory are scripted.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use vol_graph::{CallerIdentity, ExecutionContext, NodeHandler};
use vol_policy::{Capabilities, OperatingMode, RiskLevel, Role};
use vol_provider::{
    MockOperator, Operator, ProviderError, ScriptedModel, StaticMemory, StepOutcome,
};

use vol_desire::nodes::{ExecuteHandler, NodeDeps, OutcomeHandler};
use vol_desire::{
    Desire, DesireConfig, DesirePlan, DesireRuntime, DesireSource, DesireStatus, DesireStore,
    ExecutionStatus, PlanStep,
};

// ── Fixtures ──

fn user() -> CallerIdentity {
    CallerIdentity::new("u1", "alex", Role::User)
}

fn admin() -> CallerIdentity {
    CallerIdentity::new("a1", "root", Role::Admin)
}

fn detect_reply(title: &str, description: &str, confidence: f64) -> String {
    serde_json::json!({
        "is_goal": true,
        "confidence": confidence,
        "title": title,
        "description": description,
        "reason": "the user expressed this as a goal",
        "risk": "low",
    })
    .to_string()
}

fn plan_reply(steps: usize, capability: &str) -> String {
    let steps: Vec<serde_json::Value> = (1..=steps)
        .map(|n| {
            serde_json::json!({
                "order": n,
                "action": format!("step {n}"),
                "capability": capability,
                "inputs": {},
                "expected_outcome": format!("step {n} done"),
                "risk": "low",
                "requires_approval": false,
            })
        })
        .collect();
    serde_json::json!({ "goal": "satisfy the desire", "steps": steps }).to_string()
}

fn review_reply(score: f64, approved: bool) -> String {
    serde_json::json!({
        "score": score,
        "approved": approved,
        "risks": [],
        "mitigations": [],
        "reasoning": "scripted",
    })
    .to_string()
}

struct Harness {
    _dir: tempfile::TempDir,
    store: Arc<DesireStore>,
    model: Arc<ScriptedModel>,
    operator: Arc<MockOperator>,
    runtime: DesireRuntime,
}

fn harness(mode: OperatingMode, replies: &[&str], operator: MockOperator) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(DesireStore::new(dir.path().join("desires")).unwrap());
    let model = Arc::new(ScriptedModel::with_content(replies));
    let operator = Arc::new(operator);

    let runtime = DesireRuntime::new(
        store.clone(),
        model.clone(),
        operator.clone(),
        Arc::new(StaticMemory::empty()),
        DesireConfig::default(),
        mode,
    );

    Harness {
        _dir: dir,
        store,
        model,
        operator,
        runtime,
    }
}

fn plan_step(order: u32, capability: &str) -> PlanStep {
    PlanStep {
        order,
        action: format!("step {order}"),
        capability: capability.to_string(),
        inputs: serde_json::json!({}),
        expected_outcome: format!("step {order} done"),
        risk: RiskLevel::Low,
        requires_approval: false,
    }
}

/// A desire parked at AwaitingApproval with a plan over `steps` steps.
fn awaiting_desire(store: &DesireStore, capability: &str, steps: u32) -> Desire {
    let mut desire = Desire::new(
        "Learn Italian",
        "work toward conversational Italian",
        "test fixture",
        DesireSource::Detected,
        RiskLevel::Low,
    );
    let plan = DesirePlan::new(
        "learn italian basics",
        (1..=steps).map(|n| plan_step(n, capability)).collect(),
    )
    .unwrap();
    desire.adopt_plan(plan);
    desire.transition(DesireStatus::Planning).unwrap();
    desire.transition(DesireStatus::Reviewing).unwrap();
    desire.transition(DesireStatus::AwaitingApproval).unwrap();
    store.create(&desire).unwrap();
    desire
}

/// An approved desire ready for execution.
fn approved_desire(store: &DesireStore, capability: &str, steps: u32, approver: &str) -> Desire {
    let mut desire = awaiting_desire(store, capability, steps);
    desire
        .transition(DesireStatus::Approved {
            approved_by: approver.to_string(),
        })
        .unwrap();
    desire.approved_by = Some(approver.to_string());
    store.save(&desire).unwrap();
    desire
}

// ── Full pipeline ──

#[tokio::test]
async fn autonomous_flow_completes_end_to_end() {
    let h = harness(
        OperatingMode::Autonomous,
        &[
            &detect_reply("Learn Italian", "conversational italian", 0.9),
            &plan_reply(2, "research.web_search"),
            &review_reply(0.9, true),
            &review_reply(0.8, true),
        ],
        MockOperator::new(),
    );

    let report = h
        .runtime
        .handle_input("s1", user(), "I really want to learn Italian")
        .await
        .unwrap();

    assert_eq!(report.outcome, "completed");
    let id = report.desire_id.expect("desire id in report");

    let desire = h.store.load(id).unwrap();
    assert_eq!(desire.status, DesireStatus::Completed);
    assert_eq!(desire.approved_by.as_deref(), Some("auto"));
    assert_eq!(desire.metrics.attempts, 1);
    assert_eq!(desire.metrics.successes, 1);
    assert_eq!(desire.metrics.failures, 0);

    // One model call per reasoning stage, in pipeline order.
    assert_eq!(
        h.model.call_roles(),
        vec!["detector", "planner", "safety_reviewer", "alignment_reviewer"]
    );
    // One operator call per plan step.
    assert_eq!(h.operator.call_count(), 2);

    let attempts = h.store.load_executions(id).unwrap();
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].status, ExecutionStatus::Completed);
    assert_eq!(attempts[0].steps_completed, 2);

    // Nothing queued, and the reasoning trail is intact.
    assert!(h.runtime.pending_approvals().unwrap().is_empty());
    h.store.verify_scratchpad(id).unwrap();
}

#[tokio::test]
async fn emulation_mode_only_detects() {
    let h = harness(
        OperatingMode::Emulation,
        &[&detect_reply("Learn Italian", "conversational italian", 0.9)],
        MockOperator::new(),
    );

    let report = h
        .runtime
        .handle_input("s1", user(), "I want to learn Italian")
        .await
        .unwrap();

    assert_eq!(report.outcome, "created");
    let id = report.desire_id.unwrap();
    let desire = h.store.load(id).unwrap();

    // Recorded, never planned or executed.
    assert_eq!(desire.status, DesireStatus::Nascent);
    assert!(desire.plan.is_none());
    assert_eq!(h.model.call_roles(), vec!["detector"]);
    assert_eq!(h.operator.call_count(), 0);
}

#[tokio::test]
async fn low_confidence_input_is_ignored() {
    let h = harness(
        OperatingMode::Autonomous,
        &[&detect_reply("Something", "vague", 0.3)],
        MockOperator::new(),
    );

    let report = h.runtime.handle_input("s1", user(), "hm, maybe").await.unwrap();

    assert_eq!(report.outcome, "ignored");
    assert!(report.desire_id.is_none());
    assert!(h.store.list().unwrap().is_empty());
    // Downstream stages never ran.
    assert_eq!(h.model.call_roles(), vec!["detector"]);
}

// ── Dedupe and reinforcement ──

#[tokio::test]
async fn duplicate_input_reinforces_instead_of_duplicating() {
    let h = harness(
        OperatingMode::Dual,
        &[
            &detect_reply(
                "Learn Italian",
                "I want to learn conversational Italian",
                0.9,
            ),
            &plan_reply(2, "research.web_search"),
            &review_reply(0.9, true),
            &review_reply(0.9, true),
            &detect_reply(
                "Start learning the Italian language",
                "Work toward speaking Italian in conversation",
                0.8,
            ),
        ],
        MockOperator::new(),
    );

    let first = h
        .runtime
        .handle_input("s1", user(), "I want to learn Italian")
        .await
        .unwrap();
    // Dual mode always queues instead of executing.
    assert_eq!(first.outcome, "queued");
    let id = first.desire_id.unwrap();

    let second = h
        .runtime
        .handle_input("s2", user(), "I should start learning Italian")
        .await
        .unwrap();
    assert_eq!(second.outcome, "reinforced");
    assert_eq!(second.desire_id, Some(id));

    // Still exactly one desire, one queue entry, strength bumped once.
    let desires = h.store.list().unwrap();
    assert_eq!(desires.len(), 1);
    assert_eq!(desires[0].reinforcements, 1);
    assert!(desires[0].strength > desires[0].base_weight);
    assert_eq!(h.runtime.pending_approvals().unwrap().len(), 1);
    assert_eq!(h.operator.call_count(), 0);
}

// ── Review gate ──

#[tokio::test]
async fn unparsable_review_fails_closed_and_queues() {
    let h = harness(
        OperatingMode::Autonomous,
        &[
            &detect_reply("Learn Italian", "conversational italian", 0.9),
            &plan_reply(1, "research.web_search"),
            "this is not json at all",
            &review_reply(0.95, true),
        ],
        MockOperator::new(),
    );

    let report = h
        .runtime
        .handle_input("s1", user(), "I want to learn Italian")
        .await
        .unwrap();

    // Safety could not produce a verdict, so nothing auto-approves.
    assert_eq!(report.outcome, "queued");
    let desire = h.store.load(report.desire_id.unwrap()).unwrap();
    assert_eq!(desire.status, DesireStatus::AwaitingApproval);
    assert_eq!(h.runtime.pending_approvals().unwrap().len(), 1);
    assert_eq!(h.operator.call_count(), 0);
}

#[tokio::test]
async fn overspending_plan_is_rejected_by_hard_rule() {
    let plan = serde_json::json!({
        "goal": "buy the course",
        "steps": [{
            "order": 1,
            "action": "purchase subscription",
            "capability": "finance.purchase",
            "inputs": { "cost_usd": 99.0 },
            "expected_outcome": "subscribed",
            "risk": "medium",
            "requires_approval": true,
        }],
    })
    .to_string();

    let h = harness(
        OperatingMode::Autonomous,
        &[
            &detect_reply("Subscribe to a course", "paid italian course", 0.9),
            &plan,
            // Only the alignment reviewer reaches the model: the safety
            // hard rule fires first and never consults it.
            &review_reply(0.9, true),
        ],
        MockOperator::new(),
    );

    let report = h
        .runtime
        .handle_input("s1", user(), "sign me up for the course")
        .await
        .unwrap();

    assert_eq!(report.outcome, "queued");
    assert_eq!(
        h.model.call_roles(),
        vec!["detector", "planner", "alignment_reviewer"]
    );
    assert_eq!(h.operator.call_count(), 0);
}

// ── Approval queue ──

#[tokio::test]
async fn human_approval_then_execution() {
    let h = harness(OperatingMode::Dual, &[], MockOperator::new());
    let desire = awaiting_desire(&h.store, "research.web_search", 2);
    h.store
        .enqueue_approval(&vol_desire::ApprovalRequest {
            desire_id: desire.id,
            title: desire.title.clone(),
            goal: "learn italian basics".to_string(),
            plan_version: 1,
            estimated_risk: RiskLevel::Low,
            required_trust: vol_policy::TrustLevel::Observed,
            queued_at: chrono::Utc::now(),
        })
        .unwrap();

    // A non-admin cannot approve.
    assert!(h.runtime.approve(desire.id, &user()).is_err());

    h.runtime.approve(desire.id, &admin()).unwrap();
    let approved = h.store.load(desire.id).unwrap();
    assert!(approved.status.may_execute());
    assert_eq!(approved.approved_by.as_deref(), Some("a1"));
    assert!(h.runtime.pending_approvals().unwrap().is_empty());

    let report = h.runtime.run_desire("s1", user(), desire.id).await.unwrap();
    assert_eq!(report.outcome, "completed");
    assert_eq!(h.operator.call_count(), 2);
    assert_eq!(
        h.store.load(desire.id).unwrap().status,
        DesireStatus::Completed
    );
}

#[tokio::test]
async fn rejection_discards_but_keeps_the_folder() {
    let h = harness(OperatingMode::Dual, &[], MockOperator::new());
    let desire = awaiting_desire(&h.store, "research.web_search", 1);

    h.runtime.reject(desire.id, &admin(), "not now").unwrap();

    let rejected = h.store.load(desire.id).unwrap();
    assert_eq!(rejected.status, DesireStatus::Discarded);
    assert!(h.store.root().join(desire.id.to_string()).exists());
    h.store.verify_scratchpad(desire.id).unwrap();
}

// ── Plan revision ──

#[tokio::test]
async fn revision_adds_a_plan_version_and_requeues() {
    let h = harness(
        OperatingMode::Dual,
        &[
            &plan_reply(3, "research.web_search"),
            &review_reply(0.9, true),
            &review_reply(0.9, true),
        ],
        MockOperator::new(),
    );
    let desire = awaiting_desire(&h.store, "research.web_search", 2);

    let report = h
        .runtime
        .revise_plan("s1", user(), desire.id, "plan is too vague, add detail")
        .await
        .unwrap();
    assert_eq!(report.outcome, "queued");

    let revised = h.store.load(desire.id).unwrap();
    let plan = revised.plan.as_ref().unwrap();
    assert_eq!(plan.version, 2);
    assert_eq!(
        plan.revision_critique.as_deref(),
        Some("plan is too vague, add detail")
    );
    assert_eq!(plan.steps.len(), 3);
    // Version 1 is retained, untouched.
    assert_eq!(revised.plan_history.len(), 1);
    assert_eq!(revised.plan_history[0].version, 1);

    let pending = h.runtime.pending_approvals().unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].plan_version, 2);
}

// ── Execution ──

#[tokio::test]
async fn failing_step_halts_execution_fail_fast() {
    let h = harness(OperatingMode::Dual, &[], MockOperator::failing_at(3));
    let desire = approved_desire(&h.store, "research.web_search", 5, "a1");

    let report = h.runtime.run_desire("s1", user(), desire.id).await.unwrap();
    assert_eq!(report.outcome, "failed");

    let failed = h.store.load(desire.id).unwrap();
    assert!(matches!(failed.status, DesireStatus::Failed { .. }));
    assert_eq!(failed.metrics.failures, 1);

    // Steps 4 and 5 never ran.
    assert_eq!(h.operator.call_count(), 3);

    let attempts = h.store.load_executions(desire.id).unwrap();
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].status, ExecutionStatus::Failed);
    assert_eq!(attempts[0].steps_completed, 2);
    assert_eq!(attempts[0].step_results.len(), 3);
    assert!(!attempts[0].step_results[2].success);
}

#[tokio::test]
async fn step_capability_outside_mode_allowlist_is_denied() {
    // finance.* is not on the Dual allow list.
    let h = harness(OperatingMode::Dual, &[], MockOperator::new());
    let desire = approved_desire(&h.store, "finance.transfer", 1, "a1");

    let report = h.runtime.run_desire("s1", user(), desire.id).await.unwrap();
    assert_eq!(report.outcome, "failed");

    // The operator was never consulted: the gate stopped the step.
    assert_eq!(h.operator.call_count(), 0);
    let attempts = h.store.load_executions(desire.id).unwrap();
    assert_eq!(attempts[0].step_results.len(), 1);
    assert!(attempts[0].step_results[0]
        .error
        .as_deref()
        .unwrap()
        .contains("finance.transfer"));
}

#[tokio::test]
async fn under_trusted_caller_is_rejected_before_any_operator_call() {
    let h = harness(OperatingMode::Autonomous, &[], MockOperator::new());

    // A high-risk plan requires the bounded-autonomy tier; an ordinary
    // user resolves to the supervised tier.
    let mut desire = Desire::new(
        "Restructure accounts",
        "move funds between accounts",
        "test fixture",
        DesireSource::Direct,
        RiskLevel::High,
    );
    let plan = DesirePlan::new(
        "restructure accounts",
        vec![PlanStep {
            order: 1,
            action: "transfer funds".to_string(),
            capability: "finance.transfer".to_string(),
            inputs: serde_json::json!({}),
            expected_outcome: "funds moved".to_string(),
            risk: RiskLevel::High,
            requires_approval: false,
        }],
    )
    .unwrap();
    desire.adopt_plan(plan);
    desire.transition(DesireStatus::Planning).unwrap();
    desire.transition(DesireStatus::Reviewing).unwrap();
    desire.transition(DesireStatus::AwaitingApproval).unwrap();
    desire
        .transition(DesireStatus::Approved {
            approved_by: "a1".to_string(),
        })
        .unwrap();
    desire.approved_by = Some("a1".to_string());
    h.store.create(&desire).unwrap();

    let report = h.runtime.run_desire("s1", user(), desire.id).await.unwrap();
    assert_eq!(report.outcome, "failed");
    assert_eq!(h.operator.call_count(), 0);
    // Rejection happened pre-flight: no attempt record was even started.
    assert!(h.store.load_executions(desire.id).unwrap().is_empty());
}

#[tokio::test]
async fn unapproved_desire_never_executes() {
    let h = harness(OperatingMode::Dual, &[], MockOperator::new());
    let desire = awaiting_desire(&h.store, "research.web_search", 1);

    let report = h.runtime.run_desire("s1", user(), desire.id).await.unwrap();
    assert_eq!(report.outcome, "failed");
    assert_eq!(h.operator.call_count(), 0);
}

// ── Cancellation and resume ──

/// Succeeds every step, but cancels the shared token at the start of the
/// configured call and then stalls, so cancellation lands while the step
/// is in flight.
struct CancelOnCall {
    cancel_at: usize,
    token: CancellationToken,
    count: AtomicUsize,
}

#[async_trait]
impl Operator for CancelOnCall {
    async fn execute_step(
        &self,
        _goal: &str,
        _context: &serde_json::Value,
        _flags: &Capabilities,
    ) -> Result<StepOutcome, ProviderError> {
        let n = self.count.fetch_add(1, Ordering::SeqCst) + 1;
        if n == self.cancel_at {
            self.token.cancel();
            tokio::time::sleep(Duration::from_secs(5)).await;
        }
        Ok(StepOutcome::ok(serde_json::json!({ "call": n })))
    }
}

fn execute_deps(store: Arc<DesireStore>, operator: Arc<dyn Operator>) -> NodeDeps {
    NodeDeps {
        store,
        model: Arc::new(ScriptedModel::with_content(&[])),
        operator,
        memory: Arc::new(StaticMemory::empty()),
        config: DesireConfig::default(),
    }
}

fn execute_ctx(token: CancellationToken) -> ExecutionContext {
    ExecutionContext::new("s1", user(), OperatingMode::Dual).with_cancel(token)
}

#[tokio::test]
async fn cancellation_mid_step_records_no_partial_result_and_resumes() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(DesireStore::new(dir.path().join("desires")).unwrap());
    let desire = approved_desire(&store, "research.web_search", 5, "a1");
    let id_input = [serde_json::json!(desire.id.to_string())];

    // Attempt 1: cancelled while step 2 is in flight.
    let token = CancellationToken::new();
    let handler = ExecuteHandler::new(execute_deps(
        store.clone(),
        Arc::new(CancelOnCall {
            cancel_at: 2,
            token: token.clone(),
            count: AtomicUsize::new(0),
        }),
    ));
    let out = handler
        .run(&id_input, &execute_ctx(token), &serde_json::json!({}))
        .await
        .unwrap();
    assert!(out.contains_key("halted"));

    let attempts = store.load_executions(desire.id).unwrap();
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].status, ExecutionStatus::Cancelled);
    // Step 1 completed; the interrupted step 2 left no result.
    assert_eq!(attempts[0].step_results.len(), 1);
    assert_eq!(attempts[0].step_results[0].order, 1);

    // The desire is still executing, not failed.
    let paused = store.load(desire.id).unwrap();
    assert_eq!(paused.status, DesireStatus::Executing);

    // Attempt 2: resume with a fresh token; step 1 is not re-run.
    let operator = Arc::new(MockOperator::new());
    let handler = ExecuteHandler::new(execute_deps(store.clone(), operator.clone()));
    let out = handler
        .run(
            &id_input,
            &execute_ctx(CancellationToken::new()),
            &serde_json::json!({}),
        )
        .await
        .unwrap();
    let summary = out.get("finished").expect("finished output");
    assert_eq!(operator.call_count(), 4);

    let attempts = store.load_executions(desire.id).unwrap();
    assert_eq!(attempts.len(), 2);
    assert_eq!(attempts[1].status, ExecutionStatus::Completed);
    assert_eq!(attempts[1].step_results.len(), 4);
    assert_eq!(attempts[1].steps_completed, 5);

    // Outcome review settles the desire.
    let outcome = OutcomeHandler::new(execute_deps(store.clone(), operator));
    outcome
        .run(
            &[summary.clone()],
            &execute_ctx(CancellationToken::new()),
            &serde_json::json!({}),
        )
        .await
        .unwrap();
    let done = store.load(desire.id).unwrap();
    assert_eq!(done.status, DesireStatus::Completed);
    assert_eq!(done.metrics.successes, 1);
    store.verify_scratchpad(desire.id).unwrap();
}

// ── Locking ──

#[tokio::test]
async fn concurrent_writer_is_rejected_by_the_lease() {
    let h = harness(OperatingMode::Dual, &[], MockOperator::new());
    let desire = approved_desire(&h.store, "research.web_search", 1, "a1");

    // Another session holds the lease.
    h.store
        .acquire_lock(desire.id, "other-session", chrono::Duration::seconds(60))
        .unwrap();

    let result = h.runtime.run_desire("s1", user(), desire.id).await;
    assert!(matches!(
        result,
        Err(vol_desire::DesireError::Locked { .. })
    ));
    assert_eq!(h.operator.call_count(), 0);
}

// ── Session cancellation bookkeeping ──

#[tokio::test]
async fn cancel_session_without_a_run_reports_false() {
    let h = harness(OperatingMode::Dual, &[], MockOperator::new());
    assert!(!h.runtime.cancel_session("ghost"));
}

#[tokio::test]
async fn discard_requires_no_approver_and_is_terminal() {
    let h = harness(OperatingMode::Dual, &[], MockOperator::new());
    let desire = awaiting_desire(&h.store, "research.web_search", 1);

    h.runtime.discard(desire.id, &user()).unwrap();
    let discarded = h.store.load(desire.id).unwrap();
    assert_eq!(discarded.status, DesireStatus::Discarded);

    // Terminal: a later transition attempt fails.
    assert!(h.runtime.discard(desire.id, &user()).is_err());
}
