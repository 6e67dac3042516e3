// graphs.rs — The built-in lifecycle graphs, one per operating mode.
//
// Emulation gets detection only: desires are recorded and reinforced but
// nothing downstream runs. Dual and Autonomous get the full pipeline; the
// verdict node itself enforces that Dual always queues, so the two full
// graphs are structurally identical and differ only in mode.

use vol_graph::{GraphDefinition, Link, NodeInstance, NodeKind};
use vol_policy::OperatingMode;

/// Build the lifecycle graph for a mode. The result always validates.
pub fn lifecycle_graph(mode: OperatingMode) -> GraphDefinition {
    match mode {
        OperatingMode::Emulation => detection_only_graph(mode),
        OperatingMode::Dual | OperatingMode::Autonomous => full_graph(mode),
    }
}

/// Build the execution tail on its own — used to run an approved desire
/// (human sign-off or resume) without re-detecting anything. The executor
/// reads "desire_id" from the run's aux package.
pub fn execution_graph(mode: OperatingMode) -> GraphDefinition {
    GraphDefinition::new("desire-execution", mode)
        .add_node(NodeInstance::new("execute", NodeKind::Executor))
        .add_node(NodeInstance::new("outcome", NodeKind::OutcomeReview))
        .add_link(Link::new("execute", "finished", "outcome", "finished"))
}

/// Build the replanning loop on its own — plan, review, and verdict over
/// an existing desire. The planner reads "desire_id" (and "critique") from
/// the run's aux package.
pub fn revision_graph(mode: OperatingMode) -> GraphDefinition {
    let graph = GraphDefinition::new("desire-revision", mode)
        .add_node(NodeInstance::new("plan", NodeKind::Planner))
        .add_node(NodeInstance::new("safety", NodeKind::SafetyReview))
        .add_node(NodeInstance::new("alignment", NodeKind::AlignmentReview))
        .add_node(NodeInstance::new("verdict", NodeKind::Verdict))
        .add_node(NodeInstance::new("queue", NodeKind::ApprovalQueue))
        .add_node(NodeInstance::new("execute", NodeKind::Executor))
        .add_node(NodeInstance::new("outcome", NodeKind::OutcomeReview));
    wire_plan_to_outcome(graph)
}

fn detection_only_graph(mode: OperatingMode) -> GraphDefinition {
    GraphDefinition::new("desire-detection", mode)
        .add_node(NodeInstance::new("detect", NodeKind::Detector))
}

fn full_graph(mode: OperatingMode) -> GraphDefinition {
    let graph = GraphDefinition::new("desire-lifecycle", mode)
        .add_node(NodeInstance::new("detect", NodeKind::Detector))
        .add_node(NodeInstance::new("enrich", NodeKind::Enricher))
        .add_node(NodeInstance::new("plan", NodeKind::Planner))
        .add_node(NodeInstance::new("safety", NodeKind::SafetyReview))
        .add_node(NodeInstance::new("alignment", NodeKind::AlignmentReview))
        .add_node(NodeInstance::new("verdict", NodeKind::Verdict))
        .add_node(NodeInstance::new("queue", NodeKind::ApprovalQueue))
        .add_node(NodeInstance::new("execute", NodeKind::Executor))
        .add_node(NodeInstance::new("outcome", NodeKind::OutcomeReview))
        .add_link(Link::new("detect", "created", "enrich", "desire_id"))
        .add_link(Link::new("enrich", "desire_id", "plan", "desire_id"))
        .add_link(Link::new("enrich", "context", "plan", "context"));
    wire_plan_to_outcome(graph)
}

/// Shared wiring from the planner through to outcome review.
fn wire_plan_to_outcome(graph: GraphDefinition) -> GraphDefinition {
    graph
        .add_link(Link::new("plan", "desire_id", "safety", "desire_id"))
        .add_link(Link::new("plan", "plan", "safety", "plan"))
        .add_link(Link::new("plan", "desire_id", "alignment", "desire_id"))
        .add_link(Link::new("plan", "plan", "alignment", "plan"))
        .add_link(Link::new("plan", "desire_id", "verdict", "desire_id"))
        .add_link(Link::new("safety", "review", "verdict", "safety_review"))
        .add_link(Link::new("alignment", "review", "verdict", "alignment_review"))
        .add_link(Link::new("verdict", "approved", "execute", "desire_id"))
        .add_link(Link::new("verdict", "queued", "queue", "desire_id"))
        .add_link(Link::new("execute", "finished", "outcome", "finished"))
}
