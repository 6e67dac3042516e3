// engine.rs — The graph execution engine.
//
// Contract: execute(graph, context, events) → terminal outcome.
//
// The engine walks the graph in dependency order (a node runs only after
// every producer it links from has completed), invokes each node's handler
// with gathered inputs, and enforces three cross-cutting rules:
//
// - Cancellation: checked at every safe point — before each node, and
//   raced against the in-flight handler. A positive check stops new
//   invocations and returns a distinct Cancelled outcome. State persisted
//   by completed nodes stays intact; there is no rollback.
// - Timeout: the whole run has a deadline from the context's budget; each
//   handler invocation is bounded by the remaining budget. Exceeding it is
//   a TimedOut outcome, distinct from ordinary failure.
// - Failure: a handler error emits a node-error event and aborts the run.
//   Partial successes are never reported as success.
//
// Execution is sequential in dependency order. Independent branches could
// run in parallel without changing observable results, but sequential is
// the correctness baseline and what ships.

use std::sync::Arc;
use std::time::Instant;

use crate::context::{ExecutionContext, ResultTable};
use crate::error::GraphError;
use crate::events::{EventDispatcher, ExecutionEvent};
use crate::graph::{GraphDefinition, NodeInstance};
use crate::registry::NodeRegistry;

/// The terminal state of one graph run.
#[derive(Debug)]
pub enum GraphOutcome {
    /// Every reachable node produced an output.
    Completed { results: ResultTable },
    /// A node handler failed; the run aborted at that node.
    Failed {
        node_id: String,
        message: String,
        partial: ResultTable,
    },
    /// Cancellation was observed; no further nodes were invoked.
    Cancelled { partial: ResultTable },
    /// The whole-graph timeout budget was exhausted at this node.
    TimedOut {
        node_id: String,
        partial: ResultTable,
    },
}

impl GraphOutcome {
    /// Short outcome name for events and logs.
    pub fn name(&self) -> &'static str {
        match self {
            GraphOutcome::Completed { .. } => "completed",
            GraphOutcome::Failed { .. } => "failed",
            GraphOutcome::Cancelled { .. } => "cancelled",
            GraphOutcome::TimedOut { .. } => "timed_out",
        }
    }

    /// The result table, terminal or partial.
    pub fn results(&self) -> &ResultTable {
        match self {
            GraphOutcome::Completed { results } => results,
            GraphOutcome::Failed { partial, .. } => partial,
            GraphOutcome::Cancelled { partial } => partial,
            GraphOutcome::TimedOut { partial, .. } => partial,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, GraphOutcome::Completed { .. })
    }
}

/// The graph execution engine. Cheap to clone via the shared registry.
pub struct Engine {
    registry: Arc<NodeRegistry>,
}

impl Engine {
    pub fn new(registry: Arc<NodeRegistry>) -> Self {
        Self { registry }
    }

    /// Execute a graph to a terminal outcome.
    ///
    /// Returns `Err` only for structural problems (invalid graph, missing
    /// handler, unresolvable required input). Handler failures, timeouts,
    /// and cancellation are outcomes, not errors.
    pub async fn execute(
        &self,
        graph: &GraphDefinition,
        ctx: &ExecutionContext,
        events: &EventDispatcher,
    ) -> Result<GraphOutcome, GraphError> {
        graph.validate()?;
        let order = graph.topo_order()?;

        let deadline = Instant::now() + ctx.timeout;
        let mut results = ResultTable::new();
        // Nodes on branches a router didn't select.
        let mut skipped: Vec<String> = Vec::new();

        for node in order {
            // Safe point: observe cancellation before issuing the next node.
            if ctx.cancel.is_cancelled() {
                let outcome = GraphOutcome::Cancelled { partial: results };
                events.dispatch(&ExecutionEvent::graph_complete(
                    &graph.name,
                    outcome.name(),
                    outcome.results().len(),
                ));
                return Ok(outcome);
            }

            let handler = self.registry.handler_for(node.kind)?;

            let inputs = match self.gather_inputs(graph, node, &results, &skipped, ctx)? {
                Some(inputs) => inputs,
                None => {
                    // Branch not taken — skip without failing.
                    tracing::debug!("skipping node '{}' (branch not selected)", node.id);
                    skipped.push(node.id.clone());
                    continue;
                }
            };

            events.dispatch(&ExecutionEvent::node_start(&node.id, node.kind));

            let Some(remaining) = deadline.checked_duration_since(Instant::now()).filter(|d| !d.is_zero())
            else {
                events.dispatch(&ExecutionEvent::node_error(&node.id, "timeout budget exhausted"));
                let outcome = GraphOutcome::TimedOut {
                    node_id: node.id.clone(),
                    partial: results,
                };
                events.dispatch(&ExecutionEvent::graph_complete(
                    &graph.name,
                    outcome.name(),
                    outcome.results().len(),
                ));
                return Ok(outcome);
            };

            // Race the handler against cancellation and the remaining
            // budget. `biased` makes cancellation win when both are ready.
            let outcome = tokio::select! {
                biased;
                _ = ctx.cancel.cancelled() => {
                    let outcome = GraphOutcome::Cancelled { partial: results };
                    events.dispatch(&ExecutionEvent::graph_complete(
                        &graph.name,
                        outcome.name(),
                        outcome.results().len(),
                    ));
                    return Ok(outcome);
                }
                res = tokio::time::timeout(remaining, handler.run(&inputs, ctx, &node.properties)) => res,
            };

            match outcome {
                Err(_elapsed) => {
                    events.dispatch(&ExecutionEvent::node_error(
                        &node.id,
                        "node exceeded the graph timeout budget",
                    ));
                    let outcome = GraphOutcome::TimedOut {
                        node_id: node.id.clone(),
                        partial: results,
                    };
                    events.dispatch(&ExecutionEvent::graph_complete(
                        &graph.name,
                        outcome.name(),
                        outcome.results().len(),
                    ));
                    return Ok(outcome);
                }
                Ok(Err(error)) => {
                    let message = error.to_string();
                    events.dispatch(&ExecutionEvent::node_error(&node.id, &message));
                    let outcome = GraphOutcome::Failed {
                        node_id: node.id.clone(),
                        message,
                        partial: results,
                    };
                    events.dispatch(&ExecutionEvent::graph_complete(
                        &graph.name,
                        outcome.name(),
                        outcome.results().len(),
                    ));
                    return Ok(outcome);
                }
                Ok(Ok(outputs)) => {
                    let payload =
                        serde_json::to_value(&outputs).unwrap_or_else(|_| serde_json::json!({}));
                    events.dispatch(&ExecutionEvent::node_complete(&node.id, payload));
                    results.insert(node.id.clone(), outputs);
                }
            }
        }

        let outcome = GraphOutcome::Completed { results };
        events.dispatch(&ExecutionEvent::graph_complete(
            &graph.name,
            outcome.name(),
            outcome.results().len(),
        ));
        Ok(outcome)
    }

    /// Gather a node's positional inputs in slot declaration order.
    ///
    /// Returns `Ok(None)` when the node sits on an unselected router branch
    /// (a producer was skipped, or a routing producer didn't emit the
    /// linked slot) — the caller skips it.
    ///
    /// Resolution per input slot:
    /// 1. A link into the slot → the producer's recorded output.
    /// 2. No link → the context's aux package, by slot name.
    /// 3. Still nothing → JSON null if optional, `MissingInput` if required.
    fn gather_inputs(
        &self,
        graph: &GraphDefinition,
        node: &NodeInstance,
        results: &ResultTable,
        skipped: &[String],
        ctx: &ExecutionContext,
    ) -> Result<Option<Vec<serde_json::Value>>, GraphError> {
        let incoming = graph.links_into(&node.id);

        // Any producer on an unselected branch poisons this node too.
        if incoming
            .iter()
            .any(|l| skipped.contains(&l.from_node))
        {
            return Ok(None);
        }

        let definition = self.registry.definition_for(node.kind)?;
        let mut inputs = Vec::with_capacity(definition.inputs.len());

        for slot in &definition.inputs {
            let link = incoming.iter().find(|l| l.to_slot == slot.name);

            let value = match link {
                Some(link) => match results.value(&link.from_node, &link.from_slot) {
                    Some(value) => Some(value.clone()),
                    None => {
                        // Producer completed without emitting this slot.
                        let producer = graph.node(&link.from_node).ok_or_else(|| {
                            GraphError::Validation(format!(
                                "link from unknown node '{}'",
                                link.from_node
                            ))
                        })?;
                        if self.registry.definition_for(producer.kind)?.routing {
                            return Ok(None);
                        }
                        None
                    }
                },
                None => ctx.aux.get(&slot.name).cloned(),
            };

            match value {
                Some(value) => inputs.push(value),
                None if slot.required => {
                    return Err(GraphError::MissingInput {
                        node: node.id.clone(),
                        slot: slot.name.clone(),
                    })
                }
                None => inputs.push(serde_json::Value::Null),
            }
        }

        Ok(Some(inputs))
    }
}
