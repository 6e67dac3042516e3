// nodes/enrich.rs — Enricher: pull memory context for a fresh desire.
//
// Memory is read-only here. A memory failure degrades to empty context
// rather than killing the run — planning without context beats not
// planning at all.

use async_trait::async_trait;
use uuid::Uuid;

use vol_graph::{
    outputs, ExecutionContext, HandlerError, NodeDefinition, NodeHandler, NodeKind, NodeOutputs,
    SideEffects, SlotSpec,
};

use crate::scratchpad::{EntryKind, ScratchpadEntry};

use super::NodeDeps;

const TOP_K: usize = 5;

pub struct EnrichHandler {
    deps: NodeDeps,
    definition: NodeDefinition,
}

impl EnrichHandler {
    pub fn new(deps: NodeDeps) -> Self {
        Self {
            deps,
            definition: NodeDefinition {
                kind: NodeKind::Enricher,
                category: "lifecycle".to_string(),
                description: "Retrieves memory context relevant to a desire".to_string(),
                inputs: vec![SlotSpec::required("desire_id", "the desire to enrich")],
                outputs: vec![
                    SlotSpec::required("desire_id", "the same desire id, passed through"),
                    SlotSpec::required("context", "ranked memory hits, best first"),
                ],
                properties: vec![],
                routing: false,
            },
        }
    }
}

#[async_trait]
impl NodeHandler for EnrichHandler {
    fn definition(&self) -> &NodeDefinition {
        &self.definition
    }

    fn side_effects(&self) -> SideEffects {
        SideEffects::Repeatable
    }

    async fn run(
        &self,
        inputs: &[serde_json::Value],
        _ctx: &ExecutionContext,
        _properties: &serde_json::Value,
    ) -> Result<NodeOutputs, HandlerError> {
        let id: Uuid = inputs[0].as_str().unwrap_or_default().parse()?;
        let desire = self.deps.store.load(id)?;

        let query = format!("{}\n{}", desire.title, desire.description);
        let hits = match self.deps.memory.query(&query, TOP_K).await {
            Ok(hits) => hits,
            Err(err) => {
                tracing::warn!(desire_id = %id, error = %err, "memory query failed; continuing without context");
                Vec::new()
            }
        };

        let context: Vec<serde_json::Value> = hits
            .iter()
            .map(|hit| serde_json::json!({"item": hit.item, "score": hit.score}))
            .collect();

        self.deps.store.append_scratchpad(
            id,
            ScratchpadEntry::new(
                EntryKind::StageCompleted,
                "enricher",
                format!("retrieved {} memory hits", context.len()),
            )
            .with_data(serde_json::json!({"hits": context.len()})),
        )?;

        Ok(outputs(&[
            ("desire_id", serde_json::json!(id.to_string())),
            ("context", serde_json::json!(context)),
        ]))
    }
}
