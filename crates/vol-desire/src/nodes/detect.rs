// nodes/detect.rs — Detector: free-form input → desire (or not).
//
// Routing node. Exactly one of three outputs is emitted:
//   created     — a new desire was persisted (downstream lifecycle runs)
//   reinforced  — a near-duplicate existed; its strength was bumped
//   ignored     — not a goal, or confidence below threshold
//
// The dedupe check runs before any write, so one repeated wish never
// produces two desire folders.

use async_trait::async_trait;
use serde::Deserialize;

use vol_graph::{
    outputs, ExecutionContext, HandlerError, NodeDefinition, NodeHandler, NodeKind, NodeOutputs,
    SideEffects, SlotSpec,
};
use vol_policy::RiskLevel;
use vol_provider::{CallOptions, ChatMessage};

use crate::desire::{Desire, DesireSource};
use crate::scratchpad::{EntryKind, ScratchpadEntry};

use super::{parse_structured, NodeDeps};

const DETECTOR_PROMPT: &str = "You classify whether the user's message expresses a goal, wish, \
or intention the assistant could pursue on their behalf. Reply with JSON: \
{\"is_goal\": bool, \"confidence\": 0.0-1.0, \"title\": string, \"description\": string, \
\"reason\": string, \"risk\": \"none\"|\"low\"|\"medium\"|\"high\"|\"critical\"}. \
Title is a short noun phrase; reason explains why you classified it that way.";

/// The detector model's structured reply.
#[derive(Debug, Clone, Deserialize)]
pub struct DetectionOutput {
    pub is_goal: bool,
    pub confidence: f64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default = "default_risk")]
    pub risk: RiskLevel,
}

fn default_risk() -> RiskLevel {
    RiskLevel::Medium
}

pub struct DetectHandler {
    deps: NodeDeps,
    definition: NodeDefinition,
}

impl DetectHandler {
    pub fn new(deps: NodeDeps) -> Self {
        Self {
            deps,
            definition: NodeDefinition {
                kind: NodeKind::Detector,
                category: "lifecycle".to_string(),
                description: "Classifies input as a goal, dedupes, and persists new desires"
                    .to_string(),
                inputs: vec![SlotSpec::required("input", "free-form user input")],
                outputs: vec![
                    SlotSpec::optional("created", "id of the newly created desire"),
                    SlotSpec::optional("reinforced", "id of the reinforced existing desire"),
                    SlotSpec::optional("ignored", "why the input was not adopted"),
                ],
                properties: vec![],
                routing: true,
            },
        }
    }
}

#[async_trait]
impl NodeHandler for DetectHandler {
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
        let input = inputs[0].as_str().unwrap_or_default().to_string();
        if input.trim().is_empty() {
            return Ok(outputs(&[("ignored", serde_json::json!("empty input"))]));
        }

        let messages = vec![
            ChatMessage::system(DETECTOR_PROMPT),
            ChatMessage::user(&input),
        ];
        let response = self
            .deps
            .model
            .call("detector", &messages, ctx.mode, &CallOptions::structured(512))
            .await?;
        let detection: DetectionOutput = parse_structured(&response.content)?;

        let threshold = self.deps.config.detection.confidence_threshold;
        if !detection.is_goal || detection.confidence < threshold {
            tracing::debug!(
                confidence = detection.confidence,
                "input not adopted as a desire"
            );
            return Ok(outputs(&[(
                "ignored",
                serde_json::json!(format!(
                    "not a goal (confidence {:.2} < {threshold:.2})",
                    detection.confidence
                )),
            )]));
        }

        // Dedupe before creating anything.
        if let Some((mut existing, score)) = self.deps.store.find_similar(
            &detection.title,
            &detection.description,
            self.deps.config.detection.similarity_threshold,
        )? {
            existing.reinforce(
                self.deps.config.reinforcement.increment,
                self.deps.config.reinforcement.max_increase,
            );
            self.deps.store.save(&existing)?;
            self.deps.store.append_scratchpad(
                existing.id,
                ScratchpadEntry::new(
                    EntryKind::Reinforced,
                    "detector",
                    format!("reinforced by similar input (score {score:.2})"),
                )
                .with_data(serde_json::json!({
                    "input": input,
                    "similarity": score,
                    "strength": existing.strength,
                })),
            )?;
            tracing::info!(desire_id = %existing.id, score, "reinforced existing desire");
            return Ok(outputs(&[(
                "reinforced",
                serde_json::json!(existing.id.to_string()),
            )]));
        }

        let mut desire = Desire::new(
            detection.title,
            detection.description,
            detection.reason,
            DesireSource::Detected,
            detection.risk,
        );
        desire.decay_rate = self.deps.config.reinforcement.decay_rate;
        self.deps.store.create(&desire)?;
        self.deps.store.append_scratchpad(
            desire.id,
            ScratchpadEntry::new(EntryKind::Detected, "detector", "input adopted as a desire")
                .with_data(serde_json::json!({
                    "input": input,
                    "confidence": detection.confidence,
                    "risk": desire.risk,
                })),
        )?;
        tracing::info!(desire_id = %desire.id, title = %desire.title, "created desire");

        Ok(outputs(&[(
            "created",
            serde_json::json!(desire.id.to_string()),
        )]))
    }
}
