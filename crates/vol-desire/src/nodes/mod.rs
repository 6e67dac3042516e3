// nodes/mod.rs — Lifecycle node handlers.
//
// Each submodule implements one NodeKind against the shared NodeDeps
// bundle. Handlers never reach for globals: the store, providers, and
// configuration all arrive through the bundle at registration time.

use std::sync::Arc;

use serde::de::DeserializeOwned;

use vol_graph::NodeRegistry;
use vol_provider::{MemoryQuery, ModelProvider, Operator, ProviderError};

use crate::config::DesireConfig;
use crate::store::DesireStore;

mod approval;
mod detect;
mod enrich;
mod execute;
mod outcome;
mod plan;
mod review;
mod route;
mod verdict;

pub use approval::ApprovalQueueHandler;
pub use detect::{DetectHandler, DetectionOutput};
pub use enrich::EnrichHandler;
pub use execute::ExecuteHandler;
pub use outcome::OutcomeHandler;
pub use plan::PlanHandler;
pub use review::{ReviewHandler, ReviewOutput};
pub use route::RouterHandler;
pub use verdict::VerdictHandler;

/// Everything a lifecycle node needs, injected once at registration.
#[derive(Clone)]
pub struct NodeDeps {
    pub store: Arc<DesireStore>,
    pub model: Arc<dyn ModelProvider>,
    pub operator: Arc<dyn Operator>,
    pub memory: Arc<dyn MemoryQuery>,
    pub config: DesireConfig,
}

/// Register a handler for every node kind.
pub fn register_all(registry: &mut NodeRegistry, deps: NodeDeps) {
    registry.register(Arc::new(DetectHandler::new(deps.clone())));
    registry.register(Arc::new(EnrichHandler::new(deps.clone())));
    registry.register(Arc::new(PlanHandler::new(deps.clone())));
    registry.register(Arc::new(ReviewHandler::safety(deps.clone())));
    registry.register(Arc::new(ReviewHandler::alignment(deps.clone())));
    registry.register(Arc::new(VerdictHandler::new(deps.clone())));
    registry.register(Arc::new(ApprovalQueueHandler::new(deps.clone())));
    registry.register(Arc::new(ExecuteHandler::new(deps.clone())));
    registry.register(Arc::new(OutcomeHandler::new(deps)));
    registry.register(Arc::new(RouterHandler::new()));
}

/// Parse a model reply as JSON of type `T`.
///
/// Models wrap JSON in markdown fences often enough that we strip them
/// here once instead of in every handler. Anything that still fails to
/// parse is an `UnparsableOutput` error — handlers decide whether that is
/// fatal (planning) or fail-closed (review).
pub(crate) fn parse_structured<T: DeserializeOwned>(content: &str) -> Result<T, ProviderError> {
    let trimmed = content.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .map(|rest| rest.strip_suffix("```").unwrap_or(rest))
        .unwrap_or(trimmed)
        .trim();

    serde_json::from_str(body).map_err(|err| {
        ProviderError::UnparsableOutput(format!("{err}: {}", truncate(body, 200)))
    })
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
