// memory.rs — Read-only memory retrieval contract.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

/// One ranked retrieval result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryHit {
    pub item: serde_json::Value,
    /// Similarity score in [0, 1], higher is closer.
    pub score: f64,
}

/// The memory query interface — read-only from the core's perspective.
///
/// Used by the enrichment stage to pull context relevant to a desire.
/// Results come back ranked best-first.
#[async_trait]
pub trait MemoryQuery: Send + Sync {
    async fn query(&self, text: &str, top_k: usize) -> Result<Vec<MemoryHit>, ProviderError>;
}
