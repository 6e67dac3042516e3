// model.rs — The model calling contract.
//
// Every reasoning step in the lifecycle (detection, planning, safety and
// alignment review) goes through ModelProvider::call. The contract is
// deliberately small: role + messages + mode + options in, content + usage
// out. Anything backend-specific (endpoints, auth, retries) lives behind
// the implementation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use vol_policy::OperatingMode;

use crate::error::ProviderError;

/// One message in a model conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    /// "system", "user", or "assistant".
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Requested output shape for a model call.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResponseFormat {
    #[default]
    Text,
    /// The caller will parse the content as a JSON object.
    Json,
}

/// Tuning options for a single model call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CallOptions {
    pub temperature: f64,
    pub max_tokens: u32,
    pub response_format: ResponseFormat,
}

impl Default for CallOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 1024,
            response_format: ResponseFormat::Text,
        }
    }
}

impl CallOptions {
    /// Options suited to structured (JSON) output: low temperature.
    pub fn structured(max_tokens: u32) -> Self {
        Self {
            temperature: 0.2,
            max_tokens,
            response_format: ResponseFormat::Json,
        }
    }
}

/// Token accounting reported by the backend, when available.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

/// The result of a model call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelResponse {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
}

/// The model calling interface.
///
/// Implementations must fail with a typed [`ProviderError`] rather than
/// silently returning empty content — callers rely on that to fail closed.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Call the model acting in the given role (e.g., "detector", "planner").
    async fn call(
        &self,
        role: &str,
        messages: &[ChatMessage],
        mode: OperatingMode,
        options: &CallOptions,
    ) -> Result<ModelResponse, ProviderError>;
}
