//! # vol-provider
//!
//! External collaborator contracts for Volition.
//!
//! The core runtime never talks to a concrete model backend, capability
//! executor, or memory index directly — it goes through the three traits
//! defined here:
//!
//! - [`ModelProvider`] — reasoning calls (classification, planning, review).
//! - [`Operator`] — carries out one real-world plan step at a time.
//! - [`MemoryQuery`] — read-only ranked retrieval for enrichment.
//!
//! All three are `async` and object-safe so implementations can be injected
//! as `Arc<dyn ...>`. The [`mock`] module ships scripted implementations
//! used throughout the workspace's tests.

pub mod error;
pub mod memory;
pub mod mock;
pub mod model;
pub mod operator;

pub use error::ProviderError;
pub use memory::{MemoryHit, MemoryQuery};
pub use mock::{CallHook, MockOperator, ScriptedModel, ScriptedReply, StaticMemory};
pub use model::{CallOptions, ChatMessage, ModelProvider, ModelResponse, ResponseFormat, TokenUsage};
pub use operator::{Operator, StepOutcome};
