//! # vol-graph
//!
//! Typed data-flow graph execution for Volition.
//!
//! A graph is a validated set of node instances and directed links
//! (producer output slot → consumer input slot). The [`Engine`] resolves a
//! [`GraphDefinition`] into dependency order, invokes each node's handler
//! with its upstream outputs and a shared [`ExecutionContext`], streams
//! advisory [`ExecutionEvent`]s, and enforces cancellation and the
//! whole-graph timeout budget.
//!
//! ## Key components
//!
//! - [`NodeKind`] — the closed set of processing-unit kinds (compile-time
//!   exhaustive, no string dispatch)
//! - [`NodeHandler`] — the uniform async handler contract:
//!   (inputs, context, properties) → named outputs
//! - [`NodeRegistry`] — maps each kind to its definition and handler
//! - [`GraphDefinition`] — nodes + links, validated acyclic
//! - [`Engine`] — sequential dependency-order execution with cancellation,
//!   timeout, and router-aware branch skipping
//! - [`CancelRegistry`] — session-keyed cancellation tokens with an
//!   explicit lifecycle
//!
//! ## Execution guarantees
//!
//! - A node runs only after every producer it links from has completed.
//! - A handler failure aborts the whole run — partial successes are never
//!   reported as success.
//! - Cancellation and timeout produce distinct outcomes, both leaving
//!   results already committed by completed nodes intact (no rollback).
//! - Events are best-effort: execution is identical with no sink attached.

pub mod cancel;
pub mod context;
pub mod engine;
pub mod error;
pub mod events;
pub mod graph;
pub mod node;
pub mod registry;

pub use cancel::CancelRegistry;
pub use context::{CallerIdentity, ExecutionContext, ResultTable};
pub use engine::{Engine, GraphOutcome};
pub use error::GraphError;
pub use events::{EventDispatcher, EventSink, ExecutionEvent, LogSink};
pub use graph::{GraphDefinition, Link, NodeInstance};
pub use node::{
    outputs, HandlerError, NodeDefinition, NodeHandler, NodeKind, NodeOutputs, PropertySpec,
    SideEffects, SlotSpec,
};
pub use registry::NodeRegistry;
