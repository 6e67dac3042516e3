// registry.rs — Node kind → handler registry.
//
// The registry is built once at startup: each NodeKind gets exactly one
// handler. Because NodeKind is a closed enum, a kind with no handler is a
// construction-time wiring mistake, surfaced as a typed error on lookup —
// not a stringly-typed runtime miss.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::GraphError;
use crate::node::{NodeDefinition, NodeHandler, NodeKind};

/// Maps each node kind to its definition and handler.
#[derive(Default)]
pub struct NodeRegistry {
    handlers: HashMap<NodeKind, Arc<dyn NodeHandler>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under its definition's kind.
    ///
    /// Re-registering a kind replaces the previous handler.
    pub fn register(&mut self, handler: Arc<dyn NodeHandler>) {
        let kind = handler.definition().kind;
        if self.handlers.insert(kind, handler).is_some() {
            tracing::debug!("replaced handler for node kind '{}'", kind);
        }
    }

    /// The handler for a kind.
    pub fn handler_for(&self, kind: NodeKind) -> Result<Arc<dyn NodeHandler>, GraphError> {
        self.handlers
            .get(&kind)
            .cloned()
            .ok_or(GraphError::UnregisteredKind(kind))
    }

    /// The immutable definition for a kind.
    pub fn definition_for(&self, kind: NodeKind) -> Result<NodeDefinition, GraphError> {
        Ok(self.handler_for(kind)?.definition().clone())
    }

    /// Kinds with registered handlers.
    pub fn kinds(&self) -> Vec<NodeKind> {
        self.handlers.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
