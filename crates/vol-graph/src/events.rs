// events.rs — Execution events and best-effort sink dispatch.
//
// The engine emits events at node boundaries so a presentation layer can
// stream progress. Events are advisory only: execution must succeed
// identically with zero sinks attached, and a failing sink never fails
// the run — it gets a tracing::warn! and life goes on.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::GraphError;
use crate::node::NodeKind;

/// Events emitted during a graph run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum ExecutionEvent {
    /// A node is about to run.
    NodeStart {
        node_id: String,
        kind: NodeKind,
        timestamp: DateTime<Utc>,
    },

    /// A node completed and produced outputs.
    NodeComplete {
        node_id: String,
        payload: serde_json::Value,
        timestamp: DateTime<Utc>,
    },

    /// A node failed (or timed out); the run is aborting.
    NodeError {
        node_id: String,
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// The run reached a terminal outcome.
    GraphComplete {
        graph_name: String,
        outcome: String,
        nodes_completed: usize,
        timestamp: DateTime<Utc>,
    },
}

impl ExecutionEvent {
    pub fn node_start(node_id: &str, kind: NodeKind) -> Self {
        ExecutionEvent::NodeStart {
            node_id: node_id.to_string(),
            kind,
            timestamp: Utc::now(),
        }
    }

    pub fn node_complete(node_id: &str, payload: serde_json::Value) -> Self {
        ExecutionEvent::NodeComplete {
            node_id: node_id.to_string(),
            payload,
            timestamp: Utc::now(),
        }
    }

    pub fn node_error(node_id: &str, message: &str) -> Self {
        ExecutionEvent::NodeError {
            node_id: node_id.to_string(),
            message: message.to_string(),
            timestamp: Utc::now(),
        }
    }

    pub fn graph_complete(graph_name: &str, outcome: &str, nodes_completed: usize) -> Self {
        ExecutionEvent::GraphComplete {
            graph_name: graph_name.to_string(),
            outcome: outcome.to_string(),
            nodes_completed,
            timestamp: Utc::now(),
        }
    }

    /// The event type name as a string.
    pub fn event_type(&self) -> &str {
        match self {
            ExecutionEvent::NodeStart { .. } => "node_start",
            ExecutionEvent::NodeComplete { .. } => "node_complete",
            ExecutionEvent::NodeError { .. } => "node_error",
            ExecutionEvent::GraphComplete { .. } => "graph_complete",
        }
    }
}

/// Trait for receiving execution events.
///
/// Implementations decide what to do with each event: append to a file,
/// push over a channel to a UI, etc. Errors are reported but never stop
/// the run.
pub trait EventSink: Send + Sync {
    fn send(&self, event: &ExecutionEvent) -> Result<(), GraphError>;
}

/// Logs events as JSONL to a file.
pub struct LogSink {
    path: PathBuf,
}

impl LogSink {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl EventSink for LogSink {
    fn send(&self, event: &ExecutionEvent) -> Result<(), GraphError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| GraphError::Io {
                path: parent.display().to_string(),
                source,
            })?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|source| GraphError::Io {
                path: self.path.display().to_string(),
                source,
            })?;

        let json = serde_json::to_string(event)?;
        writeln!(file, "{}", json).map_err(|source| GraphError::Io {
            path: self.path.display().to_string(),
            source,
        })?;

        Ok(())
    }
}

/// Dispatches events to any number of sinks, best-effort.
#[derive(Default)]
pub struct EventDispatcher {
    sinks: Vec<Box<dyn EventSink>>,
}

impl EventDispatcher {
    /// A dispatcher with no sinks — the correctness baseline.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_sink(&mut self, sink: Box<dyn EventSink>) {
        self.sinks.push(sink);
    }

    /// Send an event to every sink. Sink errors are logged, never raised.
    pub fn dispatch(&self, event: &ExecutionEvent) {
        for sink in &self.sinks {
            if let Err(e) = sink.send(event) {
                tracing::warn!("event sink error: {}", e);
            }
        }
    }
}
