//! # vol-desire
//!
//! The autonomous desire lifecycle for Volition: detection, enrichment,
//! planning, dual review, approval, execution, and outcome settlement —
//! all expressed as nodes over the vol-graph engine.
//!
//! ## Key components
//!
//! - [`Desire`] — a persisted goal with a strict lifecycle state machine,
//!   bounded reinforcement, and time decay
//! - [`DesireStore`] — folder-per-desire persistence: atomic manifest,
//!   hash-chained append-only scratchpad, per-attempt execution records,
//!   a writer lock lease, and the human approval queue
//! - [`nodes`] — one handler per lifecycle stage, registered against the
//!   shared [`NodeDeps`](nodes::NodeDeps) bundle
//! - [`lifecycle_graph`](graphs::lifecycle_graph) — the built-in graph for
//!   each operating mode (emulation observes, dual always queues,
//!   autonomous may auto-approve)
//! - [`DesireRuntime`] — the assembled front door: feed input in, run
//!   approved desires, revise plans, approve/reject, cancel
//!
//! ## Safety posture
//!
//! Reviews fail closed. Auto-approval requires autonomous mode, both
//! reviewers' approval, a combined score over the threshold, and plan
//! risk at or below the ceiling. Every step clears the policy gate before
//! the operator runs it. Desires are discarded, never deleted.

pub mod config;
pub mod desire;
pub mod error;
pub mod execution;
pub mod graphs;
pub mod nodes;
pub mod plan;
pub mod runtime;
pub mod scratchpad;
pub mod similarity;
pub mod store;

pub use config::DesireConfig;
pub use desire::{Desire, DesireMetrics, DesireSource, DesireStatus};
pub use error::DesireError;
pub use execution::{DesireExecution, ExecutionStatus, StepResult};
pub use plan::{DesirePlan, PlanStep};
pub use runtime::{DesireRuntime, LifecycleReport};
pub use scratchpad::{EntryKind, Scratchpad, ScratchpadEntry};
pub use store::{ApprovalRequest, DesireStore, LockLease};
