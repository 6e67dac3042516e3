//! # vol-policy
//!
//! Trust model and capability policy gate for Volition.
//!
//! Every durable write and every autonomous action in the runtime passes
//! through the [`PolicyGate`] before it happens. The gate is a pure function
//! of (operating mode, caller role, admin flag) — no ambient state, no hidden
//! identity lookup — and produces a [`Capabilities`] value: flag fields plus
//! assertion helpers that return a typed [`PolicyViolation`] when a rule is
//! broken.
//!
//! ## Key invariants
//!
//! - **Fail closed**: an unresolvable capability is a denial, never a
//!   silent downgrade.
//! - **Trust is ordered**: [`TrustLevel`] tiers are totally ordered, and a
//!   plan's required tier must be ≤ the caller's resolved tier.
//! - **Violations are fatal**: a [`PolicyViolation`] aborts the specific
//!   action; callers audit it and stop — they never retry around it.

pub mod error;
pub mod gate;
pub mod trust;

pub use error::PolicyViolation;
pub use gate::{Capabilities, PolicyGate, StepCheck};
pub use trust::{OperatingMode, RiskLevel, Role, TrustLevel};
