// error.rs — Error types for the policy subsystem.

use thiserror::Error;

/// A policy rule was violated.
///
/// Violations are fatal for the action that triggered them. They carry an
/// audit-ready message and are never downgraded to a warning by callers.
#[derive(Debug, Error)]
pub enum PolicyViolation {
    /// The caller may not write durable memory in this mode.
    #[error("memory writes are not permitted for role '{role}' in mode '{mode}'")]
    MemoryWriteDenied { role: String, mode: String },

    /// The caller may not invoke autonomous actions in this mode.
    #[error("autonomous actions are not permitted for role '{role}' in mode '{mode}'")]
    AutonomyDenied { role: String, mode: String },

    /// The caller's trust tier is below what the plan requires.
    #[error("trust level '{actual}' is below required level '{required}'")]
    InsufficientTrust { required: String, actual: String },

    /// A plan step requires explicit human approval that was not recorded.
    #[error("step {step} requires human approval before execution")]
    ApprovalRequired { step: u32 },

    /// A step targets a capability outside the mode's allow list.
    #[error("capability '{capability}' is not allowed in mode '{mode}'")]
    CapabilityDenied { capability: String, mode: String },

    /// The caller may not change operating mode or trust settings.
    #[error("role '{role}' may not change mode or trust settings")]
    ModeChangeDenied { role: String },

    /// The caller may not approve queued plans.
    #[error("role '{role}' may not approve plans")]
    ApprovalDenied { role: String },
}
