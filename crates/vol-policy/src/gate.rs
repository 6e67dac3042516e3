// gate.rs — The capability policy gate.
//
// PolicyGate::resolve() is the single chokepoint: it turns
// (operating mode, caller role, admin flag) into a Capabilities value.
// Callers keep the Capabilities and use its assertion helpers right before
// each sensitive action:
//
// 1. Is the caller allowed to write durable memory? → assert_memory_write
// 2. May autonomous actions run at all in this mode? → assert_autonomy
// 3. Does the caller's trust tier cover the plan's requirement?
//    → assert_trust_at_least
// 4. Is this specific step runnable (approval recorded, capability on the
//    mode's allow list)? → check_step
//
// This is deliberately conservative: anything not resolvable is denied.

use glob::Pattern;
use serde::{Deserialize, Serialize};

use crate::error::PolicyViolation;
use crate::trust::{OperatingMode, Role, TrustLevel};

/// What a plan step must look like for the gate to clear it.
///
/// A small view struct so the gate doesn't depend on the full plan model —
/// the executor builds one per step.
#[derive(Debug, Clone)]
pub struct StepCheck<'a> {
    /// The step's declared order (used in violation messages).
    pub order: u32,
    /// The capability the step targets (e.g., "research.web_search").
    pub capability: &'a str,
    /// Whether the plan marked this step as requiring human approval.
    pub requires_approval: bool,
    /// Whether a human approval has been recorded for the plan.
    pub human_approved: bool,
}

/// Capability flags resolved for one (mode, role, admin) combination.
///
/// `#[derive(PartialEq)]` lets tests compare resolved capability sets with `==`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Capabilities {
    /// The mode these capabilities were resolved for.
    pub mode: OperatingMode,
    /// The role these capabilities were resolved for.
    pub role: Role,
    /// May the caller write durable memory (desire manifests, scratchpads)?
    pub may_write_memory: bool,
    /// May autonomous actions (Operator calls) be invoked at all?
    pub may_invoke_autonomy: bool,
    /// May the caller change operating mode or trust settings?
    pub may_change_mode: bool,
    /// May the caller approve queued plans?
    pub may_approve: bool,
    /// The caller's resolved autonomy tier.
    pub trust_level: TrustLevel,
    /// Glob patterns for capabilities the mode allows steps to target.
    pub allowed_capabilities: Vec<String>,
}

impl Capabilities {
    /// Assert the caller may write durable memory.
    pub fn assert_memory_write(&self) -> Result<(), PolicyViolation> {
        if self.may_write_memory {
            Ok(())
        } else {
            Err(PolicyViolation::MemoryWriteDenied {
                role: self.role.to_string(),
                mode: self.mode.to_string(),
            })
        }
    }

    /// Assert autonomous actions may be invoked.
    pub fn assert_autonomy(&self) -> Result<(), PolicyViolation> {
        if self.may_invoke_autonomy {
            Ok(())
        } else {
            Err(PolicyViolation::AutonomyDenied {
                role: self.role.to_string(),
                mode: self.mode.to_string(),
            })
        }
    }

    /// Assert the caller's trust tier is at least `required`.
    pub fn assert_trust_at_least(&self, required: TrustLevel) -> Result<(), PolicyViolation> {
        if self.trust_level >= required {
            Ok(())
        } else {
            Err(PolicyViolation::InsufficientTrust {
                required: required.to_string(),
                actual: self.trust_level.to_string(),
            })
        }
    }

    /// Assert the caller may change mode/trust settings.
    pub fn assert_mode_change(&self) -> Result<(), PolicyViolation> {
        if self.may_change_mode {
            Ok(())
        } else {
            Err(PolicyViolation::ModeChangeDenied {
                role: self.role.to_string(),
            })
        }
    }

    /// Assert the caller may approve queued plans.
    pub fn assert_approver(&self) -> Result<(), PolicyViolation> {
        if self.may_approve {
            Ok(())
        } else {
            Err(PolicyViolation::ApprovalDenied {
                role: self.role.to_string(),
            })
        }
    }

    /// Check a single plan step immediately before it executes.
    ///
    /// Order of checks:
    /// 1. Approval flag — a step marked requires_approval without a recorded
    ///    human approval halts here. Never silently downgraded.
    /// 2. Capability allow list — the step's target capability must match one
    ///    of the mode's glob patterns.
    pub fn check_step(&self, step: &StepCheck<'_>) -> Result<(), PolicyViolation> {
        if step.requires_approval && !step.human_approved {
            return Err(PolicyViolation::ApprovalRequired { step: step.order });
        }

        if !self.capability_allowed(step.capability) {
            return Err(PolicyViolation::CapabilityDenied {
                capability: step.capability.to_string(),
                mode: self.mode.to_string(),
            });
        }

        Ok(())
    }

    /// Check whether a capability matches the mode's allow list.
    ///
    /// Invalid glob patterns never match (fail-closed, not fail-open).
    fn capability_allowed(&self, capability: &str) -> bool {
        self.allowed_capabilities.iter().any(|pattern| {
            Pattern::new(pattern)
                .map(|p| p.matches(capability))
                .unwrap_or(false)
        })
    }
}

/// The policy gate — a pure function from caller context to capabilities.
pub struct PolicyGate;

impl PolicyGate {
    /// Resolve capability flags for a (mode, role, admin) combination.
    ///
    /// Pure: same inputs always produce the same flags. There is no hidden
    /// lookup of ambient identity — callers pass everything explicitly.
    pub fn resolve(mode: OperatingMode, role: Role, is_admin: bool) -> Capabilities {
        let trust_level = match (mode, role, is_admin) {
            // Emulation never rises above the lowest tier, admin or not.
            (OperatingMode::Emulation, _, _) => TrustLevel::Observed,
            // Guests are always at the lowest tier.
            (_, Role::Guest, _) => TrustLevel::Observed,
            // Admins in autonomous mode get the bounded-autonomy tier.
            (OperatingMode::Autonomous, _, true) | (OperatingMode::Autonomous, Role::Admin, _) => {
                TrustLevel::Bounded
            }
            // Ordinary users in autonomous/dual mode are supervised.
            (OperatingMode::Autonomous, Role::User, false) => TrustLevel::Supervised,
            (OperatingMode::Dual, Role::Admin, _) | (OperatingMode::Dual, _, true) => {
                TrustLevel::Supervised
            }
            (OperatingMode::Dual, Role::User, false) => TrustLevel::Supervised,
        };

        let may_write_memory = !matches!(role, Role::Guest);
        // Emulation mode never invokes autonomous actions; guests never do.
        let may_invoke_autonomy =
            !matches!(mode, OperatingMode::Emulation) && !matches!(role, Role::Guest);
        let may_change_mode = is_admin || matches!(role, Role::Admin);
        let may_approve = may_change_mode;

        let allowed_capabilities = match mode {
            // Emulation: nothing may execute, so the allow list is empty.
            OperatingMode::Emulation => vec![],
            // Dual: read-mostly capabilities; everything else queues anyway.
            OperatingMode::Dual => vec![
                "research.*".to_string(),
                "memory.*".to_string(),
                "schedule.*".to_string(),
            ],
            // Autonomous: the full capability surface.
            OperatingMode::Autonomous => vec![
                "research.*".to_string(),
                "memory.*".to_string(),
                "schedule.*".to_string(),
                "messaging.*".to_string(),
                "files.*".to_string(),
                "finance.*".to_string(),
            ],
        };

        Capabilities {
            mode,
            role,
            may_write_memory,
            may_invoke_autonomy,
            may_change_mode,
            may_approve,
            trust_level,
            allowed_capabilities,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step<'a>(capability: &'a str, requires_approval: bool, approved: bool) -> StepCheck<'a> {
        StepCheck {
            order: 1,
            capability,
            requires_approval,
            human_approved: approved,
        }
    }

    #[test]
    fn resolve_is_pure() {
        let a = PolicyGate::resolve(OperatingMode::Autonomous, Role::User, false);
        let b = PolicyGate::resolve(OperatingMode::Autonomous, Role::User, false);
        assert_eq!(a, b);
    }

    #[test]
    fn guest_gets_lowest_tier_and_no_writes() {
        let caps = PolicyGate::resolve(OperatingMode::Autonomous, Role::Guest, false);
        assert_eq!(caps.trust_level, TrustLevel::Observed);
        assert!(!caps.may_write_memory);
        assert!(caps.assert_memory_write().is_err());
        assert!(caps.assert_autonomy().is_err());
    }

    #[test]
    fn emulation_mode_never_invokes_autonomy() {
        let caps = PolicyGate::resolve(OperatingMode::Emulation, Role::Admin, true);
        assert_eq!(caps.trust_level, TrustLevel::Observed);
        assert!(matches!(
            caps.assert_autonomy(),
            Err(PolicyViolation::AutonomyDenied { .. })
        ));
    }

    #[test]
    fn admin_in_autonomous_mode_gets_bounded_tier() {
        let caps = PolicyGate::resolve(OperatingMode::Autonomous, Role::Admin, true);
        assert_eq!(caps.trust_level, TrustLevel::Bounded);
        assert!(caps.assert_trust_at_least(TrustLevel::Bounded).is_ok());
    }

    #[test]
    fn user_below_required_tier_is_rejected() {
        let caps = PolicyGate::resolve(OperatingMode::Autonomous, Role::User, false);
        assert_eq!(caps.trust_level, TrustLevel::Supervised);
        let result = caps.assert_trust_at_least(TrustLevel::Bounded);
        assert!(matches!(
            result,
            Err(PolicyViolation::InsufficientTrust { .. })
        ));
    }

    #[test]
    fn step_requiring_approval_without_one_is_halted() {
        let caps = PolicyGate::resolve(OperatingMode::Autonomous, Role::Admin, true);
        let result = caps.check_step(&step("messaging.send", true, false));
        assert!(matches!(
            result,
            Err(PolicyViolation::ApprovalRequired { step: 1 })
        ));
    }

    #[test]
    fn approved_step_with_allowed_capability_passes() {
        let caps = PolicyGate::resolve(OperatingMode::Autonomous, Role::Admin, true);
        assert!(caps.check_step(&step("messaging.send", true, true)).is_ok());
    }

    #[test]
    fn capability_outside_allow_list_is_denied() {
        let caps = PolicyGate::resolve(OperatingMode::Dual, Role::User, false);
        // Dual mode does not allow messaging capabilities.
        let result = caps.check_step(&step("messaging.send", false, false));
        assert!(matches!(
            result,
            Err(PolicyViolation::CapabilityDenied { .. })
        ));
    }

    #[test]
    fn glob_patterns_match_capability_families() {
        let caps = PolicyGate::resolve(OperatingMode::Autonomous, Role::User, false);
        assert!(caps.check_step(&step("research.web_search", false, false)).is_ok());
        assert!(caps.check_step(&step("files.organize", false, false)).is_ok());
    }

    #[test]
    fn only_admins_approve_or_change_mode() {
        let user = PolicyGate::resolve(OperatingMode::Dual, Role::User, false);
        assert!(user.assert_approver().is_err());
        assert!(user.assert_mode_change().is_err());

        let admin = PolicyGate::resolve(OperatingMode::Dual, Role::Admin, false);
        assert!(admin.assert_approver().is_ok());
        assert!(admin.assert_mode_change().is_ok());
    }

    #[test]
    fn capabilities_serialize_for_audit() {
        let caps = PolicyGate::resolve(OperatingMode::Autonomous, Role::User, false);
        let json = serde_json::to_string(&caps).unwrap();
        assert!(json.contains("\"supervised\""));
        let restored: Capabilities = serde_json::from_str(&json).unwrap();
        assert_eq!(caps, restored);
    }
}
