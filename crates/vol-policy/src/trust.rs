// trust.rs — Operating modes, caller roles, trust tiers, and risk levels.
//
// These four enums are the vocabulary of the policy gate:
// - OperatingMode selects which graph runs and the default autonomy posture.
// - Role is who the caller is (from the session, passed explicitly).
// - TrustLevel is the authorized autonomy tier — totally ordered.
// - RiskLevel annotates plans and steps, and maps to a required TrustLevel.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The named operating configuration the runtime is in.
///
/// The mode selects which graph definition handles input and what the
/// default trust posture is. It is part of the execution context and is
/// passed explicitly — never read from ambient state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OperatingMode {
    /// Full pipeline with auto-approval for low-risk plans.
    Autonomous,
    /// Full pipeline, but every plan queues for human approval.
    Dual,
    /// Detection and planning only — no autonomous actions at all.
    Emulation,
}

impl fmt::Display for OperatingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperatingMode::Autonomous => write!(f, "autonomous"),
            OperatingMode::Dual => write!(f, "dual"),
            OperatingMode::Emulation => write!(f, "emulation"),
        }
    }
}

/// The caller's role, resolved by the (external) session layer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Unauthenticated or read-only caller.
    Guest,
    /// A normal authenticated user.
    User,
    /// An administrator.
    Admin,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Guest => write!(f, "guest"),
            Role::User => write!(f, "user"),
            Role::Admin => write!(f, "admin"),
        }
    }
}

/// An authorized autonomy tier.
///
/// Derives `Ord` so tiers compare directly: `Observed < Supervised < Bounded`.
/// A plan may only execute when the caller's tier is at least the plan's
/// required tier.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TrustLevel {
    /// Lowest tier — every action is visible, nothing sensitive runs alone.
    Observed,
    /// Medium-risk actions allowed with supervision (approval queue).
    Supervised,
    /// Bounded autonomy — high-risk plans may run once approved.
    Bounded,
}

impl fmt::Display for TrustLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrustLevel::Observed => write!(f, "observed"),
            TrustLevel::Supervised => write!(f, "supervised"),
            TrustLevel::Bounded => write!(f, "bounded"),
        }
    }
}

/// Risk classification for a desire, plan, or individual step.
///
/// Ordered so `max()` over step risks yields the plan's aggregate risk.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    None,
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// The trust tier required to execute at this risk level.
    ///
    /// none/low → lowest tier, medium → supervised tier,
    /// high/critical → bounded-autonomy tier.
    pub fn required_trust(&self) -> TrustLevel {
        match self {
            RiskLevel::None | RiskLevel::Low => TrustLevel::Observed,
            RiskLevel::Medium => TrustLevel::Supervised,
            RiskLevel::High | RiskLevel::Critical => TrustLevel::Bounded,
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskLevel::None => write!(f, "none"),
            RiskLevel::Low => write!(f, "low"),
            RiskLevel::Medium => write!(f, "medium"),
            RiskLevel::High => write!(f, "high"),
            RiskLevel::Critical => write!(f, "critical"),
        }
    }
}
