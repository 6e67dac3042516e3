// config.rs — Tunables for the desire lifecycle, loaded from volition.toml.
//
// Every field has a serde default, so a partial (or missing) config file
// yields a fully usable configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use vol_policy::RiskLevel;

use crate::error::DesireError;

/// Top-level lifecycle configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DesireConfig {
    #[serde(default)]
    pub detection: DetectionConfig,

    #[serde(default)]
    pub reinforcement: ReinforcementConfig,

    #[serde(default)]
    pub approval: ApprovalConfig,

    #[serde(default)]
    pub execution: ExecutionConfig,

    #[serde(default)]
    pub limits: LimitsConfig,
}

/// Goal-detection thresholds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DetectionConfig {
    /// Minimum detector confidence for input to become a desire.
    #[serde(default = "default_detection_threshold")]
    pub confidence_threshold: f64,

    /// Similarity at or above which a new detection reinforces an existing
    /// desire instead of creating one.
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: default_detection_threshold(),
            similarity_threshold: default_similarity_threshold(),
        }
    }
}

/// Strength reinforcement and decay.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReinforcementConfig {
    /// Strength added per reinforcement, before the bound applies.
    #[serde(default = "default_reinforcement_increment")]
    pub increment: f64,

    /// Hard cap on the strength added by any single reinforcement.
    #[serde(default = "default_reinforcement_bound")]
    pub max_increase: f64,

    /// Strength lost per day without reinforcement, applied to new desires.
    #[serde(default = "default_decay_rate")]
    pub decay_rate: f64,
}

impl Default for ReinforcementConfig {
    fn default() -> Self {
        Self {
            increment: default_reinforcement_increment(),
            max_increase: default_reinforcement_bound(),
            decay_rate: default_decay_rate(),
        }
    }
}

/// Auto-approval rules for the verdict stage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApprovalConfig {
    /// Minimum combined review score for auto-approval.
    #[serde(default = "default_auto_approve_score")]
    pub auto_approve_min_score: f64,

    /// Highest plan risk auto-approval will accept. Anything above queues
    /// for a human.
    #[serde(default = "default_auto_approve_risk")]
    pub auto_approve_max_risk: RiskLevel,
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            auto_approve_min_score: default_auto_approve_score(),
            auto_approve_max_risk: default_auto_approve_risk(),
        }
    }
}

/// Execution timing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionConfig {
    /// Wall-clock budget for one whole graph run, in seconds.
    #[serde(default = "default_graph_timeout")]
    pub graph_timeout_secs: u64,

    /// Budget for one plan step, in seconds.
    #[serde(default = "default_step_timeout")]
    pub step_timeout_secs: u64,

    /// Writer lease duration over a desire folder, in seconds.
    #[serde(default = "default_lock_lease")]
    pub lock_lease_secs: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            graph_timeout_secs: default_graph_timeout(),
            step_timeout_secs: default_step_timeout(),
            lock_lease_secs: default_lock_lease(),
        }
    }
}

/// Hard spending limits, enforced at review time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LimitsConfig {
    /// Maximum USD a single plan may commit to. Plans over this limit are
    /// rejected at safety review regardless of reviewer scores.
    #[serde(default = "default_financial_cap")]
    pub financial_cap_usd: f64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            financial_cap_usd: default_financial_cap(),
        }
    }
}

// Serde default functions
fn default_detection_threshold() -> f64 {
    0.6
}

fn default_similarity_threshold() -> f64 {
    0.4
}

fn default_reinforcement_increment() -> f64 {
    0.1
}

fn default_reinforcement_bound() -> f64 {
    0.1
}

fn default_decay_rate() -> f64 {
    0.01
}

fn default_auto_approve_score() -> f64 {
    0.7
}

fn default_auto_approve_risk() -> RiskLevel {
    RiskLevel::Low
}

fn default_graph_timeout() -> u64 {
    120
}

fn default_step_timeout() -> u64 {
    30
}

fn default_lock_lease() -> u64 {
    60
}

fn default_financial_cap() -> f64 {
    20.0
}

impl DesireConfig {
    /// Parse a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, DesireError> {
        toml::from_str(text).map_err(|err| DesireError::Config(err.to_string()))
    }

    /// Load from a file path.
    pub fn load(path: &Path) -> Result<Self, DesireError> {
        let text = std::fs::read_to_string(path).map_err(|source| DesireError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Load if the file exists, otherwise use all defaults.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }
}
