//! Consensus configuration types and defaults.
//!
//! The decision-rule constants (health threshold, validation boost, default
//! validated probability) carry the values the product shipped with. They
//! have no statistical derivation; they are exposed as named, overridable
//! fields rather than re-tuned.

use serde::{Deserialize, Serialize};

use crate::upstream::InvokerConfig;

/// Configuration for the consensus engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusConfig {
    /// A top-ranked candidate at or above this probability flips the
    /// verdict to unhealthy (default: 0.5).
    #[serde(default = "default_health_threshold")]
    pub health_threshold: f64,

    /// Probability added to a registry-corroborated candidate, capped at
    /// 1.0 (default: 0.15).
    #[serde(default = "default_validation_boost")]
    pub validation_boost: f64,

    /// Probability assumed for an unscored candidate when it is
    /// corroborated (default: 0.6).
    #[serde(default = "default_validated_probability")]
    pub default_validated_probability: f64,

    /// How many top-ranked candidates are cross-checked against the
    /// registry (default: 3).
    #[serde(default = "default_validate_top_n")]
    pub validate_top_n: usize,

    /// TTL in seconds for cached verdicts (default: 600).
    #[serde(default = "default_verdict_ttl_seconds")]
    pub verdict_ttl_seconds: u64,

    /// Retry/backoff policy for classifier calls.
    #[serde(default)]
    pub invoker: InvokerConfig,
}

fn default_health_threshold() -> f64 {
    0.5
}

fn default_validation_boost() -> f64 {
    0.15
}

fn default_validated_probability() -> f64 {
    0.6
}

fn default_validate_top_n() -> usize {
    3
}

fn default_verdict_ttl_seconds() -> u64 {
    600
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            health_threshold: default_health_threshold(),
            validation_boost: default_validation_boost(),
            default_validated_probability: default_validated_probability(),
            validate_top_n: default_validate_top_n(),
            verdict_ttl_seconds: default_verdict_ttl_seconds(),
            invoker: InvokerConfig::default(),
        }
    }
}
