//! Classifier collaborator trait and per-classifier configuration.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::errors::UpstreamError;

/// Configuration for a single classifier collaborator.
///
/// Injected at construction time; the engine never reads classifier
/// identity or feature switches from ambient global state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Stable identifier recorded in `ConsensusVerdict::sources`.
    pub name: Arc<str>,

    /// Disabled classifiers are skipped during fan-out.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Per-call timeout for this classifier (default: 20).
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

fn default_enabled() -> bool {
    true
}

fn default_timeout_seconds() -> u64 {
    20
}

impl ClassifierConfig {
    #[must_use]
    pub fn new(name: impl AsRef<str>) -> Self {
        Self {
            name: Arc::from(name.as_ref()),
            enabled: default_enabled(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

/// A remote disease-classification service.
///
/// Implementations are opaque remote calls owned by the surrounding
/// application; the consensus core only requires that a call eventually
/// yields some loosely-typed JSON payload. Each collaborator returns its
/// own ad hoc shape, which [`crate::consensus::normalize`] maps into the
/// canonical candidate model.
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Configuration injected at construction.
    fn config(&self) -> &ClassifierConfig;

    /// Classifies an opaque image payload.
    ///
    /// # Errors
    ///
    /// Returns [`UpstreamError`] on transport or protocol failure; the
    /// engine classifies the failure and decides whether to retry.
    async fn classify(&self, image: &[u8]) -> Result<serde_json::Value, UpstreamError>;
}
