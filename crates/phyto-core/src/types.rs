//! Shared request types for the diagnosis pipeline.

use std::{sync::Arc, time::Duration};

use crate::consensus::DiagnosisError;

/// Source identifier recorded for candidates extracted from a caller-supplied
/// seed result.
pub const SEED_SOURCE: &str = "seed-analysis";

/// A single diagnosis request handed to the consensus engine.
///
/// The image payload is an opaque encoded blob; the engine never interprets
/// it beyond fingerprinting it for cache keys and in-flight de-duplication.
/// The scope key (typically a user or session identifier) only namespaces
/// cache entries and is never sent upstream.
#[derive(Debug, Clone)]
pub struct DiagnosisRequest {
    /// Opaque encoded image bytes, shared cheaply across the fan-out.
    pub image: Arc<Vec<u8>>,
    /// Optional pre-computed partial result from an earlier analysis step.
    pub seed: Option<serde_json::Value>,
    /// Identifier recorded in `sources` when the seed yields candidates.
    pub seed_source: Arc<str>,
    /// Caller scope used to namespace cache keys.
    pub scope_key: String,
    /// Overall deadline for the fan-out and validation stages. When it
    /// expires the engine finalizes with whatever settled in time.
    pub deadline: Option<Duration>,
}

impl DiagnosisRequest {
    #[must_use]
    pub fn new(image: Vec<u8>, scope_key: impl Into<String>) -> Self {
        Self {
            image: Arc::new(image),
            seed: None,
            seed_source: Arc::from(SEED_SOURCE),
            scope_key: scope_key.into(),
            deadline: None,
        }
    }

    /// Attaches a pre-computed partial result to normalize ahead of fan-out.
    #[must_use]
    pub fn with_seed(mut self, seed: serde_json::Value) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Overrides the source identifier recorded for seed candidates.
    #[must_use]
    pub fn with_seed_source(mut self, source: impl AsRef<str>) -> Self {
        self.seed_source = Arc::from(source.as_ref());
        self
    }

    #[must_use]
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Checks the caller contract. Violations fail fast and are never
    /// retried or cached.
    ///
    /// # Errors
    ///
    /// Returns [`DiagnosisError::InvalidRequest`] if the image payload is
    /// empty or the scope key is blank.
    pub fn validate(&self) -> Result<(), DiagnosisError> {
        if self.image.is_empty() {
            return Err(DiagnosisError::InvalidRequest("image payload is empty".to_string()));
        }
        if self.scope_key.trim().is_empty() {
            return Err(DiagnosisError::InvalidRequest("scope key is empty".to_string()));
        }
        Ok(())
    }

    /// Stable fingerprint of the image payload, used for cache keys and
    /// in-flight de-duplication keys.
    #[must_use]
    pub fn fingerprint(&self) -> u64 {
        use std::hash::{Hash, Hasher};
        let mut hasher = ahash::AHasher::default();
        self.image.hash(&mut hasher);
        hasher.finish()
    }
}
