//! Candidate and verdict types for the diagnosis consensus.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// One classifier's claim about a possible disease.
///
/// The identity key for merging is the lower-cased trimmed name; candidates
/// are duplicates iff those keys match exactly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiseaseCandidate {
    /// Non-empty, trimmed disease name.
    pub name: String,

    /// Score in `[0, 1]`; `None` means the source did not score the claim.
    #[serde(default)]
    pub probability: Option<f64>,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub symptoms: Vec<String>,

    /// Opaque structured-or-textual treatment payload, passed through
    /// untouched.
    #[serde(default)]
    pub treatment: Option<serde_json::Value>,
}

impl DiseaseCandidate {
    /// Creates an unscored candidate. The name is stored trimmed.
    #[must_use]
    pub fn new(name: impl AsRef<str>) -> Self {
        Self {
            name: name.as_ref().trim().to_string(),
            probability: None,
            description: None,
            symptoms: Vec::new(),
            treatment: None,
        }
    }

    #[must_use]
    pub fn with_probability(mut self, probability: f64) -> Self {
        self.probability = Some(probability);
        self
    }

    /// Case-insensitive identity key used for merging.
    #[must_use]
    pub fn merge_key(&self) -> String {
        self.name.trim().to_lowercase()
    }

    /// Probability with the "missing means unscored" convention collapsed
    /// to 0 for ranking.
    #[must_use]
    pub fn rank_probability(&self) -> f64 {
        self.probability.unwrap_or(0.0)
    }

    /// Folds a duplicate claim into this one: max-wins for the score,
    /// first-write-wins for the descriptive fields.
    pub(crate) fn absorb(&mut self, other: DiseaseCandidate) {
        self.probability = match (self.probability, other.probability) {
            (Some(existing), Some(incoming)) => Some(existing.max(incoming)),
            (existing, incoming) => existing.or(incoming),
        };
        if self.description.is_none() {
            self.description = other.description;
        }
        if self.symptoms.is_empty() {
            self.symptoms = other.symptoms;
        }
        if self.treatment.is_none() {
            self.treatment = other.treatment;
        }
    }
}

/// The engine's confidence-scored output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusVerdict {
    pub is_healthy: bool,

    /// Merged candidates, sorted descending by probability (missing = 0),
    /// ties broken by first-seen order.
    pub diseases: Vec<DiseaseCandidate>,

    /// Normalized names of top candidates corroborated by the registry.
    /// Set semantics in insertion order.
    pub validated_by_registry: Vec<String>,

    /// Identifiers of sources that contributed at least one candidate,
    /// insertion order, no duplicates.
    pub sources: Vec<Arc<str>>,
}

impl ConsensusVerdict {
    /// The well-formed "no data" verdict: healthy, nothing found.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            is_healthy: true,
            diseases: Vec::new(),
            validated_by_registry: Vec::new(),
            sources: Vec::new(),
        }
    }
}
