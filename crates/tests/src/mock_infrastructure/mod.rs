//! Mock infrastructure for testing the diagnosis consensus core.
//!
//! Provides scripted in-process collaborators so tests exercise the full
//! engine without real network connections:
//!
//! - [`MockClassifier`]: scripted classifier with observable call counts,
//!   optional response delays, and fail-N-times-then-recover scripts
//! - [`MockRegistry`]: taxonomic registry matching a fixed name set
//!
//! ## Usage
//!
//! ```ignore
//! use tests::mock_infrastructure::{MockBehavior, MockClassifier};
//!
//! let classifier = MockClassifier::new(
//!     "leaf-vision",
//!     MockBehavior::Respond(serde_json::json!([{ "label": "rust", "score": 0.4 }])),
//! );
//! ```

use std::{
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use phyto_core::{
    taxonomy::{TaxonRecord, TaxonomyRegistry},
    upstream::{Classifier, ClassifierConfig, UpstreamError},
};
use serde_json::Value;

/// Scripted classifier behavior.
pub enum MockBehavior {
    /// Respond immediately with the payload.
    Respond(Value),
    /// Respond with the payload after a fixed delay.
    RespondAfter(Value, Duration),
    /// Fail every call with a transient (retryable) error.
    FailTransient,
    /// Fail every call with a permanent (non-retryable) error.
    FailPermanent,
    /// Fail the first `n` calls transiently, then respond with the payload.
    FailTransientTimes(u32, Value),
}

/// Classifier whose behavior is scripted and whose call count is
/// observable.
pub struct MockClassifier {
    config: ClassifierConfig,
    behavior: MockBehavior,
    calls: AtomicU32,
}

impl MockClassifier {
    #[must_use]
    pub fn new(name: &str, behavior: MockBehavior) -> Arc<Self> {
        Arc::new(Self { config: ClassifierConfig::new(name), behavior, calls: AtomicU32::new(0) })
    }

    /// Total `classify` invocations observed so far.
    #[must_use]
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Classifier for MockClassifier {
    fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    async fn classify(&self, _image: &[u8]) -> Result<Value, UpstreamError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        match &self.behavior {
            MockBehavior::Respond(payload) => Ok(payload.clone()),
            MockBehavior::RespondAfter(payload, delay) => {
                tokio::time::sleep(*delay).await;
                Ok(payload.clone())
            }
            MockBehavior::FailTransient => Err(UpstreamError::ConnectionFailed("scripted".into())),
            MockBehavior::FailPermanent => {
                Err(UpstreamError::InvalidResponse("scripted".into()))
            }
            MockBehavior::FailTransientTimes(n, payload) => {
                if call <= *n {
                    Err(UpstreamError::Timeout)
                } else {
                    Ok(payload.clone())
                }
            }
        }
    }
}

/// Registry matching a fixed set of names (case-insensitively), returning
/// one fungal record per match.
pub struct MockRegistry {
    matches: Vec<String>,
    calls: AtomicU32,
}

impl MockRegistry {
    #[must_use]
    pub fn matching(names: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            matches: names.iter().map(|name| name.to_lowercase()).collect(),
            calls: AtomicU32::new(0),
        })
    }

    #[must_use]
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TaxonomyRegistry for MockRegistry {
    async fn search(&self, name: &str) -> Result<Vec<TaxonRecord>, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let needle = name.to_lowercase();
        if self.matches.contains(&needle) {
            Ok(vec![TaxonRecord {
                code: format!("REG-{}", needle.replace(' ', "-")),
                preferred_name: name.to_string(),
                kingdom: Some("Fungi".to_string()),
                family: Some("Peronosporaceae".to_string()),
                genus: Some("Phytophthora".to_string()),
            }])
        } else {
            Ok(Vec::new())
        }
    }
}
