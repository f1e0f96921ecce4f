//! Taxonomic registry lookup and candidate-name corroboration.
//!
//! The registry itself is an external collaborator behind the
//! [`TaxonomyRegistry`] trait; [`TaxonomyValidator`] adds query validation,
//! resilient invocation, and kingdom filtering on top of it.

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::upstream::{InvokeError, InvokerConfig, ResilientInvoker, UpstreamError};

/// Kingdoms treated as plausible plant-disease agents.
const PATHOGEN_KINGDOMS: [&str; 4] = ["fungi", "bacteria", "viruses", "chromista"];

/// One authoritative record returned by the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxonRecord {
    /// Registry code uniquely identifying the record.
    pub code: String,
    /// Preferred display name.
    pub preferred_name: String,
    /// Coarse taxonomic classification, when the registry supplies it.
    pub kingdom: Option<String>,
    pub family: Option<String>,
    pub genus: Option<String>,
}

/// Coarse filter applied to registry matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaxonKind {
    /// Kingdoms consistent with fungi, bacteria, and viruses.
    Pathogen,
    /// The plant kingdom only.
    Plant,
    /// No kingdom filtering.
    Any,
}

impl TaxonKind {
    fn matches(self, record: &TaxonRecord) -> bool {
        match self {
            Self::Any => true,
            Self::Pathogen => record
                .kingdom
                .as_deref()
                .is_some_and(|k| PATHOGEN_KINGDOMS.contains(&k.to_lowercase().as_str())),
            Self::Plant => record
                .kingdom
                .as_deref()
                .is_some_and(|k| k.eq_ignore_ascii_case("plantae")),
        }
    }
}

impl fmt::Display for TaxonKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pathogen => write!(f, "pathogen"),
            Self::Plant => write!(f, "plant"),
            Self::Any => write!(f, "any"),
        }
    }
}

/// External taxonomic registry collaborator.
///
/// Implementations return every match for a free-text name; kingdom
/// filtering is the validator's job.
#[async_trait]
pub trait TaxonomyRegistry: Send + Sync {
    /// Searches the registry for records matching a free-text name.
    ///
    /// # Errors
    ///
    /// Returns [`UpstreamError`] on transport or protocol failure.
    async fn search(&self, name: &str) -> Result<Vec<TaxonRecord>, UpstreamError>;
}

/// Corroborates candidate disease names against the registry.
pub struct TaxonomyValidator {
    registry: Arc<dyn TaxonomyRegistry>,
    invoker: ResilientInvoker<Vec<TaxonRecord>>,
}

impl TaxonomyValidator {
    #[must_use]
    pub fn new(registry: Arc<dyn TaxonomyRegistry>) -> Self {
        Self::with_invoker_config(registry, InvokerConfig::default())
    }

    #[must_use]
    pub fn with_invoker_config(registry: Arc<dyn TaxonomyRegistry>, config: InvokerConfig) -> Self {
        Self { registry, invoker: ResilientInvoker::new(config) }
    }

    /// Looks up a free-text name, returning the matching records for the
    /// requested kind.
    ///
    /// Concurrent lookups for the same name and kind share one registry
    /// call.
    ///
    /// # Errors
    ///
    /// An empty (post-trim) search string is an input-contract violation.
    /// Transport failures surface as [`InvokeError`]; callers deciding
    /// consensus treat any failure as "zero matching records".
    pub async fn lookup(
        &self,
        name: &str,
        kind: TaxonKind,
    ) -> Result<Vec<TaxonRecord>, InvokeError> {
        let query = name.trim();
        if query.is_empty() {
            return Err(InvokeError::upstream(UpstreamError::InvalidRequest(
                "taxonomy search string is empty".to_string(),
            )));
        }

        let key = format!("taxonomy:{}:{}", kind, query.to_lowercase());
        let registry = Arc::clone(&self.registry);
        let query_owned = query.to_string();

        let records = self
            .invoker
            .invoke(
                move || {
                    let registry = Arc::clone(&registry);
                    let query = query_owned.clone();
                    async move { registry.search(&query).await }
                },
                Some(&key),
                "taxonomy-lookup",
            )
            .await?;

        let matches: Vec<TaxonRecord> =
            records.into_iter().filter(|record| kind.matches(record)).collect();
        debug!(query = %query, kind = %kind, matches = matches.len(), "taxonomy lookup complete");
        Ok(matches)
    }

    /// Non-retried availability probe against the registry.
    pub async fn health_check(&self) -> bool {
        let registry = Arc::clone(&self.registry);
        self.invoker
            .health_check(move || async move { registry.search("Phytophthora").await.map(|_| ()) })
            .await
    }
}
