//! Consensus engine implementation for multi-classifier diagnosis.
//!
//! This module provides the `ConsensusEngine` which orchestrates one
//! diagnosis: seed normalization, concurrent classifier fan-out, candidate
//! merging and ranking, the health decision, and registry validation of the
//! top candidates. The merge/rank rules live in [`super::merge`]; payload
//! normalization lives in [`super::normalize`].

use std::{sync::Arc, time::Duration};

use futures_util::{stream::FuturesUnordered, StreamExt};
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{
    config::ConsensusConfig,
    merge, normalize,
    types::{ConsensusVerdict, DiseaseCandidate},
};
use crate::{
    cache::ResultCache,
    taxonomy::{TaxonKind, TaxonomyValidator},
    types::DiagnosisRequest,
    upstream::{Classifier, ResilientInvoker, UpstreamError},
};

/// Errors the engine surfaces to its caller.
///
/// Everything except a caller contract violation degrades gracefully into a
/// smaller `sources`/`diseases` set instead of erroring.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DiagnosisError {
    /// The request violated the caller contract (empty image payload or
    /// blank scope key). Never retried, never cached.
    #[error("Invalid diagnosis request: {0}")]
    InvalidRequest(String),
}

/// Best-effort side effect invoked after a verdict is finalized.
///
/// Hooks run on spawned tasks; their failures are logged and never awaited
/// for correctness.
#[async_trait::async_trait]
pub trait DiagnosisHook: Send + Sync {
    fn name(&self) -> &str;

    /// Observes a finalized verdict.
    ///
    /// # Errors
    ///
    /// Any error is logged by the engine and otherwise ignored.
    async fn on_verdict(
        &self,
        verdict: &ConsensusVerdict,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Orchestrates the diagnosis state machine:
///
/// `NORMALIZE-SEED → FANOUT → MERGE → RANK → HEALTH-DECISION →
/// VALIDATE-TOP-N → FINALIZE`
///
/// The engine owns the merge/rank logic and is the sole writer of
/// [`ConsensusVerdict`]; collaborators only ever contribute raw payloads.
pub struct ConsensusEngine {
    config: ConsensusConfig,
    classifiers: Vec<Arc<dyn Classifier>>,
    invoker: Arc<ResilientInvoker<serde_json::Value>>,
    validator: Option<Arc<TaxonomyValidator>>,
    cache: Option<Arc<ResultCache>>,
    hooks: Vec<Arc<dyn DiagnosisHook>>,
}

impl ConsensusEngine {
    #[must_use]
    pub fn new(config: ConsensusConfig) -> Self {
        let invoker = Arc::new(ResilientInvoker::new(config.invoker.clone()));
        Self {
            config,
            classifiers: Vec::new(),
            invoker,
            validator: None,
            cache: None,
            hooks: Vec::new(),
        }
    }

    /// Registers a classifier collaborator for the fan-out.
    #[must_use]
    pub fn with_classifier(mut self, classifier: Arc<dyn Classifier>) -> Self {
        self.classifiers.push(classifier);
        self
    }

    /// Attaches the taxonomy validator used for VALIDATE-TOP-N. Without
    /// one, validation is skipped and no candidate is boosted.
    #[must_use]
    pub fn with_validator(mut self, validator: Arc<TaxonomyValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Attaches the result cache for verdict reuse.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<ResultCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Registers a post-completion hook.
    #[must_use]
    pub fn with_hook(mut self, hook: Arc<dyn DiagnosisHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    /// Runs one diagnosis to a confidence-scored verdict.
    ///
    /// Total failure of every upstream (including the seed) still produces
    /// a well-formed healthy, empty verdict.
    ///
    /// # Errors
    ///
    /// Only [`DiagnosisError::InvalidRequest`]; every upstream failure
    /// mode degrades into a smaller verdict instead.
    pub async fn diagnose(
        &self,
        request: DiagnosisRequest,
    ) -> Result<ConsensusVerdict, DiagnosisError> {
        request.validate()?;

        let started = Instant::now();
        let fingerprint = request.fingerprint();
        let cache_key = verdict_cache_key(&request.scope_key, fingerprint);

        if let Some(cache) = &self.cache {
            if let Some(verdict) = cache.get::<ConsensusVerdict>(&cache_key) {
                debug!(scope = %request.scope_key, "serving diagnosis verdict from cache");
                return Ok(verdict);
            }
        }

        let deadline = request.deadline.map(|d| started + d);

        // NORMALIZE-SEED
        let mut candidates: Vec<DiseaseCandidate> = Vec::new();
        let mut sources: Vec<Arc<str>> = Vec::new();
        let mut seed_unhealthy = false;

        if let Some(seed) = &request.seed {
            seed_unhealthy = normalize::asserts_unhealthy(seed);
            let seeded = normalize::extract_candidates(seed);
            if seeded.is_empty() {
                debug!(source = %request.seed_source, "seed result yielded no usable candidates");
            } else {
                push_source(&mut sources, Arc::clone(&request.seed_source));
                merge::merge_into(&mut candidates, seeded);
            }
        }

        // FANOUT: settle all, fail none
        let outcomes = self.fan_out(&request, fingerprint, deadline).await;
        for (name, outcome) in outcomes {
            match outcome {
                Ok(payload) => {
                    let extracted = normalize::extract_candidates(&payload);
                    if extracted.is_empty() {
                        debug!(source = %name, "classifier returned no usable candidates");
                    } else {
                        // MERGE
                        push_source(&mut sources, name);
                        merge::merge_into(&mut candidates, extracted);
                    }
                }
                Err(err) => {
                    warn!(source = %name, error = %err, "classifier contributed nothing");
                }
            }
        }

        // RANK
        merge::rank(&mut candidates);

        // HEALTH-DECISION
        let top_probability = candidates.first().map_or(0.0, DiseaseCandidate::rank_probability);
        let is_healthy = !seed_unhealthy && top_probability < self.config.health_threshold;

        // VALIDATE-TOP-N
        let validated_by_registry = self.validate_top(&mut candidates, deadline).await;

        let verdict = ConsensusVerdict { is_healthy, diseases: candidates, validated_by_registry, sources };

        // FINALIZE
        if let Some(cache) = &self.cache {
            cache.set(
                &cache_key,
                &verdict,
                Some(Duration::from_secs(self.config.verdict_ttl_seconds)),
            );
        }
        self.dispatch_hooks(&verdict);

        info!(
            scope = %request.scope_key,
            duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            sources = verdict.sources.len(),
            diseases = verdict.diseases.len(),
            validated = verdict.validated_by_registry.len(),
            healthy = verdict.is_healthy,
            "diagnosis consensus complete"
        );
        Ok(verdict)
    }

    /// Drops every cached verdict in a caller scope, e.g. after the caller
    /// uploads a corrected image for the same plant.
    pub fn invalidate_scope(&self, scope_key: &str) {
        let Some(cache) = &self.cache else {
            return;
        };
        match regex::Regex::new(&format!("^diagnosis:{}:", regex::escape(scope_key))) {
            Ok(pattern) => cache.invalidate_pattern(&pattern),
            Err(err) => warn!(error = %err, "failed to build scope invalidation pattern"),
        }
    }

    /// Issues the classifier calls concurrently and collects per-call
    /// success-or-failure without short-circuiting.
    async fn fan_out(
        &self,
        request: &DiagnosisRequest,
        fingerprint: u64,
        deadline: Option<Instant>,
    ) -> Vec<(Arc<str>, Result<serde_json::Value, crate::upstream::InvokeError>)> {
        let mut calls = FuturesUnordered::new();

        for classifier in &self.classifiers {
            let config = classifier.config();
            if !config.enabled {
                debug!(source = %config.name, "classifier disabled, skipping");
                continue;
            }

            let name = Arc::clone(&config.name);
            let timeout = Duration::from_secs(config.timeout_seconds);
            let invoker = Arc::clone(&self.invoker);
            let key = format!("classify:{name}:{fingerprint:016x}");

            let op = {
                let classifier = Arc::clone(classifier);
                let image = Arc::clone(&request.image);
                move || {
                    let classifier = Arc::clone(&classifier);
                    let image = Arc::clone(&image);
                    async move {
                        match tokio::time::timeout(timeout, classifier.classify(image.as_slice()))
                            .await
                        {
                            Ok(result) => result,
                            Err(_) => Err(UpstreamError::Timeout),
                        }
                    }
                }
            };

            calls.push(async move {
                let result = invoker.invoke(op, Some(&key), name.as_ref()).await;
                (name, result)
            });
        }

        settle_all(&mut calls, deadline, "fanout").await
    }

    /// Cross-checks the top-ranked candidates against the registry,
    /// boosting and re-ranking the corroborated ones.
    async fn validate_top(
        &self,
        candidates: &mut Vec<DiseaseCandidate>,
        deadline: Option<Instant>,
    ) -> Vec<String> {
        let Some(validator) = &self.validator else {
            return Vec::new();
        };
        if candidates.is_empty() {
            return Vec::new();
        }

        let mut lookups = FuturesUnordered::new();
        for candidate in candidates.iter().take(self.config.validate_top_n) {
            let validator = Arc::clone(validator);
            let display_name = candidate.name.clone();
            let key = candidate.merge_key();
            lookups.push(async move {
                let outcome = validator.lookup(&display_name, TaxonKind::Pathogen).await;
                (key, outcome)
            });
        }

        let mut validated = Vec::new();
        for (key, outcome) in settle_all(&mut lookups, deadline, "validate-top").await {
            match outcome {
                Ok(records) if !records.is_empty() => {
                    self.boost_candidate(candidates, &key);
                    if !validated.contains(&key) {
                        validated.push(key);
                    }
                }
                Ok(_) => {
                    debug!(candidate = %key, "no matching registry records");
                }
                Err(err) => {
                    warn!(candidate = %key, error = %err, "registry validation unavailable");
                }
            }
        }

        if !validated.is_empty() {
            merge::rank(candidates);
        }
        validated
    }

    fn boost_candidate(&self, candidates: &mut [DiseaseCandidate], key: &str) {
        if let Some(candidate) = candidates.iter_mut().find(|c| c.merge_key() == key) {
            let base = candidate.probability.unwrap_or(self.config.default_validated_probability);
            candidate.probability = Some((base + self.config.validation_boost).min(1.0));
        }
    }

    fn dispatch_hooks(&self, verdict: &ConsensusVerdict) {
        for hook in &self.hooks {
            let hook = Arc::clone(hook);
            let verdict = verdict.clone();
            tokio::spawn(async move {
                if let Err(err) = hook.on_verdict(&verdict).await {
                    warn!(hook = %hook.name(), error = %err, "post-diagnosis hook failed");
                }
            });
        }
    }
}

fn verdict_cache_key(scope_key: &str, fingerprint: u64) -> String {
    format!("diagnosis:{scope_key}:{fingerprint:016x}")
}

fn push_source(sources: &mut Vec<Arc<str>>, source: Arc<str>) {
    if !sources.iter().any(|existing| existing == &source) {
        sources.push(source);
    }
}

/// Awaits every future, collecting outcomes as they settle. With a deadline,
/// collection stops when it expires and still-pending calls are abandoned;
/// nothing is retried past the deadline.
async fn settle_all<F, T>(
    futures: &mut FuturesUnordered<F>,
    deadline: Option<Instant>,
    stage: &str,
) -> Vec<T>
where
    F: std::future::Future<Output = T>,
{
    let mut settled = Vec::new();
    match deadline {
        None => {
            while let Some(outcome) = futures.next().await {
                settled.push(outcome);
            }
        }
        Some(deadline) => {
            let expiry = tokio::time::sleep_until(deadline);
            tokio::pin!(expiry);
            while !futures.is_empty() {
                tokio::select! {
                    biased;
                    Some(outcome) = futures.next() => settled.push(outcome),
                    () = &mut expiry => {
                        warn!(
                            stage = %stage,
                            settled = settled.len(),
                            abandoned = futures.len(),
                            "deadline reached, abandoning in-flight calls"
                        );
                        break;
                    }
                }
            }
        }
    }
    settled
}
