//! Resilient invocation wrapper for remote collaborator calls.
//!
//! [`ResilientInvoker`] adds two behaviors in front of any upstream call:
//!
//! - **In-flight de-duplication**: callers supplying the same key while an
//!   identical operation is outstanding attach to the original call's shared
//!   result instead of issuing a duplicate request. The registry entry is
//!   removed exactly once, when the driving task settles, regardless of how
//!   many callers are waiting.
//! - **Transient-failure retry**: failures on the explicit transient
//!   allow-list ([`UpstreamError::is_transient`]) are retried with bounded
//!   exponential backoff; everything else propagates immediately.
//!
//! There is deliberately no circuit-breaker open state here. The shared
//! retry counter and "currently retrying" flag are the only cross-operation
//! coordination, which is appropriate to the single-digit fan-out widths the
//! diagnosis pipeline issues.

use std::{
    future::Future,
    sync::{
        atomic::{AtomicBool, AtomicU32, Ordering},
        Arc,
    },
    time::Duration,
};

use dashmap::{mapref::entry::Entry, DashMap};
use futures_util::future::{BoxFuture, FutureExt, Shared};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::errors::{InvokeError, UpstreamError};

type SharedAttempt<T> = Shared<BoxFuture<'static, Result<T, InvokeError>>>;

/// Configuration for retry and health-probe behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvokerConfig {
    /// Maximum retries after the initial attempt (default: 3).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base backoff delay in milliseconds; attempt `n` waits
    /// `min(base * 2^n, cap)` (default: 100).
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Upper bound on a single backoff delay in milliseconds
    /// (default: 5000).
    #[serde(default = "default_backoff_cap_ms")]
    pub backoff_cap_ms: u64,

    /// Timeout applied to the non-retried health probe in milliseconds
    /// (default: 1500).
    #[serde(default = "default_health_probe_timeout_ms")]
    pub health_probe_timeout_ms: u64,
}

fn default_max_retries() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    100
}

fn default_backoff_cap_ms() -> u64 {
    5000
}

fn default_health_probe_timeout_ms() -> u64 {
    1500
}

impl Default for InvokerConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_cap_ms: default_backoff_cap_ms(),
            health_probe_timeout_ms: default_health_probe_timeout_ms(),
        }
    }
}

/// Retry state shared by every operation routed through one invoker
/// instance.
///
/// The counter and flag are instance-scoped: independent invokers (one per
/// collaborator family) never share a backoff sequence.
#[derive(Clone)]
struct RetryPolicy {
    config: InvokerConfig,
    retry_count: Arc<AtomicU32>,
    retrying: Arc<AtomicBool>,
}

impl RetryPolicy {
    fn new(config: InvokerConfig) -> Self {
        Self {
            config,
            retry_count: Arc::new(AtomicU32::new(0)),
            retrying: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Runs the operation to a terminal outcome, retrying transient
    /// failures up to the configured budget.
    async fn run<F, Fut, R>(&self, op: F, name: &str) -> Result<R, InvokeError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<R, UpstreamError>>,
    {
        let mut attempt: u32 = 0;
        loop {
            match op().await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(op = %name, attempts = attempt + 1, "call recovered after retries");
                    }
                    self.note_settled_ok();
                    return Ok(value);
                }
                Err(err) if !err.is_transient() => {
                    debug!(op = %name, error = %err, "non-transient failure, not retrying");
                    return Err(InvokeError::upstream(err));
                }
                Err(err) if attempt >= self.config.max_retries => {
                    warn!(
                        op = %name,
                        attempts = attempt + 1,
                        error = %err,
                        "transient failures exhausted retry budget"
                    );
                    return Err(InvokeError::RetriesExhausted {
                        name: Arc::from(name),
                        attempts: attempt + 1,
                        cause: Arc::new(err),
                    });
                }
                Err(err) => {
                    attempt += 1;
                    let delay = self.next_backoff(attempt);
                    warn!(
                        op = %name,
                        attempt = attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %err,
                        "transient failure, backing off before retry"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Computes the delay before retry `attempt` (1-based).
    ///
    /// When another operation on this invoker is already mid-retry, the new
    /// retry folds into the shared escalating sequence instead of running
    /// its own parallel schedule, so concurrent failures back off together
    /// rather than hammering the upstream in lockstep.
    fn next_backoff(&self, attempt: u32) -> Duration {
        let already_retrying = self.retrying.swap(true, Ordering::SeqCst);
        let shared = self.retry_count.fetch_add(1, Ordering::SeqCst) + 1;
        let n = if already_retrying { shared.max(attempt) } else { attempt };

        let exp = 1u64.checked_shl(n.min(16)).unwrap_or(u64::MAX);
        let delay_ms = self.config.backoff_base_ms.saturating_mul(exp).min(self.config.backoff_cap_ms);
        Duration::from_millis(delay_ms)
    }

    fn note_settled_ok(&self) {
        self.retry_count.store(0, Ordering::SeqCst);
        self.retrying.store(false, Ordering::SeqCst);
    }
}

/// Connection-resilience wrapper around remote collaborator calls.
///
/// One instance per collaborator family; the type parameter is the settled
/// value the family's operations produce (classifiers settle to
/// `serde_json::Value`, registry lookups to `Vec<TaxonRecord>`).
pub struct ResilientInvoker<T> {
    policy: RetryPolicy,
    in_flight: Arc<DashMap<String, SharedAttempt<T>>>,
}

impl<T> Default for ResilientInvoker<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new(InvokerConfig::default())
    }
}

impl<T> ResilientInvoker<T>
where
    T: Clone + Send + Sync + 'static,
{
    #[must_use]
    pub fn new(config: InvokerConfig) -> Self {
        Self { policy: RetryPolicy::new(config), in_flight: Arc::new(DashMap::new()) }
    }

    /// Executes `op`, de-duplicating against in-flight calls with the same
    /// `key` and retrying transient failures.
    ///
    /// With `key = None` the call is never de-duplicated. `name` labels the
    /// operation in logs and in the exhaustion signal.
    ///
    /// # Errors
    ///
    /// - [`InvokeError::Upstream`] for non-transient failures (no retry).
    /// - [`InvokeError::RetriesExhausted`] once the retry budget is spent.
    /// - [`InvokeError::Aborted`] if the shared driving task was cancelled.
    pub async fn invoke<F, Fut>(
        &self,
        op: F,
        key: Option<&str>,
        name: &str,
    ) -> Result<T, InvokeError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, UpstreamError>> + Send + 'static,
    {
        let Some(key) = key else {
            return self.policy.run(op, name).await;
        };

        let shared = match self.in_flight.entry(key.to_string()) {
            Entry::Occupied(entry) => {
                debug!(key = %key, op = %name, "attaching to in-flight call");
                entry.get().clone()
            }
            Entry::Vacant(entry) => {
                // The entry must be registered before the driving task can
                // settle, or a fast settlement would race its own cleanup
                // and leave a stale entry behind.
                let (tx, rx) = tokio::sync::oneshot::channel::<Result<T, InvokeError>>();
                let shared = async move { rx.await.unwrap_or(Err(InvokeError::Aborted)) }
                    .boxed()
                    .shared();
                entry.insert(shared.clone());

                let policy = self.policy.clone();
                let registry = Arc::clone(&self.in_flight);
                let registry_key = key.to_string();
                let op_name: Arc<str> = Arc::from(name);

                // The driving task owns the retry loop and removes the
                // registry entry exactly once on settlement, before any
                // waiter observes the result; cleanup does not depend on
                // any individual waiter staying alive.
                tokio::spawn(async move {
                    let result = policy.run(op, &op_name).await;
                    registry.remove(&registry_key);
                    let _ = tx.send(result);
                });

                shared
            }
        };

        shared.await
    }

    /// Lightweight, non-retried availability probe.
    ///
    /// Returns `false` on any failure or on probe timeout; never errors.
    pub async fn health_check<F, Fut>(&self, probe: F) -> bool
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), UpstreamError>>,
    {
        let timeout = Duration::from_millis(self.policy.config.health_probe_timeout_ms);
        match tokio::time::timeout(timeout, probe()).await {
            Ok(Ok(())) => true,
            Ok(Err(err)) => {
                debug!(error = %err, "health probe failed");
                false
            }
            Err(_) => {
                debug!(timeout_ms = self.policy.config.health_probe_timeout_ms, "health probe timed out");
                false
            }
        }
    }

    /// Number of operations currently in flight (diagnostic).
    #[must_use]
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }
}
