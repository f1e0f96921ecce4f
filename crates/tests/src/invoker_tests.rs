//! Integration tests for in-flight de-duplication and retry behavior.

use std::{
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    },
    time::Duration,
};

use phyto_core::upstream::{InvokeError, InvokerConfig, ResilientInvoker, UpstreamError};

fn fast_config(max_retries: u32) -> InvokerConfig {
    InvokerConfig {
        max_retries,
        backoff_base_ms: 1,
        backoff_cap_ms: 4,
        health_probe_timeout_ms: 50,
    }
}

/// Operation that counts executions and resolves slowly, so concurrent
/// callers overlap with it.
fn slow_counting_op(
    executions: &Arc<AtomicU32>,
) -> impl Fn() -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<u32, UpstreamError>> + Send>>
       + Send
       + Sync
       + 'static {
    let executions = Arc::clone(executions);
    move || {
        let executions = Arc::clone(&executions);
        Box::pin(async move {
            executions.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(42)
        })
    }
}

#[tokio::test]
async fn test_concurrent_callers_share_one_execution() {
    let invoker: Arc<ResilientInvoker<u32>> = Arc::new(ResilientInvoker::new(fast_config(0)));
    let executions = Arc::new(AtomicU32::new(0));

    let first = {
        let invoker = Arc::clone(&invoker);
        let op = slow_counting_op(&executions);
        tokio::spawn(async move { invoker.invoke(op, Some("classify:img-1"), "op").await })
    };
    // give the first caller time to register the in-flight entry
    tokio::time::sleep(Duration::from_millis(10)).await;
    let second = {
        let invoker = Arc::clone(&invoker);
        let op = slow_counting_op(&executions);
        tokio::spawn(async move { invoker.invoke(op, Some("classify:img-1"), "op").await })
    };

    let (a, b) = (first.await.unwrap().unwrap(), second.await.unwrap().unwrap());
    assert_eq!(a, 42);
    assert_eq!(b, 42);
    assert_eq!(executions.load(Ordering::SeqCst), 1, "exactly one underlying execution");
    assert_eq!(invoker.in_flight_count(), 0, "registry entry removed on settlement");
}

#[tokio::test]
async fn test_distinct_keys_execute_independently() {
    let invoker: Arc<ResilientInvoker<u32>> = Arc::new(ResilientInvoker::new(fast_config(0)));
    let executions = Arc::new(AtomicU32::new(0));

    let a = invoker.invoke(slow_counting_op(&executions), Some("classify:img-1"), "op");
    let b = invoker.invoke(slow_counting_op(&executions), Some("classify:img-2"), "op");
    let (a, b) = tokio::join!(a, b);

    assert_eq!(a.unwrap(), 42);
    assert_eq!(b.unwrap(), 42);
    assert_eq!(executions.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_deduplicated_failure_reaches_every_caller() {
    let invoker: Arc<ResilientInvoker<u32>> = Arc::new(ResilientInvoker::new(fast_config(0)));
    let executions = Arc::new(AtomicU32::new(0));

    let op = {
        let executions = Arc::clone(&executions);
        move || {
            let executions = Arc::clone(&executions);
            async move {
                executions.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                Err::<u32, _>(UpstreamError::InvalidResponse("garbage".into()))
            }
        }
    };

    let first = {
        let invoker = Arc::clone(&invoker);
        let op = op.clone();
        tokio::spawn(async move { invoker.invoke(op, Some("k"), "op").await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    let second = {
        let invoker = Arc::clone(&invoker);
        tokio::spawn(async move { invoker.invoke(op, Some("k"), "op").await })
    };

    assert!(matches!(first.await.unwrap(), Err(InvokeError::Upstream(_))));
    assert!(matches!(second.await.unwrap(), Err(InvokeError::Upstream(_))));
    assert_eq!(executions.load(Ordering::SeqCst), 1);
    assert_eq!(invoker.in_flight_count(), 0);
}

#[tokio::test]
async fn test_retry_exhaustion_attempts_exactly_max_plus_one() {
    let invoker: ResilientInvoker<u32> = ResilientInvoker::new(fast_config(3));
    let attempts = Arc::new(AtomicU32::new(0));

    let op = {
        let attempts = Arc::clone(&attempts);
        move || {
            let attempts = Arc::clone(&attempts);
            async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err::<u32, _>(UpstreamError::Timeout)
            }
        }
    };

    let result = invoker.invoke(op, None, "always-failing").await;

    let err = result.unwrap_err();
    assert!(err.is_exhausted(), "exhaustion signal expected, got: {err}");
    assert_eq!(attempts.load(Ordering::SeqCst), 4, "max_retries + 1 total attempts");
}

#[tokio::test]
async fn test_transient_failure_recovers_within_budget() {
    let invoker: ResilientInvoker<u32> = ResilientInvoker::new(fast_config(3));
    let attempts = Arc::new(AtomicU32::new(0));

    let op = {
        let attempts = Arc::clone(&attempts);
        move || {
            let attempts = Arc::clone(&attempts);
            async move {
                if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(UpstreamError::ConnectionFailed("reset".into()))
                } else {
                    Ok(7)
                }
            }
        }
    };

    let result = invoker.invoke(op, None, "flaky").await;
    assert_eq!(result.unwrap(), 7);
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_exhaustion_signal_carries_original_error() {
    let invoker: ResilientInvoker<u32> = ResilientInvoker::new(fast_config(1));

    let result = invoker
        .invoke(
            || async { Err::<u32, _>(UpstreamError::HttpError(503, "unavailable".into())) },
            None,
            "op",
        )
        .await;

    match result.unwrap_err() {
        InvokeError::RetriesExhausted { attempts, cause, .. } => {
            assert_eq!(attempts, 2);
            assert!(matches!(cause.as_ref(), UpstreamError::HttpError(503, _)));
        }
        other => panic!("expected exhaustion, got: {other}"),
    }
}
