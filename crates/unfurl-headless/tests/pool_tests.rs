//! Pool lifecycle tests.
//!
//! Everything here runs without a browser: the pool is configured with
//! `min_browsers = 0` (and `max_browsers = 0` where the queue itself is
//! under test). Tests that need a real Chromium are `#[ignore]`d and run
//! explicitly in environments that have one.

use std::sync::Arc;
use std::time::{Duration, Instant};

use unfurl_headless::{BrowserPool, ContextBroker, PoolConfig, PoolError, SessionOptions};

fn browserless_config() -> PoolConfig {
    PoolConfig {
        min_browsers: 0,
        max_browsers: 0,
        ..Default::default()
    }
}

#[tokio::test]
async fn queue_deadline_is_enforced() {
    let pool = BrowserPool::new(browserless_config());

    let started = Instant::now();
    let err = pool
        .acquire_slot(Some(Duration::from_millis(100)))
        .await
        .unwrap_err();
    let waited = started.elapsed();

    assert!(matches!(err, PoolError::QueueTimeout));
    assert!(waited >= Duration::from_millis(100));
    assert!(waited < Duration::from_secs(5), "deadline not respected");

    pool.shutdown().await;
}

#[tokio::test]
async fn expired_waiters_do_not_accumulate() {
    let pool = Arc::new(BrowserPool::new(browserless_config()));

    for _ in 0..4 {
        let _ = pool.acquire_slot(Some(Duration::from_millis(20))).await;
    }

    assert_eq!(pool.capacity().await.queue_length, 0);
    pool.shutdown().await;
}

#[tokio::test]
async fn concurrent_waiters_all_fail_on_shutdown() {
    let pool = Arc::new(BrowserPool::new(browserless_config()));

    let waiters: Vec<_> = (0..3)
        .map(|_| {
            let pool = pool.clone();
            tokio::spawn(async move { pool.acquire_slot(Some(Duration::from_secs(30))).await })
        })
        .collect();

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(pool.capacity().await.queue_length, 3);

    pool.shutdown().await;

    for waiter in waiters {
        let result = waiter.await.unwrap();
        assert!(matches!(result, Err(PoolError::ShuttingDown)));
    }
}

#[tokio::test]
async fn capacity_snapshot_counts_unlaunched_potential() {
    let pool = BrowserPool::new(PoolConfig {
        min_browsers: 0,
        max_browsers: 2,
        max_contexts_per_browser: 4,
        ..Default::default()
    });
    pool.initialize().await.unwrap();

    let capacity = pool.capacity().await;
    assert_eq!(capacity.browsers, 0);
    assert_eq!(capacity.healthy_browsers, 0);
    assert_eq!(capacity.available_slots, 8);
    assert_eq!(capacity.max_browsers, 2);
    assert_eq!(capacity.max_contexts_per_browser, 4);

    pool.shutdown().await;
}

#[tokio::test]
async fn broker_surfaces_pool_errors() {
    let pool = Arc::new(BrowserPool::new(browserless_config()));
    let broker = ContextBroker::new(pool.clone());

    let options = SessionOptions {
        acquire_timeout: Some(Duration::from_millis(50)),
        ..Default::default()
    };
    let err = broker.lease_context(&options).await.unwrap_err();
    assert_eq!(err.to_string(), "Timeout waiting for available browser");

    pool.shutdown().await;
}

// ---- browser-bound tests (require a local Chromium) ------------------------

#[tokio::test]
#[ignore = "requires a local Chromium installation"]
async fn lease_accounting_returns_to_baseline() {
    let pool = Arc::new(BrowserPool::new(PoolConfig {
        min_browsers: 1,
        max_browsers: 1,
        max_contexts_per_browser: 2,
        ..Default::default()
    }));
    pool.initialize().await.unwrap();
    let broker = ContextBroker::new(pool.clone());

    let before = pool.capacity().await;
    assert_eq!(before.active_leases, 0);

    let lease = broker
        .lease_context(&SessionOptions::default())
        .await
        .unwrap();
    assert_eq!(pool.capacity().await.active_leases, 1);

    lease.release().await;
    assert_eq!(pool.capacity().await.active_leases, 0);

    pool.shutdown().await;
}

#[tokio::test]
#[ignore = "requires a local Chromium installation"]
async fn saturated_pool_serves_queued_acquisitions_fifo() {
    let pool = Arc::new(BrowserPool::new(PoolConfig {
        min_browsers: 1,
        max_browsers: 1,
        max_contexts_per_browser: 1,
        ..Default::default()
    }));
    pool.initialize().await.unwrap();
    let broker = Arc::new(ContextBroker::new(pool.clone()));

    let first = broker
        .lease_context(&SessionOptions::default())
        .await
        .unwrap();

    // Two queued acquisitions; the one enqueued first must be granted first.
    let order = Arc::new(tokio::sync::Mutex::new(Vec::new()));
    let mut handles = Vec::new();
    for tag in ["a", "b"] {
        let broker = broker.clone();
        let order = order.clone();
        handles.push(tokio::spawn(async move {
            let lease = broker
                .lease_context(&SessionOptions {
                    acquire_timeout: Some(Duration::from_secs(30)),
                    ..Default::default()
                })
                .await
                .unwrap();
            order.lock().await.push(tag);
            lease.release().await;
        }));
        // Deterministic enqueue order.
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    first.release().await;
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(*order.lock().await, vec!["a", "b"]);
    pool.shutdown().await;
}
