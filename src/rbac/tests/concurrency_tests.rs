//! Concurrency tests: single-flight, cache coherence, speculative evaluation

mod common;

use common::*;
use cretoai_rbac::{CacheConfig, Checker, Context, EngineConfig, EvaluationMode, ANY_TABLE};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

// ============================================================================
// SINGLE-FLIGHT
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_misses_collapse() {
    init_tracing();
    let (authz, store) =
        counting_authorizer(EngineConfig::default(), Duration::from_millis(30)).await;
    let article = Context::new("articles", 42);
    authz.grant(G1, "editor", &article).await.unwrap();

    let handles: Vec<_> = (0..20)
        .map(|_| {
            let authz = authz.clone();
            let article = article.clone();
            tokio::spawn(async move { authz.can(ALICE, "write", &article).await })
        })
        .collect();

    for handle in handles {
        assert!(handle.await.unwrap().unwrap());
    }

    assert_eq!(CountingStore::count(&store.group_lookups), 1);
    assert_eq!(CountingStore::count(&store.role_lookups), 1);
    assert_eq!(CountingStore::count(&store.grant_lookups), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_disabled_cache_still_collapses_overlapping_calls() {
    init_tracing();
    let config = EngineConfig {
        cache: CacheConfig::disabled(),
        ..EngineConfig::default()
    };
    let (authz, store) = counting_authorizer(config, Duration::from_millis(30)).await;

    let handles: Vec<_> = (0..10)
        .map(|_| {
            let authz = authz.clone();
            tokio::spawn(async move { authz.has_role(ALICE, "editor").await })
        })
        .collect();
    for handle in handles {
        assert!(!handle.await.unwrap().unwrap());
    }
    assert_eq!(CountingStore::count(&store.group_lookups), 1);

    // Nothing was kept: a later call goes back to the store
    authz.has_role(ALICE, "editor").await.unwrap();
    assert_eq!(CountingStore::count(&store.group_lookups), 2);
}

// ============================================================================
// CACHE COHERENCE
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_no_stale_allow_after_revoke() {
    init_tracing();

    for round in 0..5 {
        let (authz, _) =
            counting_authorizer(EngineConfig::default(), Duration::from_millis(15)).await;
        let article = Context::new("articles", 42);
        authz.grant(G1, "editor", &article).await.unwrap();

        let revoked = Arc::new(AtomicBool::new(false));
        let stop = Arc::new(AtomicBool::new(false));
        let violations = Arc::new(AtomicUsize::new(0));

        let checkers: Vec<_> = (0..16)
            .map(|_| {
                let authz = authz.clone();
                let article = article.clone();
                let revoked = revoked.clone();
                let stop = stop.clone();
                let violations = violations.clone();
                tokio::spawn(async move {
                    while !stop.load(Ordering::SeqCst) {
                        let started_after_revoke = revoked.load(Ordering::SeqCst);
                        let allowed = authz.can(ALICE, "write", &article).await.unwrap();
                        if started_after_revoke && allowed {
                            violations.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                })
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(10 + round * 7)).await;
        authz.revoke(G1, "editor", &article).await.unwrap();
        revoked.store(true, Ordering::SeqCst);

        tokio::time::sleep(Duration::from_millis(80)).await;
        stop.store(true, Ordering::SeqCst);
        for handle in checkers {
            handle.await.unwrap();
        }

        assert_eq!(violations.load(Ordering::SeqCst), 0, "round {}", round);
        assert!(!authz.can(ALICE, "write", &article).await.unwrap());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_grant_visible_to_calls_after_it() {
    init_tracing();
    let (authz, _) = counting_authorizer(EngineConfig::default(), Duration::from_millis(10)).await;
    let article = Context::new("articles", 42);

    // Warm every cache with a denial
    assert!(!authz.can(ALICE, "write", &article).await.unwrap());

    let pending: Vec<_> = (0..8)
        .map(|_| {
            let authz = authz.clone();
            let article = article.clone();
            tokio::spawn(async move { authz.can(ALICE, "write", &article).await })
        })
        .collect();

    authz.grant(G1, "editor", &article).await.unwrap();
    assert!(authz.can(ALICE, "write", &article).await.unwrap());

    for handle in pending {
        // Started before the grant returned: either answer is acceptable
        handle.await.unwrap().unwrap();
    }
    assert!(authz.can(ALICE, "write", &article).await.unwrap());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_leave_is_visible_immediately() {
    init_tracing();
    let (authz, _) = counting_authorizer(EngineConfig::default(), Duration::from_millis(10)).await;
    let article = Context::new("articles", 42);
    authz.grant(G1, "editor", &article).await.unwrap();
    assert!(authz.can(ALICE, "write", &article).await.unwrap());

    let background = {
        let authz = authz.clone();
        let article = article.clone();
        tokio::spawn(async move { authz.can(ALICE, "write", &article).await })
    };
    authz.leave(ALICE, G1).await.unwrap();
    assert!(!authz.can(ALICE, "write", &article).await.unwrap());
    background.await.unwrap().unwrap();
}

// ============================================================================
// SPECULATIVE EVALUATION
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_speculative_runs_operands_together() {
    init_tracing();
    let both = Checker::direct("write") & Checker::path("write", ["journal"]);

    let mut elapsed = Vec::new();
    for mode in [EvaluationMode::Sequential, EvaluationMode::Speculative] {
        let config = EngineConfig {
            mode,
            ..EngineConfig::default()
        };
        let store = CountingStore::new(seeded_store().await, Duration::ZERO)
            .with_slow_table("articles", Duration::from_millis(150))
            .with_slow_table("journals", Duration::from_millis(150));
        let (authz, _) = authorizer_over(config, store).await;
        authz.register(ANY_TABLE, "both", both.clone()).unwrap();
        authz.grant(G1, "editor", &Context::new("articles", 42)).await.unwrap();
        authz.grant(G1, "editor", &Context::new("journals", 1)).await.unwrap();

        let start = Instant::now();
        assert!(authz
            .can(ALICE, "both", &Context::new("articles", 42))
            .await
            .unwrap());
        elapsed.push(start.elapsed());
    }

    assert!(elapsed[0] >= Duration::from_millis(300), "{:?}", elapsed);
    assert!(elapsed[1] < Duration::from_millis(290), "{:?}", elapsed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cancelled_branch_leaves_no_trace() {
    init_tracing();
    let config = EngineConfig {
        mode: EvaluationMode::Speculative,
        ..EngineConfig::default()
    };
    let store = CountingStore::new(seeded_store().await, Duration::ZERO)
        .with_slow_table("articles", Duration::from_millis(20))
        .with_slow_table("journals", Duration::from_millis(500));
    let (authz, store) = authorizer_over(config, store).await;
    authz
        .register(
            ANY_TABLE,
            "either",
            Checker::direct("write") | Checker::path("write", ["journal"]),
        )
        .unwrap();
    authz.grant(G1, "editor", &Context::new("articles", 42)).await.unwrap();

    let start = Instant::now();
    assert!(authz
        .can(ALICE, "either", &Context::new("articles", 42))
        .await
        .unwrap());
    assert!(start.elapsed() < Duration::from_millis(400));

    // The journal lookup was started, then dropped before it could publish
    assert_eq!(CountingStore::count(&store.grant_lookups), 2);
    assert_eq!(authz.cache_stats().grants.entries, 1);
}
