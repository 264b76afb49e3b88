//! Integration tests for fetch-kit
//!
//! These tests drive the public API the way a workshop dashboard would:
//! one shared cache, several cache-backed resources, a visibility
//! coordinator and a staged loader composed together.

use fetch_kit::storage::FileStore;
use fetch_kit::visibility::VisibilityCoordinator;
use fetch_kit::{
    BatchOptions, BatchRunner, CacheConfig, CacheKeyBuilder, CachedResource, Error, FetchOptions,
    Stage, StagedLoadOptions, StagedLoader, TtlCache, VisibilityConfig,
};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
struct Workshop {
    id: String,
    title: String,
    seats: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
struct Task {
    id: String,
    workshop_id: String,
    done: bool,
}

fn workshops() -> Vec<Workshop> {
    vec![
        Workshop {
            id: "w1".to_string(),
            title: "Async Rust".to_string(),
            seats: 20,
        },
        Workshop {
            id: "w2".to_string(),
            title: "Parsers".to_string(),
            seats: 12,
        },
    ]
}

fn init_logger() {
    let _ = env_logger::Builder::from_default_env().is_test(true).try_init();
}

/// Source closure that counts how often it is called.
fn counting<T: Clone + Send + Sync + 'static>(
    value: T,
    calls: Arc<AtomicUsize>,
) -> impl Fn() -> std::future::Ready<fetch_kit::Result<T>> + Send + Sync {
    move || {
        calls.fetch_add(1, Ordering::SeqCst);
        std::future::ready(Ok(value.clone()))
    }
}

/// Test 1: End-to-End Resource Flow
///
/// - First load misses the cache and calls the source
/// - A second resource on the same key is served from the shared cache
/// - After the TTL lapses the source is called again
#[tokio::test(start_paused = true)]
async fn test_end_to_end_resource_flow() {
    init_logger();
    let cache = TtlCache::new(CacheConfig::default()).expect("valid config");
    let calls = Arc::new(AtomicUsize::new(0));
    let options = FetchOptions::default().with_ttl(Duration::from_secs(60));

    let list = CachedResource::new(
        "workshops",
        cache.clone(),
        counting(workshops(), calls.clone()),
        options.clone(),
    );
    let loaded = list.load().await.expect("load");
    assert_eq!(loaded, workshops());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(!list.is_loading());

    // Another view mounting the same resource
    let sidebar = CachedResource::new(
        "workshops",
        cache.clone(),
        counting(workshops(), calls.clone()),
        options,
    );
    assert_eq!(sidebar.load().await.expect("load"), workshops());
    assert_eq!(calls.load(Ordering::SeqCst), 1, "served from cache");

    tokio::time::advance(Duration::from_secs(61)).await;
    sidebar.load().await.expect("load");
    assert_eq!(calls.load(Ordering::SeqCst), 2, "expired entry refetched");

    let stats = cache.stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.total_entries, 1);
}

/// Test 2: Force Refetch and Failure Handling
///
/// A forced refetch bypasses the cache read; a failing refetch keeps the
/// previous data and records the error.
#[tokio::test]
async fn test_force_refetch_and_failure_keeps_data() {
    init_logger();
    let cache = TtlCache::new(CacheConfig::default()).expect("valid config");
    let attempt = Arc::new(AtomicUsize::new(0));
    let counter = attempt.clone();

    let tasks = CachedResource::new(
        CacheKeyBuilder::with_params("tasks", &[("workshop", "w1")]),
        cache.clone(),
        move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Ok(vec![Task {
                        id: "t1".to_string(),
                        workshop_id: "w1".to_string(),
                        done: false,
                    }])
                } else {
                    Err(Error::FetchError("503 Service Unavailable".to_string()))
                }
            }
        },
        FetchOptions::default(),
    );

    assert_eq!(tasks.key(), "tasks?workshop=w1");
    tasks.load().await.expect("initial load");

    // Non-forced refetch is a cache hit
    tasks.refetch(false).await.expect("cached");
    assert_eq!(attempt.load(Ordering::SeqCst), 1);

    let err = tasks.refetch(true).await.expect_err("forced fetch fails");
    assert_eq!(err, Error::FetchError("503 Service Unavailable".to_string()));

    let state = tasks.state();
    assert_eq!(state.data.map(|t| t.len()), Some(1));
    assert_eq!(state.error, Some(err));
    assert!(!state.loading);
}

/// Test 3: Persistence Across Restart
///
/// Entries written by one cache instance are hydrated by the next one that
/// points at the same snapshot file.
#[tokio::test]
async fn test_persistence_across_restart() {
    init_logger();
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("cache.json");
    let config = CacheConfig::default().with_persist(true);

    {
        let cache =
            TtlCache::with_store(config.clone(), FileStore::new(&path)).expect("valid config");
        let list = CachedResource::new(
            "workshops",
            cache,
            || async { Ok::<_, Error>(workshops()) },
            FetchOptions::default(),
        );
        list.load().await.expect("load");
    }

    assert!(path.exists());

    let calls = Arc::new(AtomicUsize::new(0));
    let cache = TtlCache::with_store(config, FileStore::new(&path)).expect("valid config");
    let list = CachedResource::new(
        "workshops",
        cache.clone(),
        counting(Vec::<Workshop>::new(), calls.clone()),
        FetchOptions::default(),
    );

    assert_eq!(list.load().await.expect("load"), workshops());
    assert_eq!(calls.load(Ordering::SeqCst), 0, "hydrated entry served");

    cache.clear();
    assert!(!path.exists());
}

/// Test 4: Visibility-Driven Invalidation
///
/// A refresh callback drops cached data after a long absence so the next
/// load goes back to the source.
#[tokio::test(start_paused = true)]
async fn test_visibility_refresh_invalidates_cache() {
    init_logger();
    let cache = TtlCache::new(CacheConfig::default()).expect("valid config");
    let calls = Arc::new(AtomicUsize::new(0));
    let list = CachedResource::new(
        "workshops",
        cache.clone(),
        counting(workshops(), calls.clone()),
        FetchOptions::default(),
    );
    list.load().await.expect("load");

    let coordinator = VisibilityCoordinator::new(true, VisibilityConfig::default());
    let handle = cache.clone();
    let _registration = coordinator.register_refresh_callback(move || {
        handle.delete("workshops");
    });

    // Short absence keeps the cache
    coordinator.set_visible(false);
    tokio::time::advance(Duration::from_secs(10)).await;
    coordinator.set_visible(true);
    assert!(cache.has("workshops"));

    // Long absence refreshes
    coordinator.set_visible(false);
    tokio::time::advance(Duration::from_secs(45)).await;
    coordinator.set_visible(true);
    assert!(!cache.has("workshops"));

    list.load().await.expect("reload");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

/// Test 5: Staged Dashboard Load
///
/// Critical data loads first; a failing secondary stage does not block the
/// others and can be retried on its own.
#[tokio::test]
async fn test_staged_dashboard_load() {
    init_logger();
    let order: Arc<Mutex<Vec<String>>> = Arc::default();
    let stats_fails = Arc::new(AtomicUsize::new(1));

    let record = |key: &'static str, order: &Arc<Mutex<Vec<String>>>| {
        let order = order.clone();
        move || {
            order.lock().unwrap().push(key.to_string());
            async move { Ok::<_, Error>(key.len() as u32) }
        }
    };

    let failing = stats_fails.clone();
    let stages = vec![
        Stage::new("recommendations", 3, record("recommendations", &order)),
        Stage::new("profile", 1, record("profile", &order)),
        Stage::new("stats", 2, move || {
            let fail = failing
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            async move {
                if fail {
                    Err(Error::FetchError("timeout".to_string()))
                } else {
                    Ok(5)
                }
            }
        })
        .with_fallback(0),
    ];

    let completed = Arc::new(AtomicUsize::new(0));
    let counter = completed.clone();
    let loader = StagedLoader::new(
        stages,
        StagedLoadOptions::default().on_all_complete(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }),
    )
    .expect("unique keys");

    loader.run().await;

    assert_eq!(
        *order.lock().unwrap(),
        vec!["profile".to_string(), "recommendations".to_string()]
    );
    assert!(loader.has_errors());
    assert!(!loader.is_complete());
    assert_eq!(loader.progress().percentage, 67);
    assert_eq!(loader.stage("stats").and_then(|s| s.data), Some(0));
    assert_eq!(completed.load(Ordering::SeqCst), 0);

    loader.retry_stage("stats").await.expect("known stage");

    assert!(loader.is_complete());
    assert!(!loader.has_errors());
    assert_eq!(loader.data().get("stats"), Some(&5));
    assert_eq!(completed.load(Ordering::SeqCst), 1);
}

/// Test 6: Batch Cancel of Workshops
///
/// A bulk action updates the shared cache per item and reports failures
/// without aborting the batch.
#[tokio::test]
async fn test_batch_updates_cache() {
    init_logger();
    let cache = TtlCache::new(CacheConfig::default()).expect("valid config");
    for workshop in workshops() {
        cache
            .set(&CacheKeyBuilder::build("workshop", &workshop.id), &workshop, None)
            .expect("set");
    }

    let progress: Arc<Mutex<Vec<u32>>> = Arc::default();
    let sink = progress.clone();
    let runner = BatchRunner::new(BatchOptions::default().with_concurrency(2))
        .expect("valid options")
        .with_on_progress(move |p| sink.lock().unwrap().push(p.percentage));

    let report = runner
        .run(vec!["w1", "w2", "w9"], |id| {
            let cache = cache.clone();
            async move {
                if cache.delete(&CacheKeyBuilder::build("workshop", &id)) {
                    Ok(())
                } else {
                    Err(Error::FetchError(format!("unknown workshop {}", id)))
                }
            }
        })
        .await;

    assert_eq!(report.succeeded.len(), 2);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, "w9");
    assert!(cache.is_empty());
    assert_eq!(progress.lock().unwrap().last(), Some(&100));
}
