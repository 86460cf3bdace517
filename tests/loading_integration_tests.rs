use chunkload::loading::{
    shared, CatalogEntry, ChunkTracker, DeferredComponent, FallbackCatalog, FallbackKind,
    FeatureLoader, LoadError, LoadPhase, LoadResult, LoaderConfig, PreloadScheduler,
    ReloadSignal, RenderKind, Rendered, SharedLoader,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};

fn dev_config() -> LoaderConfig {
    LoaderConfig {
        dev_mode: true,
        grace_delay_ms: 200,
        timeout_ms: 1000,
        ..Default::default()
    }
}

/// A loader that is called once no matter how often its component renders
#[tokio::test(start_paused = true)]
async fn test_deferred_component_memoizes_load() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let component = DeferredComponent::wrap(
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
            async {
                sleep(Duration::from_millis(80)).await;
                Ok::<_, LoadError>("timeline")
            }
        },
        "list",
        ReloadSignal::new(),
    );

    for _ in 0..10 {
        component.render();
    }
    sleep(Duration::from_millis(100)).await;
    for _ in 0..10 {
        assert_eq!(component.render().content(), Some(&"timeline"));
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

/// A feature that loads inside the grace delay never flashes its fallback
#[tokio::test(start_paused = true)]
async fn test_feature_loaded_within_grace_delay() {
    let features = FeatureLoader::new(&dev_config(), ReloadSignal::new());
    let feed = features.load(
        || async {
            sleep(Duration::from_millis(50)).await;
            Ok::<_, LoadError>("feed")
        },
        "feed",
    );
    feed.mount();

    sleep(Duration::from_millis(250)).await;
    assert!(!feed.trace().contains(&RenderKind::Fallback));
    assert_eq!(feed.phase(), LoadPhase::Succeeded);
}

/// A hung feature is forced into the error view once, at the timeout
#[tokio::test(start_paused = true)]
async fn test_hung_feature_times_out_once() {
    let reload = ReloadSignal::new();
    let features = FeatureLoader::new(&dev_config(), reload.clone());
    let profile = features.load(
        || futures::future::pending::<LoadResult<&'static str>>(),
        "profile",
    );
    let mut phases = profile.subscribe();
    let started = Instant::now();
    profile.mount();

    phases.changed().await.unwrap();
    assert_eq!(*phases.borrow(), LoadPhase::VisibleFallback);
    phases.changed().await.unwrap();
    assert!(phases.borrow().is_timed_out());
    assert!(started.elapsed() >= Duration::from_millis(1000));

    sleep(Duration::from_secs(30)).await;
    let errors = profile
        .trace()
        .into_iter()
        .filter(|kind| *kind == RenderKind::Error)
        .count();
    assert_eq!(errors, 1);

    match profile.render() {
        Rendered::Error(view) => {
            view.retry();
            assert_eq!(reload.requested_count(), 1);
        }
        other => panic!("Expected error view, got {:?}", other.kind()),
    }
}

/// Disposing a loader before its timers fire leaves nothing behind
#[tokio::test(start_paused = true)]
async fn test_disposed_loader_observes_no_transitions() {
    let features = FeatureLoader::new(&dev_config(), ReloadSignal::new());
    let settings = features.load(
        || futures::future::pending::<LoadResult<&'static str>>(),
        "settings",
    );
    settings.mount();
    sleep(Duration::from_millis(150)).await;
    settings.dispose();

    sleep(Duration::from_secs(5)).await;
    assert_eq!(settings.trace(), vec![RenderKind::Nothing]);
    assert_eq!(settings.render().kind(), RenderKind::Nothing);
}

/// Chunk tracking counts each name once and preloads stay independent
#[tokio::test(start_paused = true)]
async fn test_preload_and_tracking() {
    let tracker = Arc::new(ChunkTracker::new(true));
    let scheduler = PreloadScheduler::default().with_tracker(Arc::clone(&tracker));

    let fired = Arc::new(std::sync::Mutex::new(Vec::new()));
    let start = Instant::now();
    let make = |name: &'static str, fail: bool| -> (&'static str, SharedLoader<()>) {
        let fired = Arc::clone(&fired);
        let loader = shared(move || {
            fired.lock().unwrap().push((name, start.elapsed()));
            async move {
                if fail {
                    Err(LoadError::module("bad chunk"))
                } else {
                    Ok(())
                }
            }
        });
        (name, loader)
    };

    let report = scheduler
        .preload_chunks(vec![make("a", false), make("b", true), make("c", false)])
        .join()
        .await;
    assert_eq!(report.succeeded, 2);
    assert_eq!(report.failed, 1);

    let fired = fired.lock().unwrap().clone();
    assert_eq!(fired.len(), 3);
    assert!(fired[2].1 >= Duration::from_millis(200));

    for _ in 0..5 {
        tracker.record_load("a");
    }
    let metrics = tracker.metrics();
    assert_eq!(metrics.loaded_chunks, vec!["a", "c"]);
    assert_eq!(metrics.total_chunks, 2);
    assert_eq!(metrics.estimated_size_kb, 100);
}

/// Unrecognized fallback keys degrade to the default placeholder
#[test]
fn test_unknown_fallback_key() {
    let catalog = FallbackCatalog::default();
    match catalog.entry("carousel") {
        CatalogEntry::Static(placeholder) => assert_eq!(placeholder.kind, FallbackKind::Default),
        other => panic!("Expected default placeholder, got {:?}", other),
    }
}
