//! Feature loader: instrumented, progressive loading of application features

use std::sync::Arc;
use tokio::time::Instant;
use tracing::{error, info};

use crate::loading::config::LoaderConfig;
use crate::loading::deferred::DeferredComponent;
use crate::loading::error::LoadResult;
use crate::loading::fallback::FallbackCatalog;
use crate::loading::loader::{LoadFuture, ModuleLoader, SharedLoader};
use crate::loading::progressive::{ProgressiveLoader, ProgressiveOptions};
use crate::loading::retry::{ReloadSignal, RetryPolicy};
use crate::loading::tracker::ChunkTracker;

/// Loader wrapped with timing and dev-mode logging
struct InstrumentedLoader<T> {
    inner: SharedLoader<T>,
    feature: Arc<str>,
    verbose: bool,
    tracker: Option<Arc<ChunkTracker>>,
}

impl<T> ModuleLoader<T> for InstrumentedLoader<T>
where
    T: Send + 'static,
{
    fn load(&self) -> LoadFuture<T> {
        let inner = Arc::clone(&self.inner);
        let feature = Arc::clone(&self.feature);
        let verbose = self.verbose;
        let tracker = self.tracker.clone();

        Box::pin(async move {
            if verbose {
                info!(feature = %feature, "Loading feature");
            }
            let started = Instant::now();
            let result: LoadResult<T> = inner.load().await;

            match &result {
                Ok(_) => {
                    if verbose {
                        info!(
                            feature = %feature,
                            elapsed_ms = started.elapsed().as_millis() as u64,
                            "Feature loaded"
                        );
                    }
                    if let Some(tracker) = tracker {
                        tracker.record_load(feature.to_string());
                    }
                }
                Err(err) => {
                    if verbose {
                        error!(feature = %feature, error = %err, "Failed to load feature");
                    }
                }
            }
            result
        })
    }
}

/// Builds progressive, instrumented loaders for named features
#[derive(Clone)]
pub struct FeatureLoader {
    catalog: Arc<FallbackCatalog>,
    options: ProgressiveOptions,
    policy: RetryPolicy,
    verbose: bool,
    reload: ReloadSignal,
    tracker: Option<Arc<ChunkTracker>>,
}

impl FeatureLoader {
    pub fn new(config: &LoaderConfig, reload: ReloadSignal) -> Self {
        Self {
            catalog: Arc::new(FallbackCatalog::default()),
            options: config.progressive_options(),
            policy: config.retry_policy,
            verbose: config.dev_mode,
            reload,
            tracker: None,
        }
    }

    /// Record each successfully loaded feature as a chunk
    pub fn with_tracker(mut self, tracker: Arc<ChunkTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    pub fn with_catalog(mut self, catalog: Arc<FallbackCatalog>) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn with_options(mut self, options: ProgressiveOptions) -> Self {
        self.options = options;
        self
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Wrap `loader` for the feature `feature_name`. The returned loader is
    /// not mounted yet.
    pub fn load<T, L>(&self, loader: L, feature_name: &str) -> ProgressiveLoader<T>
    where
        T: Clone + Send + Sync + 'static,
        L: ModuleLoader<T> + 'static,
    {
        self.load_shared(Arc::new(loader), feature_name)
    }

    pub fn load_shared<T>(&self, loader: SharedLoader<T>, feature_name: &str) -> ProgressiveLoader<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        let instrumented = InstrumentedLoader {
            inner: loader,
            feature: Arc::from(feature_name),
            verbose: self.verbose,
            tracker: self.tracker.clone(),
        };
        let component = DeferredComponent::new(
            Arc::new(instrumented),
            self.options.fallback,
            Arc::clone(&self.catalog),
            self.policy,
            self.reload.clone(),
        );
        ProgressiveLoader::new(
            component,
            self.options,
            Arc::clone(&self.catalog),
            self.reload.clone(),
        )
    }
}
