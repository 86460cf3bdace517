//! Progressive, code-split component loading
//!
//! This module provides:
//! - A fallback catalog of placeholder and error views
//! - Deferred components that memoize a module load and never propagate its failure
//! - Progressive loaders with a grace delay and a hard timeout
//! - Instrumented feature loading
//! - Chunk tracking and staggered preloading

pub mod config;
pub mod deferred;
pub mod error;
pub mod fallback;
pub mod feature;
pub mod loader;
pub mod preload;
pub mod progressive;
pub mod render;
pub mod retry;
pub mod tracker;

pub use config::LoaderConfig;
pub use deferred::{DeferredComponent, LoadStatus};
pub use error::{LoadError, LoadResult};
pub use fallback::{CatalogEntry, ErrorView, FallbackCatalog, FallbackKind, Placeholder};
pub use feature::FeatureLoader;
pub use loader::{shared, LoadFuture, ModuleLoader, SharedLoader};
pub use preload::{PreloadBatch, PreloadReport, PreloadScheduler};
pub use progressive::{LoadPhase, PhaseEvent, ProgressiveLoader, ProgressiveOptions};
pub use render::{RenderKind, Rendered};
pub use retry::{ReloadSignal, RetryAction, RetryPolicy};
pub use tracker::{BundleMetrics, ChunkTracker};
