//! Staggered, fire-and-forget preloading of chunks

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::loading::loader::SharedLoader;
use crate::loading::tracker::ChunkTracker;

pub const DEFAULT_STAGGER: Duration = Duration::from_millis(100);

/// Outcome counts of a preload batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PreloadReport {
    pub succeeded: usize,
    pub failed: usize,
}

/// Handles of the preloads scheduled by one call. Dropping the batch does not
/// cancel anything.
#[derive(Debug)]
pub struct PreloadBatch {
    handles: Vec<JoinHandle<bool>>,
}

impl PreloadBatch {
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Wait for every preload to finish
    pub async fn join(self) -> PreloadReport {
        let mut report = PreloadReport::default();
        for handle in self.handles {
            match handle.await {
                Ok(true) => report.succeeded += 1,
                Ok(false) | Err(_) => report.failed += 1,
            }
        }
        report
    }

    /// Stop preloads that have not fired yet
    pub fn cancel(&self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}

/// Fires load operations spread out over time
#[derive(Clone)]
pub struct PreloadScheduler {
    stagger: Duration,
    tracker: Option<Arc<ChunkTracker>>,
}

impl PreloadScheduler {
    pub fn new(stagger: Duration) -> Self {
        Self {
            stagger,
            tracker: None,
        }
    }

    /// Record successful named preloads in a chunk tracker
    pub fn with_tracker(mut self, tracker: Arc<ChunkTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    pub fn stagger(&self) -> Duration {
        self.stagger
    }

    /// Schedule loader `i` at `i * stagger` from now and return immediately.
    /// A failing loader is logged and never affects the others.
    pub fn preload_all<T, I>(&self, loaders: I) -> PreloadBatch
    where
        T: Send + 'static,
        I: IntoIterator<Item = SharedLoader<T>>,
    {
        self.schedule(loaders.into_iter().map(|loader| (None, loader)))
    }

    /// Like [`preload_all`](Self::preload_all), recording each successful
    /// chunk under its name
    pub fn preload_chunks<T, I, S>(&self, chunks: I) -> PreloadBatch
    where
        T: Send + 'static,
        I: IntoIterator<Item = (S, SharedLoader<T>)>,
        S: Into<String>,
    {
        self.schedule(
            chunks
                .into_iter()
                .map(|(name, loader)| (Some(name.into()), loader)),
        )
    }

    fn schedule<T, I>(&self, items: I) -> PreloadBatch
    where
        T: Send + 'static,
        I: Iterator<Item = (Option<String>, SharedLoader<T>)>,
    {
        let handles = items
            .enumerate()
            .map(|(index, (name, loader))| {
                let offset = self.stagger * index as u32;
                let tracker = self.tracker.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(offset).await;
                    match loader.load().await {
                        Ok(_) => {
                            debug!(index, chunk = ?name, "Preload finished");
                            if let (Some(tracker), Some(name)) = (tracker, name) {
                                tracker.record_load(name);
                            }
                            true
                        }
                        Err(err) => {
                            warn!(index, chunk = ?name, error = %err, "Preload failed");
                            false
                        }
                    }
                })
            })
            .collect::<Vec<_>>();

        debug!(count = handles.len(), stagger_ms = self.stagger.as_millis() as u64, "Preloads scheduled");
        PreloadBatch { handles }
    }
}

impl Default for PreloadScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_STAGGER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loading::error::{LoadError, LoadResult};
    use crate::loading::loader::shared;
    use std::sync::Mutex;
    use tokio::time::Instant;

    type FireLog = Arc<Mutex<Vec<(&'static str, Duration)>>>;

    fn recording_loader(
        name: &'static str,
        fail: bool,
        start: Instant,
        log: FireLog,
    ) -> SharedLoader<()> {
        shared(move || {
            log.lock().unwrap().push((name, start.elapsed()));
            async move {
                if fail {
                    Err(LoadError::module(format!("{} chunk is corrupt", name)))
                } else {
                    Ok(())
                }
            }
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_does_not_block_siblings() {
        let log: FireLog = Arc::new(Mutex::new(Vec::new()));
        let start = Instant::now();
        let scheduler = PreloadScheduler::default();

        let batch = scheduler.preload_all(vec![
            recording_loader("a", false, start, Arc::clone(&log)),
            recording_loader("b", true, start, Arc::clone(&log)),
            recording_loader("c", false, start, Arc::clone(&log)),
        ]);
        assert_eq!(batch.len(), 3);

        let report = batch.join().await;
        assert_eq!(report, PreloadReport { succeeded: 2, failed: 1 });

        let fired = log.lock().unwrap().clone();
        let names: Vec<_> = fired.iter().map(|(name, _)| *name).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        for (index, (_, at)) in fired.iter().enumerate() {
            let expected = DEFAULT_STAGGER * index as u32;
            assert!(*at >= expected && *at < expected + Duration::from_millis(10));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_preload_returns_immediately() {
        let log: FireLog = Arc::new(Mutex::new(Vec::new()));
        let start = Instant::now();
        let scheduler = PreloadScheduler::new(Duration::from_millis(250));

        let batch = scheduler.preload_all(vec![
            recording_loader("feed", false, start, Arc::clone(&log)),
            recording_loader("profile", false, start, Arc::clone(&log)),
        ]);

        assert!(log.lock().unwrap().is_empty());
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(log.lock().unwrap().len(), 1);

        drop(batch);
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(log.lock().unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_named_preloads_record_chunks() {
        let tracker = Arc::new(ChunkTracker::default());
        let scheduler = PreloadScheduler::default().with_tracker(Arc::clone(&tracker));

        let ok: SharedLoader<()> = shared(|| async { Ok::<(), LoadError>(()) });
        let broken: SharedLoader<()> =
            shared(|| async { LoadResult::<()>::Err(LoadError::module("offline")) });

        let report = scheduler
            .preload_chunks(vec![("feed", Arc::clone(&ok)), ("messages", broken), ("settings", ok)])
            .join()
            .await;

        assert_eq!(report.failed, 1);
        assert_eq!(tracker.metrics().loaded_chunks, vec!["feed", "settings"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_pending_preloads() {
        let log: FireLog = Arc::new(Mutex::new(Vec::new()));
        let start = Instant::now();
        let scheduler = PreloadScheduler::default();

        let batch = scheduler.preload_all(vec![
            recording_loader("a", false, start, Arc::clone(&log)),
            recording_loader("b", false, start, Arc::clone(&log)),
        ]);
        tokio::time::sleep(Duration::from_millis(50)).await;
        batch.cancel();
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert_eq!(log.lock().unwrap().len(), 1);
    }
}
