use anyhow::Result;
use futures::future::{join_all, FutureExt};
use serde::Serialize;
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::time::{Duration, Instant};
use tracing::{info, warn};

use crate::loading::{
    shared, BundleMetrics, ChunkTracker, FeatureLoader, LoadError, LoadPhase, LoaderConfig,
    PreloadReport, PreloadScheduler, ProgressiveLoader, ReloadSignal, RenderKind, RetryPolicy,
    SharedLoader,
};

/// Content produced by a simulated feature chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeatureView {
    pub feature: String,
    pub body: String,
}

/// A feature chunk with a fixed load latency that fails its first
/// `failures` loads
#[derive(Debug, Clone)]
pub struct SimulatedFeature {
    pub name: String,
    pub latency: Duration,
    pub failures: u32,
    attempts: Arc<AtomicU32>,
}

impl SimulatedFeature {
    pub fn new(name: impl Into<String>, latency: Duration, failures: u32) -> Self {
        Self {
            name: name.into(),
            latency,
            failures,
            attempts: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn loader(&self) -> SharedLoader<FeatureView> {
        let name = self.name.clone();
        let latency = self.latency;
        let failures = self.failures;
        let attempts = Arc::clone(&self.attempts);

        shared(move || {
            let name = name.clone();
            let attempt = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                tokio::time::sleep(latency).await;
                if attempt < failures {
                    Err(LoadError::module(format!(
                        "Chunk '{}' failed to download (attempt {})",
                        name,
                        attempt + 1
                    )))
                } else {
                    Ok(FeatureView {
                        body: format!("{} ready", name),
                        feature: name,
                    })
                }
            }
        })
    }
}

impl FromStr for SimulatedFeature {
    type Err = String;

    /// Parses `NAME:LATENCY_MS[:FAILURES]`
    fn from_str(spec: &str) -> Result<Self, Self::Err> {
        let mut parts = spec.split(':');
        let name = parts
            .next()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| format!("Missing feature name in '{}'", spec))?;
        let latency = match parts.next() {
            Some(ms) => ms
                .trim()
                .parse::<u64>()
                .map_err(|e| format!("Invalid latency in '{}': {}", spec, e))?,
            None => 0,
        };
        let failures = match parts.next() {
            Some(count) => count
                .trim()
                .parse::<u32>()
                .map_err(|e| format!("Invalid failure count in '{}': {}", spec, e))?,
            None => 0,
        };
        if parts.next().is_some() {
            return Err(format!("Too many fields in '{}'", spec));
        }

        Ok(Self::new(name, Duration::from_millis(latency), failures))
    }
}

/// What to load at startup
#[derive(Debug, Clone, Default)]
pub struct StartupPlan {
    pub features: Vec<SimulatedFeature>,
    pub preloads: Vec<SimulatedFeature>,
    /// Activate the retry control of every failed feature
    pub retry_failed: bool,
    pub max_retries: u32,
}

impl StartupPlan {
    pub fn demo() -> Self {
        Self {
            features: vec![
                SimulatedFeature::new("feed", Duration::from_millis(120), 0),
                SimulatedFeature::new("profile", Duration::from_millis(450), 0),
                SimulatedFeature::new("messages", Duration::from_millis(90), 1),
            ],
            preloads: vec![
                SimulatedFeature::new("notifications", Duration::from_millis(30), 0),
                SimulatedFeature::new("search", Duration::from_millis(60), 0),
                SimulatedFeature::new("explore", Duration::from_millis(40), 1),
            ],
            retry_failed: true,
            max_retries: 2,
        }
    }
}

/// Result of loading one feature
#[derive(Debug, Clone, Serialize)]
pub struct FeatureReport {
    pub feature: String,
    pub succeeded: bool,
    pub outcome: String,
    pub trace: Vec<RenderKind>,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RoundReport {
    pub round: u32,
    pub full_reload: bool,
    pub features: Vec<FeatureReport>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PreloadSummary {
    pub succeeded: usize,
    pub failed: usize,
}

impl From<PreloadReport> for PreloadSummary {
    fn from(report: PreloadReport) -> Self {
        Self {
            succeeded: report.succeeded,
            failed: report.failed,
        }
    }
}

/// Everything a startup run produced
#[derive(Debug, Clone, Serialize)]
pub struct StartupReport {
    pub rounds: Vec<RoundReport>,
    pub preload: PreloadSummary,
    pub reloads_requested: u64,
    pub metrics: BundleMetrics,
}

impl StartupReport {
    /// Features whose final attempt failed
    pub fn failed_features(&self) -> Vec<&str> {
        let mut failed = Vec::new();
        for round in &self.rounds {
            for report in &round.features {
                failed.retain(|name| *name != report.feature.as_str());
                if !report.succeeded {
                    failed.push(report.feature.as_str());
                }
            }
        }
        failed
    }
}

/// Simulated client startup driving the loading layer
pub struct App {
    config: LoaderConfig,
    tracker: Arc<ChunkTracker>,
    reload: ReloadSignal,
}

impl App {
    pub fn new(config: LoaderConfig) -> Self {
        let tracker = Arc::new(ChunkTracker::with_chunk_size(
            config.dev_mode,
            config.estimated_chunk_size_kb,
        ));
        Self {
            config,
            tracker,
            reload: ReloadSignal::new(),
        }
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    pub fn tracker(&self) -> Arc<ChunkTracker> {
        Arc::clone(&self.tracker)
    }

    pub fn reload_signal(&self) -> ReloadSignal {
        self.reload.clone()
    }

    /// Preload in the background, load every feature, and retry failures
    /// according to the configured retry policy
    pub async fn run(&self, plan: &StartupPlan) -> Result<StartupReport> {
        self.config.validate()?;

        let scheduler =
            PreloadScheduler::new(self.config.preload_stagger()).with_tracker(self.tracker());
        let preloads = scheduler.preload_chunks(
            plan.preloads
                .iter()
                .map(|feature| (feature.name.clone(), feature.loader())),
        );

        let features = FeatureLoader::new(&self.config, self.reload.clone()).with_tracker(self.tracker());
        let mut active = self.mount_features(&features, &plan.features);
        let mut rounds = Vec::new();
        let mut full_reload = false;

        for round in 0..=plan.max_retries {
            let reports = Self::settle_round(&active).await;
            let failed: Vec<usize> = reports
                .iter()
                .enumerate()
                .filter(|(_, report)| !report.succeeded)
                .map(|(index, _)| index)
                .collect();
            rounds.push(RoundReport {
                round,
                full_reload,
                features: reports,
            });

            if failed.is_empty() || !plan.retry_failed || round == plan.max_retries {
                break;
            }

            for &index in &failed {
                if let Some(view) = active[index].1.render().error_view() {
                    view.retry();
                }
            }

            // A retry control that asked for a reload leaves a pending wakeup
            full_reload = self.reload.wait().now_or_never().is_some();
            if full_reload {
                info!(round = round + 1, "Reloading application");
                active = self.mount_features(&features, &plan.features);
            } else {
                info!(round = round + 1, failed = failed.len(), "Retrying failed features");
                active = active
                    .into_iter()
                    .enumerate()
                    .filter(|(index, _)| failed.contains(index))
                    .map(|(_, entry)| entry)
                    .collect();
            }
        }

        let preload = preloads.join().await.into();
        Ok(StartupReport {
            rounds,
            preload,
            reloads_requested: self.reload.requested_count(),
            metrics: self.tracker.metrics(),
        })
    }

    fn mount_features(
        &self,
        features: &FeatureLoader,
        plan: &[SimulatedFeature],
    ) -> Vec<(String, ProgressiveLoader<FeatureView>)> {
        plan.iter()
            .map(|feature| {
                let loader = features.load_shared(feature.loader(), &feature.name);
                loader.mount();
                (feature.name.clone(), loader)
            })
            .collect()
    }

    async fn settle_round(active: &[(String, ProgressiveLoader<FeatureView>)]) -> Vec<FeatureReport> {
        let started = Instant::now();
        let loads = active.iter().map(|(name, loader)| async move {
            let phase = loader.settled().await;
            let elapsed_ms = started.elapsed().as_millis() as u64;

            let outcome = match &phase {
                LoadPhase::Succeeded => "loaded".to_string(),
                LoadPhase::Failed(err) if err.is_timeout() => format!("timed out: {}", err),
                LoadPhase::Failed(err) => format!("failed: {}", err),
                other => format!("{:?}", other),
            };
            if let Some(view) = loader.render().error_view() {
                warn!(feature = %name, message = %view.message, "Feature shows error view");
            }

            FeatureReport {
                feature: name.clone(),
                succeeded: phase == LoadPhase::Succeeded,
                outcome,
                trace: loader.trace(),
                elapsed_ms,
            }
        });

        join_all(loads).await
    }

    /// Whether failed features are recovered by a full reload
    pub fn reloads_on_failure(&self) -> bool {
        self.config.retry_policy == RetryPolicy::ReloadApplication
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(policy: RetryPolicy) -> LoaderConfig {
        LoaderConfig {
            dev_mode: true,
            retry_policy: policy,
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_simulated_feature() {
        let feature: SimulatedFeature = "feed:120:2".parse().unwrap();
        assert_eq!(feature.name, "feed");
        assert_eq!(feature.latency, Duration::from_millis(120));
        assert_eq!(feature.failures, 2);

        let feature: SimulatedFeature = "profile".parse().unwrap();
        assert_eq!(feature.latency, Duration::ZERO);
        assert_eq!(feature.failures, 0);

        assert!("".parse::<SimulatedFeature>().is_err());
        assert!("feed:soon".parse::<SimulatedFeature>().is_err());
        assert!("feed:1:2:3".parse::<SimulatedFeature>().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reload_policy_restarts_all_features() {
        let app = App::new(config(RetryPolicy::ReloadApplication));
        let plan = StartupPlan::demo();

        let report = app.run(&plan).await.unwrap();

        assert_eq!(report.rounds.len(), 2);
        assert!(report.rounds[1].full_reload);
        assert_eq!(report.rounds[1].features.len(), plan.features.len());
        assert!(report.failed_features().is_empty());
        assert_eq!(report.reloads_requested, 1);
        assert!(app.reloads_on_failure());

        // feed and profile were loaded twice, but recorded once
        let metrics = &report.metrics;
        for chunk in ["feed", "profile", "messages", "notifications", "search"] {
            assert_eq!(
                metrics.loaded_chunks.iter().filter(|name| *name == chunk).count(),
                1,
                "{} should be recorded once",
                chunk
            );
        }
        assert!(!metrics.loaded_chunks.iter().any(|name| name == "explore"));
        assert_eq!(report.preload.failed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_load_policy_retries_only_failures() {
        let app = App::new(config(RetryPolicy::RetryLoad));
        let plan = StartupPlan::demo();

        let report = app.run(&plan).await.unwrap();

        assert_eq!(report.rounds.len(), 2);
        assert!(!report.rounds[1].full_reload);
        let retried: Vec<_> = report.rounds[1]
            .features
            .iter()
            .map(|f| f.feature.as_str())
            .collect();
        assert_eq!(retried, vec!["messages"]);
        assert_eq!(report.reloads_requested, 0);
        assert_eq!(plan.features[0].attempts(), 1);
        assert_eq!(plan.features[2].attempts(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_feature_times_out() {
        let app = App::new(LoaderConfig {
            timeout_ms: 500,
            ..config(RetryPolicy::ReloadApplication)
        });
        let plan = StartupPlan {
            features: vec![SimulatedFeature::new("video", Duration::from_secs(5), 0)],
            ..Default::default()
        };

        let report = app.run(&plan).await.unwrap();
        let video = &report.rounds[0].features[0];

        assert!(!video.succeeded);
        assert!(video.outcome.starts_with("timed out"));
        assert_eq!(
            video.trace,
            vec![RenderKind::Nothing, RenderKind::Fallback, RenderKind::Error]
        );
        assert_eq!(report.failed_features(), vec!["video"]);
        assert_eq!(report.reloads_requested, 0);
    }
}
