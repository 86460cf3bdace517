//! Loader configuration, persisted as TOML

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::loading::fallback::FallbackKind;
use crate::loading::progressive::ProgressiveOptions;
use crate::loading::retry::RetryPolicy;
use crate::loading::tracker::DEFAULT_CHUNK_SIZE_KB;

/// Settings shared by the feature loader, chunk tracker and preload scheduler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Verbose load instrumentation. Defaults to the build mode.
    pub dev_mode: bool,

    /// Grace period before a fallback is shown
    pub grace_delay_ms: u64,

    /// Time after which a pending load is failed
    pub timeout_ms: u64,

    /// Delay between consecutive preloads
    pub preload_stagger_ms: u64,

    /// Fallback key used by the feature loader
    pub feature_fallback: String,

    /// Size attributed to each loaded chunk in metrics
    pub estimated_chunk_size_kb: u64,

    /// Recovery offered by error views
    pub retry_policy: RetryPolicy,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            dev_mode: cfg!(debug_assertions),
            grace_delay_ms: 200,
            timeout_ms: 10_000,
            preload_stagger_ms: 100,
            feature_fallback: "card".to_string(),
            estimated_chunk_size_kb: DEFAULT_CHUNK_SIZE_KB,
            retry_policy: RetryPolicy::ReloadApplication,
        }
    }
}

impl LoaderConfig {
    /// Default location: `<config dir>/chunkload/loader.toml`
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .map(|dir| dir.join("chunkload").join("loader.toml"))
            .unwrap_or_else(|| PathBuf::from("loader.toml"))
    }

    /// Load configuration from file; a missing file yields the defaults
    pub async fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read loader config {}", path.display()))?;
        let config: LoaderConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse loader config {}", path.display()))?;

        config.validate()?;
        Ok(config)
    }

    pub async fn save_to_file(&self, path: &Path) -> Result<()> {
        self.validate()?;

        let content = toml::to_string_pretty(self).context("Failed to serialize loader config")?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context("Failed to create config directory")?;
        }
        tokio::fs::write(path, content)
            .await
            .with_context(|| format!("Failed to write loader config {}", path.display()))?;

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.timeout_ms == 0 {
            bail!("timeout_ms must be greater than zero");
        }
        Ok(())
    }

    pub fn grace_delay(&self) -> Duration {
        Duration::from_millis(self.grace_delay_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn preload_stagger(&self) -> Duration {
        Duration::from_millis(self.preload_stagger_ms)
    }

    pub fn feature_fallback(&self) -> FallbackKind {
        FallbackKind::from_key(&self.feature_fallback)
    }

    pub fn progressive_options(&self) -> ProgressiveOptions {
        ProgressiveOptions::default()
            .with_delay(self.grace_delay())
            .with_timeout(self.timeout())
            .with_fallback(self.feature_fallback())
    }
}
