use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::app::{App, SimulatedFeature, StartupPlan};
use crate::loading::LoaderConfig;

/// chunkload - progressive loading of code-split application features
#[derive(Parser)]
#[command(name = "chunkload")]
#[command(about = "Simulate progressive, code-split feature loading")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Loader configuration file (TOML)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Force verbose load instrumentation regardless of build mode
    #[arg(long, global = true)]
    pub dev: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a simulated application startup and print a JSON report
    Run(RunArgs),

    /// Show the effective loader configuration
    Config(ConfigArgs),
}

#[derive(Args, Default)]
pub struct RunArgs {
    /// Feature to load, as NAME:LATENCY_MS[:FAILURES] (repeatable)
    #[arg(long = "feature", value_name = "SPEC")]
    pub features: Vec<SimulatedFeature>,

    /// Chunk to preload, as NAME:LATENCY_MS[:FAILURES] (repeatable)
    #[arg(long = "preload", value_name = "SPEC")]
    pub preloads: Vec<SimulatedFeature>,

    /// Press the retry control of every feature that fails
    #[arg(long)]
    pub retry_failed: bool,

    /// Maximum number of retry rounds
    #[arg(long, default_value = "2")]
    pub max_retries: u32,
}

impl RunArgs {
    /// Build a startup plan, using the demo features when none are given
    pub fn plan(&self) -> StartupPlan {
        if self.features.is_empty() && self.preloads.is_empty() {
            return StartupPlan {
                max_retries: self.max_retries,
                ..StartupPlan::demo()
            };
        }

        StartupPlan {
            features: self.features.clone(),
            preloads: self.preloads.clone(),
            retry_failed: self.retry_failed,
            max_retries: self.max_retries,
        }
    }
}

#[derive(Args)]
pub struct ConfigArgs {
    /// Write the effective configuration to the config file
    #[arg(long)]
    pub write: bool,
}

/// Executes CLI subcommands
pub struct CliHandler {
    config: LoaderConfig,
    config_path: PathBuf,
}

impl CliHandler {
    pub fn new(config: LoaderConfig, config_path: PathBuf) -> Self {
        Self {
            config,
            config_path,
        }
    }

    pub async fn handle_command(&self, command: Commands) -> Result<()> {
        match command {
            Commands::Run(args) => self.handle_run(args).await,
            Commands::Config(args) => self.handle_config(args).await,
        }
    }

    async fn handle_run(&self, args: RunArgs) -> Result<()> {
        let app = App::new(self.config.clone());
        let report = app.run(&args.plan()).await?;

        let json = serde_json::to_string_pretty(&report).context("Failed to serialize report")?;
        println!("{}", json);

        let failed = report.failed_features();
        if !failed.is_empty() {
            tracing::warn!("Features still failing: {}", failed.join(", "));
        }
        Ok(())
    }

    async fn handle_config(&self, args: ConfigArgs) -> Result<()> {
        let content =
            toml::to_string_pretty(&self.config).context("Failed to serialize loader config")?;
        println!("# {}", self.config_path.display());
        println!("{}", content);

        if args.write {
            self.config.save_to_file(&self.config_path).await?;
            tracing::info!("Wrote loader config to {}", self.config_path.display());
        }
        Ok(())
    }
}
