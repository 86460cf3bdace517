use anyhow::Result;
use clap::Parser;
use chunkload::cli::{Cli, CliHandler, Commands, RunArgs};
use chunkload::loading::LoaderConfig;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so the JSON report on stdout stays clean
    let log_level = if cli.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(log_level)
        .init();

    let config_path = cli.config.clone().unwrap_or_else(LoaderConfig::default_path);
    let mut config = LoaderConfig::load_from_file(&config_path).await?;
    if cli.dev {
        config.dev_mode = true;
    }
    if config.dev_mode {
        tracing::debug!("Development mode - verbose load instrumentation active");
    }

    let command = cli.command.unwrap_or_else(|| {
        Commands::Run(RunArgs {
            max_retries: 2,
            ..Default::default()
        })
    });

    CliHandler::new(config, config_path)
        .handle_command(command)
        .await
}
