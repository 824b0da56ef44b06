//! Sluice - log and event routing pipeline
//!
//! # Usage
//!
//! ```bash
//! # Run the pipeline described by a config file
//! sluice
//! sluice --config configs/pipeline.toml
//!
//! # Override the log level
//! sluice --log-level debug
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use sluice_config::Config;
use sluice_runtime::PipelineBuilder;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Sluice - log and event routing pipeline
#[derive(Parser, Debug)]
#[command(name = "sluice")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the pipeline configuration file
    #[arg(short, long, default_value = "configs/pipeline.toml")]
    config: std::path::PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides the config
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::from_file(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    let level = cli.log_level.as_deref().unwrap_or(&config.log.level);
    init_logging(level, config.log.ansi)?;

    tracing::info!(
        config = %cli.config.display(),
        plugins = config.plugins.len(),
        "sluice starting"
    );

    let pipeline = PipelineBuilder::new()
        .build(&config)
        .context("building pipeline")?;
    pipeline.run().await.context("running pipeline")?;

    tracing::info!("sluice shutdown complete");
    Ok(())
}

/// Initialize the tracing subscriber
fn init_logging(level: &str, ansi: bool) -> Result<()> {
    let filter = EnvFilter::try_new(level)
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|e| anyhow::anyhow!("invalid log level: {e}"))?;

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_ansi(ansi))
        .with(filter)
        .init();

    Ok(())
}
