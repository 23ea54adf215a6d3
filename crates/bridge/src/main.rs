//! ml-bridge - regression model bridge
//!
//! Keeps one feed-forward network in memory and serves line-delimited JSON
//! commands from stdin, answering on stdout. Logs go to stderr.

use anyhow::{Context, Result};
use bridge_lib::{init_tracing, CommandBridge, LogFormat, ModelManager, StructuredLogger};
use clap::Parser;
use std::io;
use std::path::PathBuf;
use tracing::info;

mod config;

const BRIDGE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Line-delimited JSON bridge for training and serving a regression network
#[derive(Parser, Debug)]
#[command(name = "ml-bridge")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file (TOML, JSON or YAML)
    #[arg(long, env = "BRIDGE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Number of input features
    #[arg(long)]
    pub input_dim: Option<usize>,

    /// Hidden layer widths, comma separated
    #[arg(long, value_delimiter = ',')]
    pub hidden_layers: Option<Vec<usize>>,

    #[arg(long)]
    pub dropout_rate: Option<f32>,

    #[arg(long)]
    pub learning_rate: Option<f32>,

    /// Seed for reproducible initialization and shuffling
    #[arg(long)]
    pub seed: Option<u64>,

    /// Network artifact to load at startup (requires --scaler-path)
    #[arg(long)]
    pub model_path: Option<PathBuf>,

    /// Scaler artifact to load at startup (requires --model-path)
    #[arg(long)]
    pub scaler_path: Option<PathBuf>,

    /// Log format written to stderr
    #[arg(long, env = "BRIDGE_LOG_FORMAT", default_value = "json")]
    pub log_format: LogFormat,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.log_format)?;
    info!(version = BRIDGE_VERSION, "Starting ml-bridge");

    // Load configuration
    let mut config = config::BridgeConfig::load(cli.config.as_deref())?;
    config.apply_cli(&cli);
    let model_config = config.model_config()?;
    let train_options = config.train_options()?;

    let manager = match config.seed {
        Some(seed) => ModelManager::with_seed(model_config, seed)?,
        None => ModelManager::new(model_config)?,
    };
    let mut bridge = CommandBridge::new(manager, train_options);

    if let Some((model_path, scaler_path)) = config.preload_paths() {
        // A failed preload is logged and the bridge starts without a model
        let _ = bridge.preload(model_path, scaler_path);
    }

    let logger = StructuredLogger::new(env!("CARGO_PKG_NAME"));
    logger.log_startup(BRIDGE_VERSION, &bridge.manager().status());

    let summary = bridge
        .run(io::stdin().lock(), io::stdout().lock())
        .context("Protocol stream failed")?;

    logger.log_shutdown("end of input", &summary);
    Ok(())
}
