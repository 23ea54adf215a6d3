//! Bridge configuration
//!
//! Layered as: optional config file, then `BRIDGE_*` environment variables,
//! then command-line flags.

use crate::Cli;
use anyhow::{bail, Context, Result};
use bridge_lib::{
    ModelConfig, TrainOptions, DEFAULT_DROPOUT_RATE, DEFAULT_HIDDEN_LAYERS, DEFAULT_LEARNING_RATE,
    DEFAULT_PATIENCE,
};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Bridge configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BridgeConfig {
    /// Number of input features; required
    #[serde(default)]
    pub input_dim: Option<usize>,

    #[serde(default = "default_hidden_layers")]
    pub hidden_layers: Vec<usize>,

    #[serde(default = "default_dropout_rate")]
    pub dropout_rate: f32,

    #[serde(default = "default_learning_rate")]
    pub learning_rate: f32,

    /// Default epochs for `train` requests
    #[serde(default = "default_epochs")]
    pub epochs: usize,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_validation_split")]
    pub validation_split: f32,

    #[serde(default = "default_patience")]
    pub patience: usize,

    /// Seed for weight initialization, dropout and shuffling
    #[serde(default)]
    pub seed: Option<u64>,

    /// Artifacts loaded at startup when both paths are set
    #[serde(default)]
    pub model_path: Option<PathBuf>,

    #[serde(default)]
    pub scaler_path: Option<PathBuf>,
}

fn default_hidden_layers() -> Vec<usize> {
    DEFAULT_HIDDEN_LAYERS.to_vec()
}

fn default_dropout_rate() -> f32 {
    DEFAULT_DROPOUT_RATE
}

fn default_learning_rate() -> f32 {
    DEFAULT_LEARNING_RATE
}

fn default_epochs() -> usize {
    100
}

fn default_batch_size() -> usize {
    32
}

fn default_validation_split() -> f32 {
    0.2
}

fn default_patience() -> usize {
    DEFAULT_PATIENCE
}

impl BridgeConfig {
    /// Load configuration from an optional file and the environment
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let config = builder
            .add_source(
                config::Environment::with_prefix("BRIDGE")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("hidden_layers"),
            )
            .build()
            .context("Failed to read configuration sources")?;

        config
            .try_deserialize()
            .context("Invalid configuration values")
    }

    /// Command-line flags take precedence over every other source
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(input_dim) = cli.input_dim {
            self.input_dim = Some(input_dim);
        }
        if let Some(hidden_layers) = &cli.hidden_layers {
            self.hidden_layers = hidden_layers.clone();
        }
        if let Some(dropout_rate) = cli.dropout_rate {
            self.dropout_rate = dropout_rate;
        }
        if let Some(learning_rate) = cli.learning_rate {
            self.learning_rate = learning_rate;
        }
        if let Some(seed) = cli.seed {
            self.seed = Some(seed);
        }
        if let Some(path) = &cli.model_path {
            self.model_path = Some(path.clone());
        }
        if let Some(path) = &cli.scaler_path {
            self.scaler_path = Some(path.clone());
        }
    }

    pub fn model_config(&self) -> Result<ModelConfig> {
        let Some(input_dim) = self.input_dim else {
            bail!("input_dim is required: pass --input-dim, set BRIDGE_INPUT_DIM or add input_dim to the config file");
        };

        let config = ModelConfig::new(input_dim)
            .with_hidden_layers(self.hidden_layers.clone())
            .with_dropout_rate(self.dropout_rate)
            .with_learning_rate(self.learning_rate);
        config.validate()?;
        Ok(config)
    }

    /// Defaults for `train` requests that omit their options
    pub fn train_options(&self) -> Result<TrainOptions> {
        let options = TrainOptions {
            validation_split: self.validation_split,
            epochs: self.epochs,
            batch_size: self.batch_size,
            patience: self.patience,
        };
        options.validate()?;
        Ok(options)
    }

    /// Startup artifacts, only when both paths are configured
    pub fn preload_paths(&self) -> Option<(&Path, &Path)> {
        match (&self.model_path, &self.scaler_path) {
            (Some(model), Some(scaler)) => Some((model.as_path(), scaler.as_path())),
            (None, None) => None,
            _ => {
                warn!("Only one of model_path and scaler_path is set, skipping preload");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::fs;
    use tempfile::TempDir;

    fn from_file(contents: &str, name: &str) -> BridgeConfig {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(name);
        fs::write(&path, contents).unwrap();
        BridgeConfig::load(Some(&path)).unwrap()
    }

    #[test]
    fn test_defaults_from_minimal_file() {
        let config = from_file("input_dim = 10\n", "bridge.toml");
        assert_eq!(config.input_dim, Some(10));
        assert_eq!(config.hidden_layers, vec![64, 32]);
        assert_eq!(config.epochs, 100);
        assert_eq!(config.patience, 10);

        let model = config.model_config().unwrap();
        assert_eq!(model.dropout_rate, 0.2);
        assert_eq!(model.learning_rate, 0.001);
        assert_eq!(config.train_options().unwrap(), TrainOptions::default());
    }

    #[test]
    fn test_json_file_sets_topology() {
        let config = from_file(
            r#"{"input_dim": 4, "hidden_layers": [16, 8, 4], "dropout_rate": 0.1}"#,
            "bridge.json",
        );
        let model = config.model_config().unwrap();
        assert_eq!(model.hidden_layers, vec![16, 8, 4]);
        assert_eq!(model.dropout_rate, 0.1);
    }

    #[test]
    fn test_missing_input_dim_is_an_error() {
        let config = from_file("epochs = 5\n", "bridge.toml");
        let err = config.model_config().unwrap_err();
        assert!(err.to_string().contains("input_dim is required"));
    }

    #[test]
    fn test_invalid_topology_is_an_error() {
        let config = from_file("input_dim = 3\nhidden_layers = []\n", "bridge.toml");
        assert!(config.model_config().is_err());
    }

    #[test]
    fn test_missing_config_file_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        assert!(BridgeConfig::load(Some(&temp_dir.path().join("absent.toml"))).is_err());
    }

    #[test]
    fn test_cli_overrides_file() {
        let mut config = from_file("input_dim = 10\nseed = 1\n", "bridge.toml");
        let cli = Cli::parse_from([
            "ml-bridge",
            "--input-dim",
            "6",
            "--hidden-layers",
            "12,6",
            "--model-path",
            "m.json",
            "--scaler-path",
            "s.json",
        ]);
        config.apply_cli(&cli);

        assert_eq!(config.input_dim, Some(6));
        assert_eq!(config.hidden_layers, vec![12, 6]);
        assert_eq!(config.seed, Some(1));
        let (model, scaler) = config.preload_paths().unwrap();
        assert_eq!(model, Path::new("m.json"));
        assert_eq!(scaler, Path::new("s.json"));
    }

    #[test]
    fn test_single_preload_path_is_ignored() {
        let mut config = from_file("input_dim = 2\n", "bridge.toml");
        config.model_path = Some(PathBuf::from("m.json"));
        assert!(config.preload_paths().is_none());
    }
}
