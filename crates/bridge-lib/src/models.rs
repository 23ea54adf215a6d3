//! Core data models for the regression bridge

use crate::error::{BridgeError, Result};
use serde::{Deserialize, Serialize};

/// Default hidden layer widths
pub const DEFAULT_HIDDEN_LAYERS: [usize; 2] = [64, 32];

/// Default dropout probability applied after every hidden layer
pub const DEFAULT_DROPOUT_RATE: f32 = 0.2;

/// Default Adam learning rate
pub const DEFAULT_LEARNING_RATE: f32 = 0.001;

/// Epochs without validation improvement before training halts
pub const DEFAULT_PATIENCE: usize = 10;

/// Shape of the regression network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub input_dim: usize,
    pub hidden_layers: Vec<usize>,
    pub dropout_rate: f32,
    pub learning_rate: f32,
}

impl ModelConfig {
    /// Create a configuration with the default topology for `input_dim` features
    pub fn new(input_dim: usize) -> Self {
        Self {
            input_dim,
            hidden_layers: DEFAULT_HIDDEN_LAYERS.to_vec(),
            dropout_rate: DEFAULT_DROPOUT_RATE,
            learning_rate: DEFAULT_LEARNING_RATE,
        }
    }

    pub fn with_hidden_layers(mut self, hidden_layers: Vec<usize>) -> Self {
        self.hidden_layers = hidden_layers;
        self
    }

    pub fn with_dropout_rate(mut self, dropout_rate: f32) -> Self {
        self.dropout_rate = dropout_rate;
        self
    }

    pub fn with_learning_rate(mut self, learning_rate: f32) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.input_dim == 0 {
            return Err(BridgeError::InvalidConfig(
                "input_dim must be a positive integer".to_string(),
            ));
        }
        if self.hidden_layers.is_empty() {
            return Err(BridgeError::InvalidConfig(
                "hidden_layers must contain at least one layer".to_string(),
            ));
        }
        if let Some(idx) = self.hidden_layers.iter().position(|&w| w == 0) {
            return Err(BridgeError::InvalidConfig(format!(
                "hidden layer {} has zero width",
                idx
            )));
        }
        if !(0.0..1.0).contains(&self.dropout_rate) {
            return Err(BridgeError::InvalidConfig(format!(
                "dropout_rate must be in [0, 1), got {}",
                self.dropout_rate
            )));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(BridgeError::InvalidConfig(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        Ok(())
    }
}

/// Options for a single training run
#[derive(Debug, Clone, PartialEq)]
pub struct TrainOptions {
    /// Trailing fraction of rows held out for validation
    pub validation_split: f32,
    pub epochs: usize,
    pub batch_size: usize,
    /// Epochs without improvement before stopping early
    pub patience: usize,
}

impl Default for TrainOptions {
    fn default() -> Self {
        Self {
            validation_split: 0.2,
            epochs: 100,
            batch_size: 32,
            patience: DEFAULT_PATIENCE,
        }
    }
}

impl TrainOptions {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..1.0).contains(&self.validation_split) {
            return Err(BridgeError::InvalidTrainingData(format!(
                "validation_split must be in [0, 1), got {}",
                self.validation_split
            )));
        }
        if self.epochs == 0 {
            return Err(BridgeError::InvalidTrainingData(
                "epochs must be at least 1".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(BridgeError::InvalidTrainingData(
                "batch_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Loss and metric values recorded at the end of one epoch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    pub epoch: usize,
    pub loss: f32,
    pub mae: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub val_loss: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub val_mae: Option<f32>,
}

impl EpochMetrics {
    /// The value early stopping watches: validation loss when a holdout exists
    pub fn monitored(&self) -> f32 {
        self.val_loss.unwrap_or(self.loss)
    }
}

/// Per-epoch history of a training run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingHistory {
    pub epochs: Vec<EpochMetrics>,
    /// Epoch whose parameters were kept (1-based)
    pub best_epoch: usize,
    pub stopped_early: bool,
}

impl TrainingHistory {
    pub fn epochs_run(&self) -> usize {
        self.epochs.len()
    }

    pub fn best(&self) -> Option<&EpochMetrics> {
        self.epochs.iter().find(|m| m.epoch == self.best_epoch)
    }
}

/// Lifecycle state of the managed model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelState {
    /// No network exists
    Empty,
    /// A freshly initialized network exists but has not been trained
    Built,
    /// A trained or restored network and a fitted scaler exist
    Trained,
}

impl ModelState {
    pub fn can_predict(&self) -> bool {
        matches!(self, ModelState::Trained)
    }
}

/// Snapshot of the manager reported by the `status` action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelStatus {
    pub model_state: ModelState,
    pub input_dim: usize,
    pub hidden_layers: Vec<usize>,
    pub dropout_rate: f32,
    pub learning_rate: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ModelConfig::new(10);
        assert_eq!(config.hidden_layers, vec![64, 32]);
        assert_eq!(config.dropout_rate, 0.2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_rejects_bad_shapes() {
        assert!(ModelConfig::new(0).validate().is_err());
        assert!(ModelConfig::new(4)
            .with_hidden_layers(vec![])
            .validate()
            .is_err());
        assert!(ModelConfig::new(4)
            .with_hidden_layers(vec![8, 0])
            .validate()
            .is_err());
        assert!(ModelConfig::new(4)
            .with_dropout_rate(1.0)
            .validate()
            .is_err());
        assert!(ModelConfig::new(4)
            .with_learning_rate(0.0)
            .validate()
            .is_err());
    }

    #[test]
    fn test_train_options_validation() {
        assert!(TrainOptions::default().validate().is_ok());
        let opts = TrainOptions {
            validation_split: 1.0,
            ..Default::default()
        };
        assert!(opts.validate().is_err());
        let opts = TrainOptions {
            batch_size: 0,
            ..Default::default()
        };
        assert!(opts.validate().is_err());
    }

    #[test]
    fn test_model_state_serializes_lowercase() {
        let json = serde_json::to_string(&ModelState::Trained).unwrap();
        assert_eq!(json, "\"trained\"");
        assert!(!ModelState::Built.can_predict());
    }

    #[test]
    fn test_monitored_falls_back_to_training_loss() {
        let m = EpochMetrics {
            epoch: 1,
            loss: 0.5,
            mae: 0.4,
            val_loss: None,
            val_mae: None,
        };
        assert_eq!(m.monitored(), 0.5);
    }
}
