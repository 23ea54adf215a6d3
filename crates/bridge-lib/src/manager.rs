//! Model lifecycle management
//!
//! Owns the network, the feature scaler and the lifecycle state
//! (`Empty → Built → Trained`). Every operation either succeeds or leaves the
//! manager exactly as it was.

use crate::error::{BridgeError, Result};
use crate::models::{ModelConfig, ModelState, ModelStatus, TrainOptions, TrainingHistory};
use crate::network::Network;
use crate::persistence::{read_artifact, stage_artifact, ArtifactKind};
use crate::scaler::StandardScaler;
use ndarray::{aview1, Array1, ArrayView1, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, warn};

const NOT_TRAINED: &str = "Model not trained yet";

/// Owner of the regression network and its preprocessing contract
pub struct ModelManager {
    config: ModelConfig,
    network: Option<Network>,
    scaler: StandardScaler,
    state: ModelState,
    rng: StdRng,
}

impl ModelManager {
    /// Create an empty manager, seeding randomness from the OS
    pub fn new(config: ModelConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::with_rng(config, StdRng::from_os_rng()))
    }

    /// Create an empty manager with reproducible initialization and shuffling
    pub fn with_seed(config: ModelConfig, seed: u64) -> Result<Self> {
        config.validate()?;
        Ok(Self::with_rng(config, StdRng::seed_from_u64(seed)))
    }

    fn with_rng(config: ModelConfig, rng: StdRng) -> Self {
        Self {
            config,
            network: None,
            scaler: StandardScaler::new(),
            state: ModelState::Empty,
            rng,
        }
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn state(&self) -> ModelState {
        self.state
    }

    pub fn network(&self) -> Option<&Network> {
        self.network.as_ref()
    }

    pub fn scaler(&self) -> &StandardScaler {
        &self.scaler
    }

    /// Discard any existing network and initialize a fresh one
    pub fn build(&mut self) {
        let network = Network::build(&self.config, &mut self.rng);
        info!(
            input_dim = self.config.input_dim,
            hidden_layers = ?self.config.hidden_layers,
            dropout_rate = self.config.dropout_rate,
            parameters = network.parameter_count(),
            "Network built"
        );
        self.network = Some(network);
        self.scaler = StandardScaler::new();
        self.state = ModelState::Built;
    }

    /// Fit the scaler and the network on `(x, y)`.
    ///
    /// Train constructs the network on demand: a `Built` network is trained
    /// as-is, any other state starts from a freshly built one so nothing from
    /// an earlier run leaks into this one. Network and scaler are replaced
    /// only when training succeeds.
    pub fn train(
        &mut self,
        x: ArrayView2<f32>,
        y: ArrayView1<f32>,
        options: &TrainOptions,
    ) -> Result<TrainingHistory> {
        options.validate()?;
        self.check_training_data(x, y)?;

        let mut candidate = match (self.state, &self.network) {
            (ModelState::Built, Some(network)) => network.clone(),
            _ => {
                info!(state = ?self.state, "No untrained network, building one before training");
                Network::build(&self.config, &mut self.rng)
            }
        };

        let start = Instant::now();
        let mut scaler = StandardScaler::new();
        let x_scaled = scaler.fit_transform(x)?;
        let history = candidate.fit(x_scaled.view(), y, options, &mut self.rng)?;

        self.network = Some(candidate);
        self.scaler = scaler;
        self.state = ModelState::Trained;

        let best = history.best();
        info!(
            rows = x.nrows(),
            epochs_run = history.epochs_run(),
            best_epoch = history.best_epoch,
            best_loss = ?best.map(|m| m.monitored()),
            stopped_early = history.stopped_early,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Training completed"
        );

        Ok(history)
    }

    fn check_training_data(&self, x: ArrayView2<f32>, y: ArrayView1<f32>) -> Result<()> {
        if x.ncols() != self.config.input_dim {
            return Err(BridgeError::ShapeMismatch {
                expected: self.config.input_dim,
                got: x.ncols(),
            });
        }
        if x.nrows() == 0 {
            return Err(BridgeError::InvalidTrainingData(
                "training set is empty".to_string(),
            ));
        }
        if x.nrows() != y.len() {
            return Err(BridgeError::InvalidTrainingData(format!(
                "features have {} rows but targets have {} values",
                x.nrows(),
                y.len()
            )));
        }
        if x.iter().chain(y.iter()).any(|v| !v.is_finite()) {
            return Err(BridgeError::InvalidTrainingData(
                "features and targets must be finite numbers".to_string(),
            ));
        }
        Ok(())
    }

    fn trained_network(&self) -> Result<&Network> {
        match (&self.network, self.state) {
            (Some(network), state) if state.can_predict() => Ok(network),
            _ => Err(BridgeError::ModelNotReady(NOT_TRAINED)),
        }
    }

    /// Predict one value per row of `x`
    pub fn predict(&self, x: ArrayView2<f32>) -> Result<Array1<f32>> {
        let network = self.trained_network()?;
        if let Some(((row, col), _)) = x.indexed_iter().find(|(_, v)| !v.is_finite()) {
            return Err(BridgeError::InvalidInput(format!(
                "feature {} of row {} is not a finite number",
                col, row
            )));
        }
        let x_scaled = self.scaler.transform(x)?;
        let predictions = network.predict(x_scaled.view())?;
        debug!(rows = x.nrows(), "Prediction completed");
        Ok(predictions)
    }

    /// Predict a single feature vector
    pub fn predict_one(&self, features: &[f32]) -> Result<f32> {
        let x = aview1(features).insert_axis(Axis(0));
        let predictions = self.predict(x)?;
        Ok(predictions[0])
    }

    /// Persist the trained network and the fitted scaler
    pub fn save(&self, model_path: &Path, scaler_path: &Path) -> Result<()> {
        let network = self.trained_network()?;

        // Both artifacts are fully written before either replaces a file on disk
        let staged_network = stage_artifact(model_path, ArtifactKind::Network, network)?;
        let staged_scaler = stage_artifact(scaler_path, ArtifactKind::Scaler, &self.scaler)?;
        staged_network.commit()?;
        staged_scaler.commit()?;

        info!(
            model_path = %model_path.display(),
            scaler_path = %scaler_path.display(),
            "Model saved"
        );
        Ok(())
    }

    /// Replace the network and scaler with previously saved artifacts
    pub fn load(&mut self, model_path: &Path, scaler_path: &Path) -> Result<()> {
        for path in [model_path, scaler_path] {
            if !path.is_file() {
                return Err(BridgeError::ArtifactNotFound {
                    path: path.to_path_buf(),
                });
            }
        }

        let (network, network_info) = read_artifact::<Network>(model_path, ArtifactKind::Network)?;
        network
            .validate()
            .map_err(|reason| BridgeError::corrupt(model_path, reason))?;

        let (scaler, _) = read_artifact::<StandardScaler>(scaler_path, ArtifactKind::Scaler)?;
        scaler
            .validate()
            .map_err(|reason| BridgeError::corrupt(scaler_path, reason))?;

        if scaler.n_features() != Some(network.input_dim()) {
            return Err(BridgeError::corrupt(
                scaler_path,
                format!(
                    "scaler was fitted on {} features but the network expects {}",
                    scaler.n_features().unwrap_or(0),
                    network.input_dim()
                ),
            ));
        }

        if network.config() != &self.config {
            warn!(
                configured_input_dim = self.config.input_dim,
                loaded_input_dim = network.input_dim(),
                loaded_hidden_layers = ?network.config().hidden_layers,
                "Loaded network topology differs from configuration, using the loaded one"
            );
        }

        self.config = network.config().clone();
        self.network = Some(network);
        self.scaler = scaler;
        self.state = ModelState::Trained;

        info!(
            model_path = %model_path.display(),
            scaler_path = %scaler_path.display(),
            checksum = %network_info.checksum,
            saved_at = network_info.saved_at,
            "Model loaded"
        );
        Ok(())
    }

    pub fn status(&self) -> ModelStatus {
        ModelStatus {
            model_state: self.state,
            input_dim: self.config.input_dim,
            hidden_layers: self.config.hidden_layers.clone(),
            dropout_rate: self.config.dropout_rate,
            learning_rate: self.config.learning_rate,
            parameters: self.network.as_ref().map(Network::parameter_count),
        }
    }
}
