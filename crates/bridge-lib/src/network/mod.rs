//! Feed-forward regression network
//!
//! A sequential stack of dense ReLU blocks, each followed by dropout, and a
//! single linear output unit. Trained with Adam on mean squared error; see
//! [`Network::fit`] for the training loop.

mod adam;
mod layers;
mod loss;
mod trainer;

pub use adam::Adam;
pub use layers::{Activation, Dense, Dropout, Layer};
pub use loss::{mean_absolute_error, LossFn, Mse};

use crate::error::{BridgeError, Result};
use crate::models::ModelConfig;
use ndarray::{Array1, Array2, ArrayView2, Axis};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Topology plus learned parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Network {
    config: ModelConfig,
    layers: Vec<Layer>,
}

impl Network {
    /// Build a freshly initialized network for `config`
    pub fn build<R: Rng + ?Sized>(config: &ModelConfig, rng: &mut R) -> Self {
        let mut layers = Vec::with_capacity(config.hidden_layers.len() * 2 + 1);
        let mut fan_in = config.input_dim;

        for &units in &config.hidden_layers {
            layers.push(Layer::Dense(Dense::new(fan_in, units, Activation::Relu, rng)));
            layers.push(Layer::Dropout(Dropout::new(config.dropout_rate)));
            fan_in = units;
        }
        layers.push(Layer::Dense(Dense::new(fan_in, 1, Activation::Linear, rng)));

        Self {
            config: config.clone(),
            layers,
        }
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn input_dim(&self) -> usize {
        self.config.input_dim
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn parameter_count(&self) -> usize {
        self.layers.iter().map(Layer::parameter_count).sum()
    }

    /// Check that a deserialized network is consistent with its own configuration
    pub fn validate(&self) -> std::result::Result<(), String> {
        self.config.validate().map_err(|e| e.to_string())?;

        let dense: Vec<&Dense> = self
            .layers
            .iter()
            .filter_map(|layer| match layer {
                Layer::Dense(d) => Some(d),
                Layer::Dropout(_) => None,
            })
            .collect();

        if dense.len() != self.config.hidden_layers.len() + 1 {
            return Err(format!(
                "expected {} dense layers, found {}",
                self.config.hidden_layers.len() + 1,
                dense.len()
            ));
        }

        let mut fan_in = self.config.input_dim;
        let widths = self.config.hidden_layers.iter().copied().chain(std::iter::once(1));
        for (idx, (layer, width)) in dense.iter().zip(widths).enumerate() {
            if layer.fan_in() != fan_in || layer.fan_out() != width {
                return Err(format!(
                    "dense layer {} has shape ({}, {}), expected ({}, {})",
                    idx,
                    layer.fan_in(),
                    layer.fan_out(),
                    fan_in,
                    width
                ));
            }
            if !layer.is_well_formed() {
                return Err(format!("dense layer {} has malformed parameters", idx));
            }
            fan_in = width;
        }

        Ok(())
    }

    /// Forward-evaluate a batch with dropout disabled, one output per row
    pub fn predict(&self, x: ArrayView2<f32>) -> Result<Array1<f32>> {
        if x.ncols() != self.input_dim() {
            return Err(BridgeError::ShapeMismatch {
                expected: self.input_dim(),
                got: x.ncols(),
            });
        }

        let mut out = x.to_owned();
        for layer in &self.layers {
            out = layer.infer(out.view());
        }

        Ok(out.index_axis_move(Axis(1), 0))
    }

    fn forward_train<R: Rng + ?Sized>(&mut self, x: Array2<f32>, rng: &mut R) -> Array2<f32> {
        self.layers
            .iter_mut()
            .fold(x, |out, layer| layer.forward(out, rng))
    }

    fn backward(&mut self, d: Array2<f32>) {
        self.layers
            .iter_mut()
            .rev()
            .fold(d, |delta, layer| layer.backward(delta));
    }

    fn apply_gradients(&mut self, optimizer: &mut Adam) {
        let dense = self.layers.iter_mut().filter_map(|layer| match layer {
            Layer::Dense(d) => Some(d),
            Layer::Dropout(_) => None,
        });
        for (idx, layer) in dense.enumerate() {
            layer.apply_gradients(optimizer, idx * 2);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_build_topology() {
        let mut rng = StdRng::seed_from_u64(1);
        let config = ModelConfig::new(10);
        let net = Network::build(&config, &mut rng);

        // dense, dropout, dense, dropout, dense
        assert_eq!(net.layers().len(), 5);
        assert!(matches!(net.layers()[1], Layer::Dropout(_)));
        match &net.layers()[4] {
            Layer::Dense(d) => {
                assert_eq!(d.fan_out(), 1);
                assert_eq!(d.activation(), Activation::Linear);
            }
            Layer::Dropout(_) => panic!("output layer must be dense"),
        }
        assert_eq!(net.parameter_count(), (10 * 64 + 64) + (64 * 32 + 32) + (32 + 1));
        assert!(net.validate().is_ok());
    }

    #[test]
    fn test_predict_one_value_per_row() {
        let mut rng = StdRng::seed_from_u64(1);
        let net = Network::build(&ModelConfig::new(3), &mut rng);
        let out = net.predict(Array2::zeros((4, 3)).view()).unwrap();
        assert_eq!(out.len(), 4);
        // zero input with zero biases yields zero output
        assert!(out.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_predict_rejects_wrong_width() {
        let mut rng = StdRng::seed_from_u64(1);
        let net = Network::build(&ModelConfig::new(3), &mut rng);
        let err = net.predict(Array2::zeros((1, 2)).view()).unwrap_err();
        assert!(matches!(
            err,
            BridgeError::ShapeMismatch {
                expected: 3,
                got: 2
            }
        ));
    }

    #[test]
    fn test_serde_roundtrip_preserves_predictions() {
        let mut rng = StdRng::seed_from_u64(9);
        let net = Network::build(&ModelConfig::new(4), &mut rng);
        let x = Array2::from_shape_fn((3, 4), |(i, j)| (i as f32) - (j as f32) * 0.5);

        let json = serde_json::to_string(&net).unwrap();
        let restored: Network = serde_json::from_str(&json).unwrap();

        assert!(restored.validate().is_ok());
        let a = net.predict(x.view()).unwrap();
        let b = restored.predict(x.view()).unwrap();
        for (p, q) in a.iter().zip(b.iter()) {
            assert!((p - q).abs() < 1e-5);
        }
    }

    #[test]
    fn test_validate_detects_topology_drift() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut net = Network::build(&ModelConfig::new(4), &mut rng);
        net.config.input_dim = 5;
        assert!(net.validate().is_err());
    }
}
