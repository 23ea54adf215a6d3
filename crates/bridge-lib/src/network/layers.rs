//! Layers of the feed-forward regression network

use super::Adam;
use ndarray::{Array1, Array2, ArrayView2, Axis};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Element-wise activation applied after a dense transform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    Relu,
    Linear,
}

impl Activation {
    fn f(&self, z: f32) -> f32 {
        match self {
            Activation::Relu => z.max(0.0),
            Activation::Linear => z,
        }
    }

    fn df(&self, z: f32) -> f32 {
        match self {
            Activation::Relu => {
                if z > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Activation::Linear => 1.0,
        }
    }
}

/// Fully-connected layer: `a = act(x · W + b)`
///
/// Weights are stored as `(fan_in, fan_out)` so a batch of row vectors can be
/// multiplied directly. Forward caches and gradients are training-only state
/// and are never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dense {
    weights: Array2<f32>,
    biases: Array1<f32>,
    activation: Activation,

    // Forward metadata
    #[serde(skip)]
    x: Array2<f32>,
    #[serde(skip)]
    z: Array2<f32>,

    // Backward metadata
    #[serde(skip)]
    grad_w: Array2<f32>,
    #[serde(skip)]
    grad_b: Array1<f32>,
}

impl Dense {
    /// Create a layer with Glorot-uniform weights and zero biases
    pub fn new<R: Rng + ?Sized>(
        fan_in: usize,
        fan_out: usize,
        activation: Activation,
        rng: &mut R,
    ) -> Self {
        let limit = (6.0 / (fan_in + fan_out) as f32).sqrt();
        let weights = Array2::from_shape_fn((fan_in, fan_out), |_| rng.random_range(-limit..limit));
        Self::from_parts(weights, Array1::zeros(fan_out), activation)
    }

    pub fn from_parts(weights: Array2<f32>, biases: Array1<f32>, activation: Activation) -> Self {
        Self {
            weights,
            biases,
            activation,
            x: Array2::default((0, 0)),
            z: Array2::default((0, 0)),
            grad_w: Array2::default((0, 0)),
            grad_b: Array1::default(0),
        }
    }

    pub fn fan_in(&self) -> usize {
        self.weights.nrows()
    }

    pub fn fan_out(&self) -> usize {
        self.weights.ncols()
    }

    pub fn activation(&self) -> Activation {
        self.activation
    }

    pub fn weights(&self) -> &Array2<f32> {
        &self.weights
    }

    pub fn biases(&self) -> &Array1<f32> {
        &self.biases
    }

    pub fn parameter_count(&self) -> usize {
        self.weights.len() + self.biases.len()
    }

    /// Whether the stored parameters are internally consistent and finite
    pub fn is_well_formed(&self) -> bool {
        self.biases.len() == self.fan_out()
            && self.weights.iter().chain(self.biases.iter()).all(|v| v.is_finite())
    }

    /// Inference pass, no state is cached
    pub fn infer(&self, x: ArrayView2<f32>) -> Array2<f32> {
        let mut z = x.dot(&self.weights);
        z += &self.biases;
        let act = self.activation;
        z.mapv_inplace(|v| act.f(v));
        z
    }

    /// Training pass, caches the input and pre-activation for `backward`
    pub fn forward(&mut self, x: Array2<f32>) -> Array2<f32> {
        let mut z = x.dot(&self.weights);
        z += &self.biases;
        let act = self.activation;
        let a = z.mapv(|v| act.f(v));
        self.x = x;
        self.z = z;
        a
    }

    /// Consumes the output delta, stores parameter gradients and returns the input delta
    pub fn backward(&mut self, mut d: Array2<f32>) -> Array2<f32> {
        let act = self.activation;
        d.zip_mut_with(&self.z, |d, &z| *d *= act.df(z));

        self.grad_w = self.x.t().dot(&d);
        self.grad_b = d.sum_axis(Axis(0));

        d.dot(&self.weights.t())
    }

    /// Apply the gradients of the last backward pass using two optimizer slots
    pub(crate) fn apply_gradients(&mut self, optimizer: &mut Adam, slot: usize) {
        optimizer.update(slot, self.weights.view_mut(), self.grad_w.view());
        optimizer.update(slot + 1, self.biases.view_mut(), self.grad_b.view());
    }
}

/// Inverted dropout: active only during training
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dropout {
    rate: f32,
    #[serde(skip)]
    mask: Array2<f32>,
}

impl Dropout {
    pub fn new(rate: f32) -> Self {
        Self {
            rate,
            mask: Array2::default((0, 0)),
        }
    }

    pub fn forward<R: Rng + ?Sized>(&mut self, x: Array2<f32>, rng: &mut R) -> Array2<f32> {
        if self.rate <= 0.0 {
            return x;
        }
        let keep = 1.0 - self.rate;
        let scale = 1.0 / keep;
        self.mask = Array2::from_shape_fn(x.raw_dim(), |_| {
            if rng.random::<f32>() < keep {
                scale
            } else {
                0.0
            }
        });
        x * &self.mask
    }

    pub fn backward(&self, d: Array2<f32>) -> Array2<f32> {
        if self.rate <= 0.0 {
            return d;
        }
        d * &self.mask
    }
}

/// A layer of the sequential stack
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Layer {
    Dense(Dense),
    Dropout(Dropout),
}

impl Layer {
    pub fn parameter_count(&self) -> usize {
        match self {
            Layer::Dense(l) => l.parameter_count(),
            Layer::Dropout(_) => 0,
        }
    }

    pub fn infer(&self, x: ArrayView2<f32>) -> Array2<f32> {
        match self {
            Layer::Dense(l) => l.infer(x),
            Layer::Dropout(_) => x.to_owned(),
        }
    }

    pub fn forward<R: Rng + ?Sized>(&mut self, x: Array2<f32>, rng: &mut R) -> Array2<f32> {
        match self {
            Layer::Dense(l) => l.forward(x),
            Layer::Dropout(l) => l.forward(x, rng),
        }
    }

    pub fn backward(&mut self, d: Array2<f32>) -> Array2<f32> {
        match self {
            Layer::Dense(l) => l.backward(d),
            Layer::Dropout(l) => l.backward(d),
        }
    }
}
