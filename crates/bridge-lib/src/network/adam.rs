use ndarray::{ArrayView, ArrayViewMut, Dimension};

/// First and second moment estimates for one parameter tensor
#[derive(Debug, Clone, Default)]
struct Moments {
    v: Vec<f32>,
    s: Vec<f32>,
}

/// Adam optimizer with bias correction.
///
/// Each parameter tensor owns a slot; the timestep is shared and advanced once
/// per minibatch with [`Adam::tick`].
#[derive(Debug, Clone)]
pub struct Adam {
    learning_rate: f32,
    beta1: f32,
    beta2: f32,
    beta1_t: f32,
    beta2_t: f32,
    epsilon: f32,
    moments: Vec<Moments>,
}

impl Adam {
    /// Creates a new `Adam` with the usual hyperparameters (β1 0.9, β2 0.999, ε 1e-7).
    pub fn new(learning_rate: f32) -> Self {
        Self::with_hyperparameters(learning_rate, 0.9, 0.999, 1e-7)
    }

    pub fn with_hyperparameters(learning_rate: f32, beta1: f32, beta2: f32, epsilon: f32) -> Self {
        Self {
            learning_rate,
            beta1,
            beta2,
            beta1_t: 1.,
            beta2_t: 1.,
            epsilon,
            moments: Vec::new(),
        }
    }

    /// Advance the shared timestep
    pub fn tick(&mut self) {
        self.beta1_t *= self.beta1;
        self.beta2_t *= self.beta2;
    }

    /// Update `params` in place from `grad`, tracking moments in `slot`
    pub fn update<D: Dimension>(
        &mut self,
        slot: usize,
        mut params: ArrayViewMut<f32, D>,
        grad: ArrayView<f32, D>,
    ) {
        if self.moments.len() <= slot {
            self.moments.resize_with(slot + 1, Moments::default);
        }

        let Self {
            learning_rate: lr,
            beta1: b1,
            beta2: b2,
            epsilon: eps,
            beta1_t,
            beta2_t,
            ..
        } = *self;

        let moments = &mut self.moments[slot];
        if moments.v.len() != params.len() {
            moments.v = vec![0.; params.len()];
            moments.s = vec![0.; params.len()];
        }

        // tick() must run before the first update of a step
        let bc1 = (1. - beta1_t).max(f32::MIN_POSITIVE);
        let bc2 = 1. - beta2_t;
        let step_size = lr * (bc2.sqrt() / bc1);

        params
            .iter_mut()
            .zip(grad.iter())
            .zip(moments.v.iter_mut())
            .zip(moments.s.iter_mut())
            .for_each(|(((p, g), v), s)| {
                *v = b1 * *v + (1. - b1) * g;
                *s = b2 * *s + (1. - b2) * g.powi(2);
                *p -= step_size * *v / (s.sqrt() + eps);
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array1};

    #[test]
    fn test_first_step_moves_by_learning_rate() {
        let mut adam = Adam::new(0.01);
        let mut params = array![1.0f32, -1.0];
        adam.tick();
        adam.update(0, params.view_mut(), array![0.5f32, -2.0].view());
        // With bias correction the first step is ~lr * sign(grad)
        assert!((params[0] - 0.99).abs() < 1e-4);
        assert!((params[1] + 0.99).abs() < 1e-4);
    }

    #[test]
    fn test_minimizes_quadratic() {
        let mut adam = Adam::new(0.1);
        let mut x = Array1::from_elem(1, 5.0f32);
        for _ in 0..500 {
            let grad = x.mapv(|v| 2.0 * v);
            adam.tick();
            adam.update(0, x.view_mut(), grad.view());
        }
        assert!(x[0].abs() < 0.5, "x = {}", x[0]);
    }

    #[test]
    fn test_slots_are_independent() {
        let mut adam = Adam::new(0.01);
        let mut a = array![[1.0f32, 1.0]];
        let mut b = array![1.0f32, 1.0, 1.0];
        adam.tick();
        adam.update(0, a.view_mut(), array![[1.0f32, 1.0]].view());
        adam.update(1, b.view_mut(), array![0.0f32, 0.0, 0.0].view());
        assert!(a.iter().all(|&v| v < 1.0));
        assert!(b.iter().all(|&v| v == 1.0));
    }
}
