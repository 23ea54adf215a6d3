//! Feature standardization
//!
//! Per-feature mean and standard deviation fitted on the training design
//! matrix and applied unchanged at inference time.

use crate::error::{BridgeError, Result};
use ndarray::{Array1, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

/// Fitted statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalerStats {
    pub mean: Array1<f32>,
    /// Population standard deviation, with 1.0 substituted for constant features
    pub scale: Array1<f32>,
    pub n_samples_seen: usize,
}

/// Standardizes features to zero mean and unit variance
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    stats: Option<ScalerStats>,
}

impl StandardScaler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_fitted(&self) -> bool {
        self.stats.is_some()
    }

    pub fn stats(&self) -> Option<&ScalerStats> {
        self.stats.as_ref()
    }

    /// Number of features the scaler was fitted on
    pub fn n_features(&self) -> Option<usize> {
        self.stats.as_ref().map(|s| s.mean.len())
    }

    /// Compute statistics from `x`, replacing any previous fit
    pub fn fit(&mut self, x: ArrayView2<f32>) -> Result<()> {
        if x.nrows() == 0 || x.ncols() == 0 {
            return Err(BridgeError::InvalidTrainingData(
                "cannot fit scaler on an empty matrix".to_string(),
            ));
        }

        let n = x.nrows() as f64;
        let x64 = x.mapv(f64::from);
        let mean = x64.sum_axis(Axis(0)) / n;
        let var = x64
            .axis_iter(Axis(0))
            .fold(Array1::<f64>::zeros(x.ncols()), |acc, row| {
                acc + (&row - &mean).mapv(|d| d * d)
            })
            / n;

        let scale = var.mapv(|v| {
            let sd = v.sqrt();
            if sd < 10.0 * f64::EPSILON {
                1.0
            } else {
                sd as f32
            }
        });

        self.stats = Some(ScalerStats {
            mean: mean.mapv(|m| m as f32),
            scale,
            n_samples_seen: x.nrows(),
        });
        Ok(())
    }

    /// Apply the fitted statistics; never refits
    pub fn transform(&self, x: ArrayView2<f32>) -> Result<Array2<f32>> {
        let stats = self
            .stats
            .as_ref()
            .ok_or(BridgeError::ModelNotReady("Scaler has not been fitted"))?;

        if x.ncols() != stats.mean.len() {
            return Err(BridgeError::ShapeMismatch {
                expected: stats.mean.len(),
                got: x.ncols(),
            });
        }

        Ok((&x - &stats.mean) / &stats.scale)
    }

    pub fn fit_transform(&mut self, x: ArrayView2<f32>) -> Result<Array2<f32>> {
        self.fit(x)?;
        self.transform(x)
    }

    /// Check that deserialized statistics are usable
    pub fn validate(&self) -> std::result::Result<(), String> {
        let stats = self.stats.as_ref().ok_or("scaler is not fitted")?;
        if stats.mean.len() != stats.scale.len() {
            return Err(format!(
                "mean has {} entries but scale has {}",
                stats.mean.len(),
                stats.scale.len()
            ));
        }
        if stats.mean.is_empty() {
            return Err("scaler has no features".to_string());
        }
        if stats.scale.iter().any(|s| !s.is_finite() || *s <= 0.0) {
            return Err("scale entries must be positive and finite".to_string());
        }
        if stats.mean.iter().any(|m| !m.is_finite()) {
            return Err("mean entries must be finite".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_fit_computes_population_statistics() {
        let mut scaler = StandardScaler::new();
        scaler
            .fit(array![[1.0, 10.0], [3.0, 10.0], [5.0, 10.0]].view())
            .unwrap();
        let stats = scaler.stats().unwrap();
        assert_eq!(stats.mean, array![3.0, 10.0]);
        assert!((stats.scale[0] - (8.0f32 / 3.0).sqrt()).abs() < 1e-6);
        // Constant feature keeps unit scale
        assert_eq!(stats.scale[1], 1.0);
        assert_eq!(stats.n_samples_seen, 3);
    }

    #[test]
    fn test_transform_standardizes() {
        let mut scaler = StandardScaler::new();
        let x = array![[0.0, 2.0], [2.0, 4.0], [4.0, 6.0], [6.0, 8.0]];
        let scaled = scaler.fit_transform(x.view()).unwrap();
        let mean = scaled.mean_axis(Axis(0)).unwrap();
        let std = scaled.std_axis(Axis(0), 0.0);
        assert!(mean.iter().all(|m| m.abs() < 1e-6));
        assert!(std.iter().all(|s| (s - 1.0).abs() < 1e-5));
    }

    #[test]
    fn test_transform_requires_fit() {
        let scaler = StandardScaler::new();
        let err = scaler.transform(array![[1.0]].view()).unwrap_err();
        assert!(matches!(err, BridgeError::ModelNotReady(_)));
    }

    #[test]
    fn test_transform_rejects_width_mismatch() {
        let mut scaler = StandardScaler::new();
        scaler.fit(array![[1.0, 2.0, 3.0]].view()).unwrap();
        let err = scaler.transform(array![[1.0, 2.0]].view()).unwrap_err();
        assert!(matches!(
            err,
            BridgeError::ShapeMismatch {
                expected: 3,
                got: 2
            }
        ));
    }

    #[test]
    fn test_refit_overwrites_previous_statistics() {
        let mut scaler = StandardScaler::new();
        scaler.fit(array![[100.0], [200.0]].view()).unwrap();
        scaler.fit(array![[1.0], [3.0]].view()).unwrap();
        assert_eq!(scaler.stats().unwrap().mean, array![2.0]);
        assert_eq!(scaler.stats().unwrap().n_samples_seen, 2);
    }

    #[test]
    fn test_fit_rejects_empty_matrix() {
        let mut scaler = StandardScaler::new();
        assert!(scaler.fit(Array2::<f32>::zeros((0, 3)).view()).is_err());
        assert!(!scaler.is_fitted());
    }

    #[test]
    fn test_validate_unfitted_scaler() {
        assert!(StandardScaler::new().validate().is_err());
    }
}
