//! Minibatch training with a validation holdout and early stopping

use super::{mean_absolute_error, Adam, LossFn, Mse, Network};
use crate::error::{BridgeError, Result};
use crate::models::{EpochMetrics, TrainOptions, TrainingHistory};
use ndarray::{ArrayView1, ArrayView2, Axis};
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{debug, info};

impl Network {
    /// Train in place on `(x, y)`.
    ///
    /// The trailing `validation_split` fraction of rows is held out and
    /// evaluated after every epoch. Training stops once the monitored loss has
    /// not improved for `patience` epochs, and the parameters of the best epoch
    /// are restored before returning.
    pub fn fit<R: Rng + ?Sized>(
        &mut self,
        x: ArrayView2<f32>,
        y: ArrayView1<f32>,
        options: &TrainOptions,
        rng: &mut R,
    ) -> Result<TrainingHistory> {
        options.validate()?;

        if x.ncols() != self.input_dim() {
            return Err(BridgeError::ShapeMismatch {
                expected: self.input_dim(),
                got: x.ncols(),
            });
        }
        if x.nrows() != y.len() {
            return Err(BridgeError::InvalidTrainingData(format!(
                "features have {} rows but targets have {} values",
                x.nrows(),
                y.len()
            )));
        }

        let n_rows = x.nrows();
        let n_train = (n_rows as f64 * (1.0 - f64::from(options.validation_split))) as usize;
        if n_train == 0 {
            return Err(BridgeError::InvalidTrainingData(format!(
                "validation_split {} leaves no training rows out of {}",
                options.validation_split, n_rows
            )));
        }

        let y = y.insert_axis(Axis(1));
        let (x_train, x_val) = x.split_at(Axis(0), n_train);
        let (y_train, y_val) = y.split_at(Axis(0), n_train);
        let has_holdout = x_val.nrows() > 0;

        let loss_fn = Mse;
        let mut optimizer = Adam::new(self.config.learning_rate);
        let mut indices: Vec<usize> = (0..n_train).collect();

        let mut history = TrainingHistory::default();
        let mut best = f32::INFINITY;
        let mut best_layers = None;
        let mut wait = 0;

        debug!(
            train_rows = n_train,
            val_rows = x_val.nrows(),
            epochs = options.epochs,
            batch_size = options.batch_size,
            "Starting training"
        );

        for epoch in 1..=options.epochs {
            indices.shuffle(rng);

            let mut loss_sum = 0.0;
            let mut mae_sum = 0.0;

            for batch in indices.chunks(options.batch_size) {
                let xb = x_train.select(Axis(0), batch);
                let yb = y_train.select(Axis(0), batch);

                let y_pred = self.forward_train(xb, rng);
                let weight = batch.len() as f32;
                loss_sum += loss_fn.loss(y_pred.view(), yb.view()) * weight;
                mae_sum += mean_absolute_error(y_pred.view(), yb.view()) * weight;

                self.backward(loss_fn.loss_prime(y_pred.view(), yb.view()));
                optimizer.tick();
                self.apply_gradients(&mut optimizer);
            }

            let loss = loss_sum / n_train as f32;
            if !loss.is_finite() {
                return Err(BridgeError::InvalidTrainingData(format!(
                    "training diverged: loss is not finite at epoch {}",
                    epoch
                )));
            }

            let (val_loss, val_mae) = if has_holdout {
                let y_pred = self.predict(x_val)?.insert_axis(Axis(1));
                (
                    Some(loss_fn.loss(y_pred.view(), y_val)),
                    Some(mean_absolute_error(y_pred.view(), y_val)),
                )
            } else {
                (None, None)
            };

            let metrics = EpochMetrics {
                epoch,
                loss,
                mae: mae_sum / n_train as f32,
                val_loss,
                val_mae,
            };
            let monitored = metrics.monitored();
            debug!(epoch, loss, val_loss = ?val_loss, "Epoch completed");
            history.epochs.push(metrics);

            if monitored < best {
                best = monitored;
                history.best_epoch = epoch;
                best_layers = Some(self.layers.clone());
                wait = 0;
            } else {
                wait += 1;
                if wait >= options.patience {
                    history.stopped_early = true;
                    info!(
                        epoch,
                        best_epoch = history.best_epoch,
                        patience = options.patience,
                        "Early stopping, monitored loss stopped improving"
                    );
                    break;
                }
            }
        }

        if let Some(layers) = best_layers {
            self.layers = layers;
        }

        Ok(history)
    }
}
