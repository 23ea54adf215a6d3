//! Line protocol types
//!
//! One JSON object per line in each direction. Requests carry an `action`
//! string and an optional `params` object; responses carry a `status` tag plus
//! either an action-specific payload or an error message.

use crate::bridge::BridgeStats;
use crate::error::{BridgeError, Result};
use crate::models::{EpochMetrics, ModelStatus, TrainOptions, TrainingHistory};
use ndarray::Array2;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;

/// Raw request before the action is resolved
#[derive(Debug, Deserialize)]
struct Envelope {
    action: String,
    #[serde(default)]
    params: Option<Map<String, Value>>,
}

/// Paths of the two artifacts making up a saved model
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ArtifactParams {
    pub model_path: PathBuf,
    pub scaler_path: PathBuf,
}

/// Feature payload of a single prediction
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Features {
    Row(Vec<f32>),
    /// Nested rows are flattened into one feature vector
    Nested(Vec<Vec<f32>>),
}

impl Features {
    pub fn into_row(self) -> Vec<f32> {
        match self {
            Features::Row(row) => row,
            Features::Nested(rows) => rows.into_iter().flatten().collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PredictParams {
    pub features: Features,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PredictBatchParams {
    pub features: Vec<Vec<f32>>,
}

/// Labeled data plus optional per-run overrides of the configured options
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TrainParams {
    pub features: Vec<Vec<f32>>,
    pub targets: Vec<f32>,
    #[serde(default)]
    pub validation_split: Option<f32>,
    #[serde(default)]
    pub epochs: Option<usize>,
    #[serde(default)]
    pub batch_size: Option<usize>,
    #[serde(default)]
    pub patience: Option<usize>,
}

impl TrainParams {
    pub fn options(&self, defaults: &TrainOptions) -> TrainOptions {
        TrainOptions {
            validation_split: self.validation_split.unwrap_or(defaults.validation_split),
            epochs: self.epochs.unwrap_or(defaults.epochs),
            batch_size: self.batch_size.unwrap_or(defaults.batch_size),
            patience: self.patience.unwrap_or(defaults.patience),
        }
    }
}

/// Every action the bridge understands
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    LoadModel(ArtifactParams),
    SaveModel(ArtifactParams),
    Predict(PredictParams),
    PredictBatch(PredictBatchParams),
    Train(TrainParams),
    BuildModel,
    Status,
}

impl Command {
    /// Parse one request line
    pub fn parse(line: &str) -> Result<Self> {
        let envelope: Envelope = serde_json::from_str(line)
            .map_err(|e| BridgeError::MalformedCommand(e.to_string()))?;
        let params = envelope.params.unwrap_or_default();

        match envelope.action.as_str() {
            "load_model" => Ok(Command::LoadModel(decode(params)?)),
            "save_model" => Ok(Command::SaveModel(decode(params)?)),
            "predict" => Ok(Command::Predict(decode(params)?)),
            "predict_batch" => Ok(Command::PredictBatch(decode(params)?)),
            "train" => Ok(Command::Train(decode(params)?)),
            "build_model" => Ok(Command::BuildModel),
            "status" => Ok(Command::Status),
            _ => Err(BridgeError::UnknownAction(envelope.action)),
        }
    }

    /// Action name as it appears on the wire
    pub fn action(&self) -> &'static str {
        match self {
            Command::LoadModel(_) => "load_model",
            Command::SaveModel(_) => "save_model",
            Command::Predict(_) => "predict",
            Command::PredictBatch(_) => "predict_batch",
            Command::Train(_) => "train",
            Command::BuildModel => "build_model",
            Command::Status => "status",
        }
    }
}

fn decode<T: DeserializeOwned>(params: Map<String, Value>) -> Result<T> {
    serde_json::from_value(Value::Object(params))
        .map_err(|e| BridgeError::MalformedCommand(e.to_string()))
}

/// Stack equally sized rows into a matrix; an empty list yields `(0, width)`
pub fn rows_to_matrix(rows: Vec<Vec<f32>>, width: usize) -> Result<Array2<f32>> {
    let width = rows.first().map_or(width, Vec::len);
    let n_rows = rows.len();

    let mut flat = Vec::with_capacity(n_rows * width);
    for row in rows {
        if row.len() != width {
            return Err(BridgeError::ShapeMismatch {
                expected: width,
                got: row.len(),
            });
        }
        flat.extend(row);
    }

    Array2::from_shape_vec((n_rows, width), flat)
        .map_err(|e| BridgeError::MalformedCommand(e.to_string()))
}

/// Outcome of a training run as reported over the wire
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainingSummary {
    pub epochs_run: usize,
    pub best_epoch: usize,
    pub stopped_early: bool,
    pub best_loss: Option<f32>,
    pub history: Vec<EpochMetrics>,
}

impl From<TrainingHistory> for TrainingSummary {
    fn from(history: TrainingHistory) -> Self {
        Self {
            epochs_run: history.epochs_run(),
            best_epoch: history.best_epoch,
            stopped_early: history.stopped_early,
            best_loss: history.best().map(EpochMetrics::monitored),
            history: history.epochs,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusReport {
    #[serde(flatten)]
    pub model: ModelStatus,
    #[serde(flatten)]
    pub stats: BridgeStats,
}

/// Action-specific fields of a success response
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Payload {
    Ack {},
    Prediction { prediction: f32 },
    Predictions { predictions: Vec<f32> },
    Trained(TrainingSummary),
    Status(StatusReport),
}

/// A single response line
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Response {
    Success(Payload),
    Error { message: String },
}

impl Response {
    pub fn ack() -> Self {
        Response::Success(Payload::Ack {})
    }

    pub fn error(err: &BridgeError) -> Self {
        Response::Error {
            message: err.to_string(),
        }
    }
}

impl From<Result<Payload>> for Response {
    fn from(result: Result<Payload>) -> Self {
        match result {
            Ok(payload) => Response::Success(payload),
            Err(e) => Response::error(&e),
        }
    }
}
