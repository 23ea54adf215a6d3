//! Error taxonomy shared by the model manager and the command bridge

use std::path::PathBuf;
use thiserror::Error;

/// Result type used across the library
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Every failure a command can produce.
///
/// The bridge converts each variant into an error response; none of them
/// terminates the process.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Unparseable JSON, missing required field or wrong value type
    #[error("Malformed command: {0}")]
    MalformedCommand(String),

    #[error("Unknown action: {0}")]
    UnknownAction(String),

    /// Predict or save before a trained network exists
    #[error("{0}")]
    ModelNotReady(&'static str),

    /// Load given a path that does not exist
    #[error("Model or scaler file not found")]
    ArtifactNotFound { path: PathBuf },

    /// Feature width inconsistent with the fitted scaler or network
    #[error("Feature shape mismatch: expected {expected} features, got {got}")]
    ShapeMismatch { expected: usize, got: usize },

    /// Features that cannot be evaluated, such as out-of-range numbers
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid training data: {0}")]
    InvalidTrainingData(String),

    #[error("Invalid model configuration: {0}")]
    InvalidConfig(String),

    #[error("Corrupt artifact {path:?}: {reason}")]
    CorruptArtifact { path: PathBuf, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BridgeError {
    pub(crate) fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::CorruptArtifact {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Short machine-friendly name used in structured logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MalformedCommand(_) => "malformed_command",
            Self::UnknownAction(_) => "unknown_action",
            Self::ModelNotReady(_) => "model_not_ready",
            Self::ArtifactNotFound { .. } => "artifact_not_found",
            Self::ShapeMismatch { .. } => "shape_mismatch",
            Self::InvalidInput(_) => "invalid_input",
            Self::InvalidTrainingData(_) => "invalid_training_data",
            Self::InvalidConfig(_) => "invalid_config",
            Self::CorruptArtifact { .. } => "corrupt_artifact",
            Self::Io(_) => "io",
            Self::Serialization(_) => "serialization",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_not_found_message_is_fixed() {
        let err = BridgeError::ArtifactNotFound {
            path: PathBuf::from("/tmp/missing.json"),
        };
        assert_eq!(err.to_string(), "Model or scaler file not found");
        assert_eq!(err.kind(), "artifact_not_found");
    }

    #[test]
    fn test_unknown_action_message() {
        let err = BridgeError::UnknownAction("explode".to_string());
        assert_eq!(err.to_string(), "Unknown action: explode");
    }

    #[test]
    fn test_shape_mismatch_message() {
        let err = BridgeError::ShapeMismatch {
            expected: 10,
            got: 2,
        };
        assert_eq!(
            err.to_string(),
            "Feature shape mismatch: expected 10 features, got 2"
        );
    }
}
