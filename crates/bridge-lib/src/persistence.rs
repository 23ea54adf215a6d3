//! On-disk artifacts for the network and the scaler
//!
//! This module provides:
//! - A JSON envelope carrying kind, format version, timestamp and checksum
//! - Staged writes through a synced temporary file, renamed into place on commit
//! - Checksum validation before a payload is deserialized

use crate::error::{BridgeError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Current artifact layout version
pub const FORMAT_VERSION: u32 = 1;

/// Kind of payload stored in an artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Network,
    Scaler,
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArtifactKind::Network => write!(f, "network"),
            ArtifactKind::Scaler => write!(f, "scaler"),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct Envelope {
    kind: ArtifactKind,
    format_version: u32,
    saved_at: i64,
    checksum: String,
    payload: Box<RawValue>,
}

/// Metadata describing a written or loaded artifact
#[derive(Debug, Clone)]
pub struct ArtifactInfo {
    pub kind: ArtifactKind,
    pub path: PathBuf,
    pub checksum: String,
    pub size_bytes: usize,
    pub saved_at: i64,
}

/// An artifact fully written to a temporary file next to its destination.
///
/// Dropping it without calling [`StagedArtifact::commit`] removes the
/// temporary file and leaves the destination untouched.
pub struct StagedArtifact {
    file: NamedTempFile,
    info: ArtifactInfo,
}

impl StagedArtifact {
    /// Move the staged file into place
    pub fn commit(self) -> Result<ArtifactInfo> {
        let StagedArtifact { file, info } = self;
        file.persist(&info.path).map_err(|e| BridgeError::Io(e.error))?;

        info!(
            kind = %info.kind,
            path = %info.path.display(),
            size = info.size_bytes,
            checksum = %info.checksum,
            "Artifact written"
        );
        Ok(info)
    }
}

/// Serialize `value` into a synced temporary file beside `path`, creating
/// parent directories
pub fn stage_artifact<T: Serialize>(path: &Path, kind: ArtifactKind, value: &T) -> Result<StagedArtifact> {
    let dir = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => {
            fs::create_dir_all(parent)?;
            parent.to_path_buf()
        }
        None => PathBuf::from("."),
    };

    let payload = serde_json::to_string(value)?;
    let checksum = compute_checksum(payload.as_bytes());
    let envelope = Envelope {
        kind,
        format_version: FORMAT_VERSION,
        saved_at: chrono::Utc::now().timestamp(),
        checksum,
        payload: RawValue::from_string(payload)?,
    };
    let bytes = serde_json::to_vec(&envelope)?;

    let mut file = NamedTempFile::new_in(&dir)?;
    file.write_all(&bytes)?;
    file.as_file().sync_all()?;

    debug!(kind = %kind, path = %path.display(), temp = %file.path().display(), "Artifact staged");

    Ok(StagedArtifact {
        file,
        info: ArtifactInfo {
            kind,
            path: path.to_path_buf(),
            checksum: envelope.checksum,
            size_bytes: bytes.len(),
            saved_at: envelope.saved_at,
        },
    })
}

/// Read and validate an artifact of the expected `kind`
pub fn read_artifact<T: DeserializeOwned>(path: &Path, kind: ArtifactKind) -> Result<(T, ArtifactInfo)> {
    if !path.is_file() {
        return Err(BridgeError::ArtifactNotFound {
            path: path.to_path_buf(),
        });
    }

    let bytes = fs::read(path)?;
    let envelope: Envelope = serde_json::from_slice(&bytes)
        .map_err(|e| BridgeError::corrupt(path, format!("not an artifact envelope: {}", e)))?;

    if envelope.kind != kind {
        return Err(BridgeError::corrupt(
            path,
            format!("expected a {} artifact, found {}", kind, envelope.kind),
        ));
    }
    if envelope.format_version != FORMAT_VERSION {
        return Err(BridgeError::corrupt(
            path,
            format!(
                "unsupported format version {} (expected {})",
                envelope.format_version, FORMAT_VERSION
            ),
        ));
    }

    let computed = compute_checksum(envelope.payload.get().as_bytes());
    if computed != envelope.checksum {
        return Err(BridgeError::corrupt(
            path,
            format!(
                "checksum mismatch: expected {}, got {}",
                envelope.checksum, computed
            ),
        ));
    }

    let value = serde_json::from_str(envelope.payload.get())
        .map_err(|e| BridgeError::corrupt(path, format!("invalid {} payload: {}", kind, e)))?;

    debug!(kind = %kind, path = %path.display(), checksum = %computed, "Artifact validated");

    Ok((
        value,
        ArtifactInfo {
            kind,
            path: path.to_path_buf(),
            checksum: computed,
            size_bytes: bytes.len(),
            saved_at: envelope.saved_at,
        },
    ))
}

/// Compute SHA256 checksum of data
pub fn compute_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        name: String,
        values: Vec<f32>,
    }

    fn sample() -> Sample {
        Sample {
            name: "weights".to_string(),
            values: vec![0.1, -2.5, 3.25],
        }
    }

    fn write(path: &Path, kind: ArtifactKind) -> ArtifactInfo {
        stage_artifact(path, kind, &sample()).unwrap().commit().unwrap()
    }

    fn entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_compute_checksum() {
        let checksum = compute_checksum(b"test model weights");
        assert_eq!(checksum.len(), 64); // SHA256 hex is 64 chars
        assert_eq!(checksum, compute_checksum(b"test model weights"));
    }

    #[test]
    fn test_write_then_read() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("dir").join("model.json");

        let written = write(&path, ArtifactKind::Network);
        assert!(path.exists());
        assert_eq!(entries(path.parent().unwrap()), vec!["model.json".to_string()]);

        let (loaded, info): (Sample, _) = read_artifact(&path, ArtifactKind::Network).unwrap();
        assert_eq!(loaded, sample());
        assert_eq!(info.checksum, written.checksum);
        assert_eq!(info.kind, ArtifactKind::Network);
    }

    #[test]
    fn test_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let result: Result<(Sample, _)> =
            read_artifact(&temp_dir.path().join("absent.json"), ArtifactKind::Scaler);
        assert!(matches!(result, Err(BridgeError::ArtifactNotFound { .. })));
    }

    #[test]
    fn test_wrong_kind_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("scaler.json");
        write(&path, ArtifactKind::Scaler);

        let result: Result<(Sample, _)> = read_artifact(&path, ArtifactKind::Network);
        assert!(matches!(result, Err(BridgeError::CorruptArtifact { .. })));
    }

    #[test]
    fn test_tampered_payload_fails_checksum() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("model.json");
        write(&path, ArtifactKind::Network);

        let contents = fs::read_to_string(&path).unwrap();
        fs::write(&path, contents.replace("-2.5", "-2.6")).unwrap();

        let err = read_artifact::<Sample>(&path, ArtifactKind::Network).unwrap_err();
        assert!(err.to_string().contains("checksum mismatch"), "{}", err);
    }

    #[test]
    fn test_garbage_file_is_corrupt() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("model.json");
        fs::write(&path, b"not json at all").unwrap();

        let err = read_artifact::<Sample>(&path, ArtifactKind::Network).unwrap_err();
        assert!(matches!(err, BridgeError::CorruptArtifact { .. }));
    }

    #[test]
    fn test_unsupported_format_version() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("model.json");
        write(&path, ArtifactKind::Network);

        let contents = fs::read_to_string(&path).unwrap();
        assert!(contents.contains("\"format_version\":1"));
        fs::write(&path, contents.replace("\"format_version\":1", "\"format_version\":2")).unwrap();

        let err = read_artifact::<Sample>(&path, ArtifactKind::Network).unwrap_err();
        assert!(matches!(err, BridgeError::CorruptArtifact { .. }));
        assert!(err.to_string().contains("unsupported format version 2"), "{}", err);
    }

    #[test]
    fn test_dropped_stage_leaves_nothing_behind() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("model.json");

        let staged = stage_artifact(&path, ArtifactKind::Network, &sample()).unwrap();
        assert_eq!(entries(temp_dir.path()).len(), 1);
        drop(staged);

        assert!(entries(temp_dir.path()).is_empty());
    }

    #[test]
    fn test_uncommitted_stage_keeps_previous_artifact() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("model.json");
        let first = write(&path, ArtifactKind::Network);

        let other = Sample {
            name: "other".to_string(),
            values: vec![1.0],
        };
        drop(stage_artifact(&path, ArtifactKind::Network, &other).unwrap());

        let (loaded, info): (Sample, _) = read_artifact(&path, ArtifactKind::Network).unwrap();
        assert_eq!(loaded, sample());
        assert_eq!(info.checksum, first.checksum);
    }

    #[test]
    fn test_stage_fails_when_parent_is_a_file() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("blocker");
        fs::write(&blocker, b"not a directory").unwrap();

        let result = stage_artifact(&blocker.join("model.json"), ArtifactKind::Network, &sample());
        assert!(matches!(result, Err(BridgeError::Io(_))));
        assert_eq!(entries(temp_dir.path()), vec!["blocker".to_string()]);
    }
}
