//! Error taxonomy for scenario ingestion, archive storage and configuration.
//!
//! Structural and validation failures are routine rejections that a caller
//! processing a batch should skip past. Storage failures are fatal for the call
//! that hit them and always propagate unchanged.

use std::path::PathBuf;

/// A scenario is missing a required field or is not shaped like a scenario at all.
#[derive(Debug, thiserror::Error)]
pub enum StructuralInputError {
    #[error("scenario missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("malformed scenario: {0}")]
    Malformed(String),

    #[error("scenario field {field} is not a finite number: {value}")]
    NonFiniteScore { field: &'static str, value: f64 },
}

/// A well-formed scenario failed a quality gate.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScenarioValidationError {
    #[error("novelty_score {value} below threshold {threshold}")]
    NoveltyBelowThreshold { value: f64, threshold: f64 },

    #[error("difficulty_score {value} outside range [{low}, {high}]")]
    DifficultyOutOfRange { value: f64, low: f64, high: f64 },
}

impl ScenarioValidationError {
    /// Stable name of the gate that rejected the scenario.
    pub fn criterion(&self) -> &'static str {
        match self {
            Self::NoveltyBelowThreshold { .. } => "novelty_threshold",
            Self::DifficultyOutOfRange { .. } => "difficulty_range",
        }
    }

    /// The offending value supplied by the scenario.
    pub fn value(&self) -> f64 {
        match self {
            Self::NoveltyBelowThreshold { value, .. } => *value,
            Self::DifficultyOutOfRange { value, .. } => *value,
        }
    }

    /// Human-readable form of the threshold that was not met.
    pub fn threshold(&self) -> String {
        match self {
            Self::NoveltyBelowThreshold { threshold, .. } => format!(">= {threshold}"),
            Self::DifficultyOutOfRange { low, high, .. } => format!("[{low}, {high}]"),
        }
    }
}

/// Disk failure while persisting, reading or trimming the trajectory archive.
#[derive(Debug, thiserror::Error)]
pub enum StorageIoError {
    #[error("failed to create storage directory {path:?}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to delete {path:?}: {source}")]
    Delete {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode trajectory: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Any failure of [`crate::ingestion::ScenarioIngestionPipeline`].
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error(transparent)]
    Structural(#[from] StructuralInputError),

    #[error(transparent)]
    Validation(#[from] ScenarioValidationError),

    #[error(transparent)]
    Storage(#[from] StorageIoError),

    #[error("ingestion worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl IngestError {
    /// True when the scenario itself was rejected and the caller should skip it
    /// and continue with the next one.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Structural(_) | Self::Validation(_))
    }
}

/// Result type for ingestion operations.
pub type IngestResult<T> = std::result::Result<T, IngestError>;

/// Configuration could not be loaded or is inconsistent.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_names_gate_and_values() {
        let err = ScenarioValidationError::NoveltyBelowThreshold {
            value: 50.0,
            threshold: 70.0,
        };
        assert_eq!(err.criterion(), "novelty_threshold");
        assert_eq!(err.value(), 50.0);
        let msg = err.to_string();
        assert!(msg.contains("50"));
        assert!(msg.contains("70"));

        let err = ScenarioValidationError::DifficultyOutOfRange {
            value: 95.0,
            low: 30.0,
            high: 90.0,
        };
        assert_eq!(err.criterion(), "difficulty_range");
        assert_eq!(err.threshold(), "[30, 90]");
    }

    #[test]
    fn test_rejection_classification() {
        let structural: IngestError = StructuralInputError::MissingField {
            field: "business_type",
        }
        .into();
        assert!(structural.is_rejection());
        assert!(structural.to_string().contains("business_type"));

        let storage: IngestError = StorageIoError::Write {
            path: PathBuf::from("/tmp/x.json"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        }
        .into();
        assert!(!storage.is_rejection());
        assert!(storage.to_string().contains("x.json"));
    }
}
