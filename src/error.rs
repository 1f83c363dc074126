//! Error taxonomy for box fusion.
//!
//! Validation and geometry problems are local to one batch or one box
//! comparison. Configuration problems are either recoverable (a default is
//! applied and the error travels back to the caller as a warning) or fatal
//! at engine construction.

use std::path::PathBuf;
use thiserror::Error;

/// A model batch whose contents cannot be fused as given.
#[derive(Debug, Error, PartialEq, Clone)]
pub enum ValidationError {
    #[error("batch {batch}: {boxes} boxes but {scores} scores")]
    ScoreCountMismatch {
        batch: usize,
        boxes: usize,
        scores: usize,
    },
    #[error("batch {batch}: {boxes} boxes but {labels} labels")]
    LabelCountMismatch {
        batch: usize,
        boxes: usize,
        labels: usize,
    },
    #[error("batch {batch}, detection {index}: non-finite {field}")]
    NonFinite {
        batch: usize,
        index: usize,
        field: &'static str,
    },
    #[error("batch {batch}, detection {index}: score {score} outside [0, 1]")]
    ScoreOutOfRange {
        batch: usize,
        index: usize,
        score: f64,
    },
}

/// A configuration value that is invalid or unsupported.
#[derive(Debug, Error, PartialEq, Clone)]
pub enum ConfigError {
    #[error("incorrect number of weights {got}, expected {expected}; using 1.0 for every model")]
    WeightCountMismatch { expected: usize, got: usize },
    #[error(
        "weight {value} for model {index} is negative or not finite; \
         using 1.0 for every model"
    )]
    InvalidWeight { index: usize, value: f64 },
    #[error("confidence aggregation '{0}' is recognized but not implemented; using 'max'")]
    UnsupportedAggregation(String),
    #[error("unknown confidence aggregation '{0}', expected 'max'; using 'max'")]
    UnknownAggregation(String),
    #[error("{name} must be within [0, 1], got {value}")]
    ThresholdOutOfRange { name: &'static str, value: f64 },
    #[error("invalid scene filter: {0}")]
    SceneFilter(String),
}

/// A box that cannot take part in an overlap computation.
#[derive(Debug, Error, PartialEq, Clone)]
pub enum GeometryError {
    #[error("non-positive extent {length}x{width}x{height}")]
    DegenerateExtent { length: f64, width: f64, height: f64 },
    #[error("non-finite box parameter")]
    NonFinite,
}

/// Top-level error for library entry points that touch files.
#[derive(Debug, Error)]
pub enum FusionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("{path}: missing required column '{column}'")]
    MissingColumn { path: PathBuf, column: &'static str },
    #[error("{path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("could not serialize configuration: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),
}

impl FusionError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn csv(path: impl Into<PathBuf>, source: csv::Error) -> Self {
        Self::Csv {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weight_mismatch_message_names_both_counts() {
        let err = ConfigError::WeightCountMismatch {
            expected: 3,
            got: 2,
        };
        let msg = err.to_string();
        assert!(msg.contains("incorrect number of weights 2"));
        assert!(msg.contains("expected 3"));
    }

    #[test]
    fn validation_errors_convert_into_fusion_error() {
        let err: FusionError = ValidationError::LabelCountMismatch {
            batch: 1,
            boxes: 4,
            labels: 3,
        }
        .into();
        assert_eq!(err.to_string(), "batch 1: 4 boxes but 3 labels");
    }
}
