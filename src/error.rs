// src/error.rs
use thiserror::Error;

use crate::persistence::PersistenceBucket;
use crate::thresholds::{BodyRegion, ErrorType, ThresholdLevel, ThresholdViolation};

#[derive(Debug, Error)]
pub enum ThresholdError {
    #[error("no threshold for {error_type} in region {region}")]
    UnknownEntry { region: BodyRegion, error_type: ErrorType },

    #[error("{level} threshold for {region}/{error_type} must be a finite non-negative number, got {value}")]
    InvalidValue {
        region: BodyRegion,
        error_type: ErrorType,
        level: ThresholdLevel,
        value: f64,
    },

    #[error("critical threshold must exceed warning for {region}/{error_type} (warning {warning}, critical {critical})")]
    CriticalNotAboveWarning {
        region: BodyRegion,
        error_type: ErrorType,
        warning: f64,
        critical: f64,
    },

    #[error("threshold table failed validation with {} violation(s)", .0.len())]
    Invalid(Vec<ThresholdViolation>),

    #[error("malformed threshold document: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("threshold file I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error, PartialEq)]
pub enum PersistenceError {
    #[error("no persistence window configured for bucket '{0}'")]
    UnknownBucket(PersistenceBucket),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("min_landmark_visibility must lie in [0, 1], got {0}")]
    Visibility(f64),

    #[error("persistence window for '{bucket}' must be positive")]
    PersistenceWindow { bucket: PersistenceBucket },

    #[error("reset timeout must be positive")]
    ResetTimeout,

    #[error("malformed config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("config file I/O failed: {0}")]
    Io(#[from] std::io::Error),
}
