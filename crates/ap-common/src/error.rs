//! Error types for measurement autopsy.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for autopsy operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for measurement autopsy.
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors (10-19)
    #[error("configuration error: {0}")]
    Config(String),

    #[error("unknown signal '{signal}': not a numeric column of the measurement")]
    UnknownSignal { signal: String },

    #[error("unknown aggregator '{0}'")]
    UnknownAggregator(String),

    #[error("invalid measurement id '{0}'")]
    InvalidMeasurementId(String),

    // Input errors (20-29)
    #[error("measurement has no usable rows")]
    EmptyInput,

    // Lookup errors (30-39)
    #[error("overview {key} for {measurement_id} has not been built")]
    OverviewNotBuilt { measurement_id: String, key: String },

    #[error("unknown measurement: {0}")]
    UnknownMeasurement(String),

    // Artifact errors (40-49)
    #[error("cached artifact at {path} is corrupted: {reason}")]
    CacheCorruption { path: PathBuf, reason: String },

    #[error("artifact encoding failed: {0}")]
    Artifact(String),

    // Dependency errors (50-59)
    #[error("missing dependency: {0} support is not compiled in")]
    MissingDependency(String),

    // I/O errors (60-69)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Returns the error code for this error type.
    /// Used for detailed error reporting in JSON output.
    pub fn code(&self) -> u32 {
        match self {
            Error::Config(_) => 10,
            Error::UnknownSignal { .. } => 11,
            Error::UnknownAggregator(_) => 12,
            Error::InvalidMeasurementId(_) => 13,
            Error::EmptyInput => 20,
            Error::OverviewNotBuilt { .. } => 30,
            Error::UnknownMeasurement(_) => 31,
            Error::CacheCorruption { .. } => 40,
            Error::Artifact(_) => 41,
            Error::MissingDependency(_) => 50,
            Error::Io(_) => 60,
            Error::Json(_) => 61,
        }
    }

    /// True for the configuration family (bad hz, unknown signal or aggregator).
    pub fn is_config(&self) -> bool {
        (10..20).contains(&self.code())
    }
}
