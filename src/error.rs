//! Error types for model construction, configuration and dataset loading.
//!
//! Shape mismatches inside the numeric core are programming errors and panic
//! with a descriptive message instead of surfacing here.

use thiserror::Error;

/// Errors raised while building a model.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    /// Hyperparameters that cannot describe a valid model.
    #[error("Invalid model configuration: {0}")]
    InvalidConfig(String),
}

/// Errors raised while loading a JSON configuration file.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not valid JSON for the expected structure.
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    /// The file parsed but holds values outside their valid range.
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// The model section describes an impossible architecture.
    #[error(transparent)]
    Model(#[from] ModelError),
}

/// Errors raised while reading IDX image and label files.
#[derive(Error, Debug)]
pub enum DatasetError {
    /// The file could not be read.
    #[error("Failed to read dataset file: {0}")]
    Io(#[from] std::io::Error),

    /// The header magic number does not match the expected IDX type.
    #[error("Invalid magic number in {path}: expected {expected}, got {found}")]
    BadMagic {
        path: String,
        expected: u32,
        found: u32,
    },

    /// The file ends before the advertised payload.
    #[error("Dataset file {0} is truncated")]
    Truncated(String),

    /// Images are not the size the model expects.
    #[error("Unexpected image dimensions {rows}x{cols} in {path}")]
    Dimensions { path: String, rows: usize, cols: usize },
}

/// Result type for model construction.
pub type ModelResult<T> = Result<T, ModelError>;
