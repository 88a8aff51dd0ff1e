//! Configuration structures for the model and the training run
//!
//! A run is described by a JSON file with a `model` and a `training` section.
//! Every field is optional and falls back to the defaults below, so `{}` is a
//! valid configuration.
//!
//! # Example
//!
//! ```json
//! {
//!   "model": { "d_model": 64, "num_heads": 4, "num_layers": 2 },
//!   "training": {
//!     "epochs": 5,
//!     "learning_rate": 0.001,
//!     "scheduler": { "scheduler_type": "step_decay", "step_size": 2, "gamma": 0.5 }
//!   }
//! }
//! ```

use crate::error::{ConfigError, ModelError};
use crate::utils::lr_scheduler::{
    ConstantLR, ExponentialDecay, InverseTimeDecay, LRScheduler, StepDecay,
};
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Seed used when none is configured.
pub const DEFAULT_SEED: u64 = 42;

/// Hyperparameters of the vision transformer.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Embedding width of every token.
    pub d_model: usize,
    /// Attention heads per layer; must divide `d_model`.
    pub num_heads: usize,
    /// Encoder layers in the stack.
    pub num_layers: usize,
    /// Hidden width of the feed-forward blocks.
    pub d_ff: usize,
    pub num_classes: usize,
    /// Side length of the square patches; must divide `image_size`.
    pub patch_size: usize,
    /// Side length of the square input images.
    pub image_size: usize,
    /// Dropout probability in `[0, 1)`.
    pub dropout_rate: f64,
    /// Train the positional table instead of keeping it fixed.
    pub learned_positions: bool,
    /// Seed for weight initialization and dropout masks.
    pub seed: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            d_model: 64,
            num_heads: 4,
            num_layers: 2,
            d_ff: 256,
            num_classes: 10,
            patch_size: 4,
            image_size: 28,
            dropout_rate: 0.1,
            learned_positions: true,
            seed: DEFAULT_SEED,
        }
    }
}

impl ModelConfig {
    /// Checks that the hyperparameters describe a buildable model.
    pub fn validate(&self) -> Result<(), ModelError> {
        let invalid = |msg: String| -> Result<(), ModelError> { Err(ModelError::InvalidConfig(msg)) };

        for (name, value) in [
            ("d_model", self.d_model),
            ("num_heads", self.num_heads),
            ("num_layers", self.num_layers),
            ("d_ff", self.d_ff),
            ("num_classes", self.num_classes),
            ("patch_size", self.patch_size),
            ("image_size", self.image_size),
        ] {
            if value == 0 {
                return invalid(format!("{} must be positive", name));
            }
        }
        if self.d_model % self.num_heads != 0 {
            return invalid(format!(
                "d_model ({}) must be divisible by num_heads ({})",
                self.d_model, self.num_heads
            ));
        }
        if self.image_size % self.patch_size != 0 {
            return invalid(format!(
                "image_size ({}) must be divisible by patch_size ({})",
                self.image_size, self.patch_size
            ));
        }
        if !(0.0..1.0).contains(&self.dropout_rate) {
            return invalid(format!(
                "dropout_rate must be in [0, 1), got {}",
                self.dropout_rate
            ));
        }
        Ok(())
    }
}

/// Learning rate schedule selection.
///
/// Different scheduler types read different optional fields:
///
/// - **constant**: none
/// - **inverse_time**: `decay` (default 0.1)
/// - **step_decay**: `step_size` (default 1) and `gamma` (default 0.5)
/// - **exponential**: `decay_rate` (default 0.9)
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub scheduler_type: String,
    pub decay: Option<f64>,
    pub step_size: Option<usize>,
    pub gamma: Option<f64>,
    pub decay_rate: Option<f64>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            scheduler_type: "inverse_time".to_string(),
            decay: Some(0.1),
            step_size: None,
            gamma: None,
            decay_rate: None,
        }
    }
}

const SCHEDULER_TYPES: [&str; 4] = ["constant", "inverse_time", "step_decay", "exponential"];

impl SchedulerConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if !SCHEDULER_TYPES.contains(&self.scheduler_type.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "Invalid scheduler type '{}'. Must be one of: {}",
                self.scheduler_type,
                SCHEDULER_TYPES.join(", ")
            )));
        }
        for (name, value) in [
            ("decay", self.decay),
            ("gamma", self.gamma),
            ("decay_rate", self.decay_rate),
        ] {
            if matches!(value, Some(v) if v < 0.0) {
                return Err(ConfigError::Invalid(format!("{} must be non-negative", name)));
            }
        }
        if self.step_size == Some(0) {
            return Err(ConfigError::Invalid("step_size must be positive".to_string()));
        }
        Ok(())
    }

    /// Builds the configured scheduler starting from `initial_lr`.
    pub fn build(&self, initial_lr: f64) -> Result<Box<dyn LRScheduler>, ConfigError> {
        self.validate()?;
        let scheduler: Box<dyn LRScheduler> = match self.scheduler_type.as_str() {
            "constant" => Box::new(ConstantLR::new(initial_lr)),
            "inverse_time" => Box::new(InverseTimeDecay::new(
                initial_lr,
                self.decay.unwrap_or(0.1),
            )),
            "step_decay" => Box::new(StepDecay::new(
                initial_lr,
                self.step_size.unwrap_or(1),
                self.gamma.unwrap_or(0.5),
            )),
            _ => Box::new(ExponentialDecay::new(
                initial_lr,
                self.decay_rate.unwrap_or(0.9),
            )),
        };
        Ok(scheduler)
    }
}

/// Settings of the training driver.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub epochs: usize,
    pub batch_size: usize,
    /// Learning rate of the first epoch.
    pub learning_rate: f64,
    pub scheduler: SchedulerConfig,
    /// Cap on the number of training images loaded.
    pub train_samples: usize,
    /// Cap on the number of test images loaded.
    pub test_samples: usize,
    /// Training stops once an epoch's mean accuracy exceeds this value.
    pub early_stop_accuracy: f64,
    /// Log progress every this many batches; 0 disables batch logging.
    pub log_every: usize,
    /// Test predictions printed after evaluation.
    pub preview_samples: usize,
    /// Directory holding the four IDX files.
    pub data_dir: String,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: 5,
            batch_size: 16,
            learning_rate: 0.001,
            scheduler: SchedulerConfig::default(),
            train_samples: 5000,
            test_samples: 1000,
            early_stop_accuracy: 0.85,
            log_every: 10,
            preview_samples: 10,
            data_dir: "./data".to_string(),
        }
    }
}

impl TrainingConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.epochs == 0 {
            return Err(ConfigError::Invalid("epochs must be positive".to_string()));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid("batch_size must be positive".to_string()));
        }
        if self.learning_rate.is_nan() || self.learning_rate <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if !(0.0..=1.0).contains(&self.early_stop_accuracy) {
            return Err(ConfigError::Invalid(format!(
                "early_stop_accuracy must be in [0, 1], got {}",
                self.early_stop_accuracy
            )));
        }
        self.scheduler.validate()
    }
}

/// Complete configuration of one training run.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub model: ModelConfig,
    pub training: TrainingConfig,
}

impl RunConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.model.validate()?;
        self.training.validate()
    }
}

/// Parses and validates a configuration from a JSON string.
pub fn parse_config(contents: &str) -> Result<RunConfig, ConfigError> {
    let config: RunConfig = serde_json::from_str(contents)?;
    config.validate()?;
    Ok(config)
}

/// Loads a run configuration from a JSON file.
///
/// # Examples
///
/// ```no_run
/// use fashion_transformer::config::load_config;
///
/// let cfg = load_config("config/fashion_vit.json").unwrap();
/// assert_eq!(cfg.model.d_model, 64);
/// ```
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<RunConfig, ConfigError> {
    let contents = fs::read_to_string(path)?;
    parse_config(&contents)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_object_uses_defaults() {
        let config = parse_config("{}").unwrap();
        assert_eq!(config, RunConfig::default());
        assert_eq!(config.training.batch_size, 16);
    }

    #[test]
    fn test_indivisible_heads_is_model_error() {
        let err = parse_config(r#"{"model": {"d_model": 65}}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Model(ModelError::InvalidConfig(_))));
    }

    #[test]
    fn test_unknown_scheduler_rejected() {
        let err = parse_config(r#"{"training": {"scheduler": {"scheduler_type": "cyclic"}}}"#)
            .unwrap_err();
        assert!(err.to_string().contains("Invalid scheduler type"));
    }
}
