//! Fashion-MNIST Vision Transformer
//!
//! A small vision transformer with hand-written forward and backward passes.
//! Images are cut into patches, embedded, passed through a stack of post-norm
//! encoder layers and mean-pooled into class probabilities.
//!
//! # Modules
//!
//! - `matrix`: Dense row-major `f64` matrix and its products
//! - `layers`: Layer trait and the transformer building blocks
//! - `model`: The `VisionTransformer` classifier and its training step
//! - `loss`: Cross-entropy and accuracy
//! - `optimizers`: Optimizer trait and SGD
//! - `utils`: RNG, activations and learning rate schedules
//! - `config`: JSON run configuration
//! - `dataset`: IDX file loading and class names
//! - `error`: Error types

pub mod config;
pub mod dataset;
pub mod error;
pub mod layers;
pub mod loss;
pub mod matrix;
pub mod model;
pub mod optimizers;
pub mod utils;

pub use error::{ConfigError, DatasetError, ModelError};
pub use matrix::Matrix;
pub use model::VisionTransformer;
