//! Optimizer abstractions for parameter updates
//!
//! Optimizers turn averaged gradients into parameter updates. The model
//! hands every trainable tensor to the optimizer as a flat slice together
//! with its gradient of the same length.
//!
//! # Example
//!
//! ```
//! use fashion_transformer::optimizers::{Optimizer, SGD};
//!
//! let mut optimizer = SGD::new(0.1);
//! let mut weights = vec![1.0, 2.0];
//! optimizer.update(&mut weights, &[0.5, -0.5]);
//! assert!((weights[0] - 0.95).abs() < 1e-12);
//! ```

pub mod sgd;

pub use sgd::SGD;

/// Core trait for optimizers.
///
/// Implementations may keep internal state across updates, keyed by the
/// order in which tensors are passed; the model always passes them in
/// parameter order.
pub trait Optimizer: Send {
    /// Applies the update rule to `parameters` in place.
    ///
    /// # Panics
    ///
    /// Implementations panic if `parameters` and `gradients` have different
    /// lengths.
    fn update(&mut self, parameters: &mut [f64], gradients: &[f64]);

    /// Clears any accumulated state.
    fn reset(&mut self);

    fn learning_rate(&self) -> f64;

    /// Updates the base learning rate, e.g. from a scheduler.
    fn set_learning_rate(&mut self, lr: f64);
}
