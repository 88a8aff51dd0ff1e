//! Layer trait definition for transformer building blocks
//!
//! This module defines the core Layer trait that every component implements,
//! together with the execution mode and the per-call forward context.
//!
//! Layers never keep activations between calls. `forward` returns the output
//! together with a cache value holding whatever the matching `backward` call
//! needs (inputs, normalized activations, attention weights, dropout masks).
//! The caller owns that cache for the duration of one training step.

use crate::matrix::Matrix;
use crate::utils::rng::SimpleRng;

/// Whether dropout is active.
///
/// Models start in `Training`; the only transitions are explicit requests
/// from the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Training,
    Evaluating,
}

impl Mode {
    pub fn is_training(self) -> bool {
        self == Mode::Training
    }
}

/// State threaded through one forward pass.
///
/// Carries the mode explicitly instead of reading a flag stored on each
/// layer, plus the generator used for dropout masks. In `Evaluating` mode no
/// random numbers are drawn.
#[derive(Debug, Clone)]
pub struct ForwardContext {
    mode: Mode,
    rng: SimpleRng,
}

impl ForwardContext {
    pub fn new(mode: Mode, rng: SimpleRng) -> Self {
        Self { mode, rng }
    }

    /// Evaluation context; dropout is a no-op and the RNG is never touched.
    pub fn evaluating() -> Self {
        Self::new(Mode::Evaluating, SimpleRng::new(0))
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn is_training(&self) -> bool {
        self.mode.is_training()
    }

    pub fn rng(&mut self) -> &mut SimpleRng {
        &mut self.rng
    }
}

/// Core trait for neural network layers.
///
/// # Example
///
/// ```
/// use fashion_transformer::layers::{ForwardContext, Layer, Linear};
/// use fashion_transformer::matrix::Matrix;
/// use fashion_transformer::utils::SimpleRng;
///
/// let mut rng = SimpleRng::new(42);
/// let layer = Linear::new(4, 3, &mut rng);
/// let input = Matrix::filled(2, 4, 0.5);
///
/// let mut ctx = ForwardContext::evaluating();
/// let (output, cache) = layer.forward(&input, &mut ctx);
/// assert_eq!(output.shape(), (2, 3));
///
/// let mut grads = layer.zero_grads();
/// let grad_input = layer.backward(&cache, &Matrix::filled(2, 3, 1.0), &mut grads);
/// assert_eq!(grad_input.shape(), (2, 4));
/// ```
pub trait Layer {
    /// Intermediate values recorded by `forward` for `backward`.
    type Cache;

    /// Forward propagation through the layer.
    ///
    /// # Panics
    ///
    /// Implementations panic if `input` does not have the expected shape.
    fn forward(&self, input: &Matrix, ctx: &mut ForwardContext) -> (Matrix, Self::Cache);

    /// Backward propagation through the layer.
    ///
    /// Adds the parameter gradients into `grads`, which must hold one tensor
    /// per entry of [`Layer::parameters`] in the same order and shape, and
    /// returns the gradient with respect to the layer input.
    fn backward(&self, cache: &Self::Cache, grad_output: &Matrix, grads: &mut [Matrix]) -> Matrix;

    /// Trainable tensors in a fixed order.
    fn parameters(&self) -> Vec<&Matrix>;

    /// Mutable access to the trainable tensors, same order as `parameters`.
    fn parameters_mut(&mut self) -> Vec<&mut Matrix>;

    /// Number of trainable tensors.
    fn tensor_count(&self) -> usize {
        self.parameters().len()
    }

    /// Total number of trainable scalars.
    fn parameter_count(&self) -> usize {
        self.parameters().iter().map(|p| p.len()).sum()
    }

    /// Zeroed gradient buffers matching `parameters`.
    fn zero_grads(&self) -> Vec<Matrix> {
        self.parameters()
            .iter()
            .map(|p| Matrix::zeros(p.rows(), p.cols()))
            .collect()
    }
}

/// Asserts that a gradient slice matches a layer's parameter layout.
pub(crate) fn check_grads(layer: &str, expected: usize, grads: &[Matrix]) {
    assert_eq!(
        grads.len(),
        expected,
        "{} expects {} gradient tensors, got {}",
        layer,
        expected,
        grads.len()
    );
}
