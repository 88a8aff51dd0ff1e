//! Dropout layer implementation for regularization
//!
//! This module provides a Dropout layer that randomly drops (sets to zero) a
//! fraction of input units during training to prevent overfitting. During
//! evaluation, all units are kept and outputs are passed through unchanged.

use crate::layers::r#trait::{check_grads, ForwardContext, Layer};
use crate::matrix::Matrix;

/// Inverted dropout.
///
/// During training, sets each unit to zero with probability `rate` and scales
/// the remaining units by 1/(1-rate) so expected values are preserved. The
/// mask drawn in `forward` is returned in the cache and reused verbatim by
/// `backward`.
///
/// # Example
///
/// ```
/// use fashion_transformer::layers::{Dropout, ForwardContext, Layer, Mode};
/// use fashion_transformer::matrix::Matrix;
/// use fashion_transformer::utils::SimpleRng;
///
/// let layer = Dropout::new(0.5);
/// let input = Matrix::filled(4, 8, 1.0);
///
/// let mut ctx = ForwardContext::new(Mode::Training, SimpleRng::new(1));
/// let (output, _mask) = layer.forward(&input, &mut ctx);
/// assert!(output.data().iter().all(|&x| x == 0.0 || x == 2.0));
/// ```
#[derive(Debug, Clone, Copy)]
pub struct Dropout {
    rate: f64,
}

impl Dropout {
    /// Creates a dropout layer.
    ///
    /// # Panics
    ///
    /// Panics if `rate` is outside [0.0, 1.0).
    pub fn new(rate: f64) -> Self {
        assert!(
            (0.0..1.0).contains(&rate),
            "dropout rate must be in range [0.0, 1.0), got {}",
            rate
        );
        Self { rate }
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }
}

/// Mask recorded by [`Dropout::forward`].
///
/// `None` when no units were dropped (evaluation mode or a zero rate). When
/// present, each entry is either `0.0` or the keep scale `1/(1-rate)`.
#[derive(Debug, Clone)]
pub struct DropoutCache {
    mask: Option<Matrix>,
}

impl DropoutCache {
    pub fn mask(&self) -> Option<&Matrix> {
        self.mask.as_ref()
    }
}

impl Layer for Dropout {
    type Cache = DropoutCache;

    fn forward(&self, input: &Matrix, ctx: &mut ForwardContext) -> (Matrix, DropoutCache) {
        if !ctx.is_training() || self.rate == 0.0 {
            return (input.clone(), DropoutCache { mask: None });
        }

        let scale = 1.0 / (1.0 - self.rate);
        let rng = ctx.rng();
        let mut mask = Matrix::zeros(input.rows(), input.cols());
        for m in mask.data_mut() {
            if rng.next_f64() >= self.rate {
                *m = scale;
            }
        }
        let output = input.hadamard(&mask);
        (output, DropoutCache { mask: Some(mask) })
    }

    fn backward(&self, cache: &DropoutCache, grad_output: &Matrix, grads: &mut [Matrix]) -> Matrix {
        check_grads("Dropout", 0, grads);
        match &cache.mask {
            Some(mask) => grad_output.hadamard(mask),
            None => grad_output.clone(),
        }
    }

    fn parameters(&self) -> Vec<&Matrix> {
        Vec::new()
    }

    fn parameters_mut(&mut self) -> Vec<&mut Matrix> {
        Vec::new()
    }
}
