//! Stochastic Gradient Descent (SGD) optimizer implementation
//!
//! Plain gradient descent: `parameter = parameter - learning_rate * gradient`.

use crate::optimizers::Optimizer;

/// Stochastic Gradient Descent optimizer.
///
/// `w = w - η * ∇L/∂w`, with no momentum and no per-parameter state.
///
/// # Example
///
/// ```
/// use fashion_transformer::optimizers::{Optimizer, SGD};
///
/// let mut optimizer = SGD::new(0.1);
/// let mut params = vec![1.0, 2.0, 3.0];
/// optimizer.update(&mut params, &[0.1, 0.2, 0.3]);
/// assert!((params[2] - 2.97).abs() < 1e-12);
/// ```
#[derive(Debug, Clone)]
pub struct SGD {
    learning_rate: f64,
}

impl SGD {
    pub fn new(learning_rate: f64) -> Self {
        Self { learning_rate }
    }
}

impl Optimizer for SGD {
    fn update(&mut self, parameters: &mut [f64], gradients: &[f64]) {
        assert_eq!(
            parameters.len(),
            gradients.len(),
            "Parameters and gradients must have the same length"
        );

        for (param, grad) in parameters.iter_mut().zip(gradients.iter()) {
            *param -= self.learning_rate * grad;
        }
    }

    fn reset(&mut self) {
        // no state
    }

    fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    fn set_learning_rate(&mut self, lr: f64) {
        self.learning_rate = lr;
    }
}
