//! Linear (fully connected) layer implementation
//!
//! This module provides a Linear layer that performs the transformation
//! `output = input × weights + bias` independently on every row.

use crate::layers::r#trait::{check_grads, ForwardContext, Layer};
use crate::matrix::Matrix;
use crate::utils::SimpleRng;

/// Linear layer with weights and bias.
///
/// Performs the linear transformation: y = xW + b
/// where x is the input (rows × input_size),
/// W is the weight matrix (input_size × output_size),
/// and b is the bias row (1 × output_size).
///
/// Parameter order: `[weights, bias]`.
#[derive(Debug, Clone)]
pub struct Linear {
    weights: Matrix,
    bias: Matrix,
}

impl Linear {
    /// Create a new Linear layer with Xavier initialization.
    ///
    /// Weights are sampled uniformly from [-limit, limit] where
    /// limit = sqrt(6 / (input_size + output_size)); biases start at zero.
    pub fn new(input_size: usize, output_size: usize, rng: &mut SimpleRng) -> Self {
        Self {
            weights: Matrix::xavier(input_size, output_size, rng),
            bias: Matrix::zeros(1, output_size),
        }
    }

    pub fn input_size(&self) -> usize {
        self.weights.rows()
    }

    pub fn output_size(&self) -> usize {
        self.weights.cols()
    }

    pub fn weights(&self) -> &Matrix {
        &self.weights
    }

    pub fn bias(&self) -> &Matrix {
        &self.bias
    }

    /// Forward pass without recording a cache.
    pub fn apply(&self, input: &Matrix) -> Matrix {
        assert_eq!(
            input.cols(),
            self.input_size(),
            "linear input width mismatch: expected {}, got {}",
            self.input_size(),
            input.cols()
        );
        let mut output = input.matmul(&self.weights);
        output.add_row_vector(&self.bias);
        output
    }
}

/// Input recorded by [`Linear::forward`].
#[derive(Debug, Clone)]
pub struct LinearCache {
    input: Matrix,
}

impl Layer for Linear {
    type Cache = LinearCache;

    fn forward(&self, input: &Matrix, _ctx: &mut ForwardContext) -> (Matrix, LinearCache) {
        let output = self.apply(input);
        (
            output,
            LinearCache {
                input: input.clone(),
            },
        )
    }

    fn backward(&self, cache: &LinearCache, grad_output: &Matrix, grads: &mut [Matrix]) -> Matrix {
        check_grads("Linear", 2, grads);
        assert_eq!(
            grad_output.shape(),
            (cache.input.rows(), self.output_size()),
            "linear grad_output shape mismatch"
        );

        // dW = xᵀ·dy, db = Σ_rows dy, dx = dy·Wᵀ
        grads[0].add_assign(&cache.input.transpose_matmul(grad_output));
        grads[1].add_assign(&grad_output.sum_rows());
        grad_output.matmul_transposed(&self.weights)
    }

    fn parameters(&self) -> Vec<&Matrix> {
        vec![&self.weights, &self.bias]
    }

    fn parameters_mut(&mut self) -> Vec<&mut Matrix> {
        vec![&mut self.weights, &mut self.bias]
    }
}
