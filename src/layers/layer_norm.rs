//! Layer normalization implementation
//!
//! Layer normalization standardizes every row (one sequence position) across
//! the embedding dimension, then applies a learnable affine transformation:
//!
//! 1. Compute row statistics: mean μ and (biased) variance σ²
//! 2. Normalize: x̂ = (x - μ) / sqrt(σ² + ε)
//! 3. Scale and shift: y = γ ⊙ x̂ + β
//!
//! Unlike batch normalization there are no running statistics, so training
//! and evaluation compute exactly the same function.

use crate::layers::r#trait::{check_grads, ForwardContext, Layer};
use crate::matrix::Matrix;

/// Default ε added to the variance.
pub const LAYER_NORM_EPSILON: f64 = 1e-5;

/// Layer normalization with learnable scale (`gamma`) and shift (`beta`).
///
/// Parameter order: `[gamma, beta]`, both `1 × size`.
#[derive(Debug, Clone)]
pub struct LayerNorm {
    epsilon: f64,
    gamma: Matrix,
    beta: Matrix,
}

impl LayerNorm {
    /// Creates a layer norm over rows of width `size` with γ = 1 and β = 0.
    ///
    /// # Panics
    ///
    /// Panics if `epsilon` is not positive.
    pub fn new(size: usize, epsilon: f64) -> Self {
        assert!(epsilon > 0.0, "epsilon must be positive");
        Self {
            epsilon,
            gamma: Matrix::filled(1, size, 1.0),
            beta: Matrix::zeros(1, size),
        }
    }

    pub fn size(&self) -> usize {
        self.gamma.cols()
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    pub fn gamma(&self) -> &Matrix {
        &self.gamma
    }

    pub fn beta(&self) -> &Matrix {
        &self.beta
    }
}

/// Values recorded by [`LayerNorm::forward`].
#[derive(Debug, Clone)]
pub struct LayerNormCache {
    normalized: Matrix,
    inv_std: Vec<f64>,
}

impl Layer for LayerNorm {
    type Cache = LayerNormCache;

    fn forward(&self, input: &Matrix, _ctx: &mut ForwardContext) -> (Matrix, LayerNormCache) {
        let size = self.size();
        assert_eq!(
            input.cols(),
            size,
            "layer norm width mismatch: expected {}, got {}",
            size,
            input.cols()
        );

        let mut normalized = Matrix::zeros(input.rows(), size);
        let mut output = Matrix::zeros(input.rows(), size);
        let mut inv_std = Vec::with_capacity(input.rows());

        for r in 0..input.rows() {
            let row = input.row(r);
            let mean = row.iter().sum::<f64>() / size as f64;
            let var = row.iter().map(|x| (x - mean) * (x - mean)).sum::<f64>() / size as f64;
            let rstd = 1.0 / (var + self.epsilon).sqrt();
            inv_std.push(rstd);

            let norm_row = normalized.row_mut(r);
            for (n, &x) in norm_row.iter_mut().zip(row) {
                *n = (x - mean) * rstd;
            }
            let norm_row = normalized.row(r);
            let out_row = output.row_mut(r);
            for j in 0..size {
                out_row[j] = self.gamma.data()[j] * norm_row[j] + self.beta.data()[j];
            }
        }

        (output, LayerNormCache { normalized, inv_std })
    }

    fn backward(&self, cache: &LayerNormCache, grad_output: &Matrix, grads: &mut [Matrix]) -> Matrix {
        check_grads("LayerNorm", 2, grads);
        assert_eq!(
            grad_output.shape(),
            cache.normalized.shape(),
            "layer norm grad_output shape mismatch"
        );

        let size = self.size();
        let gamma = self.gamma.data();
        let mut grad_input = Matrix::zeros(grad_output.rows(), size);

        for r in 0..grad_output.rows() {
            let dy = grad_output.row(r);
            let x_hat = cache.normalized.row(r);
            let rstd = cache.inv_std[r];

            let mut dnorm_mean = 0.0;
            let mut dnorm_norm_mean = 0.0;
            for j in 0..size {
                let dnorm = gamma[j] * dy[j];
                dnorm_mean += dnorm;
                dnorm_norm_mean += dnorm * x_hat[j];
            }
            dnorm_mean /= size as f64;
            dnorm_norm_mean /= size as f64;

            let dx = grad_input.row_mut(r);
            for j in 0..size {
                let dnorm = gamma[j] * dy[j];
                dx[j] = (dnorm - dnorm_mean - x_hat[j] * dnorm_norm_mean) * rstd;
            }

            let dgamma = grads[0].data_mut();
            for j in 0..size {
                dgamma[j] += dy[j] * x_hat[j];
            }
            let dbeta = grads[1].data_mut();
            for j in 0..size {
                dbeta[j] += dy[j];
            }
        }

        grad_input
    }

    fn parameters(&self) -> Vec<&Matrix> {
        vec![&self.gamma, &self.beta]
    }

    fn parameters_mut(&mut self) -> Vec<&mut Matrix> {
        vec![&mut self.gamma, &mut self.beta]
    }
}
