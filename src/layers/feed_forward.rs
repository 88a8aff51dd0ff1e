//! Position-wise feed-forward block: `d_model → d_ff → d_model`.
//!
//! Every row of the sequence goes through the same two linear layers with a
//! ReLU in between. Rows never interact; mixing across positions is the
//! attention layer's job.

use crate::layers::dropout::{Dropout, DropoutCache};
use crate::layers::linear::{Linear, LinearCache};
use crate::layers::r#trait::{check_grads, ForwardContext, Layer};
use crate::matrix::Matrix;
use crate::utils::{relu, relu_backward, SimpleRng};

/// `Linear → ReLU → Dropout → Linear`.
///
/// Parameter order: `[w1, b1, w2, b2]`.
#[derive(Debug, Clone)]
pub struct FeedForward {
    expand: Linear,
    contract: Linear,
    dropout: Dropout,
}

impl FeedForward {
    pub fn new(d_model: usize, d_ff: usize, dropout_rate: f64, rng: &mut SimpleRng) -> Self {
        Self {
            expand: Linear::new(d_model, d_ff, rng),
            contract: Linear::new(d_ff, d_model, rng),
            dropout: Dropout::new(dropout_rate),
        }
    }

    pub fn d_ff(&self) -> usize {
        self.expand.output_size()
    }
}

#[derive(Debug, Clone)]
pub struct FeedForwardCache {
    expand: LinearCache,
    hidden_pre: Matrix,
    dropout: DropoutCache,
    contract: LinearCache,
}

impl Layer for FeedForward {
    type Cache = FeedForwardCache;

    fn forward(&self, input: &Matrix, ctx: &mut ForwardContext) -> (Matrix, FeedForwardCache) {
        let (hidden_pre, expand) = self.expand.forward(input, ctx);
        let hidden = relu(&hidden_pre);
        let (hidden, dropout) = self.dropout.forward(&hidden, ctx);
        let (output, contract) = self.contract.forward(&hidden, ctx);
        (
            output,
            FeedForwardCache {
                expand,
                hidden_pre,
                dropout,
                contract,
            },
        )
    }

    fn backward(&self, cache: &FeedForwardCache, grad_output: &Matrix, grads: &mut [Matrix]) -> Matrix {
        check_grads("FeedForward", 4, grads);
        let (g_expand, g_contract) = grads.split_at_mut(2);

        let grad_hidden = self.contract.backward(&cache.contract, grad_output, g_contract);
        let grad_hidden = self.dropout.backward(&cache.dropout, &grad_hidden, &mut []);
        let grad_hidden = relu_backward(&cache.hidden_pre, &grad_hidden);
        self.expand.backward(&cache.expand, &grad_hidden, g_expand)
    }

    fn parameters(&self) -> Vec<&Matrix> {
        let mut params = self.expand.parameters();
        params.extend(self.contract.parameters());
        params
    }

    fn parameters_mut(&mut self) -> Vec<&mut Matrix> {
        let mut params = self.expand.parameters_mut();
        params.extend(self.contract.parameters_mut());
        params
    }
}
