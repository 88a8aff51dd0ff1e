//! Multi-head scaled dot-product self-attention.
//!
//! The sequence `X` (n × d_model) is projected to queries, keys and values.
//! Head `h` owns the column block `[h·d_k, (h+1)·d_k)` of each projection,
//! with `d_k = d_model / num_heads`, and computes
//!
//! ```text
//! S_h = Q_h K_hᵀ / sqrt(d_k)          [n × n]
//! A_h = softmax_rows(S_h)             every row sums to 1
//! O_h = dropout(A_h) V_h              [n × d_k]
//! ```
//!
//! The heads are concatenated back to `n × d_model` and passed through the
//! output projection, so the result can be added residually to `X`.

use crate::layers::dropout::{Dropout, DropoutCache};
use crate::layers::linear::{Linear, LinearCache};
use crate::layers::r#trait::{check_grads, ForwardContext, Layer};
use crate::matrix::Matrix;
use crate::utils::{softmax_rows, softmax_rows_backward, SimpleRng};

/// Self-attention with `num_heads` heads.
///
/// Parameter order: `[w_q, b_q, w_k, b_k, w_v, b_v, w_o, b_o]`.
#[derive(Debug, Clone)]
pub struct MultiHeadAttention {
    num_heads: usize,
    query: Linear,
    key: Linear,
    value: Linear,
    output: Linear,
    dropout: Dropout,
}

impl MultiHeadAttention {
    /// # Panics
    ///
    /// Panics if `d_model` is not divisible by `num_heads`; model
    /// construction validates this first and reports it as an error.
    pub fn new(d_model: usize, num_heads: usize, dropout_rate: f64, rng: &mut SimpleRng) -> Self {
        assert!(
            num_heads > 0 && d_model % num_heads == 0,
            "d_model {} must be divisible by num_heads {}",
            d_model,
            num_heads
        );
        Self {
            num_heads,
            query: Linear::new(d_model, d_model, rng),
            key: Linear::new(d_model, d_model, rng),
            value: Linear::new(d_model, d_model, rng),
            output: Linear::new(d_model, d_model, rng),
            dropout: Dropout::new(dropout_rate),
        }
    }

    pub fn num_heads(&self) -> usize {
        self.num_heads
    }

    pub fn d_model(&self) -> usize {
        self.query.input_size()
    }

    pub fn head_dim(&self) -> usize {
        self.d_model() / self.num_heads
    }
}

/// Per-head values recorded during the forward pass.
#[derive(Debug, Clone)]
struct HeadCache {
    /// Softmax output before dropout.
    weights: Matrix,
    /// Weights after dropout, as multiplied with `V_h`.
    dropped: Matrix,
    dropout: DropoutCache,
}

/// Values recorded by [`MultiHeadAttention::forward`].
#[derive(Debug, Clone)]
pub struct AttentionCache {
    query_cache: LinearCache,
    key_cache: LinearCache,
    value_cache: LinearCache,
    output_cache: LinearCache,
    q: Matrix,
    k: Matrix,
    v: Matrix,
    heads: Vec<HeadCache>,
}

impl AttentionCache {
    /// Attention-weight matrix of every head, `seq_len × seq_len` each.
    pub fn attention_weights(&self) -> Vec<&Matrix> {
        self.heads.iter().map(|h| &h.weights).collect()
    }
}

impl Layer for MultiHeadAttention {
    type Cache = AttentionCache;

    fn forward(&self, input: &Matrix, ctx: &mut ForwardContext) -> (Matrix, AttentionCache) {
        let seq_len = input.rows();
        let d_k = self.head_dim();
        let scale = 1.0 / (d_k as f64).sqrt();

        let (q, query_cache) = self.query.forward(input, ctx);
        let (k, key_cache) = self.key.forward(input, ctx);
        let (v, value_cache) = self.value.forward(input, ctx);

        let mut concat = Matrix::zeros(seq_len, self.d_model());
        let mut heads = Vec::with_capacity(self.num_heads);

        for h in 0..self.num_heads {
            let start = h * d_k;
            let q_h = q.columns(start, d_k);
            let k_h = k.columns(start, d_k);
            let v_h = v.columns(start, d_k);

            let scores = q_h.matmul_transposed(&k_h).scale(scale);
            let weights = softmax_rows(&scores);
            let (dropped, dropout) = self.dropout.forward(&weights, ctx);

            concat.set_columns(start, &dropped.matmul(&v_h));
            heads.push(HeadCache {
                weights,
                dropped,
                dropout,
            });
        }

        let (output, output_cache) = self.output.forward(&concat, ctx);
        (
            output,
            AttentionCache {
                query_cache,
                key_cache,
                value_cache,
                output_cache,
                q,
                k,
                v,
                heads,
            },
        )
    }

    fn backward(&self, cache: &AttentionCache, grad_output: &Matrix, grads: &mut [Matrix]) -> Matrix {
        check_grads("MultiHeadAttention", 8, grads);
        let (g_query, rest) = grads.split_at_mut(2);
        let (g_key, rest) = rest.split_at_mut(2);
        let (g_value, g_output) = rest.split_at_mut(2);

        let seq_len = grad_output.rows();
        let d_k = self.head_dim();
        let scale = 1.0 / (d_k as f64).sqrt();

        let grad_concat = self.output.backward(&cache.output_cache, grad_output, g_output);

        let mut grad_q = Matrix::zeros(seq_len, self.d_model());
        let mut grad_k = Matrix::zeros(seq_len, self.d_model());
        let mut grad_v = Matrix::zeros(seq_len, self.d_model());

        for (h, head) in cache.heads.iter().enumerate() {
            let start = h * d_k;
            let q_h = cache.q.columns(start, d_k);
            let k_h = cache.k.columns(start, d_k);
            let v_h = cache.v.columns(start, d_k);
            let grad_head = grad_concat.columns(start, d_k);

            // O_h = A' V_h
            let grad_dropped = grad_head.matmul_transposed(&v_h);
            grad_v.set_columns(start, &head.dropped.transpose_matmul(&grad_head));

            let grad_weights = self.dropout.backward(&head.dropout, &grad_dropped, &mut []);
            let grad_scores = softmax_rows_backward(&head.weights, &grad_weights).scale(scale);

            // S_h = Q_h K_hᵀ
            grad_q.set_columns(start, &grad_scores.matmul(&k_h));
            grad_k.set_columns(start, &grad_scores.transpose_matmul(&q_h));
        }

        let mut grad_input = self.query.backward(&cache.query_cache, &grad_q, g_query);
        grad_input.add_assign(&self.key.backward(&cache.key_cache, &grad_k, g_key));
        grad_input.add_assign(&self.value.backward(&cache.value_cache, &grad_v, g_value));
        grad_input
    }

    fn parameters(&self) -> Vec<&Matrix> {
        let mut params = self.query.parameters();
        params.extend(self.key.parameters());
        params.extend(self.value.parameters());
        params.extend(self.output.parameters());
        params
    }

    fn parameters_mut(&mut self) -> Vec<&mut Matrix> {
        let mut params = self.query.parameters_mut();
        params.extend(self.key.parameters_mut());
        params.extend(self.value.parameters_mut());
        params.extend(self.output.parameters_mut());
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::Mode;

    #[test]
    fn test_output_shape_matches_input() {
        let mut rng = SimpleRng::new(2);
        let attn = MultiHeadAttention::new(16, 4, 0.0, &mut rng);
        let input = Matrix::xavier(9, 16, &mut rng);
        let (output, cache) = attn.forward(&input, &mut ForwardContext::evaluating());

        assert_eq!(output.shape(), input.shape());
        assert_eq!(cache.attention_weights().len(), 4);
        assert_eq!(attn.parameter_count(), 4 * (16 * 16 + 16));
    }

    #[test]
    fn test_attention_rows_are_distributions() {
        let mut rng = SimpleRng::new(8);
        let attn = MultiHeadAttention::new(12, 3, 0.1, &mut rng);
        let input = Matrix::xavier(7, 12, &mut rng).scale(10.0);
        let mut ctx = ForwardContext::new(Mode::Training, SimpleRng::new(4));
        let (_, cache) = attn.forward(&input, &mut ctx);

        for weights in cache.attention_weights() {
            assert_eq!(weights.shape(), (7, 7));
            for row in weights.row_iter() {
                assert!(row.iter().all(|&w| w >= 0.0));
                assert!((row.iter().sum::<f64>() - 1.0).abs() < 1e-9);
            }
        }
    }

    #[test]
    #[should_panic(expected = "must be divisible by num_heads")]
    fn test_indivisible_heads_panic() {
        MultiHeadAttention::new(10, 4, 0.0, &mut SimpleRng::new(1));
    }
}
