//! Transformer encoder layer and stack.
//!
//! Each layer uses the post-norm residual layout:
//!
//! ```text
//! x' = LayerNorm₁(x  + Dropout(Attention(x)))
//! y  = LayerNorm₂(x' + Dropout(FeedForward(x')))
//! ```

use crate::layers::attention::{AttentionCache, MultiHeadAttention};
use crate::layers::dropout::{Dropout, DropoutCache};
use crate::layers::feed_forward::{FeedForward, FeedForwardCache};
use crate::layers::layer_norm::{LayerNorm, LayerNormCache, LAYER_NORM_EPSILON};
use crate::layers::r#trait::{check_grads, ForwardContext, Layer};
use crate::matrix::Matrix;
use crate::utils::SimpleRng;

/// One attention + feed-forward block.
///
/// Parameter order: attention (8), norm₁ (2), feed-forward (4), norm₂ (2).
#[derive(Debug, Clone)]
pub struct EncoderLayer {
    attention: MultiHeadAttention,
    attention_norm: LayerNorm,
    feed_forward: FeedForward,
    feed_forward_norm: LayerNorm,
    residual_dropout: Dropout,
}

impl EncoderLayer {
    pub fn new(
        d_model: usize,
        num_heads: usize,
        d_ff: usize,
        dropout_rate: f64,
        rng: &mut SimpleRng,
    ) -> Self {
        Self {
            attention: MultiHeadAttention::new(d_model, num_heads, dropout_rate, rng),
            attention_norm: LayerNorm::new(d_model, LAYER_NORM_EPSILON),
            feed_forward: FeedForward::new(d_model, d_ff, dropout_rate, rng),
            feed_forward_norm: LayerNorm::new(d_model, LAYER_NORM_EPSILON),
            residual_dropout: Dropout::new(dropout_rate),
        }
    }

    pub fn attention(&self) -> &MultiHeadAttention {
        &self.attention
    }
}

#[derive(Debug, Clone)]
pub struct EncoderLayerCache {
    attention: AttentionCache,
    attention_dropout: DropoutCache,
    attention_norm: LayerNormCache,
    feed_forward: FeedForwardCache,
    feed_forward_dropout: DropoutCache,
    feed_forward_norm: LayerNormCache,
}

impl EncoderLayerCache {
    pub fn attention(&self) -> &AttentionCache {
        &self.attention
    }
}

impl Layer for EncoderLayer {
    type Cache = EncoderLayerCache;

    fn forward(&self, input: &Matrix, ctx: &mut ForwardContext) -> (Matrix, EncoderLayerCache) {
        let (attended, attention) = self.attention.forward(input, ctx);
        let (attended, attention_dropout) = self.residual_dropout.forward(&attended, ctx);
        let (hidden, attention_norm) = self.attention_norm.forward(&input.add(&attended), ctx);

        let (transformed, feed_forward) = self.feed_forward.forward(&hidden, ctx);
        let (transformed, feed_forward_dropout) = self.residual_dropout.forward(&transformed, ctx);
        let (output, feed_forward_norm) =
            self.feed_forward_norm.forward(&hidden.add(&transformed), ctx);

        (
            output,
            EncoderLayerCache {
                attention,
                attention_dropout,
                attention_norm,
                feed_forward,
                feed_forward_dropout,
                feed_forward_norm,
            },
        )
    }

    fn backward(&self, cache: &EncoderLayerCache, grad_output: &Matrix, grads: &mut [Matrix]) -> Matrix {
        check_grads("EncoderLayer", 16, grads);
        let (g_attention, rest) = grads.split_at_mut(8);
        let (g_attention_norm, rest) = rest.split_at_mut(2);
        let (g_feed_forward, g_feed_forward_norm) = rest.split_at_mut(4);

        // second residual branch
        let grad_sum = self
            .feed_forward_norm
            .backward(&cache.feed_forward_norm, grad_output, g_feed_forward_norm);
        let grad_transformed =
            self.residual_dropout
                .backward(&cache.feed_forward_dropout, &grad_sum, &mut []);
        let mut grad_hidden =
            self.feed_forward
                .backward(&cache.feed_forward, &grad_transformed, g_feed_forward);
        grad_hidden.add_assign(&grad_sum);

        // first residual branch
        let grad_sum = self
            .attention_norm
            .backward(&cache.attention_norm, &grad_hidden, g_attention_norm);
        let grad_attended = self
            .residual_dropout
            .backward(&cache.attention_dropout, &grad_sum, &mut []);
        let mut grad_input = self
            .attention
            .backward(&cache.attention, &grad_attended, g_attention);
        grad_input.add_assign(&grad_sum);
        grad_input
    }

    fn parameters(&self) -> Vec<&Matrix> {
        let mut params = self.attention.parameters();
        params.extend(self.attention_norm.parameters());
        params.extend(self.feed_forward.parameters());
        params.extend(self.feed_forward_norm.parameters());
        params
    }

    fn parameters_mut(&mut self) -> Vec<&mut Matrix> {
        let mut params = self.attention.parameters_mut();
        params.extend(self.attention_norm.parameters_mut());
        params.extend(self.feed_forward.parameters_mut());
        params.extend(self.feed_forward_norm.parameters_mut());
        params
    }
}

/// `num_layers` encoder layers applied in order, each with its own
/// parameters.
#[derive(Debug, Clone)]
pub struct Encoder {
    layers: Vec<EncoderLayer>,
}

impl Encoder {
    pub fn new(
        num_layers: usize,
        d_model: usize,
        num_heads: usize,
        d_ff: usize,
        dropout_rate: f64,
        rng: &mut SimpleRng,
    ) -> Self {
        let layers = (0..num_layers)
            .map(|_| EncoderLayer::new(d_model, num_heads, d_ff, dropout_rate, rng))
            .collect();
        Self { layers }
    }

    pub fn layers(&self) -> &[EncoderLayer] {
        &self.layers
    }

    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }
}

impl Layer for Encoder {
    type Cache = Vec<EncoderLayerCache>;

    fn forward(&self, input: &Matrix, ctx: &mut ForwardContext) -> (Matrix, Vec<EncoderLayerCache>) {
        let mut caches = Vec::with_capacity(self.layers.len());
        let mut x = input.clone();
        for layer in &self.layers {
            let (y, cache) = layer.forward(&x, ctx);
            caches.push(cache);
            x = y;
        }
        (x, caches)
    }

    fn backward(
        &self,
        cache: &Vec<EncoderLayerCache>,
        grad_output: &Matrix,
        grads: &mut [Matrix],
    ) -> Matrix {
        check_grads("Encoder", self.tensor_count(), grads);
        let mut grad = grad_output.clone();
        // chunks line up with the per-layer parameter blocks
        let chunk = grads.len() / self.layers.len().max(1);
        for ((layer, layer_cache), layer_grads) in self
            .layers
            .iter()
            .zip(cache)
            .zip(grads.chunks_mut(chunk.max(1)))
            .rev()
        {
            grad = layer.backward(layer_cache, &grad, layer_grads);
        }
        grad
    }

    fn parameters(&self) -> Vec<&Matrix> {
        self.layers.iter().flat_map(|l| l.parameters()).collect()
    }

    fn parameters_mut(&mut self) -> Vec<&mut Matrix> {
        self.layers.iter_mut().flat_map(|l| l.parameters_mut()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stack_preserves_shape() {
        let mut rng = SimpleRng::new(12);
        let encoder = Encoder::new(2, 16, 4, 32, 0.1, &mut rng);
        let input = Matrix::xavier(5, 16, &mut rng);
        let (output, caches) = encoder.forward(&input, &mut ForwardContext::evaluating());

        assert_eq!(output.shape(), (5, 16));
        assert_eq!(caches.len(), 2);
        assert_eq!(encoder.tensor_count(), 32);
    }

    #[test]
    fn test_layers_are_independent() {
        let encoder = Encoder::new(2, 8, 2, 16, 0.0, &mut SimpleRng::new(3));
        let params = encoder.parameters();
        assert_ne!(params[0], params[16]);
    }
}
