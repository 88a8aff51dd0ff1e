// Tests for numerical gradient checking using finite differences.
// These tests verify that analytical gradients match central differences
// for the individual layers and for the full model.

use fashion_transformer::config::ModelConfig;
use fashion_transformer::layers::{
    ClassificationHead, Encoder, FeedForward, ForwardContext, Layer, LayerNorm, Linear,
    MultiHeadAttention, PatchEmbedding,
};
use fashion_transformer::matrix::Matrix;
use fashion_transformer::model::VisionTransformer;
use fashion_transformer::utils::SimpleRng;

const EPS: f64 = 1e-5;

fn assert_close(analytic: f64, numeric: f64, what: &str) {
    let tol = 1e-6 + 1e-4 * analytic.abs().max(numeric.abs());
    assert!(
        (analytic - numeric).abs() <= tol,
        "{}: analytic {} vs numeric {}",
        what,
        analytic,
        numeric
    );
}

// Indices spread across a tensor, at most `count` of them.
fn sample_indices(len: usize, count: usize) -> Vec<usize> {
    if len <= count {
        return (0..len).collect();
    }
    (0..count).map(|k| k * (len - 1) / (count - 1)).collect()
}

// ============================================================================
// Layer-level checks: loss = sum(output ⊙ R) for a fixed random R
// ============================================================================

fn projected_loss<L: Layer>(layer: &L, input: &Matrix, r: &Matrix) -> f64 {
    let (output, _) = layer.forward(input, &mut ForwardContext::evaluating());
    output.hadamard(r).sum()
}

fn check_layer<L: Layer>(layer: &mut L, input: &Matrix, seed: u64) {
    let mut rng = SimpleRng::new(seed);
    let (output, cache) = layer.forward(input, &mut ForwardContext::evaluating());
    let r = Matrix::xavier(output.rows(), output.cols(), &mut rng);

    let mut grads = layer.zero_grads();
    let grad_input = layer.backward(&cache, &r, &mut grads);

    // input gradient
    for i in sample_indices(input.len(), 12) {
        let mut plus = input.clone();
        plus.data_mut()[i] += EPS;
        let mut minus = input.clone();
        minus.data_mut()[i] -= EPS;
        let numeric =
            (projected_loss(layer, &plus, &r) - projected_loss(layer, &minus, &r)) / (2.0 * EPS);
        assert_close(grad_input.data()[i], numeric, &format!("input[{}]", i));
    }

    // parameter gradients
    for t in 0..grads.len() {
        for i in sample_indices(grads[t].len(), 6) {
            let original = layer.parameters()[t].data()[i];

            layer.parameters_mut()[t].data_mut()[i] = original + EPS;
            let up = projected_loss(layer, input, &r);
            layer.parameters_mut()[t].data_mut()[i] = original - EPS;
            let down = projected_loss(layer, input, &r);
            layer.parameters_mut()[t].data_mut()[i] = original;

            let numeric = (up - down) / (2.0 * EPS);
            assert_close(grads[t].data()[i], numeric, &format!("param {}[{}]", t, i));
        }
    }
}

#[test]
fn test_linear_gradients() {
    let mut rng = SimpleRng::new(1);
    let mut layer = Linear::new(5, 4, &mut rng);
    let input = Matrix::xavier(3, 5, &mut rng);
    check_layer(&mut layer, &input, 2);
}

#[test]
fn test_layer_norm_gradients() {
    let mut rng = SimpleRng::new(3);
    let mut layer = LayerNorm::new(6, 1e-5);
    // non-trivial affine parameters
    for p in layer.parameters_mut() {
        for v in p.data_mut() {
            *v += rng.gen_range_f64(-0.5, 0.5);
        }
    }
    let input = Matrix::xavier(4, 6, &mut rng).scale(3.0);
    check_layer(&mut layer, &input, 4);
}

#[test]
fn test_attention_gradients() {
    let mut rng = SimpleRng::new(5);
    let mut layer = MultiHeadAttention::new(8, 2, 0.1, &mut rng);
    let input = Matrix::xavier(5, 8, &mut rng).scale(2.0);
    check_layer(&mut layer, &input, 6);
}

#[test]
fn test_feed_forward_gradients() {
    let mut rng = SimpleRng::new(7);
    let mut layer = FeedForward::new(6, 12, 0.1, &mut rng);
    let input = Matrix::xavier(4, 6, &mut rng);
    check_layer(&mut layer, &input, 8);
}

#[test]
fn test_encoder_gradients() {
    let mut rng = SimpleRng::new(9);
    let mut layer = Encoder::new(2, 8, 2, 16, 0.1, &mut rng);
    let input = Matrix::xavier(5, 8, &mut rng);
    check_layer(&mut layer, &input, 10);
}

#[test]
fn test_head_gradients() {
    let mut rng = SimpleRng::new(11);
    let mut layer = ClassificationHead::new(6, 3, &mut rng);
    let input = Matrix::xavier(7, 6, &mut rng);
    check_layer(&mut layer, &input, 12);
}

#[test]
fn test_patch_embedding_gradients() {
    let mut rng = SimpleRng::new(13);
    let mut layer = PatchEmbedding::new(6, 3, 5, true, &mut rng);
    let input = Matrix::xavier(6, 6, &mut rng);
    check_layer(&mut layer, &input, 14);
}

// ============================================================================
// Full model: mean cross-entropy over a small batch
// ============================================================================

fn small_model(learned_positions: bool) -> VisionTransformer {
    let mut model = VisionTransformer::from_config(&ModelConfig {
        d_model: 8,
        num_heads: 2,
        num_layers: 2,
        d_ff: 16,
        num_classes: 3,
        patch_size: 2,
        image_size: 4,
        dropout_rate: 0.1,
        learned_positions,
        seed: 21,
    })
    .unwrap();
    model.set_training(false);
    model
}

fn small_batch() -> (Vec<Matrix>, Vec<usize>) {
    let mut rng = SimpleRng::new(99);
    let images = (0..3)
        .map(|_| Matrix::xavier(4, 4, &mut rng).add_scalar(0.1))
        .collect();
    (images, vec![0, 2, 1])
}

fn check_model(learned_positions: bool) {
    let mut model = small_model(learned_positions);
    let (images, labels) = small_batch();
    let step = model.batch_gradients(&images, &labels);

    let (loss, _) = model.evaluate(&images, &labels);
    assert!((loss - step.loss).abs() < 1e-12);

    let tensors = step.gradients.tensors().len();
    assert_eq!(tensors, model.parameters().len());

    for t in 0..tensors {
        for i in sample_indices(step.gradients.tensors()[t].len(), 4) {
            let original = model.parameters()[t].data()[i];

            model.parameters_mut()[t].data_mut()[i] = original + EPS;
            let (up, _) = model.evaluate(&images, &labels);
            model.parameters_mut()[t].data_mut()[i] = original - EPS;
            let (down, _) = model.evaluate(&images, &labels);
            model.parameters_mut()[t].data_mut()[i] = original;

            let numeric = (up - down) / (2.0 * EPS);
            assert_close(
                step.gradients.tensors()[t].data()[i],
                numeric,
                &format!("model tensor {}[{}]", t, i),
            );
        }
    }
}

#[test]
fn test_model_gradients_with_learned_positions() {
    check_model(true);
}

#[test]
fn test_model_gradients_with_fixed_positions() {
    check_model(false);
}
