// Integration tests for the training step: construction failures, batch
// statistics, determinism and parameter updates.

use fashion_transformer::config::ModelConfig;
use fashion_transformer::error::ModelError;
use fashion_transformer::matrix::Matrix;
use fashion_transformer::model::VisionTransformer;
use fashion_transformer::optimizers::{Optimizer, SGD};
use fashion_transformer::utils::SimpleRng;

fn batch(n: usize, size: usize, seed: u64) -> (Vec<Matrix>, Vec<usize>) {
    let mut rng = SimpleRng::new(seed);
    let images = (0..n)
        .map(|_| {
            let data = (0..size * size).map(|_| rng.gen_range_f64(-0.5, 0.5)).collect();
            Matrix::from_vec(size, size, data)
        })
        .collect();
    let labels = (0..n).map(|i| i % 10).collect();
    (images, labels)
}

fn small_config() -> ModelConfig {
    ModelConfig {
        d_model: 16,
        num_heads: 2,
        num_layers: 1,
        d_ff: 32,
        num_classes: 10,
        patch_size: 7,
        image_size: 28,
        dropout_rate: 0.1,
        learned_positions: true,
        seed: 3,
    }
}

// ============================================================================
// Construction Tests
// ============================================================================

#[test]
fn test_indivisible_heads_fail_construction() {
    match VisionTransformer::new(65, 4, 2, 256, 10, 4, 0.1) {
        Err(ModelError::InvalidConfig(msg)) => assert!(msg.contains("divisible")),
        other => panic!("expected InvalidConfig, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_other_invalid_configurations() {
    assert!(VisionTransformer::new(64, 4, 2, 256, 10, 5, 0.1).is_err());
    assert!(VisionTransformer::new(64, 4, 2, 256, 10, 4, 1.0).is_err());
    assert!(VisionTransformer::new(64, 0, 2, 256, 10, 4, 0.1).is_err());
    assert!(VisionTransformer::new(64, 4, 2, 256, 0, 4, 0.1).is_err());
}

#[test]
fn test_same_seed_same_initialization() {
    let a = VisionTransformer::from_config(&small_config()).unwrap();
    let b = VisionTransformer::from_config(&small_config()).unwrap();
    assert_eq!(a.parameters(), b.parameters());

    let mut other = small_config();
    other.seed = 4;
    let c = VisionTransformer::from_config(&other).unwrap();
    assert_ne!(a.parameters(), c.parameters());
}

#[test]
fn test_parameter_count() {
    let model = VisionTransformer::new(64, 4, 2, 256, 10, 4, 0.1).unwrap();
    let embedding = 16 * 64 + 64 + 49 * 64;
    let layer = 4 * (64 * 64 + 64) + 2 * 64 + (64 * 256 + 256 + 256 * 64 + 64) + 2 * 64;
    let head = 64 * 10 + 10;
    assert_eq!(model.parameter_count(), embedding + 2 * layer + head);
}

// ============================================================================
// Training Step Tests
// ============================================================================

#[test]
fn test_sixteen_image_batch() {
    let mut model = VisionTransformer::new(64, 4, 2, 256, 10, 4, 0.1).unwrap();
    let (images, labels) = batch(16, 28, 1);

    let (loss, accuracy) = model.train_batch(&images, &labels, 0.001);
    assert!(loss.is_finite());
    assert!(loss > 0.0);
    assert!((0.0..=1.0).contains(&accuracy));
}

#[test]
fn test_train_batch_is_deterministic() {
    let (images, labels) = batch(8, 28, 2);
    let mut a = VisionTransformer::from_config(&small_config()).unwrap();
    let mut b = VisionTransformer::from_config(&small_config()).unwrap();

    for _ in 0..2 {
        let ra = a.train_batch(&images, &labels, 0.05);
        let rb = b.train_batch(&images, &labels, 0.05);
        assert_eq!(ra, rb);
    }
    assert_eq!(a.parameters(), b.parameters());
}

#[test]
fn test_train_batch_changes_parameters() {
    let (images, labels) = batch(4, 28, 3);
    let mut model = VisionTransformer::from_config(&small_config()).unwrap();
    let before: Vec<Matrix> = model.parameters().into_iter().cloned().collect();

    model.train_batch(&images, &labels, 0.01);

    let after = model.parameters();
    assert!(before.iter().zip(after).any(|(b, a)| b != a));
}

#[test]
fn test_zero_learning_rate_keeps_parameters() {
    let (images, labels) = batch(4, 28, 4);
    let mut model = VisionTransformer::from_config(&small_config()).unwrap();
    let before: Vec<Matrix> = model.parameters().into_iter().cloned().collect();

    model.train_batch(&images, &labels, 0.0);
    let after: Vec<Matrix> = model.parameters().into_iter().cloned().collect();
    assert_eq!(before, after);
}

#[test]
fn test_fixed_positions_never_change() {
    let mut config = small_config();
    config.learned_positions = false;
    let mut model = VisionTransformer::from_config(&config).unwrap();
    let positions = model.embedding().positions().clone();

    let (images, labels) = batch(4, 28, 5);
    model.train_batch(&images, &labels, 0.1);
    assert_eq!(model.embedding().positions(), &positions);
}

#[test]
fn test_repeated_steps_reduce_loss() {
    let mut config = small_config();
    config.dropout_rate = 0.0;
    let mut model = VisionTransformer::from_config(&config).unwrap();
    let (images, labels) = batch(4, 28, 6);

    let (first, _) = model.train_batch(&images, &labels, 0.05);
    let mut last = first;
    for _ in 0..30 {
        last = model.train_batch(&images, &labels, 0.05).0;
    }
    assert!(last < first, "loss went from {} to {}", first, last);
}

#[test]
fn test_train_batch_with_matches_manual_update() {
    let mut config = small_config();
    config.dropout_rate = 0.0;
    let (images, labels) = batch(3, 28, 7);

    let mut trained = VisionTransformer::from_config(&config).unwrap();
    let mut manual = trained.clone();

    let mut sgd = SGD::new(0.02);
    trained.train_batch_with(&images, &labels, &mut sgd);

    let step = manual.batch_gradients(&images, &labels);
    for (param, grad) in manual.parameters_mut().into_iter().zip(step.gradients.tensors()) {
        for (p, g) in param.data_mut().iter_mut().zip(grad.data()) {
            *p -= 0.02 * g;
        }
    }
    assert_eq!(trained.parameters(), manual.parameters());
    assert_eq!(sgd.learning_rate(), 0.02);
}

#[test]
fn test_evaluation_mode_training_has_no_dropout() {
    let (images, labels) = batch(2, 28, 8);
    let mut a = VisionTransformer::from_config(&small_config()).unwrap();
    a.set_training(false);
    let first = a.batch_gradients(&images, &labels);
    let second = a.batch_gradients(&images, &labels);
    assert_eq!(first.gradients, second.gradients);
    assert_eq!(first.loss, second.loss);
}

#[test]
fn test_gradients_are_finite() {
    let (images, labels) = batch(4, 28, 9);
    let mut model = VisionTransformer::from_config(&small_config()).unwrap();
    let step = model.batch_gradients(&images, &labels);
    assert!(step.gradients.is_finite());
}

// ============================================================================
// Failure Tests
// ============================================================================

#[test]
#[should_panic(expected = "batch must not be empty")]
fn test_empty_batch_panics() {
    let mut model = VisionTransformer::from_config(&small_config()).unwrap();
    model.train_batch(&[], &[], 0.1);
}

#[test]
#[should_panic(expected = "label 10 out of range")]
fn test_out_of_range_label_panics() {
    let (images, _) = batch(2, 28, 10);
    let mut model = VisionTransformer::from_config(&small_config()).unwrap();
    model.train_batch(&images, &[1, 10], 0.1);
}
