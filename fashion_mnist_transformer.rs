// fashion_mnist_transformer.rs
// Vision Transformer training driver for Fashion-MNIST.
//
// Usage:
//   fashion_mnist_transformer [config.json]
//
// Without a config file the built-in defaults are used: 64-wide embeddings,
// 4 heads, 2 post-norm encoder layers, 4x4 patches, 5 epochs of batch-16 SGD
// on the first 5000 training images, and evaluation on the first 1000 test
// images. Expects the four IDX files in `data_dir` (default ./data):
//   train-images-idx3-ubyte
//   train-labels-idx1-ubyte
//   t10k-images-idx3-ubyte
//   t10k-labels-idx1-ubyte
//
// Set RUST_LOG=debug to log every training step.

use fashion_transformer::config::{load_config, RunConfig};
use fashion_transformer::dataset::{
    class_name, load_set, LabeledSet, TEST_IMAGES, TEST_LABELS, TRAIN_IMAGES, TRAIN_LABELS,
};
use fashion_transformer::error::{ConfigError, DatasetError, ModelError};
use fashion_transformer::loss::predicted_class;
use fashion_transformer::matrix::Matrix;
use fashion_transformer::model::VisionTransformer;
use fashion_transformer::utils::lr_scheduler::LRScheduler;
use fashion_transformer::utils::SimpleRng;
use std::path::Path;
use std::process;
use std::time::Instant;
use thiserror::Error;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Error, Debug)]
enum DriverError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Dataset(#[from] DatasetError),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("images are {found}x{found} but the model expects {expected}x{expected}")]
    ImageSize { expected: usize, found: usize },
    #[error("no training images were loaded")]
    EmptyTrainingSet,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Reads the configuration named by the first argument, or the defaults.
fn config_from_args(args: &[String]) -> Result<RunConfig, ConfigError> {
    match args.get(1) {
        Some(path) => {
            info!(path = %path, "loading configuration");
            load_config(path)
        }
        None => {
            info!("no configuration given, using defaults");
            Ok(RunConfig::default())
        }
    }
}

fn load_split(
    data_dir: &Path,
    images: &str,
    labels: &str,
    limit: usize,
    image_size: usize,
) -> Result<LabeledSet, DriverError> {
    let set = load_set(data_dir.join(images), data_dir.join(labels), limit)?;
    if let Some(first) = set.images.first() {
        if first.rows() != image_size {
            return Err(DriverError::ImageSize {
                expected: image_size,
                found: first.rows(),
            });
        }
    }
    Ok(set)
}

/// Mean loss and accuracy of one pass over `set` in shuffled batches.
fn train_epoch(
    model: &mut VisionTransformer,
    set: &LabeledSet,
    indices: &mut [usize],
    rng: &mut SimpleRng,
    batch_size: usize,
    learning_rate: f64,
    log_every: usize,
) -> (f64, f64) {
    rng.shuffle_usize(indices);

    let mut loss_sum = 0.0;
    let mut acc_sum = 0.0;
    let mut batches = 0usize;

    for (batch_idx, chunk) in indices.chunks(batch_size).enumerate() {
        let images: Vec<Matrix> = chunk.iter().map(|&i| set.images[i].clone()).collect();
        let labels: Vec<usize> = chunk.iter().map(|&i| set.labels[i]).collect();

        let (loss, accuracy) = model.train_batch(&images, &labels, learning_rate);
        loss_sum += loss;
        acc_sum += accuracy;
        batches += 1;

        if log_every > 0 && (batch_idx + 1) % log_every == 0 {
            info!(
                batch = batch_idx + 1,
                loss = format_args!("{:.4}", loss),
                accuracy = format_args!("{:.2}%", accuracy * 100.0),
                "batch"
            );
        }
    }

    (loss_sum / batches as f64, acc_sum / batches as f64)
}

/// Logs the first `count` test predictions with their confidence.
fn preview_predictions(model: &VisionTransformer, set: &LabeledSet, count: usize) {
    for (i, (image, &label)) in set.images.iter().zip(&set.labels).take(count).enumerate() {
        let probs = model.predict(image);
        let predicted = predicted_class(&probs);
        info!(
            sample = i,
            predicted = class_name(predicted),
            actual = class_name(label),
            confidence = format_args!("{:.2}%", probs.get(0, predicted) * 100.0),
            correct = predicted == label,
            "prediction"
        );
    }
}

fn run(config: RunConfig) -> Result<(), DriverError> {
    let program_start = Instant::now();
    let training = &config.training;
    let data_dir = Path::new(&training.data_dir);

    info!(dir = %data_dir.display(), "loading Fashion-MNIST");
    let train = load_split(
        data_dir,
        TRAIN_IMAGES,
        TRAIN_LABELS,
        training.train_samples,
        config.model.image_size,
    )?;
    let test = load_split(
        data_dir,
        TEST_IMAGES,
        TEST_LABELS,
        training.test_samples,
        config.model.image_size,
    )?;
    if train.is_empty() {
        return Err(DriverError::EmptyTrainingSet);
    }
    if train.len() < training.train_samples {
        warn!(
            requested = training.train_samples,
            loaded = train.len(),
            "fewer training samples than requested"
        );
    }
    info!(train = train.len(), test = test.len(), "data loaded");

    let mut model = VisionTransformer::from_config(&config.model)?;
    info!("{}", model.describe());

    let mut scheduler: Box<dyn LRScheduler> = training.scheduler.build(training.learning_rate)?;
    let mut rng = SimpleRng::new(config.model.seed.wrapping_add(1));
    let mut indices: Vec<usize> = (0..train.len()).collect();

    let train_start = Instant::now();
    for epoch in 0..training.epochs {
        let epoch_start = Instant::now();
        let lr = scheduler.get_lr();

        let (loss, accuracy) = train_epoch(
            &mut model,
            &train,
            &mut indices,
            &mut rng,
            training.batch_size,
            lr,
            training.log_every,
        );

        info!(
            epoch = epoch + 1,
            lr,
            loss = format_args!("{:.4}", loss),
            accuracy = format_args!("{:.2}%", accuracy * 100.0),
            time = format_args!("{:.2}s", epoch_start.elapsed().as_secs_f64()),
            "epoch complete"
        );

        scheduler.step();
        if accuracy > training.early_stop_accuracy {
            warn!(
                epoch = epoch + 1,
                threshold = training.early_stop_accuracy,
                "accuracy threshold reached, stopping early"
            );
            break;
        }
    }
    info!(
        time = format_args!("{:.2}s", train_start.elapsed().as_secs_f64()),
        "training complete"
    );

    if test.is_empty() {
        warn!("no test images loaded, skipping evaluation");
    } else {
        let (loss, accuracy) = model.evaluating(|m| m.evaluate(&test.images, &test.labels));
        info!(
            loss = format_args!("{:.4}", loss),
            accuracy = format_args!("{:.2}%", accuracy * 100.0),
            "test evaluation"
        );
        preview_predictions(&model, &test, training.preview_samples);
    }

    info!(
        time = format_args!("{:.2}s", program_start.elapsed().as_secs_f64()),
        "done"
    );
    Ok(())
}

fn main() {
    init_tracing();
    let args: Vec<String> = std::env::args().collect();

    let result = config_from_args(&args)
        .map_err(DriverError::from)
        .and_then(run);
    if let Err(e) = result {
        error!("{}", e);
        process::exit(1);
    }
}
