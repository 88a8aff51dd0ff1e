//! The vision transformer classifier.
//!
//! ```text
//! image (28×28)
//!   → PatchEmbedding     49 × d_model
//!   → Encoder × L        49 × d_model
//!   → ClassificationHead 1 × num_classes logits
//!   → softmax            1 × num_classes probabilities
//! ```
//!
//! Training computes every example of a batch independently against the same
//! parameter snapshot, sums the per-example gradients in example order and
//! applies their mean once through an [`Optimizer`].

use crate::config::{ModelConfig, DEFAULT_SEED};
use crate::error::ModelResult;
use crate::layers::encoder::EncoderLayerCache;
use crate::layers::head::ClassificationHeadCache;
use crate::layers::patch_embedding::PatchEmbeddingCache;
use crate::layers::{ClassificationHead, Encoder, ForwardContext, Layer, Mode, PatchEmbedding};
use crate::loss::{cross_entropy, mean_cross_entropy, predicted_class, softmax_cross_entropy_grad};
use crate::matrix::Matrix;
use crate::optimizers::{Optimizer, SGD};
use crate::utils::{softmax_rows, SimpleRng};
use rayon::prelude::*;
use tracing::debug;

/// Gradient buffers in model parameter order.
#[derive(Debug, Clone, PartialEq)]
pub struct Gradients {
    tensors: Vec<Matrix>,
}

impl Gradients {
    pub fn tensors(&self) -> &[Matrix] {
        &self.tensors
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    /// Adds `other` tensor by tensor.
    pub fn accumulate(&mut self, other: &Gradients) {
        assert_eq!(self.tensors.len(), other.tensors.len(), "gradient layout mismatch");
        for (acc, g) in self.tensors.iter_mut().zip(&other.tensors) {
            acc.add_assign(g);
        }
    }

    pub fn scale(&mut self, factor: f64) {
        for t in &mut self.tensors {
            t.scale_inplace(factor);
        }
    }

    pub fn is_finite(&self) -> bool {
        self.tensors.iter().all(Matrix::is_finite)
    }
}

/// Result of a gradient sweep over one batch.
#[derive(Debug, Clone)]
pub struct BatchStep {
    /// Mean cross-entropy over the batch.
    pub loss: f64,
    /// Fraction of examples whose argmax matched the label.
    pub accuracy: f64,
    /// Mean gradient over the batch.
    pub gradients: Gradients,
}

struct ForwardTrace {
    embedding: PatchEmbeddingCache,
    encoder: Vec<EncoderLayerCache>,
    head: ClassificationHeadCache,
    probabilities: Matrix,
}

/// Per-example output of the parallel sweep.
struct ExampleStep {
    loss: f64,
    correct: bool,
    gradients: Gradients,
}

/// Vision transformer for square grayscale images.
///
/// # Example
///
/// ```
/// use fashion_transformer::matrix::Matrix;
/// use fashion_transformer::model::VisionTransformer;
///
/// let model = VisionTransformer::new(16, 2, 1, 32, 10, 7, 0.1).unwrap();
/// let probs = model.predict(&Matrix::zeros(28, 28));
/// assert_eq!(probs.shape(), (1, 10));
/// assert!((probs.sum() - 1.0).abs() < 1e-6);
/// ```
#[derive(Debug, Clone)]
pub struct VisionTransformer {
    config: ModelConfig,
    embedding: PatchEmbedding,
    encoder: Encoder,
    head: ClassificationHead,
    mode: Mode,
    rng: SimpleRng,
}

impl VisionTransformer {
    /// Builds a model for 28×28 images with learned positions and the
    /// default seed.
    ///
    /// Fails with [`ModelError::InvalidConfig`](crate::error::ModelError)
    /// when `d_model` is not divisible by `num_heads`, a size is zero, the
    /// patch size does not tile the image or the dropout rate is outside
    /// `[0, 1)`.
    pub fn new(
        d_model: usize,
        num_heads: usize,
        num_layers: usize,
        d_ff: usize,
        num_classes: usize,
        patch_size: usize,
        dropout_rate: f64,
    ) -> ModelResult<Self> {
        Self::from_config(&ModelConfig {
            d_model,
            num_heads,
            num_layers,
            d_ff,
            num_classes,
            patch_size,
            image_size: 28,
            dropout_rate,
            learned_positions: true,
            seed: DEFAULT_SEED,
        })
    }

    pub fn from_config(config: &ModelConfig) -> ModelResult<Self> {
        config.validate()?;
        let mut rng = SimpleRng::new(config.seed);

        let embedding = PatchEmbedding::new(
            config.image_size,
            config.patch_size,
            config.d_model,
            config.learned_positions,
            &mut rng,
        );
        let encoder = Encoder::new(
            config.num_layers,
            config.d_model,
            config.num_heads,
            config.d_ff,
            config.dropout_rate,
            &mut rng,
        );
        let head = ClassificationHead::new(config.d_model, config.num_classes, &mut rng);

        Ok(Self {
            config: config.clone(),
            embedding,
            encoder,
            head,
            mode: Mode::Training,
            rng,
        })
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn num_classes(&self) -> usize {
        self.config.num_classes
    }

    pub fn embedding(&self) -> &PatchEmbedding {
        &self.embedding
    }

    pub fn encoder(&self) -> &Encoder {
        &self.encoder
    }

    pub fn head(&self) -> &ClassificationHead {
        &self.head
    }

    // ------------------------------------------------------------------
    // mode

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn is_training(&self) -> bool {
        self.mode.is_training()
    }

    pub fn set_training(&mut self, training: bool) {
        self.mode = if training {
            Mode::Training
        } else {
            Mode::Evaluating
        };
    }

    /// Runs `f` in evaluation mode, then restores the previous mode.
    pub fn evaluating<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        let previous = self.mode;
        self.mode = Mode::Evaluating;
        let result = f(self);
        self.mode = previous;
        result
    }

    // ------------------------------------------------------------------
    // inference

    fn forward_traced(&self, image: &Matrix, ctx: &mut ForwardContext) -> ForwardTrace {
        let (tokens, embedding) = self.embedding.forward(image, ctx);
        let (encoded, encoder) = self.encoder.forward(&tokens, ctx);
        let (logits, head) = self.head.forward(&encoded, ctx);
        ForwardTrace {
            embedding,
            encoder,
            head,
            probabilities: softmax_rows(&logits),
        }
    }

    fn context(&mut self) -> ForwardContext {
        match self.mode {
            Mode::Training => ForwardContext::new(Mode::Training, self.rng.fork()),
            Mode::Evaluating => ForwardContext::evaluating(),
        }
    }

    /// Class probabilities (`1 × num_classes`) in the current mode.
    ///
    /// In training mode a fresh dropout seed is drawn, so repeated calls may
    /// differ.
    ///
    /// # Panics
    ///
    /// Panics if `image` is not `image_size × image_size`.
    pub fn forward(&mut self, image: &Matrix) -> Matrix {
        let mut ctx = self.context();
        self.forward_traced(image, &mut ctx).probabilities
    }

    /// Class probabilities with dropout disabled, regardless of mode.
    pub fn predict(&self, image: &Matrix) -> Matrix {
        self.forward_traced(image, &mut ForwardContext::evaluating())
            .probabilities
    }

    /// Attention weights of every head in every layer for `image`, computed
    /// with dropout disabled. Indexed as `[layer][head]`.
    pub fn attention_maps(&self, image: &Matrix) -> Vec<Vec<Matrix>> {
        let trace = self.forward_traced(image, &mut ForwardContext::evaluating());
        trace
            .encoder
            .iter()
            .map(|layer| {
                layer
                    .attention()
                    .attention_weights()
                    .into_iter()
                    .cloned()
                    .collect()
            })
            .collect()
    }

    /// Mean clamped cross-entropy of the probability rows against `labels`.
    pub fn compute_loss(&self, probabilities: &Matrix, labels: &[usize]) -> f64 {
        mean_cross_entropy(probabilities, labels)
    }

    /// Mean loss and accuracy over a labelled set, with dropout disabled.
    pub fn evaluate(&self, images: &[Matrix], labels: &[usize]) -> (f64, f64) {
        check_batch(images, labels, self.num_classes());
        let results: Vec<(f64, bool)> = images
            .par_iter()
            .zip(labels.par_iter())
            .map(|(image, &label)| {
                let probs = self.predict(image);
                (cross_entropy(probs.data(), label), predicted_class(&probs) == label)
            })
            .collect();
        summarize(results.into_iter(), images.len())
    }

    // ------------------------------------------------------------------
    // training

    fn zero_gradients(&self) -> Gradients {
        let mut tensors = self.embedding.zero_grads();
        tensors.extend(self.encoder.zero_grads());
        tensors.extend(self.head.zero_grads());
        Gradients { tensors }
    }

    fn backward(&self, trace: &ForwardTrace, label: usize) -> Gradients {
        let mut grads = self.zero_gradients();
        let (g_embedding, rest) = grads
            .tensors
            .split_at_mut(self.embedding.tensor_count());
        let (g_encoder, g_head) = rest.split_at_mut(self.encoder.tensor_count());

        let grad_logits = softmax_cross_entropy_grad(&trace.probabilities, label);
        let grad = self.head.backward(&trace.head, &grad_logits, g_head);
        let grad = self.encoder.backward(&trace.encoder, &grad, g_encoder);
        self.embedding.backward(&trace.embedding, &grad, g_embedding);
        grads
    }

    fn example_step(&self, image: &Matrix, label: usize, mut ctx: ForwardContext) -> ExampleStep {
        let trace = self.forward_traced(image, &mut ctx);
        ExampleStep {
            loss: cross_entropy(trace.probabilities.data(), label),
            correct: predicted_class(&trace.probabilities) == label,
            gradients: self.backward(&trace, label),
        }
    }

    /// Mean loss, accuracy and mean gradient over a batch, without touching
    /// the parameters.
    ///
    /// Dropout follows the current mode. One seed per example is drawn from
    /// the model RNG before the parallel sweep, and the per-example
    /// gradients are summed in example order, so the result only depends on
    /// the model state and the inputs.
    ///
    /// # Panics
    ///
    /// Panics if `images` and `labels` differ in length, the batch is empty,
    /// a label is out of range or an image has the wrong shape.
    pub fn batch_gradients(&mut self, images: &[Matrix], labels: &[usize]) -> BatchStep {
        check_batch(images, labels, self.num_classes());

        let mode = self.mode;
        let seeds: Vec<SimpleRng> = match mode {
            Mode::Training => (0..images.len()).map(|_| self.rng.fork()).collect(),
            Mode::Evaluating => vec![SimpleRng::new(0); images.len()],
        };

        let model = &*self;
        let steps: Vec<ExampleStep> = images
            .par_iter()
            .zip(labels.par_iter())
            .zip(seeds.into_par_iter())
            .map(|((image, &label), rng)| {
                model.example_step(image, label, ForwardContext::new(mode, rng))
            })
            .collect();

        let mut gradients = self.zero_gradients();
        for step in &steps {
            gradients.accumulate(&step.gradients);
        }
        gradients.scale(1.0 / images.len() as f64);

        let (loss, accuracy) = summarize(steps.iter().map(|s| (s.loss, s.correct)), images.len());
        BatchStep {
            loss,
            accuracy,
            gradients,
        }
    }

    /// One training step with a caller-supplied optimizer. Returns
    /// `(mean_loss, accuracy)` measured before the update.
    pub fn train_batch_with(
        &mut self,
        images: &[Matrix],
        labels: &[usize],
        optimizer: &mut dyn Optimizer,
    ) -> (f64, f64) {
        let step = self.batch_gradients(images, labels);
        self.apply_gradients(&step.gradients, optimizer);
        debug!(
            batch_size = images.len(),
            loss = step.loss,
            accuracy = step.accuracy,
            lr = optimizer.learning_rate(),
            "training step"
        );
        (step.loss, step.accuracy)
    }

    /// One SGD step: `param -= learning_rate * mean_grad` for every
    /// trainable tensor. Returns `(mean_loss, accuracy)`.
    pub fn train_batch(&mut self, images: &[Matrix], labels: &[usize], learning_rate: f64) -> (f64, f64) {
        let mut sgd = SGD::new(learning_rate);
        self.train_batch_with(images, labels, &mut sgd)
    }

    /// Applies `gradients` through `optimizer`, tensor by tensor in
    /// parameter order.
    pub fn apply_gradients(&mut self, gradients: &Gradients, optimizer: &mut dyn Optimizer) {
        let params = self.parameters_mut();
        assert_eq!(params.len(), gradients.len(), "gradient layout mismatch");
        for (param, grad) in params.into_iter().zip(gradients.tensors()) {
            optimizer.update(param.data_mut(), grad.data());
        }
    }

    // ------------------------------------------------------------------
    // parameters

    /// Trainable tensors: embedding, encoder layers, head.
    pub fn parameters(&self) -> Vec<&Matrix> {
        let mut params = self.embedding.parameters();
        params.extend(self.encoder.parameters());
        params.extend(self.head.parameters());
        params
    }

    pub fn parameters_mut(&mut self) -> Vec<&mut Matrix> {
        let mut params = self.embedding.parameters_mut();
        params.extend(self.encoder.parameters_mut());
        params.extend(self.head.parameters_mut());
        params
    }

    pub fn parameter_count(&self) -> usize {
        self.parameters().iter().map(|p| p.len()).sum()
    }

    /// Human-readable summary of the hyperparameters.
    pub fn describe(&self) -> String {
        let c = &self.config;
        format!(
            "VisionTransformer: image {}x{}, patch {}x{} ({} patches), d_model {}, heads {}, \
             layers {}, d_ff {}, classes {}, dropout {}, {} positions, {} parameters",
            c.image_size,
            c.image_size,
            c.patch_size,
            c.patch_size,
            self.embedding.num_patches(),
            c.d_model,
            c.num_heads,
            c.num_layers,
            c.d_ff,
            c.num_classes,
            c.dropout_rate,
            if c.learned_positions { "learned" } else { "fixed" },
            self.parameter_count()
        )
    }
}

fn check_batch(images: &[Matrix], labels: &[usize], num_classes: usize) {
    assert_eq!(
        images.len(),
        labels.len(),
        "got {} images but {} labels",
        images.len(),
        labels.len()
    );
    assert!(!images.is_empty(), "batch must not be empty");
    if let Some(&bad) = labels.iter().find(|&&l| l >= num_classes) {
        panic!("label {} out of range for {} classes", bad, num_classes);
    }
}

fn summarize(results: impl Iterator<Item = (f64, bool)>, n: usize) -> (f64, f64) {
    let (loss, correct) = results.fold((0.0, 0usize), |(loss, correct), (l, c)| {
        (loss + l, correct + usize::from(c))
    });
    (loss / n as f64, correct as f64 / n as f64)
}
