//! Classification head: mean pooling followed by a linear projection.

use crate::layers::linear::{Linear, LinearCache};
use crate::layers::r#trait::{check_grads, ForwardContext, Layer};
use crate::matrix::Matrix;
use crate::utils::SimpleRng;

/// Averages the sequence into one `1 × d_model` row and maps it to
/// `1 × num_classes` logits.
#[derive(Debug, Clone)]
pub struct ClassificationHead {
    classifier: Linear,
}

impl ClassificationHead {
    pub fn new(d_model: usize, num_classes: usize, rng: &mut SimpleRng) -> Self {
        Self {
            classifier: Linear::new(d_model, num_classes, rng),
        }
    }

    pub fn num_classes(&self) -> usize {
        self.classifier.output_size()
    }
}

#[derive(Debug, Clone)]
pub struct ClassificationHeadCache {
    seq_len: usize,
    classifier: LinearCache,
}

impl Layer for ClassificationHead {
    type Cache = ClassificationHeadCache;

    fn forward(&self, input: &Matrix, ctx: &mut ForwardContext) -> (Matrix, ClassificationHeadCache) {
        assert!(input.rows() > 0, "cannot pool an empty sequence");
        let pooled = input.mean_rows();
        let (logits, classifier) = self.classifier.forward(&pooled, ctx);
        (
            logits,
            ClassificationHeadCache {
                seq_len: input.rows(),
                classifier,
            },
        )
    }

    fn backward(&self, cache: &ClassificationHeadCache, grad_output: &Matrix, grads: &mut [Matrix]) -> Matrix {
        check_grads("ClassificationHead", 2, grads);
        let grad_pooled = self.classifier.backward(&cache.classifier, grad_output, grads);

        // every position contributed 1/n of the pooled row
        let share = grad_pooled.scale(1.0 / cache.seq_len as f64);
        let mut grad_input = Matrix::zeros(cache.seq_len, share.cols());
        for r in 0..cache.seq_len {
            grad_input.row_mut(r).copy_from_slice(share.row(0));
        }
        grad_input
    }

    fn parameters(&self) -> Vec<&Matrix> {
        self.classifier.parameters()
    }

    fn parameters_mut(&mut self) -> Vec<&mut Matrix> {
        self.classifier.parameters_mut()
    }
}
