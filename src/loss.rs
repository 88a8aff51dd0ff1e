//! Cross-entropy loss and accuracy over probability rows.

use crate::matrix::Matrix;

/// Probabilities are clamped to `[PROBABILITY_EPSILON, 1 - PROBABILITY_EPSILON]`
/// before taking the log.
pub const PROBABILITY_EPSILON: f64 = 1e-9;

/// Negative log-likelihood of `label` under the distribution `probs`.
///
/// Always strictly positive: a perfect prediction yields
/// `-ln(1 - 1e-9) ≈ 1e-9`.
///
/// # Panics
///
/// Panics if `label` is out of range for `probs`.
pub fn cross_entropy(probs: &[f64], label: usize) -> f64 {
    assert!(
        label < probs.len(),
        "label {} out of range for {} classes",
        label,
        probs.len()
    );
    let p = probs[label].clamp(PROBABILITY_EPSILON, 1.0 - PROBABILITY_EPSILON);
    -p.ln()
}

/// Mean cross-entropy over the rows of `probabilities`, one label per row.
///
/// # Panics
///
/// Panics if the number of rows and labels differ or there are none.
pub fn mean_cross_entropy(probabilities: &Matrix, labels: &[usize]) -> f64 {
    assert_eq!(
        probabilities.rows(),
        labels.len(),
        "got {} probability rows for {} labels",
        probabilities.rows(),
        labels.len()
    );
    assert!(!labels.is_empty(), "cannot compute loss of an empty batch");
    let total: f64 = probabilities
        .row_iter()
        .zip(labels)
        .map(|(row, &label)| cross_entropy(row, label))
        .sum();
    total / labels.len() as f64
}

/// Gradient of `cross_entropy(softmax(logits), label)` with respect to the
/// logits: `probs - onehot(label)`.
pub fn softmax_cross_entropy_grad(probs: &Matrix, label: usize) -> Matrix {
    assert!(
        label < probs.cols(),
        "label {} out of range for {} classes",
        label,
        probs.cols()
    );
    let mut grad = probs.clone();
    grad.data_mut()[label] -= 1.0;
    grad
}

/// Index of the most probable class; ties go to the lowest index.
pub fn predicted_class(probs: &Matrix) -> usize {
    probs.argmax_row(0)
}

/// Fraction of `predictions` equal to `labels`.
pub fn accuracy(predictions: &[usize], labels: &[usize]) -> f64 {
    assert_eq!(predictions.len(), labels.len());
    if labels.is_empty() {
        return 0.0;
    }
    let correct = predictions
        .iter()
        .zip(labels)
        .filter(|(p, l)| p == l)
        .count();
    correct as f64 / labels.len() as f64
}
