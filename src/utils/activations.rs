//! Activation functions and their derivatives.
//!
//! - ReLU, applied elementwise, with the mask-based backward pass
//! - Softmax, applied row-wise with max subtraction, and its row-wise
//!   vector-Jacobian product

use crate::matrix::Matrix;

/// ReLU activation function.
pub fn relu(input: &Matrix) -> Matrix {
    input.map(|x| if x > 0.0 { x } else { 0.0 })
}

/// ReLU backward: passes `grad_output` where the pre-activation was positive.
pub fn relu_backward(pre_activation: &Matrix, grad_output: &Matrix) -> Matrix {
    assert_eq!(
        pre_activation.shape(),
        grad_output.shape(),
        "relu_backward shape mismatch"
    );
    let data = pre_activation
        .data()
        .iter()
        .zip(grad_output.data())
        .map(|(&x, &g)| if x > 0.0 { g } else { 0.0 })
        .collect();
    Matrix::from_vec(pre_activation.rows(), pre_activation.cols(), data)
}

/// Softmax applied in place to a single slice.
///
/// Subtracts the maximum before exponentiating so large scores never
/// overflow.
pub fn softmax_inplace(values: &mut [f64]) {
    if values.is_empty() {
        return;
    }
    let max_value = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    let mut sum = 0.0;
    for value in values.iter_mut() {
        *value = (*value - max_value).exp();
        sum += *value;
    }

    let inv_sum = 1.0 / sum;
    for value in values.iter_mut() {
        *value *= inv_sum;
    }
}

/// Softmax applied independently to every row.
pub fn softmax_rows(input: &Matrix) -> Matrix {
    let mut out = input.clone();
    if out.cols() == 0 {
        return out;
    }
    for r in 0..out.rows() {
        softmax_inplace(out.row_mut(r));
    }
    out
}

/// Row-wise softmax backward.
///
/// Given the softmax output `probs` and the upstream gradient, returns
/// `dS_ij = p_ij * (dP_ij - Σ_k dP_ik p_ik)`.
pub fn softmax_rows_backward(probs: &Matrix, grad_output: &Matrix) -> Matrix {
    assert_eq!(
        probs.shape(),
        grad_output.shape(),
        "softmax_rows_backward shape mismatch"
    );
    let mut out = Matrix::zeros(probs.rows(), probs.cols());
    for r in 0..probs.rows() {
        let p = probs.row(r);
        let g = grad_output.row(r);
        let dot: f64 = p.iter().zip(g).map(|(a, b)| a * b).sum();
        for (o, (&pi, &gi)) in out.row_mut(r).iter_mut().zip(p.iter().zip(g)) {
            *o = pi * (gi - dot);
        }
    }
    out
}
