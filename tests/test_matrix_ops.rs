// Tests for matrix operations: the three matrix products, bias broadcast,
// row reductions and column blocks.

use approx::assert_relative_eq;
use fashion_transformer::matrix::Matrix;
use fashion_transformer::utils::SimpleRng;

fn m(rows: usize, cols: usize, data: &[f64]) -> Matrix {
    Matrix::from_vec(rows, cols, data.to_vec())
}

// ============================================================================
// Product Tests
// ============================================================================

#[cfg(test)]
mod product_tests {
    use super::*;

    #[test]
    fn test_matmul_basic_multiplication() {
        // [1 2 3]   [7  8 ]   [ 58  64]
        // [4 5 6] x [9  10] = [139 154]
        //           [11 12]
        let a = m(2, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let b = m(3, 2, &[7.0, 8.0, 9.0, 10.0, 11.0, 12.0]);
        assert_eq!(a.matmul(&b), m(2, 2, &[58.0, 64.0, 139.0, 154.0]));
    }

    #[test]
    fn test_matmul_identity() {
        let mut rng = SimpleRng::new(1);
        let a = Matrix::xavier(4, 4, &mut rng);
        assert_eq!(a.matmul(&Matrix::identity(4)), a);
        assert_eq!(Matrix::identity(4).matmul(&a), a);
    }

    #[test]
    fn test_transposed_products_match_explicit_transpose() {
        let mut rng = SimpleRng::new(2);
        let a = Matrix::xavier(3, 5, &mut rng);
        let b = Matrix::xavier(4, 5, &mut rng);
        let c = Matrix::xavier(3, 2, &mut rng);

        let abt = a.matmul_transposed(&b);
        assert!(abt.max_abs_diff(&a.matmul(&b.transpose())) < 1e-12);

        let atc = a.transpose_matmul(&c);
        assert_eq!(atc.shape(), (5, 2));
        assert!(atc.max_abs_diff(&a.transpose().matmul(&c)) < 1e-12);
    }

    #[test]
    fn test_vector_product() {
        let row = Matrix::row_vector(&[1.0, 2.0, 3.0]);
        let col = m(3, 1, &[4.0, 5.0, 6.0]);
        assert_eq!(row.matmul(&col).get(0, 0), 32.0);
    }

    #[test]
    #[should_panic(expected = "matmul shape mismatch")]
    fn test_matmul_shape_mismatch_panics() {
        Matrix::zeros(2, 3).matmul(&Matrix::zeros(2, 3));
    }
}

// ============================================================================
// Elementwise and Reduction Tests
// ============================================================================

#[cfg(test)]
mod elementwise_tests {
    use super::*;

    #[test]
    fn test_add_row_vector_broadcasts() {
        let mut a = Matrix::zeros(3, 2);
        a.add_row_vector(&Matrix::row_vector(&[1.0, -1.0]));
        for row in a.row_iter() {
            assert_eq!(row, &[1.0, -1.0]);
        }
    }

    #[test]
    fn test_sum_and_mean_rows() {
        let a = m(2, 3, &[1.0, 2.0, 3.0, 3.0, 4.0, 5.0]);
        assert_eq!(a.sum_rows(), Matrix::row_vector(&[4.0, 6.0, 8.0]));
        assert_eq!(a.mean_rows(), Matrix::row_vector(&[2.0, 3.0, 4.0]));
        assert_relative_eq!(a.sum(), 18.0);
    }

    #[test]
    fn test_hadamard_and_scale() {
        let a = m(1, 3, &[1.0, 2.0, 3.0]);
        let b = m(1, 3, &[2.0, 0.0, -1.0]);
        assert_eq!(a.hadamard(&b), m(1, 3, &[2.0, 0.0, -3.0]));
        assert_eq!(a.scale(0.5), m(1, 3, &[0.5, 1.0, 1.5]));
        assert_eq!(a.sub(&a), Matrix::zeros(1, 3));
    }

    #[test]
    fn test_column_blocks_round_trip() {
        let a = m(2, 4, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);
        let block = a.columns(2, 2);
        assert_eq!(block, m(2, 2, &[3.0, 4.0, 7.0, 8.0]));

        let mut b = Matrix::zeros(2, 4);
        b.set_columns(0, &a.columns(0, 2));
        b.set_columns(2, &block);
        assert_eq!(a, b);
    }

    #[test]
    fn test_argmax_first_maximum_wins() {
        let a = m(2, 3, &[0.2, 0.5, 0.5, 1.0, 1.0, 1.0]);
        assert_eq!(a.argmax_row(0), 1);
        assert_eq!(a.argmax_row(1), 0);
    }

    #[test]
    fn test_xavier_is_bounded_and_seeded() {
        let a = Matrix::xavier(16, 64, &mut SimpleRng::new(7));
        let b = Matrix::xavier(16, 64, &mut SimpleRng::new(7));
        let limit = (6.0f64 / 80.0).sqrt();
        assert_eq!(a, b);
        assert!(a.data().iter().all(|x| x.abs() <= limit));
    }
}
