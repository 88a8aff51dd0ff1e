//! Dense row-major matrix used by every layer.
//!
//! This module provides the numeric primitive of the crate: a 2-D `f64`
//! buffer with the elementwise and algebraic operations needed for the
//! forward and backward passes (matmul and its transposed variants, row
//! broadcasting, column-block slicing and row reductions).
//!
//! Mismatched shapes are programming errors: every operation asserts its
//! preconditions and panics with the offending shapes.

use crate::utils::rng::SimpleRng;

/// Dense matrix stored in row-major order.
///
/// # Example
///
/// ```
/// use fashion_transformer::matrix::Matrix;
///
/// let a = Matrix::from_vec(2, 2, vec![1.0, 2.0, 3.0, 4.0]);
/// let b = Matrix::identity(2);
/// assert_eq!(a.matmul(&b), a);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Matrix {
    /// Creates a `rows × cols` matrix filled with zeros.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self::filled(rows, cols, 0.0)
    }

    /// Creates a `rows × cols` matrix with every element set to `value`.
    pub fn filled(rows: usize, cols: usize, value: f64) -> Self {
        Self {
            rows,
            cols,
            data: vec![value; rows * cols],
        }
    }

    /// Creates a square identity matrix.
    pub fn identity(size: usize) -> Self {
        let mut m = Self::zeros(size, size);
        for i in 0..size {
            m.data[i * size + i] = 1.0;
        }
        m
    }

    /// Wraps a row-major buffer.
    ///
    /// # Panics
    ///
    /// Panics if `data.len() != rows * cols`.
    pub fn from_vec(rows: usize, cols: usize, data: Vec<f64>) -> Self {
        assert_eq!(
            data.len(),
            rows * cols,
            "buffer length {} does not match shape {}x{}",
            data.len(),
            rows,
            cols
        );
        Self { rows, cols, data }
    }

    /// Creates a single-row matrix from a slice.
    pub fn row_vector(values: &[f64]) -> Self {
        Self::from_vec(1, values.len(), values.to_vec())
    }

    /// Xavier/Glorot uniform initialization.
    ///
    /// Samples every element from `[-limit, limit]` with
    /// `limit = sqrt(6 / (rows + cols))`, treating `rows` as fan-in and
    /// `cols` as fan-out.
    pub fn xavier(rows: usize, cols: usize, rng: &mut SimpleRng) -> Self {
        let limit = (6.0 / (rows + cols) as f64).sqrt();
        let data = (0..rows * cols)
            .map(|_| rng.gen_range_f64(-limit, limit))
            .collect();
        Self { rows, cols, data }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// `(rows, cols)` pair, handy for assertions.
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Total number of elements.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f64] {
        &mut self.data
    }

    pub fn into_vec(self) -> Vec<f64> {
        self.data
    }

    /// Element at `(row, col)`.
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.check_index(row, col);
        self.data[row * self.cols + col]
    }

    /// Overwrites the element at `(row, col)`.
    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        self.check_index(row, col);
        self.data[row * self.cols + col] = value;
    }

    pub fn row(&self, row: usize) -> &[f64] {
        assert!(row < self.rows, "row {} out of bounds for {} rows", row, self.rows);
        &self.data[row * self.cols..(row + 1) * self.cols]
    }

    pub fn row_mut(&mut self, row: usize) -> &mut [f64] {
        assert!(row < self.rows, "row {} out of bounds for {} rows", row, self.rows);
        &mut self.data[row * self.cols..(row + 1) * self.cols]
    }

    /// Iterates over rows as slices.
    pub fn row_iter(&self) -> std::slice::ChunksExact<'_, f64> {
        self.data.chunks_exact(self.cols.max(1))
    }

    fn check_index(&self, row: usize, col: usize) {
        assert!(
            row < self.rows && col < self.cols,
            "index ({}, {}) out of bounds for {}x{} matrix",
            row,
            col,
            self.rows,
            self.cols
        );
    }

    fn assert_same_shape(&self, other: &Matrix, op: &str) {
        assert_eq!(
            self.shape(),
            other.shape(),
            "{} shape mismatch: {}x{} vs {}x{}",
            op,
            self.rows,
            self.cols,
            other.rows,
            other.cols
        );
    }

    /// Matrix product `self · other`.
    ///
    /// # Panics
    ///
    /// Panics if `self.cols() != other.rows()`.
    pub fn matmul(&self, other: &Matrix) -> Matrix {
        assert_eq!(
            self.cols, other.rows,
            "matmul shape mismatch: {}x{} · {}x{}",
            self.rows, self.cols, other.rows, other.cols
        );
        let mut out = Matrix::zeros(self.rows, other.cols);
        for i in 0..self.rows {
            let a_row = self.row(i);
            let out_row = &mut out.data[i * other.cols..(i + 1) * other.cols];
            // i-k-j order keeps the inner loop contiguous in both buffers.
            for (k, &a) in a_row.iter().enumerate() {
                if a == 0.0 {
                    continue;
                }
                let b_row = &other.data[k * other.cols..(k + 1) * other.cols];
                for (o, &b) in out_row.iter_mut().zip(b_row) {
                    *o += a * b;
                }
            }
        }
        out
    }

    /// Product with the transpose of `other`: `self · otherᵀ`.
    pub fn matmul_transposed(&self, other: &Matrix) -> Matrix {
        assert_eq!(
            self.cols, other.cols,
            "matmul_transposed shape mismatch: {}x{} · ({}x{})ᵀ",
            self.rows, self.cols, other.rows, other.cols
        );
        let mut out = Matrix::zeros(self.rows, other.rows);
        for i in 0..self.rows {
            let a_row = self.row(i);
            for j in 0..other.rows {
                let b_row = other.row(j);
                out.data[i * other.rows + j] = a_row.iter().zip(b_row).map(|(a, b)| a * b).sum();
            }
        }
        out
    }

    /// Product of the transpose of `self` with `other`: `selfᵀ · other`.
    pub fn transpose_matmul(&self, other: &Matrix) -> Matrix {
        assert_eq!(
            self.rows, other.rows,
            "transpose_matmul shape mismatch: ({}x{})ᵀ · {}x{}",
            self.rows, self.cols, other.rows, other.cols
        );
        let mut out = Matrix::zeros(self.cols, other.cols);
        for r in 0..self.rows {
            let a_row = self.row(r);
            let b_row = other.row(r);
            for (i, &a) in a_row.iter().enumerate() {
                if a == 0.0 {
                    continue;
                }
                let out_row = &mut out.data[i * other.cols..(i + 1) * other.cols];
                for (o, &b) in out_row.iter_mut().zip(b_row) {
                    *o += a * b;
                }
            }
        }
        out
    }

    pub fn transpose(&self) -> Matrix {
        let mut out = Matrix::zeros(self.cols, self.rows);
        for i in 0..self.rows {
            for j in 0..self.cols {
                out.data[j * self.rows + i] = self.data[i * self.cols + j];
            }
        }
        out
    }

    /// Elementwise sum.
    pub fn add(&self, other: &Matrix) -> Matrix {
        let mut out = self.clone();
        out.add_assign(other);
        out
    }

    /// In-place elementwise sum.
    pub fn add_assign(&mut self, other: &Matrix) {
        self.assert_same_shape(other, "add");
        for (a, b) in self.data.iter_mut().zip(&other.data) {
            *a += b;
        }
    }

    /// Elementwise difference.
    pub fn sub(&self, other: &Matrix) -> Matrix {
        self.assert_same_shape(other, "sub");
        let data = self.data.iter().zip(&other.data).map(|(a, b)| a - b).collect();
        Matrix::from_vec(self.rows, self.cols, data)
    }

    /// Elementwise (Hadamard) product.
    pub fn hadamard(&self, other: &Matrix) -> Matrix {
        self.assert_same_shape(other, "hadamard");
        let data = self.data.iter().zip(&other.data).map(|(a, b)| a * b).collect();
        Matrix::from_vec(self.rows, self.cols, data)
    }

    pub fn scale(&self, factor: f64) -> Matrix {
        self.map(|x| x * factor)
    }

    pub fn scale_inplace(&mut self, factor: f64) {
        for value in &mut self.data {
            *value *= factor;
        }
    }

    pub fn add_scalar(&self, value: f64) -> Matrix {
        self.map(|x| x + value)
    }

    /// Applies `f` to every element.
    pub fn map<F: Fn(f64) -> f64>(&self, f: F) -> Matrix {
        Matrix {
            rows: self.rows,
            cols: self.cols,
            data: self.data.iter().map(|&x| f(x)).collect(),
        }
    }

    pub fn fill(&mut self, value: f64) {
        self.data.fill(value);
    }

    /// Adds a `1 × cols` row vector to every row.
    pub fn add_row_vector(&mut self, row: &Matrix) {
        assert!(
            row.rows == 1 && row.cols == self.cols,
            "row broadcast shape mismatch: {}x{} onto {}x{}",
            row.rows,
            row.cols,
            self.rows,
            self.cols
        );
        for out_row in self.data.chunks_exact_mut(self.cols.max(1)) {
            for (o, b) in out_row.iter_mut().zip(&row.data) {
                *o += b;
            }
        }
    }

    /// Column sums as a `1 × cols` matrix.
    pub fn sum_rows(&self) -> Matrix {
        let mut out = Matrix::zeros(1, self.cols);
        for row in self.row_iter() {
            for (o, v) in out.data.iter_mut().zip(row) {
                *o += v;
            }
        }
        out
    }

    /// Column means as a `1 × cols` matrix.
    pub fn mean_rows(&self) -> Matrix {
        assert!(self.rows > 0, "mean_rows on a matrix with no rows");
        let mut out = self.sum_rows();
        out.scale_inplace(1.0 / self.rows as f64);
        out
    }

    /// Sum of every element.
    pub fn sum(&self) -> f64 {
        self.data.iter().sum()
    }

    /// Copies the column block `[start, start + width)`.
    pub fn columns(&self, start: usize, width: usize) -> Matrix {
        assert!(
            start + width <= self.cols,
            "column block [{}, {}) out of bounds for {} columns",
            start,
            start + width,
            self.cols
        );
        let mut out = Matrix::zeros(self.rows, width);
        for r in 0..self.rows {
            let src = &self.data[r * self.cols + start..r * self.cols + start + width];
            out.data[r * width..(r + 1) * width].copy_from_slice(src);
        }
        out
    }

    /// Writes `block` into the columns starting at `start`.
    pub fn set_columns(&mut self, start: usize, block: &Matrix) {
        assert!(
            block.rows == self.rows && start + block.cols <= self.cols,
            "cannot place {}x{} block at column {} of {}x{} matrix",
            block.rows,
            block.cols,
            start,
            self.rows,
            self.cols
        );
        for r in 0..self.rows {
            let dst = &mut self.data[r * self.cols + start..r * self.cols + start + block.cols];
            dst.copy_from_slice(block.row(r));
        }
    }

    /// Index of the largest element of `row`; ties go to the lowest index.
    pub fn argmax_row(&self, row: usize) -> usize {
        let values = self.row(row);
        let mut best = 0;
        for (i, &v) in values.iter().enumerate().skip(1) {
            if v > values[best] {
                best = i;
            }
        }
        best
    }

    pub fn is_finite(&self) -> bool {
        self.data.iter().all(|x| x.is_finite())
    }

    /// Largest absolute elementwise difference, used by tests and checks.
    pub fn max_abs_diff(&self, other: &Matrix) -> f64 {
        self.assert_same_shape(other, "max_abs_diff");
        self.data
            .iter()
            .zip(&other.data)
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f64::max)
    }
}
