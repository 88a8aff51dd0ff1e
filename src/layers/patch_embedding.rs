//! Patch embedding: image → sequence of `d_model`-wide tokens.
//!
//! A `image_size × image_size` image is cut into non-overlapping
//! `patch_size × patch_size` patches in raster order (patch row, then patch
//! column). Each patch is flattened row-major, projected by a shared Linear
//! layer and offset by a per-position vector.
//!
//! For a 28×28 image and 4×4 patches this yields 7×7 = 49 tokens of 16
//! pixels each.

use crate::layers::linear::{Linear, LinearCache};
use crate::layers::r#trait::{check_grads, ForwardContext, Layer};
use crate::matrix::Matrix;
use crate::utils::SimpleRng;

/// Patch projection plus positional table.
///
/// The positional table starts from the sinusoidal encoding
///
/// ```text
/// PE(t, 2i)   = sin(t / 10000^(2i/d_model))
/// PE(t, 2i+1) = cos(t / 10000^(2i/d_model))
/// ```
///
/// which gives every position a distinct vector. When `learned_positions`
/// is set the table is a trainable tensor; otherwise it stays fixed.
///
/// Parameter order: `[projection.weights, projection.bias, positions?]`.
#[derive(Debug, Clone)]
pub struct PatchEmbedding {
    image_size: usize,
    patch_size: usize,
    projection: Linear,
    positions: Matrix,
    learned_positions: bool,
}

impl PatchEmbedding {
    /// # Panics
    ///
    /// Panics if `patch_size` is zero or does not divide `image_size`.
    pub fn new(
        image_size: usize,
        patch_size: usize,
        d_model: usize,
        learned_positions: bool,
        rng: &mut SimpleRng,
    ) -> Self {
        assert!(
            patch_size > 0 && image_size % patch_size == 0,
            "image size {} is not a multiple of patch size {}",
            image_size,
            patch_size
        );
        let grid = image_size / patch_size;
        Self {
            image_size,
            patch_size,
            projection: Linear::new(patch_size * patch_size, d_model, rng),
            positions: sinusoidal_positions(grid * grid, d_model),
            learned_positions,
        }
    }

    pub fn num_patches(&self) -> usize {
        let grid = self.image_size / self.patch_size;
        grid * grid
    }

    pub fn patch_dim(&self) -> usize {
        self.patch_size * self.patch_size
    }

    pub fn d_model(&self) -> usize {
        self.projection.output_size()
    }

    pub fn positions(&self) -> &Matrix {
        &self.positions
    }

    /// Cuts `image` into flattened patches, one per row, in raster order.
    ///
    /// # Panics
    ///
    /// Panics if `image` is not `image_size × image_size`.
    pub fn extract_patches(&self, image: &Matrix) -> Matrix {
        assert_eq!(
            image.shape(),
            (self.image_size, self.image_size),
            "image must be {}x{}, got {}x{}",
            self.image_size,
            self.image_size,
            image.rows(),
            image.cols()
        );
        let grid = self.image_size / self.patch_size;
        let p = self.patch_size;
        let mut patches = Matrix::zeros(grid * grid, p * p);

        for py in 0..grid {
            for px in 0..grid {
                let row = patches.row_mut(py * grid + px);
                for dy in 0..p {
                    let src = &image.row(py * p + dy)[px * p..(px + 1) * p];
                    row[dy * p..(dy + 1) * p].copy_from_slice(src);
                }
            }
        }
        patches
    }

    /// Inverse of [`extract_patches`](Self::extract_patches): scatters patch
    /// rows back into image layout.
    pub fn fold_patches(&self, patches: &Matrix) -> Matrix {
        let grid = self.image_size / self.patch_size;
        let p = self.patch_size;
        let mut image = Matrix::zeros(self.image_size, self.image_size);

        for py in 0..grid {
            for px in 0..grid {
                let row = patches.row(py * grid + px);
                for dy in 0..p {
                    let dst = &mut image.row_mut(py * p + dy)[px * p..(px + 1) * p];
                    dst.copy_from_slice(&row[dy * p..(dy + 1) * p]);
                }
            }
        }
        image
    }
}

/// Sinusoidal positional table of shape `seq_len × d_model`.
pub fn sinusoidal_positions(seq_len: usize, d_model: usize) -> Matrix {
    let mut table = Matrix::zeros(seq_len, d_model);
    for t in 0..seq_len {
        let row = table.row_mut(t);
        for (d, value) in row.iter_mut().enumerate() {
            let angle = t as f64 / 10000f64.powf((2 * (d / 2)) as f64 / d_model as f64);
            *value = if d % 2 == 0 { angle.sin() } else { angle.cos() };
        }
    }
    table
}

#[derive(Debug, Clone)]
pub struct PatchEmbeddingCache {
    projection: LinearCache,
}

impl Layer for PatchEmbedding {
    type Cache = PatchEmbeddingCache;

    fn forward(&self, image: &Matrix, ctx: &mut ForwardContext) -> (Matrix, PatchEmbeddingCache) {
        let patches = self.extract_patches(image);
        let (mut tokens, projection) = self.projection.forward(&patches, ctx);
        tokens.add_assign(&self.positions);
        (tokens, PatchEmbeddingCache { projection })
    }

    fn backward(
        &self,
        cache: &PatchEmbeddingCache,
        grad_output: &Matrix,
        grads: &mut [Matrix],
    ) -> Matrix {
        check_grads("PatchEmbedding", self.tensor_count(), grads);
        let (projection_grads, position_grads) = grads.split_at_mut(2);
        if self.learned_positions {
            position_grads[0].add_assign(grad_output);
        }
        let grad_patches = self
            .projection
            .backward(&cache.projection, grad_output, projection_grads);
        self.fold_patches(&grad_patches)
    }

    fn parameters(&self) -> Vec<&Matrix> {
        let mut params = self.projection.parameters();
        if self.learned_positions {
            params.push(&self.positions);
        }
        params
    }

    fn parameters_mut(&mut self) -> Vec<&mut Matrix> {
        let mut params = self.projection.parameters_mut();
        if self.learned_positions {
            params.push(&mut self.positions);
        }
        params
    }
}
