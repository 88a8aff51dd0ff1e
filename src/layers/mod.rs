//! Layer abstractions for the vision transformer
//!
//! This module provides the Layer trait and the building blocks the model is
//! assembled from. Every layer pairs a `forward` that returns its cache with a
//! `backward` that consumes it.

mod r#trait;
pub mod attention;
pub mod dropout;
pub mod encoder;
pub mod feed_forward;
pub mod head;
pub mod layer_norm;
pub mod linear;
pub mod patch_embedding;

pub use attention::MultiHeadAttention;
pub use dropout::Dropout;
pub use encoder::{Encoder, EncoderLayer};
pub use feed_forward::FeedForward;
pub use head::ClassificationHead;
pub use layer_norm::LayerNorm;
pub use linear::Linear;
pub use patch_embedding::PatchEmbedding;
pub use r#trait::{ForwardContext, Layer, Mode};
