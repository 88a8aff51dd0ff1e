//! Fashion-MNIST loading from IDX files.
//!
//! IDX files start with a big-endian header: a magic number (2051 for
//! images, 2049 for labels), the item count and, for images, the row and
//! column count. The payload follows as unsigned bytes.

use crate::error::DatasetError;
use crate::matrix::Matrix;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;
use tracing::{debug, warn};

pub const IMAGE_MAGIC: u32 = 2051;
pub const LABEL_MAGIC: u32 = 2049;

pub const TRAIN_IMAGES: &str = "train-images-idx3-ubyte";
pub const TRAIN_LABELS: &str = "train-labels-idx1-ubyte";
pub const TEST_IMAGES: &str = "t10k-images-idx3-ubyte";
pub const TEST_LABELS: &str = "t10k-labels-idx1-ubyte";

/// Class names indexed by label.
pub const FASHION_MNIST_CLASSES: [&str; 10] = [
    "T-shirt/top",
    "Trouser",
    "Pullover",
    "Dress",
    "Coat",
    "Sandal",
    "Shirt",
    "Sneaker",
    "Bag",
    "Ankle boot",
];

/// Name of `label`, or `"unknown"` outside the ten classes.
pub fn class_name(label: usize) -> &'static str {
    FASHION_MNIST_CLASSES.get(label).copied().unwrap_or("unknown")
}

/// Maps a raw byte to `[-0.5, 0.5]`.
pub fn normalize_pixel(value: u8) -> f64 {
    value as f64 / 255.0 - 0.5
}

fn read_u32<R: Read>(reader: &mut R, name: &str) -> Result<u32, DatasetError> {
    let mut buf = [0u8; 4];
    read_exact(reader, &mut buf, name)?;
    Ok(u32::from_be_bytes(buf))
}

fn read_exact<R: Read>(reader: &mut R, buf: &mut [u8], name: &str) -> Result<(), DatasetError> {
    reader.read_exact(buf).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => DatasetError::Truncated(name.to_string()),
        _ => DatasetError::Io(e),
    })
}

fn check_magic(found: u32, expected: u32, name: &str) -> Result<(), DatasetError> {
    if found != expected {
        return Err(DatasetError::BadMagic {
            path: name.to_string(),
            expected,
            found,
        });
    }
    Ok(())
}

/// Reads up to `limit` normalized square images from an IDX3 stream.
/// `name` only labels errors.
pub fn read_images<R: Read>(
    mut reader: R,
    name: &str,
    limit: usize,
) -> Result<Vec<Matrix>, DatasetError> {
    check_magic(read_u32(&mut reader, name)?, IMAGE_MAGIC, name)?;
    let count = read_u32(&mut reader, name)? as usize;
    let rows = read_u32(&mut reader, name)? as usize;
    let cols = read_u32(&mut reader, name)? as usize;
    if rows == 0 || rows != cols {
        return Err(DatasetError::Dimensions {
            path: name.to_string(),
            rows,
            cols,
        });
    }

    let take = count.min(limit);
    if take < count {
        debug!(file = name, available = count, loaded = take, "truncating images");
    }

    let mut buf = vec![0u8; rows * cols];
    let mut images = Vec::with_capacity(take);
    for _ in 0..take {
        read_exact(&mut reader, &mut buf, name)?;
        let pixels = buf.iter().map(|&b| normalize_pixel(b)).collect();
        images.push(Matrix::from_vec(rows, cols, pixels));
    }
    Ok(images)
}

/// Reads up to `limit` labels from an IDX1 stream.
pub fn read_labels<R: Read>(mut reader: R, name: &str, limit: usize) -> Result<Vec<usize>, DatasetError> {
    check_magic(read_u32(&mut reader, name)?, LABEL_MAGIC, name)?;
    let count = read_u32(&mut reader, name)? as usize;
    let take = count.min(limit);

    let mut buf = vec![0u8; take];
    read_exact(&mut reader, &mut buf, name)?;
    Ok(buf.into_iter().map(usize::from).collect())
}

/// Loads up to `limit` images from an IDX3 file.
pub fn load_images<P: AsRef<Path>>(path: P, limit: usize) -> Result<Vec<Matrix>, DatasetError> {
    let path = path.as_ref();
    let file = File::open(path)?;
    read_images(BufReader::new(file), &path.display().to_string(), limit)
}

/// Loads up to `limit` labels from an IDX1 file.
pub fn load_labels<P: AsRef<Path>>(path: P, limit: usize) -> Result<Vec<usize>, DatasetError> {
    let path = path.as_ref();
    let file = File::open(path)?;
    read_labels(BufReader::new(file), &path.display().to_string(), limit)
}

/// Images paired with their labels.
#[derive(Debug, Clone)]
pub struct LabeledSet {
    pub images: Vec<Matrix>,
    pub labels: Vec<usize>,
}

impl LabeledSet {
    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

/// Loads an image file and its label file, keeping the shorter length if
/// they disagree.
pub fn load_set<P: AsRef<Path>>(
    images_path: P,
    labels_path: P,
    limit: usize,
) -> Result<LabeledSet, DatasetError> {
    let mut images = load_images(&images_path, limit)?;
    let mut labels = load_labels(&labels_path, limit)?;
    if images.len() != labels.len() {
        warn!(
            images = images.len(),
            labels = labels.len(),
            "image and label counts differ, keeping the shorter"
        );
        let n = images.len().min(labels.len());
        images.truncate(n);
        labels.truncate(n);
    }
    Ok(LabeledSet { images, labels })
}
