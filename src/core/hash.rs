use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageReader};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use thiserror::Error;

/// Largest hash size whose `size * size` bits fit in a [`Fingerprint`].
pub const MAX_HASH_SIZE: u32 = 8;

#[derive(Debug, Error)]
pub enum HashError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid image {path}: {reason}")]
    InvalidImage { path: String, reason: String },

    #[error("Unsupported hash size {size} (must be 1..={max})")]
    UnsupportedSize { size: u32, max: u32 },
}

/// Difference-hash fingerprint. Equal fingerprints mean "same picture".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Fingerprint(pub u64);

impl Fingerprint {
    /// Number of differing bits between two fingerprints.
    pub fn distance(&self, other: &Fingerprint) -> u32 {
        (self.0 ^ other.0).count_ones()
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Computes gradient fingerprints for decoded images.
///
/// The image is reduced to luminance, downscaled to `(size + 1) x size` and
/// each sample is compared with its left neighbour. Flag `i` (row-major) sets
/// bit `i` of the fingerprint when the sample is brighter than its neighbour.
#[derive(Debug, Clone, Copy)]
pub struct PerceptualHasher {
    size: u32,
}

impl PerceptualHasher {
    pub fn new() -> Self {
        Self {
            size: MAX_HASH_SIZE,
        }
    }

    pub fn with_size(size: u32) -> Result<Self, HashError> {
        if size == 0 || size > MAX_HASH_SIZE {
            return Err(HashError::UnsupportedSize {
                size,
                max: MAX_HASH_SIZE,
            });
        }
        Ok(Self { size })
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    /// Fingerprint an already decoded image.
    pub fn hash_image(&self, image: &DynamicImage) -> Result<Fingerprint, HashError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(HashError::InvalidImage {
                path: "<memory>".to_string(),
                reason: format!("zero dimension {}x{}", image.width(), image.height()),
            });
        }

        let gray = image.to_luma8();
        let resized = imageops::resize(&gray, self.size + 1, self.size, FilterType::Triangle);

        let mut bits = 0u64;
        let mut index = 0u32;
        for y in 0..self.size {
            for x in 0..self.size {
                let left = resized.get_pixel(x, y)[0];
                let right = resized.get_pixel(x + 1, y)[0];
                if right > left {
                    bits |= 1u64 << index;
                }
                index += 1;
            }
        }

        Ok(Fingerprint(bits))
    }

    /// Decode the file at `path` by content and fingerprint it.
    pub fn hash_path(&self, path: &Path) -> Result<Fingerprint, HashError> {
        let image = decode_image(path)?;
        self.hash_image(&image).map_err(|e| match e {
            HashError::InvalidImage { reason, .. } => HashError::InvalidImage {
                path: path.display().to_string(),
                reason,
            },
            other => other,
        })
    }
}

impl Default for PerceptualHasher {
    fn default() -> Self {
        Self::new()
    }
}

/// Open and decode an image, sniffing the format from its bytes rather than
/// trusting the file extension.
pub fn decode_image(path: &Path) -> Result<DynamicImage, HashError> {
    let invalid = |reason: String| HashError::InvalidImage {
        path: path.display().to_string(),
        reason,
    };

    let image = ImageReader::open(path)?
        .with_guessed_format()?
        .decode()
        .map_err(|e| invalid(e.to_string()))?;

    if image.width() == 0 || image.height() == 0 {
        return Err(invalid("zero dimension".to_string()));
    }

    Ok(image)
}
