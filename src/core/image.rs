use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, ImageReader};
use serde::Serialize;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImageOpError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Unrecognised image format: {path}")]
    UnknownFormat { path: String },

    #[error("Invalid target size {width}x{height}")]
    InvalidSize { width: u32, height: u32 },
}

/// Mean dimensions over the decodable images of a directory.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ImageStats {
    pub count: usize,
    pub mean_height: Option<f64>,
    pub mean_width: Option<f64>,
}

impl ImageStats {
    pub fn from_dimensions(dimensions: &[(u32, u32)]) -> Self {
        let count = dimensions.len();
        if count == 0 {
            return Self {
                count,
                mean_height: None,
                mean_width: None,
            };
        }
        let total_width: u64 = dimensions.iter().map(|(w, _)| u64::from(*w)).sum();
        let total_height: u64 = dimensions.iter().map(|(_, h)| u64::from(*h)).sum();
        Self {
            count,
            mean_height: Some(total_height as f64 / count as f64),
            mean_width: Some(total_width as f64 / count as f64),
        }
    }
}

/// Decode an image along with the format sniffed from its bytes.
fn load(path: &Path) -> Result<(DynamicImage, ImageFormat), ImageOpError> {
    let reader = ImageReader::open(path)?.with_guessed_format()?;
    let format = reader.format().ok_or_else(|| ImageOpError::UnknownFormat {
        path: path.display().to_string(),
    })?;
    Ok((reader.decode()?, format))
}

/// Write `img` back to `path` in `format`, dropping channels the encoder
/// cannot store.
fn store(img: DynamicImage, path: &Path, format: ImageFormat) -> Result<(), ImageOpError> {
    let img = match format {
        ImageFormat::Jpeg if img.color().has_alpha() || img.color().bytes_per_pixel() > 3 => {
            if img.color().has_color() {
                DynamicImage::ImageRgb8(img.to_rgb8())
            } else {
                DynamicImage::ImageLuma8(img.to_luma8())
            }
        }
        _ => img,
    };
    img.save_with_format(path, format)?;
    Ok(())
}

/// Resize the image at `path` in place to exactly `width` x `height`.
pub fn resize_file(path: &Path, width: u32, height: u32) -> Result<(), ImageOpError> {
    if width == 0 || height == 0 {
        return Err(ImageOpError::InvalidSize { width, height });
    }
    let (img, format) = load(path)?;
    let resized = img.resize_exact(width, height, FilterType::Triangle);
    store(resized, path, format)
}

/// Convert the image at `path` to grayscale in place.
pub fn grayscale_file(path: &Path) -> Result<(), ImageOpError> {
    let (img, format) = load(path)?;
    store(DynamicImage::ImageLuma8(img.to_luma8()), path, format)
}

/// Width and height of a fully decodable image. A valid header over
/// corrupt pixel data is an error.
pub fn dimensions(path: &Path) -> Result<(u32, u32), ImageOpError> {
    let (img, _) = load(path)?;
    Ok((img.width(), img.height()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{banded_image, save_jpeg, save_png};
    use image::GenericImageView;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_resize_file_sets_exact_dimensions() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("wide.png");
        save_png(&banded_image(0x0F), &path);

        resize_file(&path, 200, 120).unwrap();

        let img = image::open(&path).unwrap();
        assert_eq!(img.dimensions(), (200, 120));
    }

    #[test]
    fn test_resize_keeps_sniffed_format() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("photo.jpg");
        save_jpeg(&banded_image(0x33), &path);

        resize_file(&path, 30, 30).unwrap();

        let bytes = fs::read(&path).unwrap();
        assert_eq!(image::guess_format(&bytes).unwrap(), ImageFormat::Jpeg);
    }

    #[test]
    fn test_resize_rejects_zero_size() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("a.png");
        save_png(&banded_image(0x01), &path);
        assert!(matches!(
            resize_file(&path, 0, 10),
            Err(ImageOpError::InvalidSize { .. })
        ));
    }

    #[test]
    fn test_grayscale_file_produces_single_channel_png() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("colour.png");
        let colour = DynamicImage::ImageRgb8(image::RgbImage::from_fn(16, 16, |x, y| {
            image::Rgb([(x * 16) as u8, (y * 16) as u8, 200])
        }));
        save_png(&colour, &path);

        grayscale_file(&path).unwrap();

        let img = image::open(&path).unwrap();
        assert!(!img.color().has_color());
    }

    #[test]
    fn test_grayscale_jpeg_stays_readable() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("x.jpg");
        save_jpeg(&banded_image(0x55), &path);

        grayscale_file(&path).unwrap();
        assert!(image::open(&path).is_ok());
    }

    #[test]
    fn test_undecodable_file_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("junk.png");
        fs::write(&path, b"junk").unwrap();

        assert!(grayscale_file(&path).is_err());
        assert!(dimensions(&path).is_err());
    }

    #[test]
    fn test_truncated_pixel_data_has_no_dimensions() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("cut.png");
        save_png(&banded_image(0x0F), &path);
        let mut bytes = fs::read(&path).unwrap();
        bytes.truncate(60);
        fs::write(&path, &bytes).unwrap();

        // The header alone still parses.
        let header = ImageReader::open(&path)
            .unwrap()
            .with_guessed_format()
            .unwrap()
            .into_dimensions()
            .unwrap();
        assert_eq!(header, (90, 80));
        assert!(dimensions(&path).is_err());
    }

    #[test]
    fn test_stats_means() {
        let stats = ImageStats::from_dimensions(&[(100, 50), (300, 150)]);
        assert_eq!(stats.count, 2);
        assert_eq!(stats.mean_width, Some(200.0));
        assert_eq!(stats.mean_height, Some(100.0));
    }

    #[test]
    fn test_stats_of_nothing_has_no_means() {
        let stats = ImageStats::from_dimensions(&[]);
        assert_eq!(stats.count, 0);
        assert!(stats.mean_width.is_none());
        assert!(stats.mean_height.is_none());
    }
}
