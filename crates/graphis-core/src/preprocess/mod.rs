//! Image normalization for the embedding model.
//!
//! The normalizer turns raw image bytes into a fixed-shape grayscale
//! tensor (`H×W×1`, values in `[0, 1]`). The pipeline order is fixed:
//!
//! ```text
//! decode → grayscale → resize (Lanczos3) → deskew → denoise → contrast → sharpen
//! ```
//!
//! Optional stochastic augmentation (training mode only) runs last, driven
//! by a caller-provided seeded rng so runs are reproducible. The resize
//! filter is part of the model compatibility contract: tensors produced
//! with a different filter are not comparable with stored embeddings.

mod ops;

use std::io::Cursor;

use image::GrayImage;
use ndarray::Array3;
use rand::rngs::StdRng;

use crate::config::PreprocessConfig;
use crate::error::PreprocessError;

/// Contrast enhancement factor (about the image mean).
const CONTRAST_FACTOR: f32 = 1.5;

/// Unsharp-mask blur radius.
const UNSHARP_SIGMA: f32 = 1.0;

/// Unsharp-mask threshold: differences below this are left alone.
const UNSHARP_THRESHOLD: i32 = 3;

/// Deterministic preprocessing of raw image bytes into model input tensors.
pub struct Normalizer {
    target_size: u32,
    options: PreprocessConfig,
}

impl Normalizer {
    /// Create a normalizer producing `target_size × target_size × 1` tensors.
    pub fn new(target_size: u32, options: PreprocessConfig) -> Self {
        Self {
            target_size,
            options,
        }
    }

    /// The tensor shape this normalizer produces, as `[H, W, C]`.
    pub fn target_shape(&self) -> [usize; 3] {
        [self.target_size as usize, self.target_size as usize, 1]
    }

    /// Normalize image bytes for inference. Deterministic: the same bytes
    /// always produce the same tensor.
    pub fn normalize(&self, bytes: &[u8]) -> Result<Array3<f32>, PreprocessError> {
        self.run(bytes, None)
    }

    /// Normalize image bytes for training, applying stochastic augmentation
    /// from the given rng. Reproducible under a fixed seed.
    pub fn normalize_augmented(
        &self,
        bytes: &[u8],
        rng: &mut StdRng,
    ) -> Result<Array3<f32>, PreprocessError> {
        self.run(bytes, Some(rng))
    }

    fn run(
        &self,
        bytes: &[u8],
        augment_rng: Option<&mut StdRng>,
    ) -> Result<Array3<f32>, PreprocessError> {
        let gray = decode_gray(bytes)?;
        let mut img = image::imageops::resize(
            &gray,
            self.target_size,
            self.target_size,
            image::imageops::FilterType::Lanczos3,
        );

        if self.options.deskew {
            img = ops::deskew(&img);
        }
        if self.options.denoise {
            img = ops::median3(&img);
        }
        if self.options.contrast {
            img = ops::adjust_contrast(&img, CONTRAST_FACTOR);
        }
        if self.options.sharpen {
            img = image::imageops::unsharpen(&img, UNSHARP_SIGMA, UNSHARP_THRESHOLD);
        }
        if let Some(rng) = augment_rng {
            img = ops::augment(&img, rng);
        }

        Ok(to_tensor(&img))
    }
}

/// Decode image bytes with format detection and convert to 8-bit grayscale.
fn decode_gray(bytes: &[u8]) -> Result<GrayImage, PreprocessError> {
    let reader = image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| PreprocessError::InvalidImage {
            message: format!("Cannot detect image format: {e}"),
        })?;
    let decoded = reader
        .decode()
        .map_err(|e| PreprocessError::InvalidImage {
            message: e.to_string(),
        })?;
    Ok(decoded.to_luma8())
}

/// Pack a grayscale image into an `H×W×1` tensor with values in `[0, 1]`.
fn to_tensor(img: &GrayImage) -> Array3<f32> {
    let (w, h) = img.dimensions();
    let mut tensor = Array3::<f32>::zeros((h as usize, w as usize, 1));
    for (x, y, p) in img.enumerate_pixels() {
        tensor[[y as usize, x as usize, 0]] = f32::from(p[0]) / 255.0;
    }
    tensor
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;
    use rand::SeedableRng;

    fn png_bytes(img: &GrayImage) -> Vec<u8> {
        let mut buf = Vec::new();
        image::DynamicImage::ImageLuma8(img.clone())
            .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    fn sample_scan() -> Vec<u8> {
        let mut img = GrayImage::from_pixel(200, 160, Luma([240]));
        for x in 40..160 {
            img.put_pixel(x, 80, Luma([20]));
            img.put_pixel(x, 81, Luma([35]));
        }
        png_bytes(&img)
    }

    #[test]
    fn test_normalize_shape_and_range() {
        let normalizer = Normalizer::new(128, PreprocessConfig::default());
        let tensor = normalizer.normalize(&sample_scan()).unwrap();
        assert_eq!(tensor.shape(), &[128, 128, 1]);
        assert!(tensor.iter().all(|&v| (0.0..=1.0).contains(&v)));
    }

    #[test]
    fn test_normalize_deterministic() {
        let normalizer = Normalizer::new(64, PreprocessConfig::default());
        let bytes = sample_scan();
        let a = normalizer.normalize(&bytes).unwrap();
        let b = normalizer.normalize(&bytes).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_invalid_bytes_rejected() {
        let normalizer = Normalizer::new(64, PreprocessConfig::default());
        let err = normalizer.normalize(b"definitely not an image").unwrap_err();
        assert!(matches!(err, PreprocessError::InvalidImage { .. }));
    }

    #[test]
    fn test_deskew_noop_on_blank_image() {
        // A blank page has no foreground pixels; deskew must fail open and
        // produce the same tensor as a normalizer with deskew disabled.
        let blank = png_bytes(&GrayImage::from_pixel(100, 100, Luma([255])));
        let with_deskew = Normalizer::new(64, PreprocessConfig {
            deskew: true,
            ..PreprocessConfig::default()
        });
        let without = Normalizer::new(64, PreprocessConfig::default());
        assert_eq!(
            with_deskew.normalize(&blank).unwrap(),
            without.normalize(&blank).unwrap()
        );
    }

    #[test]
    fn test_augmentation_reproducible_with_seed() {
        let normalizer = Normalizer::new(64, PreprocessConfig::default());
        let bytes = sample_scan();
        let mut rng_a = StdRng::seed_from_u64(99);
        let mut rng_b = StdRng::seed_from_u64(99);
        let a = normalizer.normalize_augmented(&bytes, &mut rng_a).unwrap();
        let b = normalizer.normalize_augmented(&bytes, &mut rng_b).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_all_options_still_fixed_shape() {
        let normalizer = Normalizer::new(32, PreprocessConfig {
            deskew: true,
            denoise: true,
            contrast: true,
            sharpen: true,
        });
        let tensor = normalizer.normalize(&sample_scan()).unwrap();
        assert_eq!(tensor.shape(), &[32, 32, 1]);
    }
}
