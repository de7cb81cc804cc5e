//! Image preprocessing for OCR legibility
//!
//! Two fixed pipelines selected by an `aggressive` flag:
//!
//! - aggressive: resize to 3000px wide, grayscale, normalize, strong sharpen,
//!   contrast boost, 3x3 median, binarize at 140
//! - mild: resize to 2500px wide, normalize, light sharpen
//!
//! Output is always PNG. Identical input and flag give identical bytes.

use std::io::Cursor;

use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, ImageFormat, RgbImage};
use imageproc::filter::median_filter;

use crate::config::PreprocessConfig;
use crate::error::{ExtractionError, Result};

/// Sharpen strength of the aggressive pipeline
const AGGRESSIVE_SHARPEN: f32 = 1.0;
/// Sharpen strength of the mild pipeline
const MILD_SHARPEN: f32 = 0.5;
/// Linear contrast gain; offset keeps mid-gray fixed
const CONTRAST_GAIN: f32 = 1.8;
/// Largest side of a resized image
const MAX_DIMENSION: f64 = 10_000.0;
/// Largest area of a resized image
const MAX_PIXELS: f64 = 40_000_000.0;
/// Percentiles clipped by normalization
const NORMALIZE_LOW: f64 = 0.01;
const NORMALIZE_HIGH: f64 = 0.99;

/// Stateless preprocessing pipeline
#[derive(Debug, Clone)]
pub struct ImagePreprocessor {
    config: PreprocessConfig,
}

impl Default for ImagePreprocessor {
    fn default() -> Self {
        Self::new(PreprocessConfig::default())
    }
}

impl ImagePreprocessor {
    pub fn new(config: PreprocessConfig) -> Self {
        Self { config }
    }

    /// Decode, transform and re-encode an image buffer
    pub fn process_bytes(&self, data: &[u8], aggressive: bool) -> Result<Vec<u8>> {
        let img = image::load_from_memory(data).map_err(|e| {
            ExtractionError::Preprocessing(format!("Failed to decode image: {}", e))
        })?;
        self.process(&img, aggressive)
    }

    /// Transform a decoded image and encode it as PNG
    pub fn process(&self, img: &DynamicImage, aggressive: bool) -> Result<Vec<u8>> {
        let output = if aggressive {
            DynamicImage::ImageLuma8(self.aggressive(img))
        } else {
            DynamicImage::ImageRgb8(self.mild(img))
        };

        let mut buffer = Vec::new();
        output
            .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
            .map_err(|e| ExtractionError::Preprocessing(format!("Failed to encode image: {}", e)))?;
        Ok(buffer)
    }

    fn aggressive(&self, img: &DynamicImage) -> GrayImage {
        let resized = resize_to_width(img, self.config.aggressive_width);
        tracing::debug!(
            "Aggressive preprocessing: {}x{} -> {}x{}",
            img.width(),
            img.height(),
            resized.width(),
            resized.height()
        );

        let mut gray = resized.to_luma8();
        normalize_gray(&mut gray);
        let mut gray = imageops::filter3x3(&gray, &sharpen_kernel(AGGRESSIVE_SHARPEN));
        boost_contrast(&mut gray, CONTRAST_GAIN);
        let mut gray = median_filter(&gray, 1, 1);
        binarize(&mut gray, self.config.binarize_threshold);
        gray
    }

    fn mild(&self, img: &DynamicImage) -> RgbImage {
        let resized = resize_to_width(img, self.config.mild_width);
        let mut rgb = resized.to_rgb8();
        normalize_rgb(&mut rgb);
        imageops::filter3x3(&rgb, &sharpen_kernel(MILD_SHARPEN))
    }
}

/// Scale to `target` pixels wide, keeping the aspect ratio.
///
/// The scale is reduced so neither side exceeds `MAX_DIMENSION` and the
/// area stays within `MAX_PIXELS`; narrow, tall crops stop short of `target`.
fn resize_to_width(img: &DynamicImage, target: u32) -> DynamicImage {
    let (width, height) = (img.width().max(1) as f64, img.height().max(1) as f64);
    let requested = target.max(1) as f64 / width;
    let scale = requested
        .min(MAX_DIMENSION / width)
        .min(MAX_DIMENSION / height)
        .min((MAX_PIXELS / (width * height)).sqrt());
    if scale < requested {
        tracing::debug!(
            "Resize of {}x{} capped at scale {:.3} (requested {:.3})",
            width,
            height,
            scale,
            requested
        );
    }

    let new_width = ((width * scale).round() as u32).max(1);
    let new_height = ((height * scale).round() as u32).max(1);
    if (new_width, new_height) == (img.width(), img.height()) {
        return img.clone();
    }
    img.resize_exact(new_width, new_height, FilterType::Lanczos3)
}

/// Laplacian high-pass added to identity; kernel sums to 1
fn sharpen_kernel(strength: f32) -> [f32; 9] {
    let k = strength;
    [0.0, -k, 0.0, -k, 1.0 + 4.0 * k, -k, 0.0, -k, 0.0]
}

/// Luminance levels at the low and high clip percentiles
fn percentile_bounds(histogram: &[u64; 256], total: u64) -> (u8, u8) {
    let low_target = (total as f64 * NORMALIZE_LOW) as u64;
    let high_target = (total as f64 * NORMALIZE_HIGH) as u64;

    let mut seen = 0u64;
    let mut low = 0u8;
    let mut high = 255u8;
    let mut low_found = false;
    for (level, count) in histogram.iter().enumerate() {
        seen += count;
        if !low_found && seen > low_target {
            low = level as u8;
            low_found = true;
        }
        if seen >= high_target.max(1) {
            high = level as u8;
            break;
        }
    }
    (low, high)
}

fn stretch(value: u8, low: u8, high: u8) -> u8 {
    if high <= low {
        return value;
    }
    let scaled = (value.saturating_sub(low) as f32) * 255.0 / (high - low) as f32;
    scaled.round().clamp(0.0, 255.0) as u8
}

fn normalize_gray(img: &mut GrayImage) {
    let mut histogram = [0u64; 256];
    for p in img.pixels() {
        histogram[p.0[0] as usize] += 1;
    }
    let (low, high) = percentile_bounds(&histogram, img.width() as u64 * img.height() as u64);
    for p in img.pixels_mut() {
        p.0[0] = stretch(p.0[0], low, high);
    }
}

/// Stretch every channel by the bounds of the luminance histogram
fn normalize_rgb(img: &mut RgbImage) {
    let mut histogram = [0u64; 256];
    for p in img.pixels() {
        histogram[luma(p.0) as usize] += 1;
    }
    let (low, high) = percentile_bounds(&histogram, img.width() as u64 * img.height() as u64);
    for p in img.pixels_mut() {
        for c in p.0.iter_mut() {
            *c = stretch(*c, low, high);
        }
    }
}

fn luma([r, g, b]: [u8; 3]) -> u8 {
    (0.2126 * r as f32 + 0.7152 * g as f32 + 0.0722 * b as f32).round() as u8
}

fn boost_contrast(img: &mut GrayImage, gain: f32) {
    let offset = 128.0 - 128.0 * gain;
    for p in img.pixels_mut() {
        p.0[0] = (gain * p.0[0] as f32 + offset).round().clamp(0.0, 255.0) as u8;
    }
}

fn binarize(img: &mut GrayImage, threshold: u8) {
    for p in img.pixels_mut() {
        p.0[0] = if p.0[0] >= threshold { 255 } else { 0 };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb};

    fn small_config() -> PreprocessConfig {
        PreprocessConfig {
            aggressive_width: 120,
            mild_width: 90,
            binarize_threshold: 140,
        }
    }

    /// Light page with a dark "text" bar
    fn sample_png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, y| {
            if y > height / 3 && y < height / 2 && x > width / 5 && x < width * 4 / 5 {
                Rgb([30, 30, 40])
            } else {
                let v = 200 + ((x + y) % 40) as u8;
                Rgb([v, v, v - 10])
            }
        });
        let mut buffer = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
            .unwrap();
        buffer
    }

    #[test]
    fn test_aggressive_resizes_and_binarizes() {
        let pre = ImagePreprocessor::new(small_config());
        let out = pre.process_bytes(&sample_png(60, 30), true).unwrap();

        let decoded = image::load_from_memory(&out).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (120, 60));

        let gray = decoded.to_luma8();
        assert!(gray.pixels().all(|p| p.0[0] == 0 || p.0[0] == 255));
        assert!(gray.pixels().any(|p| p.0[0] == 0));
        assert!(gray.pixels().any(|p| p.0[0] == 255));
    }

    #[test]
    fn test_mild_shrinks_and_keeps_color() {
        let pre = ImagePreprocessor::new(small_config());
        let out = pre.process_bytes(&sample_png(180, 40), false).unwrap();

        let decoded = image::load_from_memory(&out).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (90, 20));
        assert!(matches!(decoded, DynamicImage::ImageRgb8(_)));
    }

    #[test]
    fn test_pipeline_is_deterministic() {
        let pre = ImagePreprocessor::new(small_config());
        let input = sample_png(50, 25);
        for aggressive in [true, false] {
            let a = pre.process_bytes(&input, aggressive).unwrap();
            let b = pre.process_bytes(&input, aggressive).unwrap();
            assert_eq!(a, b);
        }
    }

    #[test]
    fn test_corrupt_input_is_preprocessing_error() {
        let pre = ImagePreprocessor::default();
        let result = pre.process_bytes(b"definitely not an image", true);
        assert!(matches!(result, Err(ExtractionError::Preprocessing(_))));
    }

    #[test]
    fn test_narrow_tall_crop_resize_is_bounded() {
        let sliver = DynamicImage::ImageLuma8(GrayImage::from_pixel(1, 1500, Luma([90])));
        let resized = resize_to_width(&sliver, 3000);

        assert!(resized.width() as f64 <= MAX_DIMENSION);
        assert!(resized.height() as f64 <= MAX_DIMENSION);
        assert!(resized.width() as f64 * resized.height() as f64 <= MAX_PIXELS);
        assert_eq!(resized.height(), 10_000);
        assert_eq!(resized.width(), 7);
    }

    #[test]
    fn test_wide_crop_still_reaches_target_width() {
        let strip = DynamicImage::ImageLuma8(GrayImage::from_pixel(300, 20, Luma([90])));
        let resized = resize_to_width(&strip, 3000);
        assert_eq!((resized.width(), resized.height()), (3000, 200));
    }

    #[test]
    fn test_normalize_stretches_range() {
        let mut img = GrayImage::from_fn(10, 10, |x, _| Luma([100 + x as u8 * 5]));
        normalize_gray(&mut img);
        let min = img.pixels().map(|p| p.0[0]).min().unwrap();
        let max = img.pixels().map(|p| p.0[0]).max().unwrap();
        assert_eq!(min, 0);
        assert_eq!(max, 255);
    }

    #[test]
    fn test_flat_image_survives_normalize() {
        let mut img = GrayImage::from_pixel(4, 4, Luma([77]));
        normalize_gray(&mut img);
        assert!(img.pixels().all(|p| p.0[0] == 77));
    }

    #[test]
    fn test_contrast_keeps_mid_gray() {
        let mut img = GrayImage::from_fn(3, 1, |x, _| Luma([[128, 100, 200][x as usize]]));
        boost_contrast(&mut img, CONTRAST_GAIN);
        assert_eq!(img.get_pixel(0, 0).0[0], 128);
        assert_eq!(img.get_pixel(1, 0).0[0], 78);
        assert_eq!(img.get_pixel(2, 0).0[0], 255);
    }
}
