//! Raster preprocessing for OCR.
//!
//! Each helper is a pure transform over `image` buffers; the strategies in
//! `strategy.rs` compose them. Converted copies live only in memory and are
//! dropped when the owning strategy returns.

use std::io::Cursor;

use image::imageops::FilterType;
use image::{
    ColorType, DynamicImage, GenericImageView, GrayImage, ImageFormat, ImageOutputFormat, Luma,
    RgbImage,
};
use tracing::debug;

use crate::pipeline::extraction::ExtractionError;

// ═══════════════════════════════════════════════════════════
// Constants
// ═══════════════════════════════════════════════════════════

/// Maximum input image size (in bytes) before rejecting.
/// Prevents OOM on corrupt/adversarial files.
const MAX_IMAGE_BYTES: usize = 50 * 1024 * 1024; // 50 MB

/// Minimum valid image size in bytes (smallest valid PNG is ~67 bytes).
const MIN_IMAGE_BYTES: usize = 67;

/// Upscaling stops growing past this edge length.
const MAX_UPSCALED_DIMENSION: u32 = 12_000;

// ═══════════════════════════════════════════════════════════
// Decoding
// ═══════════════════════════════════════════════════════════

/// A decoded raster plus the container format it came from.
pub struct DecodedImage {
    pub image: DynamicImage,
    /// `PNG`, `JPEG`, `TIFF`, ...
    pub format: &'static str,
}

impl DecodedImage {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Channel layout in the usual short notation (`RGB`, `RGBA`, `L`, ...).
    pub fn mode(&self) -> &'static str {
        color_mode_name(self.image.color())
    }
}

/// Validate image bytes before decoding.
/// Returns early error for clearly invalid input, which saves decode time.
pub fn validate_image_bytes(bytes: &[u8]) -> Result<(), ExtractionError> {
    if bytes.len() < MIN_IMAGE_BYTES {
        return Err(ExtractionError::ImageProcessing(
            "Image data too small to be valid".into(),
        ));
    }
    if bytes.len() > MAX_IMAGE_BYTES {
        return Err(ExtractionError::ImageProcessing(format!(
            "Image data exceeds {}MB limit",
            MAX_IMAGE_BYTES / (1024 * 1024)
        )));
    }
    Ok(())
}

/// Decode an encoded raster, rejecting unreadable containers.
pub fn decode_image(bytes: &[u8]) -> Result<DecodedImage, ExtractionError> {
    validate_image_bytes(bytes)?;
    let image = image::load_from_memory(bytes)
        .map_err(|e| ExtractionError::ImageProcessing(format!("Failed to decode image: {e}")))?;
    Ok(DecodedImage {
        image,
        format: format_name(bytes),
    })
}

/// Container format guessed from magic bytes.
pub fn format_name(bytes: &[u8]) -> &'static str {
    match image::guess_format(bytes) {
        Ok(ImageFormat::Png) => "PNG",
        Ok(ImageFormat::Jpeg) => "JPEG",
        Ok(ImageFormat::Tiff) => "TIFF",
        Ok(ImageFormat::Bmp) => "BMP",
        Ok(ImageFormat::Gif) => "GIF",
        Ok(_) => "OTHER",
        Err(_) => "UNKNOWN",
    }
}

pub fn color_mode_name(color: ColorType) -> &'static str {
    match color {
        ColorType::L8 => "L",
        ColorType::La8 | ColorType::La16 => "LA",
        ColorType::L16 => "I;16",
        ColorType::Rgb8 | ColorType::Rgb16 | ColorType::Bgr8 => "RGB",
        ColorType::Rgba8 | ColorType::Rgba16 | ColorType::Bgra8 => "RGBA",
        _ => "RGB",
    }
}

// ═══════════════════════════════════════════════════════════
// Color normalization
// ═══════════════════════════════════════════════════════════

/// A 3-channel copy of the input, ready for the recognition strategies.
pub struct NormalizedImage {
    pub rgb: RgbImage,
    /// True when the source had alpha, gray or wide channels and was converted.
    pub converted: bool,
}

/// Convert any layout to 8-bit RGB.
///
/// Alpha channels are dropped. Thresholding downstream assumes exactly
/// three channels, so this runs before every strategy.
pub fn normalize_color(image: &DynamicImage) -> NormalizedImage {
    let color = image.color();
    let converted = color != ColorType::Rgb8;
    if converted {
        debug!(
            mode = color_mode_name(color),
            has_alpha = color.has_alpha(),
            "Converting image to RGB before recognition"
        );
    }
    NormalizedImage {
        rgb: image.to_rgb8(),
        converted,
    }
}

// ═══════════════════════════════════════════════════════════
// Pixel transforms
// ═══════════════════════════════════════════════════════════

/// Convert RGB image to grayscale using ITU-R BT.601 luminance.
pub fn rgb_to_gray(rgb: &RgbImage) -> GrayImage {
    let (w, h) = (rgb.width(), rgb.height());
    let mut gray = GrayImage::new(w, h);
    for y in 0..h {
        for x in 0..w {
            let p = rgb.get_pixel(x, y);
            let luma = (0.299 * p.0[0] as f32 + 0.587 * p.0[1] as f32 + 0.114 * p.0[2] as f32)
                as u8;
            gray.put_pixel(x, y, Luma([luma]));
        }
    }
    gray
}

/// Global threshold maximizing between-class variance (Otsu, 1979).
pub fn otsu_threshold(gray: &GrayImage) -> u8 {
    let mut histogram = [0u64; 256];
    for p in gray.pixels() {
        histogram[p.0[0] as usize] += 1;
    }

    let total: u64 = histogram.iter().sum();
    if total == 0 {
        return 127;
    }
    let weighted_sum: f64 = histogram
        .iter()
        .enumerate()
        .map(|(i, &c)| i as f64 * c as f64)
        .sum();

    let mut background_weight = 0u64;
    let mut background_sum = 0.0f64;
    let mut best_threshold = 0u8;
    let mut best_variance = -1.0f64;

    for (t, &count) in histogram.iter().enumerate() {
        background_weight += count;
        if background_weight == 0 {
            continue;
        }
        let foreground_weight = total - background_weight;
        if foreground_weight == 0 {
            break;
        }
        background_sum += t as f64 * count as f64;

        let mean_bg = background_sum / background_weight as f64;
        let mean_fg = (weighted_sum - background_sum) / foreground_weight as f64;
        let variance =
            background_weight as f64 * foreground_weight as f64 * (mean_bg - mean_fg).powi(2);

        if variance > best_variance {
            best_variance = variance;
            best_threshold = t as u8;
        }
    }

    best_threshold
}

/// Pixels strictly above `threshold` become white, the rest black.
pub fn binarize(gray: &GrayImage, threshold: u8) -> GrayImage {
    let mut out = gray.clone();
    for p in out.pixels_mut() {
        p.0[0] = if p.0[0] > threshold { 255 } else { 0 };
    }
    out
}

/// Otsu threshold then binarize.
pub fn auto_threshold(gray: &GrayImage) -> GrayImage {
    let t = otsu_threshold(gray);
    debug!(threshold = t, "Otsu threshold selected");
    binarize(gray, t)
}

/// Bicubic upscale by an integer factor, capped at `MAX_UPSCALED_DIMENSION`.
pub fn upscale(gray: &GrayImage, factor: u32) -> GrayImage {
    let factor = factor.max(1);
    let (w, h) = (gray.width(), gray.height());
    let largest = w.max(h).max(1);
    let factor = factor.min((MAX_UPSCALED_DIMENSION / largest).max(1));
    if factor == 1 {
        return gray.clone();
    }
    image::imageops::resize(gray, w * factor, h * factor, FilterType::CatmullRom)
}

/// Median filter over a `(2r+1)^2` window, edges clamped.
pub fn median_denoise(gray: &GrayImage, radius: u32) -> GrayImage {
    if radius == 0 {
        return gray.clone();
    }
    let (w, h) = (gray.width() as i64, gray.height() as i64);
    let r = radius as i64;
    let mut out = GrayImage::new(gray.width(), gray.height());
    let mut window: Vec<u8> = Vec::with_capacity(((2 * r + 1) * (2 * r + 1)) as usize);

    for y in 0..h {
        for x in 0..w {
            window.clear();
            for dy in -r..=r {
                for dx in -r..=r {
                    let sx = (x + dx).clamp(0, w - 1) as u32;
                    let sy = (y + dy).clamp(0, h - 1) as u32;
                    window.push(gray.get_pixel(sx, sy).0[0]);
                }
            }
            window.sort_unstable();
            out.put_pixel(x as u32, y as u32, Luma([window[window.len() / 2]]));
        }
    }
    out
}

// ═══════════════════════════════════════════════════════════
// Encoding
// ═══════════════════════════════════════════════════════════

/// Encode an RGB image as PNG bytes.
pub fn encode_png(img: &RgbImage) -> Result<Vec<u8>, ExtractionError> {
    write_png(DynamicImage::ImageRgb8(img.clone()))
}

/// Encode a grayscale image as PNG bytes.
pub fn encode_gray_png(img: &GrayImage) -> Result<Vec<u8>, ExtractionError> {
    write_png(DynamicImage::ImageLuma8(img.clone()))
}

fn write_png(dynamic: DynamicImage) -> Result<Vec<u8>, ExtractionError> {
    let mut cursor = Cursor::new(Vec::new());
    dynamic
        .write_to(&mut cursor, ImageOutputFormat::Png)
        .map_err(|e| ExtractionError::ImageProcessing(format!("PNG encoding failed: {e}")))?;
    Ok(cursor.into_inner())
}
