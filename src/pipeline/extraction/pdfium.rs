//! Page rasterization for scanned PDFs via PDFium.
//!
//! `PdfiumRenderer` is stateless. The upstream `Pdfium` handle is `!Send`,
//! so every call binds the library afresh; the OS caches the `dlopen`.

use std::path::PathBuf;

use image::{Rgb, RgbImage};
use pdfium_render::prelude::*;
use tracing::{debug, warn};

use super::pdf_renderer::LopdfImageExtractor;
use super::types::PdfPageRenderer;
use super::ExtractionError;
use crate::pipeline::recognition::preprocess::encode_png;

/// Upper bound on either side of a rendered page.
const MAX_DIMENSION_PX: u32 = 4096;

/// PDF user-space units per inch.
const POINTS_PER_INCH: f32 = 72.0;

pub struct PdfiumRenderer;

impl PdfiumRenderer {
    /// Fails when no PDFium library can be bound.
    ///
    /// Discovery order:
    /// 1. `PDFIUM_DYNAMIC_LIB_PATH` (explicit path to the library file)
    /// 2. Beside the running executable, then `pdfium/` and `../lib/` next to it
    /// 3. System library search paths
    pub fn new() -> Result<Self, ExtractionError> {
        let _ = load_pdfium()?;
        Ok(Self)
    }
}

/// PDFium when it loads, otherwise embedded page images through lopdf.
pub fn default_page_renderer() -> Box<dyn PdfPageRenderer> {
    match PdfiumRenderer::new() {
        Ok(renderer) => Box::new(renderer),
        Err(e) => {
            warn!(error = %e, "PDFium unavailable, scanned PDFs will use embedded page images");
            Box::new(LopdfImageExtractor)
        }
    }
}

/// Library locations tried before the system search path.
fn candidate_library_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(path) = std::env::var_os("PDFIUM_DYNAMIC_LIB_PATH") {
        paths.push(PathBuf::from(path));
    }
    if let Some(exe_dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|p| p.to_path_buf()))
    {
        for dir in [exe_dir.clone(), exe_dir.join("pdfium"), exe_dir.join("..").join("lib")] {
            paths.push(Pdfium::pdfium_platform_library_name_at_path(&dir));
        }
    }
    paths
}

fn load_pdfium() -> Result<Pdfium, ExtractionError> {
    for path in candidate_library_paths() {
        if let Ok(bindings) = Pdfium::bind_to_library(&path) {
            debug!(path = %path.display(), "PDFium bound");
            return Ok(Pdfium::new(bindings));
        }
    }
    let bindings = Pdfium::bind_to_system_library().map_err(|e| ExtractionError::PdfRendering {
        page: 0,
        reason: format!("PDFium library not found. Set PDFIUM_DYNAMIC_LIB_PATH or install PDFium: {e}"),
    })?;
    Ok(Pdfium::new(bindings))
}

/// Bind PDFium, open `pdf_bytes` and hand the document to `f`.
fn with_document<T>(
    pdf_bytes: &[u8],
    f: impl FnOnce(&PdfDocument<'_>) -> Result<T, ExtractionError>,
) -> Result<T, ExtractionError> {
    let pdfium = load_pdfium()?;
    let document = pdfium
        .load_pdf_from_byte_slice(pdf_bytes, None)
        .map_err(|e| ExtractionError::PdfRendering {
            page: 0,
            reason: format!("Failed to load PDF: {e}"),
        })?;
    f(&document)
}

/// Pixel size for a page at `dpi`, both sides clamped to `[1, MAX_DIMENSION_PX]`
/// with the aspect ratio kept when capping.
fn compute_render_dimensions(width_points: f32, height_points: f32, dpi: u32) -> (u32, u32) {
    let scale = dpi as f32 / POINTS_PER_INCH;
    let raw_w = (width_points * scale).max(1.0);
    let raw_h = (height_points * scale).max(1.0);

    let longest = raw_w.max(raw_h);
    let ratio = if longest > MAX_DIMENSION_PX as f32 {
        MAX_DIMENSION_PX as f32 / longest
    } else {
        1.0
    };
    let clamp = |v: f32| ((v * ratio).round() as u32).clamp(1, MAX_DIMENSION_PX);
    (clamp(raw_w), clamp(raw_h))
}

impl PdfPageRenderer for PdfiumRenderer {
    fn page_count(&self, pdf_bytes: &[u8]) -> Result<usize, ExtractionError> {
        with_document(pdf_bytes, |document| Ok(document.pages().len() as usize))
    }

    fn render_page(
        &self,
        pdf_bytes: &[u8],
        page_number: usize,
        dpi: u32,
    ) -> Result<Vec<u8>, ExtractionError> {
        let rendering_error = |reason: String| ExtractionError::PdfRendering {
            page: page_number,
            reason,
        };

        let rgb = with_document(pdf_bytes, |document| {
            let pages = document.pages();
            let page = u16::try_from(page_number)
                .ok()
                .and_then(|index| pages.get(index).ok())
                .ok_or_else(|| {
                    rendering_error(format!(
                        "Page {page_number} out of range (document has {} pages)",
                        pages.len()
                    ))
                })?;

            let (width, height) =
                compute_render_dimensions(page.width().value, page.height().value, dpi);
            let config = PdfRenderConfig::new()
                .set_target_width(width as i32)
                .set_maximum_height(height as i32);
            let bitmap = page
                .render_with_config(&config)
                .map_err(|e| rendering_error(format!("Rendering failed: {e}")))?;
            Ok(bitmap.as_image().to_rgb8())
        })?;

        let png = encode_png(&rgb)?;
        debug!(
            page = page_number,
            width = rgb.width(),
            height = rgb.height(),
            png_size = png.len(),
            "Rendered PDF page"
        );
        Ok(png)
    }
}

// ── Mock for testing ──────────────────────────────────────

/// Renders every in-range page as a blank white PNG.
pub struct MockPdfPageRenderer {
    page_count: usize,
}

impl MockPdfPageRenderer {
    pub fn new(page_count: usize) -> Self {
        Self { page_count }
    }
}

impl PdfPageRenderer for MockPdfPageRenderer {
    fn page_count(&self, _pdf_bytes: &[u8]) -> Result<usize, ExtractionError> {
        Ok(self.page_count)
    }

    fn render_page(
        &self,
        _pdf_bytes: &[u8],
        page_number: usize,
        _dpi: u32,
    ) -> Result<Vec<u8>, ExtractionError> {
        if page_number >= self.page_count {
            return Err(ExtractionError::PdfRendering {
                page: page_number,
                reason: format!(
                    "Page {page_number} out of range (mock has {} pages)",
                    self.page_count
                ),
            });
        }
        encode_png(&RgbImage::from_pixel(64, 48, Rgb([255, 255, 255])))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::GenericImageView;

    #[test]
    fn a4_at_300dpi() {
        let (w, h) = compute_render_dimensions(595.0, 842.0, 300);
        assert!(w > 2400 && w < 2550, "A4 width at 300dpi: got {w}");
        assert!(h > 3450 && h < 3600, "A4 height at 300dpi: got {h}");
    }

    #[test]
    fn letter_at_300dpi() {
        let (w, h) = compute_render_dimensions(612.0, 792.0, 300);
        assert!((2549..=2550).contains(&w), "Letter width at 300dpi: got {w}");
        assert!((3299..=3300).contains(&h), "Letter height at 300dpi: got {h}");
    }

    #[test]
    fn oversized_page_is_capped_with_aspect_ratio() {
        let (w, h) = compute_render_dimensions(5000.0, 10000.0, 300);
        assert_eq!(h, MAX_DIMENSION_PX);
        let ratio = h as f32 / w as f32;
        assert!((ratio - 2.0).abs() < 0.05, "ratio {ratio}");
    }

    #[test]
    fn zero_points_clamped_to_1() {
        assert_eq!(compute_render_dimensions(0.0, 0.0, 300), (1, 1));
    }

    #[test]
    fn mock_renders_decodable_png() {
        let png = MockPdfPageRenderer::new(2).render_page(&[], 1, 300).unwrap();
        let decoded = image::load_from_memory(&png).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (64, 48));
    }

    #[test]
    fn mock_errors_for_out_of_range() {
        let err = MockPdfPageRenderer::new(2).render_page(&[], 2, 300).unwrap_err();
        assert!(matches!(err, ExtractionError::PdfRendering { page: 2, .. }));
    }

    #[test]
    fn candidate_paths_name_the_platform_library() {
        let override_set = std::env::var_os("PDFIUM_DYNAMIC_LIB_PATH").is_some();
        let paths = candidate_library_paths();
        let bundled = &paths[usize::from(override_set)..];
        assert!(!bundled.is_empty());
        let library = Pdfium::pdfium_platform_library_name();
        for path in bundled {
            assert_eq!(path.file_name(), Some(library.as_os_str()), "{}", path.display());
        }
    }
}
