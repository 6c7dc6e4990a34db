//! Extraction pipeline configuration.
//!
//! Defaults suit typical radiology reports scanned at office resolution.
//! Every value can be overridden from the environment so deployments can tune
//! the scanned-document threshold or OCR languages without a rebuild.

use std::path::PathBuf;
use std::str::FromStr;

use serde::Serialize;

// ═══════════════════════════════════════════════════════════
// Defaults
// ═══════════════════════════════════════════════════════════

/// Below this many non-whitespace-trimmed characters a PDF is treated as scanned.
pub const DEFAULT_MIN_TEXT_CHARS: usize = 100;

/// Rasterization resolution for scanned PDF pages.
pub const DEFAULT_RENDER_DPI: u32 = 300;

/// Scale applied by the upscale-then-threshold recognition strategy.
pub const DEFAULT_UPSCALE_FACTOR: u32 = 2;

/// Tesseract page segmentation mode 6: a single uniform block of text.
pub const DEFAULT_PAGE_SEGMENTATION_MODE: u32 = 6;

const TESSDATA_CANDIDATES: &[&str] = &[
    "/usr/share/tesseract-ocr/5/tessdata",
    "/usr/share/tesseract-ocr/4.00/tessdata",
    "/usr/share/tessdata",
    "/usr/local/share/tessdata",
    "/opt/homebrew/share/tessdata",
];

// ═══════════════════════════════════════════════════════════
// Types
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractionConfig {
    /// Embedded-text threshold for the scanned-document fallback.
    pub min_text_chars: usize,
    /// DPI used when rendering scanned pages.
    pub render_dpi: u32,
    pub upscale_factor: u32,
    /// Tesseract language string, e.g. `eng` or `eng+fra`.
    pub ocr_languages: String,
    /// Explicit tessdata directory; `None` searches the usual system paths.
    pub tessdata_dir: Option<PathBuf>,
    pub page_segmentation_mode: u32,
    /// When false, low-text PDFs are parsed as text instead of rasterized.
    pub use_ocr: bool,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            min_text_chars: DEFAULT_MIN_TEXT_CHARS,
            render_dpi: DEFAULT_RENDER_DPI,
            upscale_factor: DEFAULT_UPSCALE_FACTOR,
            ocr_languages: "eng".into(),
            tessdata_dir: None,
            page_segmentation_mode: DEFAULT_PAGE_SEGMENTATION_MODE,
            use_ocr: true,
        }
    }
}

impl ExtractionConfig {
    /// Defaults overridden by `MEDRECORD_*` variables and `TESSDATA_PREFIX`.
    ///
    /// Unparsable values are ignored with a warning.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(v) = parse_var(&lookup, "MEDRECORD_MIN_TEXT_CHARS") {
            config.min_text_chars = v;
        }
        if let Some(v) = parse_var::<u32>(&lookup, "MEDRECORD_RENDER_DPI") {
            config.render_dpi = v.max(1);
        }
        if let Some(lang) = lookup("MEDRECORD_OCR_LANG").filter(|s| !s.trim().is_empty()) {
            config.ocr_languages = lang.trim().to_string();
        }
        if let Some(dir) = lookup("TESSDATA_PREFIX").filter(|s| !s.is_empty()) {
            config.tessdata_dir = Some(PathBuf::from(dir));
        }
        if let Some(flag) = lookup("MEDRECORD_USE_OCR") {
            match flag.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => config.use_ocr = true,
                "0" | "false" | "no" | "off" => config.use_ocr = false,
                other => tracing::warn!(value = other, "Ignoring MEDRECORD_USE_OCR"),
            }
        }

        config
    }

    /// Configured tessdata dir if it holds the first language, else the first
    /// system path that does.
    pub fn resolve_tessdata_dir(&self) -> Option<PathBuf> {
        let primary = self.ocr_languages.split('+').next().unwrap_or("eng");
        let traineddata = format!("{primary}.traineddata");

        if let Some(dir) = &self.tessdata_dir {
            if dir.join(&traineddata).exists() {
                return Some(dir.clone());
            }
            tracing::warn!(
                path = %dir.display(),
                "Configured tessdata dir has no {traineddata}, searching system paths"
            );
        }

        TESSDATA_CANDIDATES
            .iter()
            .map(PathBuf::from)
            .find(|p| p.join(&traineddata).exists())
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "Ignoring unparsable configuration value");
            None
        }
    }
}
