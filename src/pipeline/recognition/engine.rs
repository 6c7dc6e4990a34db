use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::pipeline::extraction::ExtractionError;
use crate::pipeline_config::ExtractionConfig;

/// Raw OCR result for one image.
#[derive(Debug, Clone, PartialEq)]
pub struct OcrPageResult {
    pub text: String,
    /// Mean word confidence, 0.0..=1.0.
    pub confidence: f32,
}

/// OCR engine abstraction (allows mocking for tests)
pub trait OcrEngine: Send + Sync {
    /// Recognize text in an encoded image (PNG, JPEG, TIFF).
    fn ocr_image(&self, image_bytes: &[u8]) -> Result<OcrPageResult, ExtractionError>;
}

/// Tesseract OCR engine.
/// Only available when compiled with the `ocr` feature flag.
#[cfg(feature = "ocr")]
pub struct TesseractEngine {
    tessdata_dir: std::path::PathBuf,
    languages: String,
    page_segmentation_mode: u32,
}

#[cfg(feature = "ocr")]
impl TesseractEngine {
    pub fn new(config: &ExtractionConfig) -> Result<Self, ExtractionError> {
        let tessdata_dir = config.resolve_tessdata_dir().ok_or_else(|| {
            ExtractionError::OcrInit(
                "Tesseract data directory not found. Set TESSDATA_PREFIX or install tesseract-ocr-eng"
                    .into(),
            )
        })?;
        tracing::info!(
            tessdata = %tessdata_dir.display(),
            languages = %config.ocr_languages,
            "Tesseract engine configured"
        );
        Ok(Self {
            tessdata_dir,
            languages: config.ocr_languages.clone(),
            page_segmentation_mode: config.page_segmentation_mode,
        })
    }
}

#[cfg(feature = "ocr")]
impl OcrEngine for TesseractEngine {
    fn ocr_image(&self, image_bytes: &[u8]) -> Result<OcrPageResult, ExtractionError> {
        let tessdata_str = self
            .tessdata_dir
            .to_str()
            .ok_or_else(|| ExtractionError::OcrInit("Invalid tessdata path".into()))?;

        let tess = tesseract::Tesseract::new(Some(tessdata_str), Some(&self.languages))
            .map_err(|e| ExtractionError::OcrInit(format!("{e:?}")))?;

        let psm = self.page_segmentation_mode.to_string();
        let mut tess = tess
            .set_variable("tessedit_pageseg_mode", &psm)
            .map_err(|e| ExtractionError::OcrInit(format!("Failed to set psm: {e:?}")))?
            .set_image_from_mem(image_bytes)
            .map_err(|e| ExtractionError::OcrProcessing(format!("{e:?}")))?;

        let text = tess
            .get_text()
            .map_err(|e| ExtractionError::OcrProcessing(format!("{e:?}")))?;

        let confidence = tess.mean_text_conf().max(0) as f32 / 100.0;

        Ok(OcrPageResult { text, confidence })
    }
}

/// Stand-in used when the crate is built without the `ocr` feature, or when
/// no tessdata could be found. Every call fails, so recognition yields
/// empty text and images fall back to the minimal record.
pub struct UnavailableOcrEngine {
    reason: String,
}

impl UnavailableOcrEngine {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl OcrEngine for UnavailableOcrEngine {
    fn ocr_image(&self, _image_bytes: &[u8]) -> Result<OcrPageResult, ExtractionError> {
        Err(ExtractionError::OcrInit(self.reason.clone()))
    }
}

/// Build the OCR engine for this build and host.
#[cfg(feature = "ocr")]
pub fn default_engine(config: &ExtractionConfig) -> Arc<dyn OcrEngine> {
    match TesseractEngine::new(config) {
        Ok(engine) => Arc::new(engine),
        Err(e) => {
            tracing::warn!(error = %e, "Tesseract unavailable, image OCR disabled");
            Arc::new(UnavailableOcrEngine::new(e.to_string()))
        }
    }
}

/// Build the OCR engine for this build and host.
#[cfg(not(feature = "ocr"))]
pub fn default_engine(_config: &ExtractionConfig) -> Arc<dyn OcrEngine> {
    tracing::warn!("Built without the `ocr` feature, image OCR disabled");
    Arc::new(UnavailableOcrEngine::new(
        "OCR support not compiled in (enable the `ocr` feature)",
    ))
}

// ═══════════════════════════════════════════════════════════
// Test doubles
// ═══════════════════════════════════════════════════════════

/// Mock OCR engine for unit testing without Tesseract.
pub struct MockOcrEngine {
    pub text: String,
    pub confidence: f32,
}

impl MockOcrEngine {
    pub fn new(text: &str, confidence: f32) -> Self {
        Self {
            text: text.to_string(),
            confidence,
        }
    }
}

impl OcrEngine for MockOcrEngine {
    fn ocr_image(&self, _image_bytes: &[u8]) -> Result<OcrPageResult, ExtractionError> {
        Ok(OcrPageResult {
            text: self.text.clone(),
            confidence: self.confidence,
        })
    }
}

/// Returns queued results in call order; once drained, every call fails.
/// `None` entries simulate a strategy whose OCR call errors.
pub struct ScriptedOcrEngine {
    script: Mutex<VecDeque<Option<String>>>,
}

impl ScriptedOcrEngine {
    pub fn new<I, S>(results: I) -> Self
    where
        I: IntoIterator<Item = Option<S>>,
        S: Into<String>,
    {
        Self {
            script: Mutex::new(results.into_iter().map(|r| r.map(Into::into)).collect()),
        }
    }

    pub fn remaining(&self) -> usize {
        self.script.lock().map(|q| q.len()).unwrap_or(0)
    }
}

impl OcrEngine for ScriptedOcrEngine {
    fn ocr_image(&self, _image_bytes: &[u8]) -> Result<OcrPageResult, ExtractionError> {
        let next = self
            .script
            .lock()
            .map_err(|_| ExtractionError::OcrProcessing("script lock poisoned".into()))?
            .pop_front();
        match next {
            Some(Some(text)) => Ok(OcrPageResult {
                text,
                confidence: 0.9,
            }),
            Some(None) => Err(ExtractionError::OcrProcessing("scripted failure".into())),
            None => Err(ExtractionError::OcrProcessing("script exhausted".into())),
        }
    }
}

/// Always fails with an OCR processing error.
pub struct FailingOcrEngine;

impl OcrEngine for FailingOcrEngine {
    fn ocr_image(&self, _image_bytes: &[u8]) -> Result<OcrPageResult, ExtractionError> {
        Err(ExtractionError::OcrProcessing("engine failure".into()))
    }
}
