//! Best-of-N recognition.
//!
//! A `RecognitionPolicy` is an ordered list of preprocessing strategies and
//! a scoring rule. The engine OCRs every strategy's output and keeps the
//! highest-scoring text; on equal scores the earlier strategy wins.

use std::sync::Arc;

use image::RgbImage;
use tracing::{debug, warn};

use super::engine::OcrEngine;
use super::preprocess::{auto_threshold, encode_gray_png, encode_png, median_denoise, rgb_to_gray, upscale};
use crate::pipeline::extraction::ExtractionError;

/// Name reported when the last-resort pass on the unprepared image produced the text.
pub const DIRECT_UNPROCESSED: &str = "direct_unprocessed";

/// One way of preparing an image for OCR.
pub trait RecognitionStrategy: Send + Sync {
    fn name(&self) -> &str;

    /// Encoded image handed to the OCR engine.
    fn prepare(&self, image: &RgbImage) -> Result<Vec<u8>, ExtractionError>;
}

/// The color-normalized image as-is.
pub struct DirectStrategy;

impl RecognitionStrategy for DirectStrategy {
    fn name(&self) -> &str {
        "direct"
    }

    fn prepare(&self, image: &RgbImage) -> Result<Vec<u8>, ExtractionError> {
        encode_png(image)
    }
}

/// Grayscale, bicubic upscale, then Otsu threshold.
pub struct UpscaleThresholdStrategy {
    pub factor: u32,
}

impl RecognitionStrategy for UpscaleThresholdStrategy {
    fn name(&self) -> &str {
        "upscale_threshold"
    }

    fn prepare(&self, image: &RgbImage) -> Result<Vec<u8>, ExtractionError> {
        let gray = upscale(&rgb_to_gray(image), self.factor);
        encode_gray_png(&auto_threshold(&gray))
    }
}

/// Grayscale, median denoise, then Otsu threshold.
pub struct DenoiseThresholdStrategy {
    pub radius: u32,
}

impl RecognitionStrategy for DenoiseThresholdStrategy {
    fn name(&self) -> &str {
        "denoise_threshold"
    }

    fn prepare(&self, image: &RgbImage) -> Result<Vec<u8>, ExtractionError> {
        let gray = median_denoise(&rgb_to_gray(image), self.radius);
        encode_gray_png(&auto_threshold(&gray))
    }
}

/// Text produced by one strategy.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub strategy: String,
    pub text: String,
}

pub struct RecognitionPolicy {
    strategies: Vec<Box<dyn RecognitionStrategy>>,
}

impl RecognitionPolicy {
    pub fn new(strategies: Vec<Box<dyn RecognitionStrategy>>) -> Self {
        Self { strategies }
    }

    /// Direct, then upscale+threshold, then denoise+threshold.
    pub fn standard(upscale_factor: u32) -> Self {
        Self::new(vec![
            Box::new(DirectStrategy),
            Box::new(UpscaleThresholdStrategy {
                factor: upscale_factor,
            }),
            Box::new(DenoiseThresholdStrategy { radius: 1 }),
        ])
    }

    pub fn strategies(&self) -> &[Box<dyn RecognitionStrategy>] {
        &self.strategies
    }

    /// More recovered characters is taken as more complete recognition.
    pub fn score(text: &str) -> usize {
        text.chars().count()
    }

    /// Longest non-empty candidate; the earliest one wins a tie.
    pub fn select_best(candidates: Vec<Candidate>) -> Option<Candidate> {
        let mut best: Option<Candidate> = None;
        for candidate in candidates {
            let score = Self::score(&candidate.text);
            if score == 0 {
                continue;
            }
            let better = match &best {
                Some(current) => score > Self::score(&current.text),
                None => true,
            };
            if better {
                best = Some(candidate);
            }
        }
        best
    }
}

/// Outcome of recognition. `text` is empty when nothing was recognized.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Recognition {
    pub text: String,
    /// Winning strategy, `None` when the text is empty.
    pub strategy: Option<String>,
}

impl Recognition {
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Runs a policy against an OCR engine. Never fails: strategy errors are
/// logged and skipped.
pub struct RecognitionEngine {
    ocr: Arc<dyn OcrEngine>,
    policy: RecognitionPolicy,
}

impl RecognitionEngine {
    pub fn new(ocr: Arc<dyn OcrEngine>, policy: RecognitionPolicy) -> Self {
        Self { ocr, policy }
    }

    /// `image` must already be 3-channel. `raw` is the original encoded file,
    /// handed to the last-resort pass only if `image` cannot be re-encoded.
    pub fn recognize(&self, raw: &[u8], image: &RgbImage) -> Recognition {
        let mut candidates = Vec::with_capacity(self.policy.strategies.len());

        for strategy in &self.policy.strategies {
            match self.run_strategy(strategy.as_ref(), image) {
                Ok(text) => {
                    debug!(
                        strategy = strategy.name(),
                        chars = RecognitionPolicy::score(&text),
                        "Recognition strategy finished"
                    );
                    candidates.push(Candidate {
                        strategy: strategy.name().to_string(),
                        text,
                    });
                }
                Err(e) => {
                    warn!(strategy = strategy.name(), error = %e, "Recognition strategy failed, skipping");
                }
            }
        }

        if candidates.is_empty() {
            return self.recognize_unprocessed(raw, image);
        }

        match RecognitionPolicy::select_best(candidates) {
            Some(best) => Recognition {
                text: best.text,
                strategy: Some(best.strategy),
            },
            None => Recognition::default(),
        }
    }

    fn run_strategy(
        &self,
        strategy: &dyn RecognitionStrategy,
        image: &RgbImage,
    ) -> Result<String, ExtractionError> {
        let prepared = strategy.prepare(image)?;
        let result = self.ocr.ocr_image(&prepared)?;
        Ok(result.text.trim().to_string())
    }

    fn recognize_unprocessed(&self, raw: &[u8], image: &RgbImage) -> Recognition {
        warn!("All recognition strategies failed, trying unprocessed image");
        let encoded = encode_png(image);
        let bytes = match &encoded {
            Ok(png) => png.as_slice(),
            Err(e) => {
                warn!(error = %e, "Re-encoding normalized image failed, using original bytes");
                raw
            }
        };
        match self.ocr.ocr_image(bytes) {
            Ok(result) => {
                let text = result.text.trim().to_string();
                let strategy = (!text.is_empty()).then(|| DIRECT_UNPROCESSED.to_string());
                Recognition { text, strategy }
            }
            Err(e) => {
                warn!(error = %e, "Unprocessed recognition failed");
                Recognition::default()
            }
        }
    }
}
