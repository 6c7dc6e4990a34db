use std::path::Path;

use tracing::{debug, info};

use super::ExtractionError;
use crate::models::{base_name, FileInfo, ImageProperties};
use crate::pipeline::normalize::{ProducerOutput, RecognizedReport, UnrecognizedImage};
use crate::pipeline::parsing::ParsedReport;
use crate::pipeline::recognition::preprocess::{decode_image, normalize_color};
use crate::pipeline::recognition::{Recognition, RecognitionEngine};

/// Characters of recognized text logged when no identity block was found.
const FALLBACK_PREVIEW_CHARS: usize = 200;

/// Recognition plus field parsing over one encoded raster.
pub struct ImageAnalysis {
    pub format: &'static str,
    pub properties: ImageProperties,
    pub recognition: Recognition,
    pub parsed: ParsedReport,
}

impl ImageAnalysis {
    pub fn text_len(&self) -> usize {
        self.recognition.text.chars().count()
    }
}

/// Scanned or photographed report images.
pub struct ImageReportExtractor {
    recognition: RecognitionEngine,
}

impl ImageReportExtractor {
    pub fn new(recognition: RecognitionEngine) -> Self {
        Self { recognition }
    }

    /// Decode, convert to RGB, recognize and parse. Fails only when the
    /// bytes are not a readable raster.
    pub fn analyze(&self, bytes: &[u8]) -> Result<ImageAnalysis, ExtractionError> {
        let decoded = decode_image(bytes)?;
        let properties = ImageProperties {
            width: decoded.width(),
            height: decoded.height(),
            mode: decoded.mode().to_string(),
        };
        // Converted copy lives only for this call.
        let recognition = {
            let normalized = normalize_color(&decoded.image);
            self.recognition.recognize(bytes, &normalized.rgb)
        };
        let parsed = ParsedReport::parse(&recognition.text);

        Ok(ImageAnalysis {
            format: decoded.format,
            properties,
            recognition,
            parsed,
        })
    }

    pub fn extract(&self, path: &Path) -> Result<ProducerOutput, ExtractionError> {
        let bytes = std::fs::read(path)?;
        let analysis = self.analyze(&bytes)?;
        let file_info = FileInfo::new(base_name(path), bytes.len() as u64, analysis.format);
        let patient_found = analysis.parsed.has_identity();

        info!(
            file = %file_info.filename,
            text_len = analysis.text_len(),
            patient_found,
            "Image report recognized"
        );

        if patient_found {
            return Ok(ProducerOutput::RecognizedImage(RecognizedReport {
                file_info,
                text: analysis.recognition.text,
                strategy: analysis.recognition.strategy,
                parsed: analysis.parsed,
            }));
        }

        let preview: String = analysis
            .recognition
            .text
            .chars()
            .take(FALLBACK_PREVIEW_CHARS)
            .collect();
        debug!(file = %file_info.filename, preview = %preview, "No patient identity found, keeping minimal record");

        Ok(ProducerOutput::UnrecognizedImage(UnrecognizedImage {
            file_info,
            properties: analysis.properties,
            text: analysis.recognition.text,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use image::{Rgba, RgbaImage};

    use crate::pipeline::recognition::preprocess::encode_png;
    use crate::pipeline::recognition::{FailingOcrEngine, MockOcrEngine, OcrEngine, RecognitionPolicy};

    fn extractor(ocr: Arc<dyn OcrEngine>) -> ImageReportExtractor {
        ImageReportExtractor::new(RecognitionEngine::new(ocr, RecognitionPolicy::standard(2)))
    }

    fn white_png() -> Vec<u8> {
        encode_png(&image::RgbImage::from_pixel(40, 30, image::Rgb([255, 255, 255]))).unwrap()
    }

    fn write(dir: &tempfile::TempDir, name: &str, bytes: &[u8]) -> std::path::PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn identity_block_gives_recognized_report() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "report.png", &white_png());
        let ocr = Arc::new(MockOcrEngine::new("Patient Name: JOHN DOE\nPatient ID: OPD1234567", 0.9));

        let ProducerOutput::RecognizedImage(report) = extractor(ocr).extract(&path).unwrap() else {
            panic!("expected recognized report");
        };
        assert_eq!(report.file_info.filename, "report.png");
        assert_eq!(report.file_info.format, "PNG");
        assert_eq!(report.parsed.patient.patient_name.as_deref(), Some("JOHN DOE"));
        assert!(report.strategy.is_some());
    }

    #[test]
    fn text_without_identity_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "photo.png", &white_png());
        let ocr = Arc::new(MockOcrEngine::new("Radiology Department\nIMPRESSION: Normal", 0.8));

        let ProducerOutput::UnrecognizedImage(image) = extractor(ocr).extract(&path).unwrap() else {
            panic!("expected fallback");
        };
        assert_eq!(image.properties.width, 40);
        assert_eq!(image.properties.height, 30);
        assert_eq!(image.properties.mode, "RGB");
        assert!(image.text.contains("Radiology Department"));
    }

    #[test]
    fn failed_recognition_falls_back_with_empty_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "blank.png", &white_png());

        let ProducerOutput::UnrecognizedImage(image) =
            extractor(Arc::new(FailingOcrEngine)).extract(&path).unwrap()
        else {
            panic!("expected fallback");
        };
        assert!(image.text.is_empty());
    }

    #[test]
    fn alpha_images_are_analyzed() {
        let rgba = RgbaImage::from_pixel(20, 20, Rgba([255, 255, 255, 0]));
        let mut bytes = std::io::Cursor::new(Vec::new());
        image::DynamicImage::ImageRgba8(rgba)
            .write_to(&mut bytes, image::ImageOutputFormat::Png)
            .unwrap();
        let ocr = Arc::new(MockOcrEngine::new("Patient ID: OPD7654321", 0.9));

        let analysis = extractor(ocr).analyze(bytes.get_ref()).unwrap();
        assert_eq!(analysis.properties.mode, "RGBA");
        assert_eq!(analysis.parsed.patient.patient_id.as_deref(), Some("OPD7654321"));
    }

    #[test]
    fn corrupt_image_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "broken.jpg", &[0xFF, 0xD8, 0xFF, 0x00].repeat(40));
        let ocr = Arc::new(MockOcrEngine::new("anything", 0.5));
        assert!(matches!(
            extractor(ocr).extract(&path),
            Err(ExtractionError::ImageProcessing(_))
        ));
    }
}
