use std::path::Path;
use std::sync::Arc;

use super::dicom::DicomExtractor;
use super::document::DocumentExtractor;
use super::image_report::ImageReportExtractor;
use super::pdf::PdfExtractTextExtractor;
use super::pdfium::default_page_renderer;
use super::types::{PdfPageRenderer, PdfTextExtractor};
use super::{ExtractionError, FileKind};
use crate::models::ExtractionOutcome;
use crate::pipeline::normalize::{normalize, ProducerOutput};
use crate::pipeline::recognition::{default_engine, OcrEngine, RecognitionEngine, RecognitionPolicy};
use crate::pipeline_config::ExtractionConfig;

/// Routes a file to its extractor by extension and normalizes the result.
///
/// Trait objects at the OCR and PDF seams so tests can inject mocks.
pub struct MetadataExtractor {
    dicom: DicomExtractor,
    images: Arc<ImageReportExtractor>,
    documents: DocumentExtractor,
}

impl MetadataExtractor {
    /// Tesseract (when built with `ocr`), pdf-extract and PDFium or lopdf.
    pub fn new(config: &ExtractionConfig) -> Self {
        Self::with_components(
            default_engine(config),
            Box::new(PdfExtractTextExtractor),
            default_page_renderer(),
            config,
        )
    }

    pub fn with_components(
        ocr: Arc<dyn OcrEngine>,
        pdf_text: Box<dyn PdfTextExtractor>,
        pdf_renderer: Box<dyn PdfPageRenderer>,
        config: &ExtractionConfig,
    ) -> Self {
        let recognition =
            RecognitionEngine::new(ocr, RecognitionPolicy::standard(config.upscale_factor));
        let images = Arc::new(ImageReportExtractor::new(recognition));
        let documents = DocumentExtractor::new(pdf_text, pdf_renderer, images.clone(), config);
        Self {
            dicom: DicomExtractor,
            images,
            documents,
        }
    }

    /// Extension taken from the path itself.
    pub fn extract(&self, path: &Path) -> ExtractionOutcome {
        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.extract_with_extension(path, &extension)
    }

    /// Never fails: unsupported extensions and extractor errors come back
    /// as `ExtractionOutcome::Error`.
    pub fn extract_with_extension(&self, path: &Path, extension: &str) -> ExtractionOutcome {
        let Some(kind) = FileKind::from_extension(extension) else {
            let shown = format!(".{}", extension.trim_start_matches('.').to_ascii_lowercase());
            tracing::warn!(path = %path.display(), extension = %shown, "Unsupported file format");
            return ExtractionOutcome::error(format!("Unsupported file format: {shown}"));
        };

        tracing::info!(path = %path.display(), kind = ?kind, "Extracting metadata");
        match self.produce(kind, path) {
            Ok(output) => ExtractionOutcome::Record(Box::new(normalize(output))),
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "Extraction failed");
                ExtractionOutcome::error(format!("Extraction failed: {e}"))
            }
        }
    }

    /// Producer output before normalization.
    pub fn produce(&self, kind: FileKind, path: &Path) -> Result<ProducerOutput, ExtractionError> {
        match kind {
            FileKind::Dicom => self
                .dicom
                .extract(path)
                .map(|record| ProducerOutput::StructuredTag(Box::new(record))),
            FileKind::Image => self.images.extract(path),
            FileKind::Document => self.documents.extract(path),
        }
    }
}
