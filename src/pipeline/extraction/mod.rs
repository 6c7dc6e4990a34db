pub mod types;
pub mod dicom;
pub mod image_report;
pub mod document;
pub mod pdf;
pub mod pdfium;
pub mod pdf_renderer;
pub mod orchestrator;

pub use types::*;
pub use dicom::DicomExtractor;
pub use image_report::{ImageAnalysis, ImageReportExtractor};
pub use document::DocumentExtractor;
pub use pdf::*;
pub use orchestrator::*;

use thiserror::Error;

use crate::models::UploadSource;

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("Image processing error: {0}")]
    ImageProcessing(String),

    #[error("Tesseract OCR initialization failed: {0}")]
    OcrInit(String),

    #[error("OCR processing failed: {0}")]
    OcrProcessing(String),

    #[error("PDF parsing failed: {0}")]
    PdfParsing(String),

    #[error("PDF rendering failed on page {page}: {reason}")]
    PdfRendering { page: usize, reason: String },

    #[error("DICOM read failed: {0}")]
    Dicom(String),

    #[error("Normalization failed: {0}")]
    Normalization(String),
}

/// Which extractor handles a file, decided from its extension alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Dicom,
    Image,
    Document,
}

impl FileKind {
    /// Case-insensitive, with or without the leading dot.
    pub fn from_extension(extension: &str) -> Option<Self> {
        let ext = extension.trim_start_matches('.').to_ascii_lowercase();
        match ext.as_str() {
            "dcm" | "dicom" | "dic" => Some(Self::Dicom),
            "jpg" | "jpeg" | "png" | "tif" | "tiff" => Some(Self::Image),
            "pdf" => Some(Self::Document),
            _ => None,
        }
    }

    /// Storage branch for records of this kind.
    pub fn upload_source(&self) -> UploadSource {
        match self {
            Self::Dicom => UploadSource::Dicom,
            Self::Image => UploadSource::OcrImage,
            Self::Document => UploadSource::Pdf,
        }
    }
}
