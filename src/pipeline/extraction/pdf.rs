use std::sync::Mutex;

use super::types::PdfTextExtractor;
use super::ExtractionError;

/// Reads the embedded text layer with pdf-extract.
pub struct PdfExtractTextExtractor;

impl PdfTextExtractor for PdfExtractTextExtractor {
    fn extract_pages(&self, pdf_bytes: &[u8]) -> Result<Vec<String>, ExtractionError> {
        pdf_extract::extract_text_from_mem_by_pages(pdf_bytes)
            .map_err(|e| ExtractionError::PdfParsing(e.to_string()))
    }
}

// ── Mock for testing ──────────────────────────────────────

/// Returns fixed page texts, or a parsing error when built with `failing()`.
pub struct MockPdfTextExtractor {
    pages: Option<Vec<String>>,
    calls: Mutex<usize>,
}

impl MockPdfTextExtractor {
    pub fn new<I, S>(pages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            pages: Some(pages.into_iter().map(Into::into).collect()),
            calls: Mutex::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            pages: None,
            calls: Mutex::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.lock().map(|c| *c).unwrap_or(0)
    }
}

impl PdfTextExtractor for MockPdfTextExtractor {
    fn extract_pages(&self, _pdf_bytes: &[u8]) -> Result<Vec<String>, ExtractionError> {
        if let Ok(mut calls) = self.calls.lock() {
            *calls += 1;
        }
        self.pages
            .clone()
            .ok_or_else(|| ExtractionError::PdfParsing("mock text layer unreadable".into()))
    }
}
