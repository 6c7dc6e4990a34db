//! PDF reports: embedded text first, page rasters through recognition when
//! the text layer is too thin to be a real report.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::image_report::ImageReportExtractor;
use super::types::{PdfPageRenderer, PdfTextExtractor};
use super::ExtractionError;
use crate::models::{base_name, FileInfo};
use crate::pipeline::normalize::{DocumentReport, ProducerOutput, TextLayer};
use crate::pipeline::parsing::ParsedReport;
use crate::pipeline_config::ExtractionConfig;

pub struct DocumentExtractor {
    text: Box<dyn PdfTextExtractor>,
    renderer: Box<dyn PdfPageRenderer>,
    images: Arc<ImageReportExtractor>,
    min_text_chars: usize,
    render_dpi: u32,
    use_ocr: bool,
}

impl DocumentExtractor {
    pub fn new(
        text: Box<dyn PdfTextExtractor>,
        renderer: Box<dyn PdfPageRenderer>,
        images: Arc<ImageReportExtractor>,
        config: &ExtractionConfig,
    ) -> Self {
        Self {
            text,
            renderer,
            images,
            min_text_chars: config.min_text_chars,
            render_dpi: config.render_dpi,
            use_ocr: config.use_ocr,
        }
    }

    pub fn extract(&self, path: &Path) -> Result<ProducerOutput, ExtractionError> {
        let bytes = std::fs::read(path)?;
        let file_info = FileInfo::new(base_name(path), bytes.len() as u64, "PDF");

        // An unreadable text layer is treated like an empty one.
        let pages = self.text.extract_pages(&bytes).unwrap_or_else(|e| {
            warn!(file = %file_info.filename, error = %e, "Text layer unreadable");
            Vec::new()
        });
        let text = pages.join("\n");
        let text_chars = text.trim().chars().count();

        if text_chars < self.min_text_chars && self.use_ocr {
            info!(
                file = %file_info.filename,
                text_chars,
                threshold = self.min_text_chars,
                "Text layer below threshold, recognizing page images"
            );
            return self.extract_scanned(&bytes, file_info);
        }

        info!(file = %file_info.filename, pages = pages.len(), text_chars, "PDF text layer extracted");
        Ok(ProducerOutput::Document(DocumentReport {
            file_info,
            parsed: ParsedReport::parse(&text),
            text,
            layer: TextLayer::Embedded,
            page_count: pages.len(),
        }))
    }

    /// Every page is recognized for `raw_text`; only page 1 feeds the
    /// structured sections.
    fn extract_scanned(
        &self,
        bytes: &[u8],
        file_info: FileInfo,
    ) -> Result<ProducerOutput, ExtractionError> {
        let page_count = self.renderer.page_count(bytes)?;

        let mut combined = String::new();
        let mut first: Option<(ParsedReport, Option<String>)> = None;

        for page in 0..page_count {
            let (text, parsed, strategy) = match self.recognize_page(bytes, page) {
                Ok(analysis) => (
                    analysis.recognition.text,
                    analysis.parsed,
                    analysis.recognition.strategy,
                ),
                Err(e) => {
                    warn!(page = page + 1, error = %e, "Page recognition failed, continuing");
                    (String::new(), ParsedReport::default(), None)
                }
            };
            debug!(page = page + 1, text_len = text.chars().count(), "Page recognized");
            combined.push_str(&format!("\n--- Page {} ---\n{}\n", page + 1, text));
            if first.is_none() {
                first = Some((parsed, strategy));
            }
        }

        let (parsed, strategy) = first.unwrap_or_default();
        Ok(ProducerOutput::Document(DocumentReport {
            file_info,
            text: combined,
            parsed,
            layer: TextLayer::Recognized { strategy },
            page_count,
        }))
    }

    fn recognize_page(
        &self,
        bytes: &[u8],
        page: usize,
    ) -> Result<super::ImageAnalysis, ExtractionError> {
        let png = self.renderer.render_page(bytes, page, self.render_dpi)?;
        self.images.analyze(&png)
    }
}
