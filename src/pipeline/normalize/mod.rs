//! Producer outputs and their mapping onto the canonical record.
//!
//! Each extractor hands back one `ProducerOutput` variant carrying its own
//! native fields. `normalize` is the only place those shapes are turned into
//! a `MetadataRecord`, so consumers never branch on which producer ran.

pub mod reader;

pub use reader::read_record;

use chrono::Local;

use crate::config::EXTRACTOR_VERSION;
use crate::models::{
    ClinicalInformation, ExtractionMethod, FileInfo, ImageProperties, MetadataRecord,
    PatientInformation, ProcessingInfo, StudyInformation,
};
use crate::pipeline::parsing::ParsedReport;

/// Report image whose text carried a patient identity block.
#[derive(Debug, Clone)]
pub struct RecognizedReport {
    pub file_info: FileInfo,
    pub text: String,
    pub strategy: Option<String>,
    pub parsed: ParsedReport,
}

/// Image that recognized as nothing, or as text without identity fields.
#[derive(Debug, Clone)]
pub struct UnrecognizedImage {
    pub file_info: FileInfo,
    pub properties: ImageProperties,
    pub text: String,
}

/// Where a document's text came from.
#[derive(Debug, Clone, PartialEq)]
pub enum TextLayer {
    /// Embedded text layer.
    Embedded,
    /// Pages rasterized and recognized; fields come from the first page only.
    Recognized { strategy: Option<String> },
}

#[derive(Debug, Clone)]
pub struct DocumentReport {
    pub file_info: FileInfo,
    pub text: String,
    pub parsed: ParsedReport,
    pub layer: TextLayer,
    pub page_count: usize,
}

#[derive(Debug, Clone)]
pub enum ProducerOutput {
    /// Already canonical.
    StructuredTag(Box<MetadataRecord>),
    RecognizedImage(RecognizedReport),
    UnrecognizedImage(UnrecognizedImage),
    Document(DocumentReport),
}

/// Current local time, RFC 3339.
pub fn now_rfc3339() -> String {
    Local::now().to_rfc3339()
}

pub fn normalize(output: ProducerOutput) -> MetadataRecord {
    normalize_at(output, &now_rfc3339())
}

/// `extracted_at` stamps every record built here; structured-tag records
/// keep the timestamp they were read with.
pub fn normalize_at(output: ProducerOutput, extracted_at: &str) -> MetadataRecord {
    match output {
        ProducerOutput::StructuredTag(record) => *record,
        ProducerOutput::RecognizedImage(report) => {
            let mut processing = ProcessingInfo::new(ExtractionMethod::Ocr, extracted_at);
            processing.recognition_strategy = report.strategy;
            parsed_record(report.file_info, report.text, report.parsed, processing)
        }
        ProducerOutput::UnrecognizedImage(image) => fallback_record(image, extracted_at),
        ProducerOutput::Document(doc) => {
            let mut processing = match doc.layer {
                TextLayer::Embedded => {
                    let mut p = ProcessingInfo::new(ExtractionMethod::DocumentText, extracted_at);
                    p.source_type = Some("text_pdf".into());
                    p
                }
                TextLayer::Recognized { strategy } => {
                    let mut p = ProcessingInfo::new(ExtractionMethod::Ocr, extracted_at);
                    p.source_type = Some("ocr_pdf".into());
                    p.recognition_strategy = strategy;
                    p
                }
            };
            processing.page_count = Some(doc.page_count);
            parsed_record(doc.file_info, doc.text, doc.parsed, processing)
        }
    }
}

fn parsed_record(
    file_info: FileInfo,
    text: String,
    parsed: ParsedReport,
    mut processing: ProcessingInfo,
) -> MetadataRecord {
    processing.extractor_version = Some(EXTRACTOR_VERSION.to_string());
    processing.text_length = Some(text.chars().count());

    let raw_result = serde_json::to_value(&parsed).ok();
    let ParsedReport {
        patient,
        report,
        clinical,
        measurements,
    } = parsed;

    let mut record = MetadataRecord::new(file_info, processing);
    record.patient_information = PatientInformation {
        patient_name: patient.patient_name,
        patient_id: patient.patient_id,
        patient_sex: patient.patient_sex,
        patient_age: patient.patient_age,
        ..Default::default()
    };
    record.study_information = Some(StudyInformation {
        study_date: report.report_date,
        study_description: report.study_type,
        modality: report.modality,
        report_type: report.report_type,
        examination: report.examination,
        referring_physician: report.referring_physician,
        accession_number: patient.accession_number,
        ..Default::default()
    });
    record.clinical_information = Some(ClinicalInformation {
        protocol: clinical.protocol,
        clinical_brief: clinical.clinical_brief,
        observations: clinical.observations,
        impression: clinical.impression,
        advice: clinical.advice,
    });
    record.measurements = Some(measurements);
    record.raw_text = Some(text);
    record.ocr_raw_result = raw_result;
    record
}

/// Minimal record: raster facts and whatever text came back, so a missed
/// report can be audited.
fn fallback_record(image: UnrecognizedImage, extracted_at: &str) -> MetadataRecord {
    let mut processing = ProcessingInfo::new(ExtractionMethod::BasicImageOnly, extracted_at);
    processing.ocr_ran = Some(true);
    processing.ocr_raw_text = Some(image.text);

    let mut record = MetadataRecord::new(image.file_info, processing);
    record.image_properties = Some(image.properties);
    record
}
