//! Canonical metadata record.
//!
//! Every extraction path (DICOM tags, OCR'd report images, PDFs) ends in a
//! `MetadataRecord`. Section and field names here are the canonical keys;
//! producer-native spellings are handled by `pipeline::normalize`.

use std::fmt;
use std::path::Path;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use super::sentinel::{self, not_available, unknown_id, unknown_name};

/// Technique that produced a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    /// Direct reads from a DICOM tag dictionary.
    #[serde(alias = "structured-tag", alias = "dicom")]
    StructuredTag,
    /// Recognition + field parsing on a raster image (or rasterized PDF pages).
    #[serde(alias = "tesseract_ocr", alias = "pdf_to_image_ocr")]
    Ocr,
    /// Recognition ran but found no patient identity block.
    BasicImageOnly,
    /// Field parsing on a PDF's embedded text layer.
    #[serde(alias = "text")]
    DocumentText,
}

impl ExtractionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StructuredTag => "structured_tag",
            Self::Ocr => "ocr",
            Self::BasicImageOnly => "basic_image_only",
            Self::DocumentText => "document_text",
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Sections
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileInfo {
    #[serde(default)]
    pub filename: String,
    /// Size in MB, rounded to 2 decimals.
    #[serde(default)]
    pub file_size_mb: f64,
    #[serde(default = "not_available_string")]
    pub format: String,
}

fn not_available_string() -> String {
    sentinel::NOT_AVAILABLE.to_string()
}

impl FileInfo {
    pub fn new(filename: impl Into<String>, size_bytes: u64, format: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            file_size_mb: round_megabytes(size_bytes),
            format: format.into(),
        }
    }

    /// Base name and on-disk size of `path`.
    pub fn from_path(path: &Path, format: impl Into<String>) -> std::io::Result<Self> {
        let size = std::fs::metadata(path)?.len();
        Ok(Self::new(base_name(path), size, format))
    }
}

/// Final path component, lossily decoded.
pub fn base_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn round_megabytes(bytes: u64) -> f64 {
    (bytes as f64 / (1024.0 * 1024.0) * 100.0).round() / 100.0
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatientInformation {
    #[serde(with = "unknown_name", default)]
    pub patient_name: Option<String>,
    #[serde(with = "unknown_id", default)]
    pub patient_id: Option<String>,
    /// Single-letter code when known (`M` / `F` / DICOM `O`).
    #[serde(with = "not_available", default)]
    pub patient_sex: Option<String>,
    /// Raw age string, unit embedded for DICOM (`044Y`), bare digits for OCR (`44`).
    #[serde(with = "not_available", default)]
    pub patient_age: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "not_available::deserialize"
    )]
    pub patient_birth_date: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "not_available::deserialize"
    )]
    pub patient_weight: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StudyInformation {
    /// Raw textual date as found; ISO normalization happens at storage.
    #[serde(with = "not_available", default)]
    pub study_date: Option<String>,
    #[serde(with = "not_available", default)]
    pub study_description: Option<String>,
    #[serde(with = "not_available", default)]
    pub modality: Option<String>,
    #[serde(with = "not_available", default)]
    pub report_type: Option<String>,
    #[serde(with = "not_available", default)]
    pub examination: Option<String>,
    #[serde(with = "not_available", default)]
    pub referring_physician: Option<String>,
    #[serde(with = "not_available", default)]
    pub accession_number: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "not_available::deserialize"
    )]
    pub study_instance_uid: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "not_available::deserialize"
    )]
    pub study_id: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "not_available::deserialize"
    )]
    pub study_time: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "not_available::deserialize"
    )]
    pub performing_physician: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeriesInformation {
    #[serde(with = "not_available", default)]
    pub series_instance_uid: Option<String>,
    #[serde(with = "not_available", default)]
    pub series_number: Option<String>,
    #[serde(with = "not_available", default)]
    pub series_description: Option<String>,
    #[serde(with = "not_available", default)]
    pub modality: Option<String>,
    #[serde(with = "not_available", default)]
    pub body_part_examined: Option<String>,
    #[serde(with = "not_available", default)]
    pub patient_position: Option<String>,
}

/// Pixel geometry and display window of a DICOM image.
/// Counts default to 0 rather than a placeholder.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageInformation {
    #[serde(default)]
    pub rows: u32,
    #[serde(default)]
    pub columns: u32,
    #[serde(with = "not_available", default)]
    pub window_center: Option<String>,
    #[serde(with = "not_available", default)]
    pub window_width: Option<String>,
    #[serde(with = "not_available", default)]
    pub pixel_spacing: Option<String>,
    #[serde(with = "not_available", default)]
    pub slice_thickness: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EquipmentInformation {
    #[serde(with = "not_available", default)]
    pub manufacturer: Option<String>,
    #[serde(with = "not_available", default)]
    pub manufacturer_model_name: Option<String>,
    #[serde(with = "not_available", default)]
    pub station_name: Option<String>,
    #[serde(with = "not_available", default)]
    pub institution_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionParameters {
    #[serde(with = "not_available", default)]
    pub kvp: Option<String>,
    #[serde(with = "not_available", default)]
    pub exposure_time: Option<String>,
}

/// Raster properties recorded when a scan could not be read as a report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageProperties {
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
    #[serde(default)]
    pub mode: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClinicalInformation {
    #[serde(with = "not_available", default)]
    pub protocol: Option<String>,
    #[serde(with = "not_available", default)]
    pub clinical_brief: Option<String>,
    #[serde(with = "not_available", default)]
    pub observations: Option<String>,
    #[serde(with = "not_available", default)]
    pub impression: Option<String>,
    #[serde(with = "not_available", default)]
    pub advice: Option<String>,
}

impl ClinicalInformation {
    /// True when at least one section carries text.
    pub fn has_content(&self) -> bool {
        [
            &self.protocol,
            &self.clinical_brief,
            &self.observations,
            &self.impression,
            &self.advice,
        ]
        .iter()
        .any(|v| v.is_some())
    }
}

// ═══════════════════════════════════════════════════════════
// Measurements
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub value: f64,
    #[serde(default)]
    pub unit: Option<String>,
}

/// Ordered `{type}_{n}` -> measurement map.
///
/// Kept as a vector so document order survives serialization; keys are
/// 1-indexed per type and only unique within one extraction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Measurements(Vec<(String, Measurement)>);

impl Measurements {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append under the next `{kind}_{n}` key.
    pub fn push(&mut self, kind: &str, measurement: Measurement) {
        let n = self
            .0
            .iter()
            .filter(|(key, _)| key_kind(key) == Some(kind))
            .count()
            + 1;
        self.0.push((format!("{kind}_{n}"), measurement));
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Measurement> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, m)| m)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Measurement)> {
        self.0.iter().map(|(k, m)| (k.as_str(), m))
    }
}

fn key_kind(key: &str) -> Option<&str> {
    let (kind, n) = key.rsplit_once('_')?;
    n.parse::<usize>().ok().map(|_| kind)
}

impl Serialize for Measurements {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, measurement) in &self.0 {
            map.serialize_entry(key, measurement)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Measurements {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct MeasurementsVisitor;

        impl<'de> Visitor<'de> for MeasurementsVisitor {
            type Value = Measurements;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of measurement keys to {value, unit}")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((key, measurement)) = access.next_entry::<String, Measurement>()? {
                    entries.push((key, measurement));
                }
                Ok(Measurements(entries))
            }
        }

        deserializer.deserialize_map(MeasurementsVisitor)
    }
}

// ═══════════════════════════════════════════════════════════
// Processing info + record
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingInfo {
    pub extraction_method: ExtractionMethod,
    /// RFC 3339 timestamp of the extraction.
    #[serde(default)]
    pub extracted_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extractor_version: Option<String>,
    /// Characters of recognized/extracted text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_length: Option<usize>,
    /// Name of the recognition strategy whose output won.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recognition_strategy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ocr_ran: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ocr_raw_text: Option<String>,
}

impl ProcessingInfo {
    pub fn new(extraction_method: ExtractionMethod, extracted_at: impl Into<String>) -> Self {
        Self {
            extraction_method,
            extracted_at: extracted_at.into(),
            extractor_version: None,
            text_length: None,
            recognition_strategy: None,
            source_type: None,
            page_count: None,
            ocr_ran: None,
            ocr_raw_text: None,
        }
    }
}

/// The canonical record every extraction path converges on.
///
/// `file_info`, `patient_information` and `processing_info` are always
/// present; the other sections depend on which producer ran.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataRecord {
    pub file_info: FileInfo,
    #[serde(default)]
    pub patient_information: PatientInformation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub study_information: Option<StudyInformation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub series_information: Option<SeriesInformation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_information: Option<ImageInformation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub equipment_information: Option<EquipmentInformation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acquisition_parameters: Option<AcquisitionParameters>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_properties: Option<ImageProperties>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clinical_information: Option<ClinicalInformation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub measurements: Option<Measurements>,
    pub processing_info: ProcessingInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub all_dicom_tags: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ocr_raw_result: Option<Value>,
}

impl MetadataRecord {
    /// A record with only the mandatory sections filled.
    pub fn new(file_info: FileInfo, processing_info: ProcessingInfo) -> Self {
        Self {
            file_info,
            patient_information: PatientInformation::default(),
            study_information: None,
            series_information: None,
            image_information: None,
            equipment_information: None,
            acquisition_parameters: None,
            image_properties: None,
            clinical_information: None,
            measurements: None,
            processing_info,
            raw_text: None,
            all_dicom_tags: None,
            ocr_raw_result: None,
        }
    }

    pub fn method(&self) -> ExtractionMethod {
        self.processing_info.extraction_method
    }
}

/// What the extraction boundary hands back: a record, or `{"error": msg}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ExtractionOutcome {
    Record(Box<MetadataRecord>),
    Error { error: String },
}

impl ExtractionOutcome {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            error: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    pub fn record(&self) -> Option<&MetadataRecord> {
        match self {
            Self::Record(record) => Some(record),
            Self::Error { .. } => None,
        }
    }

    pub fn into_record(self) -> Option<MetadataRecord> {
        match self {
            Self::Record(record) => Some(*record),
            Self::Error { .. } => None,
        }
    }
}
