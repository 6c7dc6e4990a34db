//! Structured-tag extraction from DICOM files.
//!
//! Fields are read by tag; nothing is parsed out of free text, so the
//! record comes out canonical. Missing text tags stay `None` (serialized as
//! "N/A"), missing pixel geometry is 0.

use std::path::Path;

use dicom_core::dictionary::{DataDictionary, DataDictionaryEntry};
use dicom_core::{Tag, VR};
use dicom_dictionary_std::{tags, StandardDataDictionary};
use dicom_object::InMemDicomObject;
use serde_json::{Map, Value};
use tracing::info;

use super::ExtractionError;
use crate::config::{EXTRACTOR_VERSION, MAX_TAG_VALUE_CHARS};
use crate::models::{
    AcquisitionParameters, EquipmentInformation, ExtractionMethod, FileInfo, ImageInformation,
    MetadataRecord, PatientInformation, ProcessingInfo, SeriesInformation, StudyInformation,
};
use crate::pipeline::normalize::now_rfc3339;

#[derive(Debug, Default, Clone, Copy)]
pub struct DicomExtractor;

impl DicomExtractor {
    pub fn extract(&self, path: &Path) -> Result<MetadataRecord, ExtractionError> {
        let file_info = FileInfo::from_path(path, "DICOM")?;
        let object = dicom_object::open_file(path)
            .map_err(|e| ExtractionError::Dicom(e.to_string()))?;
        let record = record_from_object(&object, file_info, &now_rfc3339());
        info!(
            file = %record.file_info.filename,
            tags = record.all_dicom_tags.as_ref().map_or(0, Map::len),
            "DICOM tags extracted"
        );
        Ok(record)
    }
}

/// Build the canonical record from an in-memory data set.
pub fn record_from_object(
    obj: &InMemDicomObject,
    file_info: FileInfo,
    extracted_at: &str,
) -> MetadataRecord {
    let mut processing = ProcessingInfo::new(ExtractionMethod::StructuredTag, extracted_at);
    processing.extractor_version = Some(EXTRACTOR_VERSION.to_string());

    let mut record = MetadataRecord::new(file_info, processing);
    record.patient_information = PatientInformation {
        patient_name: text(obj, tags::PATIENT_NAME),
        patient_id: text(obj, tags::PATIENT_ID),
        patient_sex: text(obj, tags::PATIENT_SEX),
        patient_age: text(obj, tags::PATIENT_AGE),
        patient_birth_date: text(obj, tags::PATIENT_BIRTH_DATE),
        patient_weight: text(obj, tags::PATIENT_WEIGHT),
    };
    record.study_information = Some(StudyInformation {
        study_date: text(obj, tags::STUDY_DATE).map(|d| format_dicom_date(&d)),
        study_description: text(obj, tags::STUDY_DESCRIPTION),
        modality: text(obj, tags::MODALITY),
        referring_physician: text(obj, tags::REFERRING_PHYSICIAN_NAME),
        accession_number: text(obj, tags::ACCESSION_NUMBER),
        study_instance_uid: text(obj, tags::STUDY_INSTANCE_UID),
        study_id: text(obj, tags::STUDY_ID),
        study_time: text(obj, tags::STUDY_TIME),
        performing_physician: text(obj, tags::PERFORMING_PHYSICIAN_NAME),
        ..Default::default()
    });
    record.series_information = Some(SeriesInformation {
        series_instance_uid: text(obj, tags::SERIES_INSTANCE_UID),
        series_number: text(obj, tags::SERIES_NUMBER),
        series_description: text(obj, tags::SERIES_DESCRIPTION),
        modality: text(obj, tags::MODALITY),
        body_part_examined: text(obj, tags::BODY_PART_EXAMINED),
        patient_position: text(obj, tags::PATIENT_POSITION),
    });
    record.image_information = Some(ImageInformation {
        rows: count(obj, tags::ROWS),
        columns: count(obj, tags::COLUMNS),
        window_center: text(obj, tags::WINDOW_CENTER),
        window_width: text(obj, tags::WINDOW_WIDTH),
        pixel_spacing: text(obj, tags::PIXEL_SPACING),
        slice_thickness: text(obj, tags::SLICE_THICKNESS),
    });
    record.equipment_information = Some(EquipmentInformation {
        manufacturer: text(obj, tags::MANUFACTURER),
        manufacturer_model_name: text(obj, tags::MANUFACTURER_MODEL_NAME),
        station_name: text(obj, tags::STATION_NAME),
        institution_name: text(obj, tags::INSTITUTION_NAME),
    });
    record.acquisition_parameters = Some(AcquisitionParameters {
        kvp: text(obj, tags::KVP),
        exposure_time: text(obj, tags::EXPOSURE_TIME),
    });
    record.all_dicom_tags = Some(all_tags(obj));
    record
}

fn text(obj: &InMemDicomObject, tag: Tag) -> Option<String> {
    let element = obj.element(tag).ok()?;
    let value = element.to_str().ok()?;
    let value = value.trim_matches(|c: char| c.is_whitespace() || c == '\0');
    (!value.is_empty()).then(|| value.to_string())
}

fn count(obj: &InMemDicomObject, tag: Tag) -> u32 {
    obj.element(tag)
        .ok()
        .and_then(|e| e.to_int::<u32>().ok())
        .unwrap_or(0)
}

/// `YYYYMMDD` -> `YYYY-MM-DD`; anything else is returned unchanged.
pub fn format_dicom_date(date: &str) -> String {
    if date.len() == 8 && date.bytes().all(|b| b.is_ascii_digit()) {
        format!("{}-{}-{}", &date[..4], &date[4..6], &date[6..])
    } else {
        date.to_string()
    }
}

/// Every non-sequence element, keyed by dictionary alias (or `(gggg,eeee)`
/// for private tags), values capped at `MAX_TAG_VALUE_CHARS`.
fn all_tags(obj: &InMemDicomObject) -> Map<String, Value> {
    let mut out = Map::new();
    for element in obj {
        let header = element.header();
        if header.vr == VR::SQ {
            continue;
        }
        let key = StandardDataDictionary
            .by_tag(header.tag)
            .map(|entry| entry.alias().to_string())
            .unwrap_or_else(|| header.tag.to_string());
        let value = if header.tag == tags::PIXEL_DATA {
            "<pixel data>".to_string()
        } else {
            match element.to_str() {
                Ok(v) => truncate(v.trim_end_matches(['\0', ' '])),
                Err(_) => format!("<{:?} value>", header.vr),
            }
        };
        out.insert(key, Value::String(value));
    }
    out
}

fn truncate(value: &str) -> String {
    if value.chars().count() > MAX_TAG_VALUE_CHARS {
        let head: String = value.chars().take(MAX_TAG_VALUE_CHARS).collect();
        format!("{head}...")
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dicom_core::{DataElement, PrimitiveValue};
    use dicom_dictionary_std::uids;
    use dicom_object::meta::FileMetaTableBuilder;

    const AT: &str = "2025-11-22T10:00:00+00:00";

    fn sample_object() -> InMemDicomObject {
        InMemDicomObject::from_element_iter([
            DataElement::new(tags::PATIENT_NAME, VR::PN, PrimitiveValue::from("DOE^JOHN")),
            DataElement::new(tags::PATIENT_ID, VR::LO, PrimitiveValue::from("PID-001")),
            DataElement::new(tags::PATIENT_SEX, VR::CS, PrimitiveValue::from("M")),
            DataElement::new(tags::PATIENT_AGE, VR::AS, PrimitiveValue::from("044Y")),
            DataElement::new(tags::STUDY_DATE, VR::DA, PrimitiveValue::from("20251122")),
            DataElement::new(tags::STUDY_DESCRIPTION, VR::LO, PrimitiveValue::from("CT CHEST")),
            DataElement::new(tags::MODALITY, VR::CS, PrimitiveValue::from("CT")),
            DataElement::new(tags::ROWS, VR::US, PrimitiveValue::from(512_u16)),
            DataElement::new(tags::COLUMNS, VR::US, PrimitiveValue::from(512_u16)),
            DataElement::new(tags::INSTITUTION_NAME, VR::LO, PrimitiveValue::from("x".repeat(250))),
        ])
    }

    #[test]
    fn reads_identity_and_study_tags() {
        let record = record_from_object(&sample_object(), FileInfo::new("ct.dcm", 1024, "DICOM"), AT);
        assert_eq!(record.method(), ExtractionMethod::StructuredTag);
        assert_eq!(record.patient_information.patient_name.as_deref(), Some("DOE^JOHN"));
        assert_eq!(record.patient_information.patient_age.as_deref(), Some("044Y"));
        let study = record.study_information.as_ref().unwrap();
        assert_eq!(study.study_date.as_deref(), Some("2025-11-22"));
        assert_eq!(study.modality.as_deref(), Some("CT"));
        let image = record.image_information.as_ref().unwrap();
        assert_eq!((image.rows, image.columns), (512, 512));
        assert_eq!(record.processing_info.extractor_version.as_deref(), Some("1.0"));
    }

    #[test]
    fn missing_tags_use_sentinels_and_zero() {
        let obj = InMemDicomObject::from_element_iter([DataElement::new(
            tags::MODALITY,
            VR::CS,
            PrimitiveValue::from("MR"),
        )]);
        let record = record_from_object(&obj, FileInfo::new("mr.dcm", 10, "DICOM"), AT);
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["patient_information"]["patient_name"], "Unknown");
        assert_eq!(value["patient_information"]["patient_id"], "UNKNOWN");
        assert_eq!(value["study_information"]["study_description"], "N/A");
        assert_eq!(value["image_information"]["rows"], 0);
        assert_eq!(value["image_information"]["window_center"], "N/A");
    }

    #[test]
    fn all_tags_keyed_by_alias_and_truncated() {
        let record = record_from_object(&sample_object(), FileInfo::new("ct.dcm", 1024, "DICOM"), AT);
        let tags = record.all_dicom_tags.unwrap();
        assert_eq!(tags["PatientName"], "DOE^JOHN");
        let institution = tags["InstitutionName"].as_str().unwrap();
        assert_eq!(institution.chars().count(), MAX_TAG_VALUE_CHARS + 3);
        assert!(institution.ends_with("..."));
    }

    #[test]
    fn dicom_date_formatting() {
        assert_eq!(format_dicom_date("20251122"), "2025-11-22");
        assert_eq!(format_dicom_date("2025112"), "2025112");
        assert_eq!(format_dicom_date("22-11-25"), "22-11-25");
    }

    #[test]
    fn reads_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("study.dcm");
        let file_obj = sample_object()
            .with_meta(
                FileMetaTableBuilder::new()
                    .transfer_syntax(uids::EXPLICIT_VR_LITTLE_ENDIAN)
                    .media_storage_sop_class_uid(uids::CT_IMAGE_STORAGE)
                    .media_storage_sop_instance_uid("1.2.826.0.1.3680043.2.1125.1"),
            )
            .unwrap();
        file_obj.write_to_file(&path).unwrap();

        let record = DicomExtractor.extract(&path).unwrap();
        assert_eq!(record.file_info.filename, "study.dcm");
        assert_eq!(record.file_info.format, "DICOM");
        assert_eq!(record.patient_information.patient_id.as_deref(), Some("PID-001"));
    }

    #[test]
    fn unreadable_file_is_dicom_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.dcm");
        std::fs::write(&path, b"definitely not a dicom stream").unwrap();
        assert!(matches!(
            DicomExtractor.extract(&path),
            Err(ExtractionError::Dicom(_))
        ));
    }
}
