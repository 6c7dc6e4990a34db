//! Persisting canonical records.
//!
//! One `medical_images` row per file, plus findings, measurements and the
//! raw payload. What lands in which column depends on the upload source:
//! tag-read DICOM records fill the acquisition columns, report records fill
//! the findings table.

use rusqlite::{params, Connection, Transaction};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::db::values::{
    extract_typed_measurements, parse_date, parse_integer, parse_numeric, parse_time,
};
use crate::db::DatabaseError;
use crate::models::enums::{ProcessingStatus, UploadSource};
use crate::models::sentinel::{UNKNOWN_ID, UNKNOWN_NAME};
use crate::models::{ClinicalInformation, Measurements, MetadataRecord};
use crate::pipeline::normalize::read_record;

/// Store `record` in a single transaction and return the new image id.
///
/// Nothing is written if any insert fails.
pub fn store_record(
    conn: &Connection,
    record: &MetadataRecord,
    source: UploadSource,
    file_path: Option<&str>,
    uploaded_by: &str,
) -> Result<Uuid, DatabaseError> {
    let tx = conn.unchecked_transaction()?;
    let id = Uuid::new_v4();
    let meta = RowMeta {
        id,
        source,
        file_path,
        uploaded_by,
    };

    match source {
        UploadSource::Dicom => store_dicom(&tx, &meta, record)?,
        UploadSource::Pdf => store_pdf(&tx, &meta, record)?,
        UploadSource::OcrImage => store_image_report(&tx, &meta, record)?,
    }

    tx.commit()?;
    tracing::info!(
        image_id = %id,
        source = %source,
        file = %record.file_info.filename,
        "Stored medical record"
    );
    Ok(id)
}

/// Store a serialized record, whichever producer spelling it uses.
pub fn store_json(
    conn: &Connection,
    value: &Value,
    source: UploadSource,
    file_path: Option<&str>,
    uploaded_by: &str,
) -> Result<Uuid, DatabaseError> {
    let record = read_record(value).map_err(|e| DatabaseError::InvalidRecord(e.to_string()))?;
    store_record(conn, &record, source, file_path, uploaded_by)
}

// ═══════════════════════════════════════════════════════════
// Branches
// ═══════════════════════════════════════════════════════════

struct RowMeta<'a> {
    id: Uuid,
    source: UploadSource,
    file_path: Option<&'a str>,
    uploaded_by: &'a str,
}

fn store_dicom(
    tx: &Transaction,
    meta: &RowMeta,
    record: &MetadataRecord,
) -> Result<(), DatabaseError> {
    let patient = &record.patient_information;
    let study = record.study_information.clone().unwrap_or_default();
    let series = record.series_information.clone().unwrap_or_default();
    let image = record.image_information.clone().unwrap_or_default();
    let equipment = record.equipment_information.clone().unwrap_or_default();
    let acquisition = record.acquisition_parameters.clone().unwrap_or_default();

    let mut row = ImageRow::identity(record);
    row.patient_dob = patient.patient_birth_date.as_deref().and_then(parse_date);
    row.patient_age = patient.patient_age.clone();
    row.patient_sex = patient.patient_sex.clone();
    row.patient_weight = patient.patient_weight.as_deref().and_then(parse_numeric);
    row.study_instance_uid = study.study_instance_uid;
    row.study_id = study.study_id;
    row.study_date = study.study_date.as_deref().and_then(parse_date);
    row.study_time = study.study_time.as_deref().and_then(parse_time);
    row.study_description = study.study_description;
    row.accession_number = study.accession_number;
    row.referring_physician = study.referring_physician;
    row.performing_physician = study.performing_physician;
    row.series_instance_uid = series.series_instance_uid;
    row.series_number = series.series_number.as_deref().and_then(parse_integer);
    row.modality = series.modality.or(study.modality);
    row.series_description = series.series_description;
    row.body_part_examined = series.body_part_examined;
    row.patient_position = series.patient_position;
    row.image_rows = Some(i64::from(image.rows));
    row.image_columns = Some(i64::from(image.columns));
    row.pixel_spacing = image.pixel_spacing;
    row.slice_thickness = image.slice_thickness.as_deref().and_then(parse_numeric);
    row.kvp = acquisition.kvp.as_deref().and_then(parse_numeric);
    row.exposure_time = acquisition.exposure_time.as_deref().and_then(parse_numeric);
    row.manufacturer = equipment.manufacturer;
    row.manufacturer_model = equipment.manufacturer_model_name;
    row.station_name = equipment.station_name;
    row.institution_name = equipment.institution_name;

    insert_image(tx, meta, &row)?;

    let tags = record.all_dicom_tags.clone().unwrap_or_default();
    insert_metadata(tx, &meta.id, Some(&serde_json::to_string(&tags)?), None)?;

    if let Some(measurements) = &record.measurements {
        insert_measurements(tx, &meta.id, measurements)?;
    }
    Ok(())
}

fn store_pdf(
    tx: &Transaction,
    meta: &RowMeta,
    record: &MetadataRecord,
) -> Result<(), DatabaseError> {
    let study = record.study_information.clone().unwrap_or_default();
    let clinical = record.clinical_information.clone().unwrap_or_default();
    let report_date = study.study_date.as_deref().and_then(parse_date);

    let mut row = ImageRow::identity(record);
    row.file_format = "PDF".to_string();
    row.patient_age = record.patient_information.patient_age.clone();
    row.patient_sex = record.patient_information.patient_sex.clone();
    row.study_date = report_date.clone();
    row.study_description = study.report_type.clone().or(study.study_description);
    row.accession_number = study.accession_number;
    row.modality = study.modality;
    row.referring_physician = study.referring_physician;
    insert_image(tx, meta, &row)?;

    // Report documents always get a findings row, even an empty one.
    insert_findings(tx, &meta.id, report_date, study.report_type, &clinical)?;
    insert_metadata(tx, &meta.id, None, Some(&serde_json::to_string(record)?))?;

    if let Some(findings) = clinical.observations.as_deref() {
        insert_measurements(tx, &meta.id, &extract_typed_measurements(findings))?;
    }
    if let Some(measurements) = &record.measurements {
        insert_measurements(tx, &meta.id, measurements)?;
    }
    Ok(())
}

fn store_image_report(
    tx: &Transaction,
    meta: &RowMeta,
    record: &MetadataRecord,
) -> Result<(), DatabaseError> {
    let study = record.study_information.clone().unwrap_or_default();
    let study_date = study.study_date.as_deref().and_then(parse_date);

    let mut row = ImageRow::identity(record);
    row.patient_age = record.patient_information.patient_age.clone();
    row.patient_sex = record.patient_information.patient_sex.clone();
    row.study_date = study_date.clone();
    // Report images name the examined region in the study line ("X-RAY CHEST").
    row.body_part_examined = study.study_description.clone();
    row.study_description = study.study_description;
    row.accession_number = study.accession_number;
    row.modality = study.modality;
    row.referring_physician = study.referring_physician;
    insert_image(tx, meta, &row)?;

    if let Some(clinical) = record.clinical_information.as_ref().filter(|c| c.has_content()) {
        insert_findings(tx, &meta.id, study_date, study.report_type, clinical)?;
    }
    insert_metadata(tx, &meta.id, None, Some(&serde_json::to_string(record)?))?;

    if let Some(measurements) = &record.measurements {
        insert_measurements(tx, &meta.id, measurements)?;
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════
// Row inserts
// ═══════════════════════════════════════════════════════════

/// Column values of a `medical_images` row, already coerced.
#[derive(Debug, Default)]
struct ImageRow {
    patient_id: String,
    patient_name: String,
    patient_dob: Option<String>,
    patient_age: Option<String>,
    patient_sex: Option<String>,
    patient_weight: Option<f64>,
    filename: String,
    file_format: String,
    file_size_mb: f64,
    study_instance_uid: Option<String>,
    study_id: Option<String>,
    study_date: Option<String>,
    study_time: Option<String>,
    study_description: Option<String>,
    accession_number: Option<String>,
    series_instance_uid: Option<String>,
    series_number: Option<i64>,
    modality: Option<String>,
    series_description: Option<String>,
    body_part_examined: Option<String>,
    patient_position: Option<String>,
    image_rows: Option<i64>,
    image_columns: Option<i64>,
    pixel_spacing: Option<String>,
    slice_thickness: Option<f64>,
    kvp: Option<f64>,
    exposure_time: Option<f64>,
    manufacturer: Option<String>,
    manufacturer_model: Option<String>,
    station_name: Option<String>,
    institution_name: Option<String>,
    referring_physician: Option<String>,
    performing_physician: Option<String>,
}

impl ImageRow {
    /// Identity and file columns every branch stores. Absent identity
    /// falls back to the sentinel anchors.
    fn identity(record: &MetadataRecord) -> Self {
        let patient = &record.patient_information;
        Self {
            patient_id: patient.patient_id.clone().unwrap_or_else(|| UNKNOWN_ID.to_string()),
            patient_name: patient
                .patient_name
                .clone()
                .unwrap_or_else(|| UNKNOWN_NAME.to_string()),
            filename: record.file_info.filename.clone(),
            file_format: record.file_info.format.clone(),
            file_size_mb: record.file_info.file_size_mb,
            ..Default::default()
        }
    }
}

fn insert_image(tx: &Transaction, meta: &RowMeta, row: &ImageRow) -> Result<(), DatabaseError> {
    tx.execute(
        "INSERT INTO medical_images (id, patient_id, patient_name, patient_dob, patient_age,
         patient_sex, patient_weight, filename, file_format, file_size_mb, file_path, upload_source,
         study_instance_uid, study_id, study_date, study_time, study_description, accession_number,
         series_instance_uid, series_number, modality, series_description, body_part_examined,
         patient_position, image_rows, image_columns, pixel_spacing, slice_thickness, kvp,
         exposure_time, manufacturer, manufacturer_model, station_name, institution_name,
         referring_physician, performing_physician, uploaded_by, processing_status)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18,
         ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27, ?28, ?29, ?30, ?31, ?32, ?33, ?34, ?35, ?36,
         ?37, ?38)",
        params![
            meta.id.to_string(),
            row.patient_id,
            row.patient_name,
            row.patient_dob,
            row.patient_age,
            row.patient_sex,
            row.patient_weight,
            row.filename,
            row.file_format,
            row.file_size_mb,
            meta.file_path,
            meta.source.as_str(),
            row.study_instance_uid,
            row.study_id,
            row.study_date,
            row.study_time,
            row.study_description,
            row.accession_number,
            row.series_instance_uid,
            row.series_number,
            row.modality,
            row.series_description,
            row.body_part_examined,
            row.patient_position,
            row.image_rows,
            row.image_columns,
            row.pixel_spacing,
            row.slice_thickness,
            row.kvp,
            row.exposure_time,
            row.manufacturer,
            row.manufacturer_model,
            row.station_name,
            row.institution_name,
            row.referring_physician,
            row.performing_physician,
            meta.uploaded_by,
            ProcessingStatus::Completed.as_str(),
        ],
    )?;
    Ok(())
}

fn insert_findings(
    tx: &Transaction,
    image_id: &Uuid,
    report_date: Option<String>,
    report_type: Option<String>,
    clinical: &ClinicalInformation,
) -> Result<(), DatabaseError> {
    tx.execute(
        "INSERT INTO clinical_findings (id, image_id, report_date, report_type, clinical_history,
         findings, impression, recommendations, findings_json)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            Uuid::new_v4().to_string(),
            image_id.to_string(),
            report_date,
            report_type,
            clinical.clinical_brief,
            clinical.observations,
            clinical.impression,
            clinical.advice,
            serde_json::to_string(clinical)?,
        ],
    )?;
    Ok(())
}

fn insert_measurements(
    tx: &Transaction,
    image_id: &Uuid,
    measurements: &Measurements,
) -> Result<(), DatabaseError> {
    let mut stmt = tx.prepare(
        "INSERT INTO measurements (id, image_id, measurement_type, measurement_name,
         measurement_value, measurement_unit, measurement_json)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )?;
    for (name, measurement) in measurements.iter() {
        let kind = name.rsplit_once('_').map_or(name, |(kind, _)| kind);
        let payload = json!({
            "value": measurement.value,
            "unit": measurement.unit,
            "type": kind,
        });
        stmt.execute(params![
            Uuid::new_v4().to_string(),
            image_id.to_string(),
            kind,
            name,
            measurement.value,
            measurement.unit,
            payload.to_string(),
        ])?;
    }
    Ok(())
}

fn insert_metadata(
    tx: &Transaction,
    image_id: &Uuid,
    dicom_tags: Option<&str>,
    extracted_text: Option<&str>,
) -> Result<(), DatabaseError> {
    tx.execute(
        "INSERT INTO image_metadata (id, image_id, dicom_tags, extracted_text)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            Uuid::new_v4().to_string(),
            image_id.to_string(),
            dicom_tags,
            extracted_text,
        ],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;
    use crate::models::{
        ExtractionMethod, FileInfo, ImageInformation, Measurement, PatientInformation,
        ProcessingInfo, SeriesInformation, StudyInformation,
    };

    const AT: &str = "2025-11-22T10:00:00+00:00";

    fn dicom_record() -> MetadataRecord {
        let mut record = MetadataRecord::new(
            FileInfo::new("ct.dcm", 2 * 1024 * 1024, "DICOM"),
            ProcessingInfo::new(ExtractionMethod::StructuredTag, AT),
        );
        record.patient_information = PatientInformation {
            patient_name: Some("DOE^JOHN".into()),
            patient_id: Some("PID-001".into()),
            patient_sex: Some("M".into()),
            patient_age: Some("044Y".into()),
            patient_birth_date: Some("19810304".into()),
            patient_weight: Some("72.5".into()),
        };
        record.study_information = Some(StudyInformation {
            study_date: Some("2025-11-22".into()),
            study_time: Some("101530.000".into()),
            modality: Some("CT".into()),
            referring_physician: Some("SMITH^ANNA".into()),
            ..Default::default()
        });
        record.series_information = Some(SeriesInformation {
            series_number: Some("3".into()),
            modality: Some("CT".into()),
            body_part_examined: Some("CHEST".into()),
            ..Default::default()
        });
        record.image_information = Some(ImageInformation {
            rows: 512,
            columns: 512,
            slice_thickness: Some("1.25".into()),
            ..Default::default()
        });
        let mut tags = serde_json::Map::new();
        tags.insert("PatientName".into(), json!("DOE^JOHN"));
        record.all_dicom_tags = Some(tags);
        record
    }

    fn report_record(format: &str, method: ExtractionMethod) -> MetadataRecord {
        let mut record = MetadataRecord::new(
            FileInfo::new("report.pdf", 50_000, format),
            ProcessingInfo::new(method, AT),
        );
        record.patient_information.patient_name = Some("JOHN DOE".into());
        record.patient_information.patient_id = Some("OPD1234567".into());
        record.study_information = Some(StudyInformation {
            study_date: Some("22-Nov-2025".into()),
            study_description: Some("CHEST".into()),
            modality: Some("X-RAY".into()),
            report_type: Some("RADIOLOGY REPORT".into()),
            ..Default::default()
        });
        record
    }

    fn count(conn: &Connection, table: &str) -> i64 {
        conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))
            .unwrap()
    }

    #[test]
    fn dicom_branch_fills_acquisition_columns() {
        let conn = open_memory_database().unwrap();
        let id = store_record(&conn, &dicom_record(), UploadSource::Dicom, Some("/up/ct.dcm"), "tech01")
            .unwrap();

        let (dob, time, series, weight, body_part, source, by): (
            String, String, i64, f64, String, String, String,
        ) = conn
            .query_row(
                "SELECT patient_dob, study_time, series_number, patient_weight, body_part_examined,
                 upload_source, uploaded_by FROM medical_images WHERE id = ?1",
                params![id.to_string()],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?, r.get(5)?, r.get(6)?)),
            )
            .unwrap();
        assert_eq!(dob, "1981-03-04");
        assert_eq!(time, "10:15:30");
        assert_eq!(series, 3);
        assert_eq!(weight, 72.5);
        assert_eq!(body_part, "CHEST");
        assert_eq!(source, "dicom");
        assert_eq!(by, "tech01");

        let tags: String = conn
            .query_row("SELECT dicom_tags FROM image_metadata WHERE image_id = ?1", params![id.to_string()], |r| r.get(0))
            .unwrap();
        assert!(tags.contains("DOE^JOHN"));
        assert_eq!(count(&conn, "clinical_findings"), 0);
    }

    #[test]
    fn pdf_branch_always_writes_findings_and_typed_measurements() {
        let conn = open_memory_database().unwrap();
        let mut record = report_record("PDF", ExtractionMethod::DocumentText);
        record.clinical_information = Some(ClinicalInformation {
            observations: Some("Nodule size: 12 mm. Cyst 3 x 2 cm.".into()),
            impression: Some("Benign appearance".into()),
            ..Default::default()
        });
        let mut own = Measurements::new();
        own.push("measurement", Measurement { value: 12.0, unit: Some("mm".into()) });
        record.measurements = Some(own);

        let id = store_record(&conn, &record, UploadSource::Pdf, None, "system").unwrap();

        let (date, description, format): (String, String, String) = conn
            .query_row(
                "SELECT study_date, study_description, file_format FROM medical_images WHERE id = ?1",
                params![id.to_string()],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .unwrap();
        assert_eq!(date, "2025-11-22");
        assert_eq!(description, "RADIOLOGY REPORT");
        assert_eq!(format, "PDF");

        let (findings, report_type): (String, String) = conn
            .query_row(
                "SELECT findings, report_type FROM clinical_findings WHERE image_id = ?1",
                params![id.to_string()],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap();
        assert!(findings.starts_with("Nodule size"));
        assert_eq!(report_type, "RADIOLOGY REPORT");

        let mut stmt = conn
            .prepare("SELECT measurement_name FROM measurements WHERE image_id = ?1 ORDER BY measurement_name")
            .unwrap();
        let names: Vec<String> = stmt
            .query_map(params![id.to_string()], |r| r.get(0))
            .unwrap()
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(names, vec!["dimensions_1", "measurement_1", "size_1"]);
    }

    #[test]
    fn pdf_without_clinical_text_still_has_findings_row() {
        let conn = open_memory_database().unwrap();
        let record = report_record("PDF", ExtractionMethod::DocumentText);
        store_record(&conn, &record, UploadSource::Pdf, None, "system").unwrap();
        assert_eq!(count(&conn, "clinical_findings"), 1);
        assert_eq!(count(&conn, "measurements"), 0);
    }

    #[test]
    fn image_report_branch_maps_body_part_and_skips_empty_findings() {
        let conn = open_memory_database().unwrap();
        let mut record = report_record("PNG", ExtractionMethod::Ocr);
        record.clinical_information = Some(ClinicalInformation::default());
        let id = store_record(&conn, &record, UploadSource::OcrImage, None, "system").unwrap();

        let (body_part, status): (String, String) = conn
            .query_row(
                "SELECT body_part_examined, processing_status FROM medical_images WHERE id = ?1",
                params![id.to_string()],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap();
        assert_eq!(body_part, "CHEST");
        assert_eq!(status, "completed");
        assert_eq!(count(&conn, "clinical_findings"), 0);

        let blob: String = conn
            .query_row("SELECT extracted_text FROM image_metadata WHERE image_id = ?1", params![id.to_string()], |r| r.get(0))
            .unwrap();
        let stored: MetadataRecord = serde_json::from_str(&blob).unwrap();
        assert_eq!(stored, record);
    }

    #[test]
    fn image_report_with_impression_gets_findings_row() {
        let conn = open_memory_database().unwrap();
        let mut record = report_record("PNG", ExtractionMethod::Ocr);
        record.clinical_information = Some(ClinicalInformation {
            impression: Some("No acute abnormality".into()),
            ..Default::default()
        });
        store_record(&conn, &record, UploadSource::OcrImage, None, "system").unwrap();
        assert_eq!(count(&conn, "clinical_findings"), 1);
    }

    #[test]
    fn missing_identity_stores_sentinels_and_null_dates() {
        let conn = open_memory_database().unwrap();
        let mut record = report_record("PNG", ExtractionMethod::BasicImageOnly);
        record.patient_information = PatientInformation::default();
        record.study_information.as_mut().unwrap().study_date = Some("sometime".into());
        let id = store_record(&conn, &record, UploadSource::OcrImage, None, "system").unwrap();

        let (pid, name, date): (String, String, Option<String>) = conn
            .query_row(
                "SELECT patient_id, patient_name, study_date FROM medical_images WHERE id = ?1",
                params![id.to_string()],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .unwrap();
        assert_eq!(pid, "UNKNOWN");
        assert_eq!(name, "Unknown");
        assert_eq!(date, None);
    }

    #[test]
    fn native_spellings_are_accepted() {
        let conn = open_memory_database().unwrap();
        let value = json!({
            "file_info": {"filename": "scan.pdf", "file_size_mb": 0.2, "format": "PDF"},
            "patient_info": {"patient_name": "JANE SMITH", "patient_id": "OPD7654321"},
            "report_info": {"report_date": "20251122", "study_type": "MRI BRAIN"},
            "clinical_data": {"observations": "Lesion density: 40 HU"},
            "processing_info": {"extraction_method": "text", "extracted_at": AT}
        });
        let id = store_json(&conn, &value, UploadSource::Pdf, None, "system").unwrap();

        let (pid, date): (String, String) = conn
            .query_row(
                "SELECT patient_id, study_date FROM medical_images WHERE id = ?1",
                params![id.to_string()],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap();
        assert_eq!(pid, "OPD7654321");
        assert_eq!(date, "2025-11-22");
        assert_eq!(count(&conn, "measurements"), 1);
    }

    #[test]
    fn error_mapping_is_rejected() {
        let conn = open_memory_database().unwrap();
        let result = store_json(&conn, &json!({"error": "Extraction failed: boom"}), UploadSource::Pdf, None, "system");
        assert!(matches!(result, Err(DatabaseError::InvalidRecord(_))));
        assert_eq!(count(&conn, "medical_images"), 0);
    }

    #[test]
    fn failed_insert_rolls_back() {
        let conn = open_memory_database().unwrap();
        conn.execute_batch("DROP TABLE image_metadata").unwrap();
        let result = store_record(&conn, &dicom_record(), UploadSource::Dicom, None, "system");
        assert!(result.is_err());
        assert_eq!(count(&conn, "medical_images"), 0);
    }
}
