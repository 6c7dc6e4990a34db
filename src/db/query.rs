//! Read queries over stored records.

use std::collections::BTreeMap;

use rusqlite::{params, params_from_iter, Connection, Row};
use serde::Serialize;
use uuid::Uuid;

use super::DatabaseError;

const IMAGE_COLUMNS: &str = "id, patient_id, patient_name, patient_dob, patient_age, patient_sex,
     patient_weight, filename, file_format, file_size_mb, file_path, upload_source,
     study_instance_uid, study_id, study_date, study_time, study_description, accession_number,
     series_instance_uid, series_number, modality, series_description, body_part_examined,
     patient_position, image_rows, image_columns, pixel_spacing, slice_thickness, kvp,
     exposure_time, manufacturer, manufacturer_model, station_name, institution_name,
     referring_physician, performing_physician, created_at, updated_at, uploaded_by,
     processing_status";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredImage {
    pub id: String,
    pub patient_id: String,
    pub patient_name: Option<String>,
    pub patient_dob: Option<String>,
    pub patient_age: Option<String>,
    pub patient_sex: Option<String>,
    pub patient_weight: Option<f64>,
    pub filename: Option<String>,
    pub file_format: Option<String>,
    pub file_size_mb: Option<f64>,
    pub file_path: Option<String>,
    pub upload_source: String,
    pub study_instance_uid: Option<String>,
    pub study_id: Option<String>,
    pub study_date: Option<String>,
    pub study_time: Option<String>,
    pub study_description: Option<String>,
    pub accession_number: Option<String>,
    pub series_instance_uid: Option<String>,
    pub series_number: Option<i64>,
    pub modality: Option<String>,
    pub series_description: Option<String>,
    pub body_part_examined: Option<String>,
    pub patient_position: Option<String>,
    pub image_rows: Option<i64>,
    pub image_columns: Option<i64>,
    pub pixel_spacing: Option<String>,
    pub slice_thickness: Option<f64>,
    pub kvp: Option<f64>,
    pub exposure_time: Option<f64>,
    pub manufacturer: Option<String>,
    pub manufacturer_model: Option<String>,
    pub station_name: Option<String>,
    pub institution_name: Option<String>,
    pub referring_physician: Option<String>,
    pub performing_physician: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub uploaded_by: String,
    pub processing_status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredFinding {
    pub id: String,
    pub report_date: Option<String>,
    pub report_type: Option<String>,
    pub clinical_history: Option<String>,
    pub findings: Option<String>,
    pub impression: Option<String>,
    pub recommendations: Option<String>,
    pub findings_json: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredMeasurement {
    pub id: String,
    pub measurement_type: Option<String>,
    pub measurement_name: Option<String>,
    pub measurement_value: Option<f64>,
    pub measurement_unit: Option<String>,
    pub measurement_json: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredMetadata {
    pub id: String,
    pub dicom_tags: Option<String>,
    pub extracted_text: Option<String>,
    pub created_at: String,
}

/// An image row with everything hanging off it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageDetail {
    pub image: StoredImage,
    pub clinical_findings: Vec<StoredFinding>,
    pub measurements: Vec<StoredMeasurement>,
    pub metadata: Option<StoredMetadata>,
}

/// Search criteria; `None` fields do not filter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageFilter {
    /// Exact match, case-insensitive.
    pub modality: Option<String>,
    /// Substring match, case-insensitive.
    pub body_part: Option<String>,
    pub patient_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Statistics {
    pub total_images: i64,
    pub by_upload_source: BTreeMap<String, i64>,
    pub by_modality: BTreeMap<String, i64>,
    pub by_body_part: BTreeMap<String, i64>,
    pub total_findings: i64,
}

/// Most recent images first.
pub fn get_all_images(conn: &Connection, limit: u32) -> Result<Vec<StoredImage>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {IMAGE_COLUMNS} FROM medical_images
         ORDER BY created_at DESC, rowid DESC LIMIT ?1"
    ))?;
    let rows = stmt.query_map(params![limit], row_to_image)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(DatabaseError::from)
}

pub fn get_image_by_id(conn: &Connection, id: &Uuid) -> Result<ImageDetail, DatabaseError> {
    let key = id.to_string();
    let image = conn
        .query_row(
            &format!("SELECT {IMAGE_COLUMNS} FROM medical_images WHERE id = ?1"),
            params![key],
            row_to_image,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => DatabaseError::NotFound {
                entity_type: "MedicalImage".into(),
                id: key.clone(),
            },
            other => other.into(),
        })?;

    let mut stmt = conn.prepare(
        "SELECT id, report_date, report_type, clinical_history, findings, impression,
         recommendations, findings_json, created_at
         FROM clinical_findings WHERE image_id = ?1 ORDER BY rowid",
    )?;
    let clinical_findings = stmt
        .query_map(params![key], |row| {
            Ok(StoredFinding {
                id: row.get(0)?,
                report_date: row.get(1)?,
                report_type: row.get(2)?,
                clinical_history: row.get(3)?,
                findings: row.get(4)?,
                impression: row.get(5)?,
                recommendations: row.get(6)?,
                findings_json: row.get(7)?,
                created_at: row.get(8)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut stmt = conn.prepare(
        "SELECT id, measurement_type, measurement_name, measurement_value, measurement_unit,
         measurement_json
         FROM measurements WHERE image_id = ?1 ORDER BY rowid",
    )?;
    let measurements = stmt
        .query_map(params![key], |row| {
            Ok(StoredMeasurement {
                id: row.get(0)?,
                measurement_type: row.get(1)?,
                measurement_name: row.get(2)?,
                measurement_value: row.get(3)?,
                measurement_unit: row.get(4)?,
                measurement_json: row.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let metadata = match conn.query_row(
        "SELECT id, dicom_tags, extracted_text, created_at
         FROM image_metadata WHERE image_id = ?1 ORDER BY rowid LIMIT 1",
        params![key],
        |row| {
            Ok(StoredMetadata {
                id: row.get(0)?,
                dicom_tags: row.get(1)?,
                extracted_text: row.get(2)?,
                created_at: row.get(3)?,
            })
        },
    ) {
        Ok(meta) => Some(meta),
        Err(rusqlite::Error::QueryReturnedNoRows) => None,
        Err(e) => return Err(e.into()),
    };

    Ok(ImageDetail {
        image,
        clinical_findings,
        measurements,
        metadata,
    })
}

pub fn search_images(
    conn: &Connection,
    filter: &ImageFilter,
) -> Result<Vec<StoredImage>, DatabaseError> {
    let mut clauses = vec!["1=1"];
    let mut values: Vec<String> = Vec::new();

    if let Some(modality) = &filter.modality {
        clauses.push("LOWER(modality) = LOWER(?)");
        values.push(modality.clone());
    }
    if let Some(body_part) = &filter.body_part {
        clauses.push("LOWER(body_part_examined) LIKE LOWER(?)");
        values.push(format!("%{body_part}%"));
    }
    if let Some(patient_id) = &filter.patient_id {
        clauses.push("patient_id = ?");
        values.push(patient_id.clone());
    }

    let sql = format!(
        "SELECT {IMAGE_COLUMNS} FROM medical_images WHERE {}
         ORDER BY created_at DESC, rowid DESC",
        clauses.join(" AND ")
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(values.iter()), row_to_image)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(DatabaseError::from)
}

pub fn get_statistics(conn: &Connection) -> Result<Statistics, DatabaseError> {
    let total_images = conn.query_row("SELECT COUNT(*) FROM medical_images", [], |row| row.get(0))?;
    let total_findings =
        conn.query_row("SELECT COUNT(*) FROM clinical_findings", [], |row| row.get(0))?;

    Ok(Statistics {
        total_images,
        by_upload_source: group_counts(conn, "upload_source")?,
        by_modality: group_counts(conn, "modality")?,
        by_body_part: group_counts(conn, "body_part_examined")?,
        total_findings,
    })
}

/// Row counts per distinct non-null value of `column`.
fn group_counts(conn: &Connection, column: &str) -> Result<BTreeMap<String, i64>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {column}, COUNT(*) FROM medical_images
         WHERE {column} IS NOT NULL GROUP BY {column}"
    ))?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;
    rows.collect::<Result<BTreeMap<_, _>, _>>().map_err(DatabaseError::from)
}

fn row_to_image(row: &Row) -> rusqlite::Result<StoredImage> {
    Ok(StoredImage {
        id: row.get(0)?,
        patient_id: row.get(1)?,
        patient_name: row.get(2)?,
        patient_dob: row.get(3)?,
        patient_age: row.get(4)?,
        patient_sex: row.get(5)?,
        patient_weight: row.get(6)?,
        filename: row.get(7)?,
        file_format: row.get(8)?,
        file_size_mb: row.get(9)?,
        file_path: row.get(10)?,
        upload_source: row.get(11)?,
        study_instance_uid: row.get(12)?,
        study_id: row.get(13)?,
        study_date: row.get(14)?,
        study_time: row.get(15)?,
        study_description: row.get(16)?,
        accession_number: row.get(17)?,
        series_instance_uid: row.get(18)?,
        series_number: row.get(19)?,
        modality: row.get(20)?,
        series_description: row.get(21)?,
        body_part_examined: row.get(22)?,
        patient_position: row.get(23)?,
        image_rows: row.get(24)?,
        image_columns: row.get(25)?,
        pixel_spacing: row.get(26)?,
        slice_thickness: row.get(27)?,
        kvp: row.get(28)?,
        exposure_time: row.get(29)?,
        manufacturer: row.get(30)?,
        manufacturer_model: row.get(31)?,
        station_name: row.get(32)?,
        institution_name: row.get(33)?,
        referring_physician: row.get(34)?,
        performing_physician: row.get(35)?,
        created_at: row.get(36)?,
        updated_at: row.get(37)?,
        uploaded_by: row.get(38)?,
        processing_status: row.get(39)?,
    })
}
