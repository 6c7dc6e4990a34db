//! Loose JSON -> canonical record.
//!
//! Records written by older producers, or by other tools, may use the native
//! section names (`patient_info`, `report_info`, `clinical_data`) or the
//! native field spellings (`report_date`, `findings`, ...). Both are read;
//! when a value is present under both spellings the canonical one wins.

use serde_json::{Map, Value};

use super::now_rfc3339;
use crate::models::sentinel::{is_placeholder, UNKNOWN_ID, UNKNOWN_NAME};
use crate::models::MetadataRecord;
use crate::pipeline::extraction::ExtractionError;

/// (canonical section, native section, native field -> canonical field)
const SECTIONS: &[(&str, &str, &[(&str, &str)])] = &[
    ("patient_information", "patient_info", &[]),
    (
        "study_information",
        "report_info",
        &[("report_date", "study_date"), ("study_type", "study_description")],
    ),
    (
        "clinical_information",
        "clinical_data",
        &[
            ("clinical_history", "clinical_brief"),
            ("findings", "observations"),
            ("recommendations", "advice"),
        ],
    ),
];

/// Parse a record from JSON, tolerating native key names.
///
/// An `{"error": ...}` mapping is returned as `Err`.
pub fn read_record(value: &Value) -> Result<MetadataRecord, ExtractionError> {
    let Some(object) = value.as_object() else {
        return Err(ExtractionError::Normalization(
            "record is not a JSON object".into(),
        ));
    };
    if let Some(error) = object.get("error") {
        let message = error.as_str().map_or_else(|| error.to_string(), str::to_string);
        return Err(ExtractionError::Normalization(message));
    }

    let mut map = object.clone();

    // Accession number is an identity field on reports but a study field canonically.
    let native_accession = section(object, "patient_info")
        .and_then(|p| p.get("accession_number"))
        .cloned();

    for (canonical, native, aliases) in SECTIONS {
        let merged = merge_section(
            section(object, canonical),
            section(object, native),
            aliases,
        );
        map.remove(*native);
        if let Some(merged) = merged {
            map.insert((*canonical).to_string(), Value::Object(merged));
        }
    }

    if let Some(accession) = native_accession {
        let study = map
            .entry("study_information")
            .or_insert_with(|| Value::Object(Map::new()));
        if let Some(study) = study.as_object_mut() {
            if !study.get("accession_number").is_some_and(has_content) {
                study.insert("accession_number".into(), accession);
            }
        }
    }

    map.entry("file_info")
        .or_insert_with(|| Value::Object(Map::new()));
    fill_processing_info(&mut map);

    serde_json::from_value(Value::Object(map))
        .map_err(|e| ExtractionError::Normalization(e.to_string()))
}

fn section<'a>(object: &'a Map<String, Value>, key: &str) -> Option<&'a Map<String, Value>> {
    object.get(key).and_then(Value::as_object)
}

/// Native fields first, canonical fields laid over them unless they are
/// placeholders.
fn merge_section(
    canonical: Option<&Map<String, Value>>,
    native: Option<&Map<String, Value>>,
    aliases: &[(&str, &str)],
) -> Option<Map<String, Value>> {
    if canonical.is_none() && native.is_none() {
        return None;
    }

    let rename = |key: &str| -> String {
        aliases
            .iter()
            .find(|(from, _)| *from == key)
            .map_or(key, |(_, to)| *to)
            .to_string()
    };

    let mut merged = Map::new();
    for source in [native, canonical].into_iter().flatten() {
        for (key, value) in source {
            let key = rename(key);
            if has_content(value) || !merged.contains_key(&key) {
                merged.insert(key, value.clone());
            }
        }
    }
    Some(merged)
}

fn has_content(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !is_placeholder(s) && s != UNKNOWN_NAME && s != UNKNOWN_ID,
        _ => true,
    }
}

/// Native producers put the method and source type at the top level, or
/// name the method `method` inside `processing_info`.
fn lift_native_processing_keys(map: &mut Map<String, Value>) {
    let top_method = map.remove("extraction_method");
    let top_source = map.remove("source_type");
    let info = map
        .entry("processing_info")
        .or_insert_with(|| Value::Object(Map::new()));
    let Some(info) = info.as_object_mut() else {
        return;
    };
    let nested_method = info.remove("method");
    if let Some(method) = nested_method.or(top_method).filter(has_content) {
        info.entry("extraction_method").or_insert(method);
    }
    if let Some(source) = top_source.filter(has_content) {
        info.entry("source_type").or_insert(source);
    }
}

fn fill_processing_info(map: &mut Map<String, Value>) {
    lift_native_processing_keys(map);
    let inferred = infer_method(map);
    let info = map
        .entry("processing_info")
        .or_insert_with(|| Value::Object(Map::new()));
    if let Some(info) = info.as_object_mut() {
        info.entry("extraction_method")
            .or_insert_with(|| Value::String(inferred.into()));
        if !info
            .get("extracted_at")
            .and_then(Value::as_str)
            .is_some_and(|s| !s.is_empty())
        {
            info.insert("extracted_at".into(), Value::String(now_rfc3339()));
        }
    }
}

fn infer_method(map: &Map<String, Value>) -> &'static str {
    let processing = section(map, "processing_info");
    if map.contains_key("all_dicom_tags") {
        "structured_tag"
    } else if map.contains_key("image_properties")
        || processing.is_some_and(|p| p.contains_key("ocr_raw_text"))
    {
        "basic_image_only"
    } else {
        "ocr"
    }
}
