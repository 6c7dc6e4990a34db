//! Pattern-based field parsers over recognized or extracted report text.
//!
//! All parsers are pure functions: text in, partial struct out. A field
//! that does not match is `None`; nothing here returns an error.

pub mod clinical;
pub mod measurements;
pub mod patient;
pub mod report;

pub use clinical::{parse_clinical, ClinicalFields};
pub use measurements::parse_measurements;
pub use patient::{parse_patient, PatientFields};
pub use report::{parse_report, ReportFields};

use serde::Serialize;

use crate::models::Measurements;

/// Everything the parsers recovered from one block of text, serialized
/// under the producer-native section names.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ParsedReport {
    #[serde(rename = "patient_info")]
    pub patient: PatientFields,
    #[serde(rename = "report_info")]
    pub report: ReportFields,
    #[serde(rename = "clinical_data")]
    pub clinical: ClinicalFields,
    pub measurements: Measurements,
}

impl ParsedReport {
    /// Run all four parsers. Windows line endings are folded first so the
    /// line-anchored patterns behave the same on every platform.
    pub fn parse(text: &str) -> Self {
        let text = text.replace("\r\n", "\n");
        Self {
            patient: parse_patient(&text),
            report: parse_report(&text),
            clinical: parse_clinical(&text),
            measurements: parse_measurements(&text),
        }
    }

    /// Identity fields matched, so this reads as a patient report.
    pub fn has_identity(&self) -> bool {
        !self.patient.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPORT: &str = "Patient Name: JOHN DOE 51YM\r\nPatient ID: OPD7654321\r\n\
        Study Date: 03-Jan-2025 | Modality: DX\r\nX-RAY CHEST PA VIEW\r\n\
        FINDINGS: Heart size normal. Nodule 8 mm in right upper lobe.\r\n\
        IMPRESSION: Small pulmonary nodule\r\n";

    #[test]
    fn parses_all_sections() {
        let parsed = ParsedReport::parse(REPORT);
        assert!(parsed.has_identity());
        assert_eq!(parsed.patient.patient_name.as_deref(), Some("JOHN DOE"));
        assert_eq!(parsed.report.modality.as_deref(), Some("DX"));
        assert_eq!(parsed.report.report_type.as_deref(), Some("X-RAY"));
        assert_eq!(parsed.clinical.impression.as_deref(), Some("Small pulmonary nodule"));
        assert_eq!(parsed.measurements.len(), 1);
    }

    #[test]
    fn serializes_with_native_section_keys() {
        let value = serde_json::to_value(ParsedReport::parse(REPORT)).unwrap();
        for key in ["patient_info", "report_info", "clinical_data", "measurements"] {
            assert!(value.get(key).is_some(), "missing {key}");
        }
        assert_eq!(value["patient_info"]["patient_id"], "OPD7654321");
        assert_eq!(value["measurements"]["measurement_1"]["unit"], "mm");
    }

    #[test]
    fn text_without_identity() {
        let parsed = ParsedReport::parse("IMPRESSION: Normal");
        assert!(!parsed.has_identity());
        assert_eq!(parsed.clinical.impression.as_deref(), Some("Normal"));
    }
}
