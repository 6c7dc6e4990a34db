//! Study and report metadata: date, study type, modality, report type,
//! examination line and referring physician.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReportFields {
    /// Raw date text as printed on the report.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub study_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modality: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub examination: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referring_physician: Option<String>,
}

/// Most specific shape first.
static DATE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)Study\s*Dat[eo]\s*[:;]\s*(\d{1,2}[-/][A-Za-z]{3,}[-/]\d{2,4})",
        r"(?i)\bDat[eo]\s*[:;]\s*(\d{1,2}[-/]\d{1,2}[-/]\d{2,4})",
        r"\b(\d{4}-\d{2}-\d{2})\b",
        r"\b(\d{1,2}[-/]\d{1,2}[-/]\d{4})\b",
        r"(?i)\b(\d{1,2}[-\s](?:Jan|Feb|Mar|Apr|May|Jun|Jul|Aug|Sep|Oct|Nov|Dec)[a-z]*[-\s]\d{4})\b",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

static STUDY_TYPE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [r"(?i)\bStudy\s*[:;]\s*([A-Z]+)", r"(?i)\bExam\s*[:;]\s*([A-Z]+)"]
        .iter()
        .map(|p| Regex::new(p).unwrap())
        .collect()
});

static MODALITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bM[oa]d[ao]l[il1]ty\s*[:;]\s*([A-Z]+(?:-[A-Z]+)?)").unwrap()
});

/// Keyword table scanned in order; the first label whose pattern occurs wins.
static REPORT_TYPES: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    [
        ("X-RAY", r"(?i)\bX[-\s]?RAY\b"),
        ("MRI", r"(?i)\bMRI\b|MAGNETIC\s+RESONANCE"),
        ("CT", r"(?i)\bCT\b|COMPUTED\s+TOMOGRAPHY"),
        ("ULTRASOUND", r"(?i)ULTRASOUND|\bUSG\b|SONOGRAPHY"),
        ("ECG", r"(?i)\bECG\b|\bEKG\b|ELECTROCARDIOGRAM"),
    ]
    .into_iter()
    .map(|(label, p)| (label, Regex::new(p).unwrap()))
    .collect()
});

/// `X-RAY CHEST PA VIEW` -> `X-RAY CHEST PA`.
static EXAMINATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)\b(?:X[-\s]?RAY|MRI|CT|USG)[ \t]+[\w \t]+?(?:\b(?:PA|AP|LAT|VIEW)\b|$)")
        .unwrap()
});

static REFERRING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?im)\b(?:Referring|Roferring|Refering|Ref\.)\s*(?:Physician|Doctor|Dr\.?)?\s*[:;]\s*([A-Za-z. \t]+?)\s*(?:\||\bStudy\b|$)",
    )
    .unwrap()
});

pub fn parse_report(text: &str) -> ReportFields {
    ReportFields {
        report_date: first_capture(&DATE_PATTERNS, text),
        study_type: first_capture(&STUDY_TYPE_PATTERNS, text).map(|s| s.to_uppercase()),
        modality: MODALITY.captures(text).map(|c| c[1].to_uppercase()),
        report_type: REPORT_TYPES
            .iter()
            .find(|(_, pattern)| pattern.is_match(text))
            .map(|(label, _)| label.to_string()),
        examination: EXAMINATION
            .find(text)
            .map(|m| m.as_str().trim().to_string())
            .filter(|s| !s.is_empty()),
        referring_physician: REFERRING
            .captures(text)
            .map(|c| c[1].trim().to_string())
            .filter(|name| name.chars().count() > 2),
    }
}

fn first_capture(patterns: &[Regex], text: &str) -> Option<String> {
    patterns
        .iter()
        .find_map(|p| p.captures(text))
        .map(|c| c[1].trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const XRAY_REPORT: &str = "\
Study Dato: 22-Nov-2025 | Madallty: CR
Roferring Physician: DR MEHTA | Study: chest
X-RAY CHEST PA VIEW
";

    #[test]
    fn study_date_with_month_word() {
        let fields = parse_report(XRAY_REPORT);
        assert_eq!(fields.report_date.as_deref(), Some("22-Nov-2025"));
    }

    #[test]
    fn labelled_numeric_date() {
        let fields = parse_report("Report Date: 05/03/2024");
        assert_eq!(fields.report_date.as_deref(), Some("05/03/2024"));
    }

    #[test]
    fn bare_long_form_date() {
        let fields = parse_report("Reported on 14 March 2024 by radiology");
        assert_eq!(fields.report_date.as_deref(), Some("14 March 2024"));
    }

    #[test]
    fn iso_date() {
        let fields = parse_report("Printed 2024-03-14");
        assert_eq!(fields.report_date.as_deref(), Some("2024-03-14"));
    }

    #[test]
    fn corrupted_modality_label() {
        let fields = parse_report(XRAY_REPORT);
        assert_eq!(fields.modality.as_deref(), Some("CR"));
    }

    #[test]
    fn study_type_uppercased() {
        let fields = parse_report(XRAY_REPORT);
        assert_eq!(fields.study_type.as_deref(), Some("CHEST"));
    }

    #[test]
    fn report_type_table_order_breaks_ties() {
        let fields = parse_report("CT abdomen compared with prior MRI");
        assert_eq!(fields.report_type.as_deref(), Some("MRI"));
        let fields = parse_report("Ultrasound and ECG on file");
        assert_eq!(fields.report_type.as_deref(), Some("ULTRASOUND"));
    }

    #[test]
    fn ct_not_matched_inside_words() {
        let fields = parse_report("Protocol: direct exam of the tract");
        assert!(fields.report_type.is_none());
    }

    #[test]
    fn examination_stops_at_view_marker() {
        let fields = parse_report(XRAY_REPORT);
        assert_eq!(fields.examination.as_deref(), Some("X-RAY CHEST PA"));
    }

    #[test]
    fn referring_physician_with_corrupted_label() {
        let fields = parse_report(XRAY_REPORT);
        assert_eq!(fields.referring_physician.as_deref(), Some("DR MEHTA"));
    }

    #[test]
    fn empty_text_yields_nothing() {
        assert_eq!(parse_report(""), ReportFields::default());
    }
}
