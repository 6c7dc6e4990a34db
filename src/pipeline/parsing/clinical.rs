//! Narrative sections of a report.
//!
//! Each section runs from its label to the earliest label that may follow
//! it, or to the end of the text. Labels are matched case-insensitively and
//! on word boundaries.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ClinicalFields {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clinical_brief: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observations: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub impression: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub advice: Option<String>,
}

impl ClinicalFields {
    /// Observations, falling back to the impression. Feeds typed
    /// measurement recovery at storage time.
    pub fn findings_text(&self) -> Option<&str> {
        self.observations.as_deref().or(self.impression.as_deref())
    }
}

struct Section {
    start: Regex,
    stop: Regex,
}

impl Section {
    fn new(start: &str, stop: &str) -> Self {
        Self {
            start: Regex::new(start).unwrap(),
            stop: Regex::new(stop).unwrap(),
        }
    }

    /// Trimmed body between the label and the next stop label.
    fn capture<'t>(&self, text: &'t str) -> Option<&'t str> {
        let label = self.start.find(text)?;
        let rest = &text[label.end()..];
        let end = self.stop.find(rest).map_or(rest.len(), |m| m.start());
        let body = rest[..end].trim();
        (!body.is_empty()).then_some(body)
    }
}

static PROTOCOL: LazyLock<Section> = LazyLock::new(|| {
    Section::new(
        r"(?i)\bPROTOCOL\s*:[-\s]*",
        r"(?i)\b(?:CLINICAL|OBSERVATIONS?|ONSERVATIONS?|FINDINGS)\b",
    )
});

static CLINICAL_BRIEF: LazyLock<Section> = LazyLock::new(|| {
    Section::new(
        r"(?i)\bCLINICAL\s*(?:BRIEF|HISTORY|ABRIEF|ASRIEF)\s*:[-\s]*",
        r"(?i)\b(?:OBSERVATIONS?|ONSERVATIONS?|FINDINGS|IMPRESSION)\b",
    )
});

static OBSERVATIONS: LazyLock<Section> = LazyLock::new(|| {
    Section::new(
        r"(?i)\b(?:OBSERVATIONS?|ONSERVATIONS?|FINDINGS)\s*:",
        r"(?i)\b(?:IMPRESSION|ADVICE|CONCLUSION|DISCLAIMER)\b",
    )
});

static IMPRESSION: LazyLock<Section> = LazyLock::new(|| {
    Section::new(
        r"(?i)\b(?:IMPRESSION|CONCLUSION|DIAGNOSIS)\s*:[-\s]*",
        r"(?i)\b(?:ADVICE|RECOMMENDATIONS?|CONCLUSION|DISCLAIMER)\b",
    )
});

static ADVICE: LazyLock<Section> = LazyLock::new(|| {
    Section::new(
        r"(?i)\b(?:ADVICE|RECOMMENDATIONS?)\s*:[-\s]*",
        r"(?i)\b(?:DISCLAIMER|NOTE)\b",
    )
});

static OCR_SYMBOLS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[§¶]").unwrap());
static LEADING_QUOTE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"^\s*['"‘’“”]"#).unwrap());
static LINE_LEADING_THE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^The\s+").unwrap());

pub fn parse_clinical(text: &str) -> ClinicalFields {
    ClinicalFields {
        protocol: PROTOCOL
            .capture(text)
            .map(|s| OCR_SYMBOLS.replace_all(s, "").trim().to_string())
            .filter(|s| !s.is_empty()),
        clinical_brief: CLINICAL_BRIEF.capture(text).map(str::to_string),
        observations: OBSERVATIONS
            .capture(text)
            .map(clean_observations)
            .filter(|s| !s.is_empty()),
        impression: IMPRESSION.capture(text).map(str::to_string),
        advice: ADVICE.capture(text).map(str::to_string),
    }
}

fn clean_observations(body: &str) -> String {
    let unquoted = LEADING_QUOTE.replace(body, "");
    LINE_LEADING_THE.replace_all(&unquoted, "").trim().to_string()
}
