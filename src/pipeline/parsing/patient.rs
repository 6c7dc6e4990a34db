//! Patient identity block: id, name, age, sex, accession number.
//!
//! OCR routinely confuses `I`/`1`/`l`, `O`/`0`, `e`/`o` and renders the `Y`
//! of an age token as `¥` or `µ`. Every pattern below tolerates those
//! substitutions.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PatientFields {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patient_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patient_age: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patient_sex: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accession_number: Option<String>,
}

impl PatientFields {
    /// True when no identity field matched. Decides whether an image is
    /// treated as a recognized report.
    pub fn is_empty(&self) -> bool {
        self.patient_name.is_none()
            && self.patient_id.is_none()
            && self.patient_age.is_none()
            && self.patient_sex.is_none()
            && self.accession_number.is_none()
    }
}

// ═══════════════════════════════════════════════════════════
// Patterns (first match wins, in order)
// ═══════════════════════════════════════════════════════════

/// `true` marks patterns that consumed a printed (possibly OCR-mangled)
/// `OPD` prefix, which is rebuilt on the captured digits.
static ID_PATTERNS: LazyLock<Vec<(Regex, bool)>> = LazyLock::new(|| {
    [
        (r"(?i)Patient\s*[I1l]D\s*[:;]\s*[0O]?PD(\d+)", true),
        (r"(?i)Patient\s*[I1l]D\s*[:;]\s*([\w-]+)", false),
        (r"(?i)\bUHID\s*[:;]\s*([\w-]+)", false),
        (r"(?i)\bReg\.?\s*No\.?\s*[:;]\s*([\w-]+)", false),
        (r"(?i)\b[I1l]D\s*[:;]\s*[0O]?PD(\d+)", true),
    ]
    .iter()
    .map(|(p, prefixed)| (Regex::new(p).unwrap(), *prefixed))
    .collect()
});

/// Name run ends at an age token, an `Age` label, a table pipe or end of line.
const NAME_TAIL: &str = r"([A-Z][A-Z \t.]*?)(?:\s+\d+\s*[YMmyµ¥]|\bAge\b|\||$)";

static NAME_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        format!(r"(?im)[\[|]?\s*Pat[il1][eo]nt\s*Nam[eo]\s*[:;]\s*{NAME_TAIL}"),
        format!(r"(?im)\bNam[eo]\s*[:;]\s*{NAME_TAIL}"),
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

static NAME_TRAILING_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*\d+.*$").unwrap());
static NAME_ARTIFACTS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[_|\[\]]").unwrap());

/// `44YF`, `44yf`, `44 Y / F`, `32Yrs M`, `44¥F`. The month unit stays
/// upper-case only so that `500mg` or `5 mm` never read as an age.
static AGE_SEX_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{1,3})\s*(?:[Yy]rs?|[Yy¥µ]|M)\s*/?\s*([MFmf])\b").unwrap()
});

static AGE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)\bAge\s*[:;]?\s*(\d{1,3})",
        r"(?i)\b(\d{1,3})\s*(?:years?|yrs?)\b",
        r"\b(\d{1,3})\s*(?:[Yy]\b|[¥µ])",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

static SEX_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:Sex|Gender)\s*[:;]?\s*(Male|Female|M|F)\b").unwrap()
});

static ACCESSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bAcc[eo]ssion\s*(?:Number|No\.?)\s*[:;]\s*([\w-]+)").unwrap()
});

// ═══════════════════════════════════════════════════════════
// Parser
// ═══════════════════════════════════════════════════════════

pub fn parse_patient(text: &str) -> PatientFields {
    let (token_age, token_sex) = match AGE_SEX_TOKEN.captures(text) {
        Some(caps) => (Some(caps[1].to_string()), Some(caps[2].to_ascii_uppercase())),
        None => (None, None),
    };

    PatientFields {
        patient_name: find_name(text),
        patient_id: find_id(text),
        patient_age: token_age.or_else(|| first_capture(&AGE_PATTERNS, text)),
        patient_sex: token_sex.or_else(|| find_sex_label(text)),
        accession_number: ACCESSION
            .captures(text)
            .map(|c| c[1].trim().to_string()),
    }
}

fn find_id(text: &str) -> Option<String> {
    let (caps, prefixed) = ID_PATTERNS
        .iter()
        .find_map(|(re, prefixed)| re.captures(text).map(|c| (c, *prefixed)))?;
    let id = caps[1].trim().replace('_', "");
    if id.is_empty() {
        return None;
    }
    if prefixed {
        return Some(format!("OPD{id}"));
    }
    // A bare digit run this long is an office code whose "OPD" prefix was lost.
    if id.len() > 6 && id.chars().all(|c| c.is_ascii_digit()) {
        Some(format!("OPD{id}"))
    } else {
        Some(id)
    }
}

fn find_name(text: &str) -> Option<String> {
    for pattern in NAME_PATTERNS.iter() {
        let Some(caps) = pattern.captures(text) else {
            continue;
        };
        let name = NAME_TRAILING_NUMBER.replace(caps[1].trim(), "");
        let name = NAME_ARTIFACTS.replace_all(&name, "");
        let name = name.trim();
        if name.chars().count() > 2 {
            return Some(name.to_string());
        }
    }
    None
}

fn find_sex_label(text: &str) -> Option<String> {
    let caps = SEX_LABEL.captures(text)?;
    let value = caps[1].to_ascii_uppercase();
    Some(if value.starts_with('M') { "M" } else { "F" }.to_string())
}

fn first_capture(patterns: &[Regex], text: &str) -> Option<String> {
    patterns
        .iter()
        .find_map(|p| p.captures(text))
        .map(|c| c[1].trim().to_string())
}
