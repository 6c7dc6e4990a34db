//! Value coercion at the storage boundary.
//!
//! Records carry dates, times and numbers as the text they were read from.
//! Columns want ISO dates, `HH:MM:SS` times and real numbers; anything that
//! does not coerce is stored as NULL, never an error.

use std::sync::LazyLock;

use chrono::{Datelike, NaiveDate};
use regex::Regex;

use crate::models::sentinel::is_placeholder;
use crate::models::{Measurement, Measurements};

/// Tried in order after ISO and `YYYYMMDD`. Day-first wins on ambiguous
/// numeric dates.
const DATE_FORMATS: &[&str] = &[
    "%d-%b-%Y",
    "%d/%b/%Y",
    "%d-%m-%Y",
    "%d/%m/%Y",
    "%m-%d-%Y",
    "%m/%d/%Y",
    "%b %d, %Y",
    "%d %b %Y",
    "%d %B %Y",
];

/// Any supported date spelling -> `YYYY-MM-DD`.
pub fn parse_date(value: &str) -> Option<String> {
    let value = value.trim();
    if is_placeholder(value) {
        return None;
    }

    // Two-digit years parse as year 25 AD.
    let full_year = |d: &NaiveDate| d.year() >= 1000;

    if let Some(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .filter(full_year)
    {
        return Some(date.format("%Y-%m-%d").to_string());
    }
    if value.len() == 8 && value.bytes().all(|b| b.is_ascii_digit()) {
        return NaiveDate::parse_from_str(value, "%Y%m%d")
            .ok()
            .filter(full_year)
            .map(|d| d.format("%Y-%m-%d").to_string());
    }

    DATE_FORMATS
        .iter()
        .filter_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
        .find(full_year)
        .map(|d| d.format("%Y-%m-%d").to_string())
}

/// DICOM `HHMMSS[.frac]` -> `HH:MM:SS`.
pub fn parse_time(value: &str) -> Option<String> {
    let value = value.trim();
    let head = value.get(..6)?;
    if !head.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(format!("{}:{}:{}", &head[..2], &head[2..4], &head[4..6]))
}

pub fn parse_numeric(value: &str) -> Option<f64> {
    let value = value.trim();
    if is_placeholder(value) {
        return None;
    }
    value.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Integer columns such as series number; `"3.0"` stores as 3.
pub fn parse_integer(value: &str) -> Option<i64> {
    parse_numeric(value).map(|v| v.trunc() as i64)
}

// ═══════════════════════════════════════════════════════════
// Typed measurements recovered from report findings
// ═══════════════════════════════════════════════════════════

static SIZE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:size|diameter|length|width|height):\s*([\d.]+)\s*(mm|cm)").unwrap()
});
static DIMENSIONS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)([\d.]+)\s*x\s*([\d.]+)\s*(mm|cm)").unwrap());
static VOLUME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)volume:\s*([\d.]+)\s*(ml|cc|L)").unwrap());
static DENSITY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)density:\s*([\d.]+)\s*HU").unwrap());

/// `size_n`, `dimensions_n`, `volume_n` and `density_n` entries from a
/// findings paragraph. Dimensions keep the first extent as the value.
pub fn extract_typed_measurements(findings: &str) -> Measurements {
    let mut out = Measurements::new();
    let patterns: [(&str, &Regex, Option<usize>); 4] = [
        ("size", &SIZE_RE, Some(2)),
        ("dimensions", &DIMENSIONS_RE, Some(3)),
        ("volume", &VOLUME_RE, Some(2)),
        ("density", &DENSITY_RE, None),
    ];

    for (kind, re, unit_group) in patterns {
        for caps in re.captures_iter(findings) {
            let Some(value) = caps.get(1).and_then(|m| parse_numeric(m.as_str())) else {
                continue;
            };
            let unit = match unit_group {
                Some(group) => caps.get(group).map(|m| m.as_str().to_string()),
                None => Some("HU".to_string()),
            };
            out.push(kind, Measurement { value, unit });
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_spellings_converge_on_iso() {
        for input in ["20251122", "22-Nov-2025", "2025-11-22", "22/11/2025", "Nov 22, 2025", "22 November 2025"] {
            assert_eq!(parse_date(input).as_deref(), Some("2025-11-22"), "{input}");
        }
    }

    #[test]
    fn day_first_wins_when_ambiguous() {
        assert_eq!(parse_date("03-04-2025").as_deref(), Some("2025-04-03"));
        // Only valid month-first.
        assert_eq!(parse_date("11/22/2025").as_deref(), Some("2025-11-22"));
    }

    #[test]
    fn unparseable_dates_are_none() {
        for input in [
            "",
            "N/A",
            "Not Available",
            "yesterday",
            "22-11-25",
            "2025-13-45",
            "20251345",
            "00251122",
            "0025-11-22",
        ] {
            assert_eq!(parse_date(input), None, "{input}");
        }
    }

    #[test]
    fn dicom_times_are_split() {
        assert_eq!(parse_time("101530").as_deref(), Some("10:15:30"));
        assert_eq!(parse_time("101530.250").as_deref(), Some("10:15:30"));
        assert_eq!(parse_time("1015"), None);
        assert_eq!(parse_time("N/A"), None);
    }

    #[test]
    fn numerics_skip_placeholders() {
        assert_eq!(parse_numeric("72.5"), Some(72.5));
        assert_eq!(parse_numeric(" 120 "), Some(120.0));
        assert_eq!(parse_numeric("N/A"), None);
        assert_eq!(parse_numeric("abc"), None);
        assert_eq!(parse_integer("3.0"), Some(3));
    }

    #[test]
    fn findings_yield_typed_measurements() {
        let findings = "Nodule size: 12 mm in the right lobe. Cyst 3.2 x 2.1 cm. \
                        Effusion volume: 150 ml. Lesion density: 45 HU. Second diameter: 4 cm.";
        let m = extract_typed_measurements(findings);
        let keys: Vec<&str> = m.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["size_1", "size_2", "dimensions_1", "volume_1", "density_1"]);
        assert_eq!(m.get("size_1"), Some(&Measurement { value: 12.0, unit: Some("mm".into()) }));
        assert_eq!(m.get("dimensions_1").unwrap().unit.as_deref(), Some("cm"));
        assert_eq!(m.get("dimensions_1").unwrap().value, 3.2);
        assert_eq!(m.get("density_1").unwrap().unit.as_deref(), Some("HU"));
    }

    #[test]
    fn plain_findings_have_no_measurements() {
        assert!(extract_typed_measurements("Lungs are clear.").is_empty());
    }
}
