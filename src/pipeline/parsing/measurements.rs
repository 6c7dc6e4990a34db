use std::sync::LazyLock;

use regex::Regex;

use crate::models::{Measurement, Measurements};

/// `<number><unit>` over a fixed unit vocabulary. `mmHg` precedes `mm` so
/// the longer unit wins.
static MEASUREMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*(mmHg|mm|cm|ml|HU|mg|kg|cc|L|%)").unwrap()
});

/// Every measurement token in document order, keyed `measurement_{n}`.
///
/// A unit immediately followed by a letter (`5 Left`, `12 mmol`) is part of
/// a longer word and does not count, except the `x` of a dimension pair
/// (`12mmx10mm`). Repeated values are kept.
pub fn parse_measurements(text: &str) -> Measurements {
    let mut measurements = Measurements::new();

    for caps in MEASUREMENT.captures_iter(text) {
        let (Some(whole), Some(number), Some(unit)) = (caps.get(0), caps.get(1), caps.get(2))
        else {
            continue;
        };
        if continues_word(&text[whole.end()..]) {
            continue;
        }
        let Ok(value) = number.as_str().parse::<f64>() else {
            continue;
        };
        measurements.push(
            "measurement",
            Measurement {
                value,
                unit: Some(unit.as_str().to_lowercase()),
            },
        );
    }

    measurements
}

fn continues_word(rest: &str) -> bool {
    let mut chars = rest.chars();
    match chars.next() {
        Some('x' | 'X') => !chars
            .next()
            .map_or(true, |c| c.is_ascii_digit() || c.is_whitespace()),
        Some(c) => c.is_alphabetic(),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn three_tokens_three_entries_in_order() {
        let m = parse_measurements("Nodule 12 mm, cyst 3.5cm and effusion 200 ml.");
        assert_eq!(m.len(), 3);
        let entries: Vec<(&str, f64, &str)> = m
            .iter()
            .map(|(k, v)| (k, v.value, v.unit.as_deref().unwrap()))
            .collect();
        assert_eq!(
            entries,
            vec![
                ("measurement_1", 12.0, "mm"),
                ("measurement_2", 3.5, "cm"),
                ("measurement_3", 200.0, "ml"),
            ]
        );
    }

    #[test]
    fn units_are_lowercased() {
        let m = parse_measurements("Density 45 HU, BP 120 mmHg, EF 60%");
        let units: Vec<&str> = m.iter().map(|(_, v)| v.unit.as_deref().unwrap()).collect();
        assert_eq!(units, vec!["hu", "mmhg", "%"]);
    }

    #[test]
    fn duplicates_are_not_merged() {
        let m = parse_measurements("4 mm and 4 mm");
        assert_eq!(m.len(), 2);
    }

    #[test]
    fn unit_inside_word_is_ignored() {
        let m = parse_measurements("Sodium 140 mmol/L, 5 Left ribs");
        assert!(m.is_empty());
    }

    #[test]
    fn dimension_pair_without_spaces() {
        let m = parse_measurements("Lesion 12mmx10mm in segment VI");
        let values: Vec<(f64, &str)> = m
            .iter()
            .map(|(_, v)| (v.value, v.unit.as_deref().unwrap()))
            .collect();
        assert_eq!(values, vec![(12.0, "mm"), (10.0, "mm")]);

        let m = parse_measurements("Cyst 3cm×2cm, node 8 mmX 6 mm");
        assert_eq!(m.len(), 4);
    }

    #[test]
    fn no_tokens_empty_map() {
        assert!(parse_measurements("No abnormality detected").is_empty());
    }
}
