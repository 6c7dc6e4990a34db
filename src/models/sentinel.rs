//! Sentinel placeholders for absent record fields.
//!
//! Record fields are `Option<String>` internally. The placeholder strings
//! ("N/A", "Unknown", "UNKNOWN") exist only on the serialized form, so storage
//! and API consumers always see a non-null value while extraction code stays
//! null-safe. Reading a placeholder back yields `None`.

use serde::{Deserialize, Deserializer, Serializer};
use serde_json::Value;

/// Placeholder for any absent text field.
pub const NOT_AVAILABLE: &str = "N/A";

/// Placeholder for an absent patient name.
pub const UNKNOWN_NAME: &str = "Unknown";

/// Placeholder for an absent patient identifier.
pub const UNKNOWN_ID: &str = "UNKNOWN";

/// True when `value` carries no information: blank or one of the generic
/// "not available" spellings other producers emit.
pub fn is_placeholder(value: &str) -> bool {
    matches!(value.trim(), "" | NOT_AVAILABLE | "Not Available")
}

/// Converts a loosely-typed JSON leaf into optional text.
///
/// Numbers and booleans are stringified, so a producer that emitted
/// `"patient_age": 44` still lands as `Some("44")`.
pub fn text_from_value(value: Option<Value>, sentinel: &str) -> Option<String> {
    let text = match value? {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    let trimmed = text.trim();
    if is_placeholder(trimmed) || trimmed == sentinel {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn serialize_or<S: Serializer>(
    value: &Option<String>,
    sentinel: &'static str,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(value.as_deref().unwrap_or(sentinel))
}

fn deserialize_with_sentinel<'de, D: Deserializer<'de>>(
    deserializer: D,
    sentinel: &'static str,
) -> Result<Option<String>, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(text_from_value(value, sentinel))
}

/// `#[serde(with = "not_available")]`: `None` <-> `"N/A"`.
pub mod not_available {
    use super::*;

    pub fn serialize<S: Serializer>(value: &Option<String>, s: S) -> Result<S::Ok, S::Error> {
        serialize_or(value, NOT_AVAILABLE, s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        deserialize_with_sentinel(d, NOT_AVAILABLE)
    }
}

/// `#[serde(with = "unknown_name")]`: `None` <-> `"Unknown"`.
pub mod unknown_name {
    use super::*;

    pub fn serialize<S: Serializer>(value: &Option<String>, s: S) -> Result<S::Ok, S::Error> {
        serialize_or(value, UNKNOWN_NAME, s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        deserialize_with_sentinel(d, UNKNOWN_NAME)
    }
}

/// `#[serde(with = "unknown_id")]`: `None` <-> `"UNKNOWN"`.
pub mod unknown_id {
    use super::*;

    pub fn serialize<S: Serializer>(value: &Option<String>, s: S) -> Result<S::Ok, S::Error> {
        serialize_or(value, UNKNOWN_ID, s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        deserialize_with_sentinel(d, UNKNOWN_ID)
    }
}
