use std::path::PathBuf;

/// Application-level constants
pub const APP_NAME: &str = "MedRecord";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Version stamped into `processing_info.extractor_version` of tag-read records.
pub const EXTRACTOR_VERSION: &str = "1.0";

/// Longest value kept per element in `all_dicom_tags` before truncation.
pub const MAX_TAG_VALUE_CHARS: usize = 200;

const DATABASE_FILE: &str = "medical_records.db";

/// Get the application data directory
/// ~/MedRecord/ on all platforms; falls back to the working directory when
/// no home directory can be determined.
pub fn app_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Default SQLite database location
pub fn default_database_path() -> PathBuf {
    app_data_dir().join(DATABASE_FILE)
}

/// Filter used when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "info,medrecord_lib=debug"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_data_dir_named_after_app() {
        let dir = app_data_dir();
        assert!(dir.ends_with("MedRecord"));
        if let Some(home) = dirs::home_dir() {
            assert!(dir.starts_with(home));
        }
    }

    #[test]
    fn database_under_app_data() {
        let db = default_database_path();
        assert!(db.starts_with(app_data_dir()));
        assert!(db.ends_with("medical_records.db"));
    }

    #[test]
    fn log_filter_enables_crate_debug() {
        assert!(default_log_filter().contains("medrecord_lib=debug"));
    }

    #[test]
    fn app_version_matches_cargo() {
        assert_eq!(APP_VERSION, "0.1.0");
    }
}
