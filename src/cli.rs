//! Command-line surface of the `medrecord` binary.

use std::io::Write;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use serde::Serialize;
use thiserror::Error;

use crate::config;
use crate::db::{self, DatabaseError};
use crate::models::ExtractionOutcome;
use crate::pipeline::extraction::{FileKind, MetadataExtractor};
use crate::pipeline_config::ExtractionConfig;

#[derive(Parser, Debug)]
#[command(name = "medrecord")]
#[command(about = "Extract canonical metadata from DICOM files, report scans and PDFs")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Extract one file and print the record as JSON
    Extract {
        file: PathBuf,

        /// Persist the record after extraction
        #[arg(long)]
        store: bool,

        /// Database path (defaults to ~/MedRecord/medical_records.db)
        #[arg(long)]
        db: Option<PathBuf>,

        /// Uploader identity recorded with the stored row
        #[arg(long, default_value = "system")]
        uploaded_by: String,
    },
    /// Print storage statistics as JSON
    Stats {
        #[arg(long)]
        db: Option<PathBuf>,
    },
}

#[derive(Error, Debug)]
pub enum RunError {
    #[error("{0}")]
    Extraction(String),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Serialize)]
struct StoredOutput<'a> {
    image_id: String,
    record: &'a ExtractionOutcome,
}

/// Run one command, writing JSON to `out`.
pub fn execute(cli: Cli, config: &ExtractionConfig, out: &mut impl Write) -> Result<(), RunError> {
    match cli.command {
        Command::Extract {
            file,
            store,
            db,
            uploaded_by,
        } => {
            let extractor = MetadataExtractor::new(config);
            extract(&extractor, &file, store.then_some(db), &uploaded_by, out)
        }
        Command::Stats { db } => {
            let conn = open(db)?;
            let stats = db::get_statistics(&conn)?;
            writeln!(out, "{}", serde_json::to_string_pretty(&stats)?)?;
            Ok(())
        }
    }
}

/// `store` is `Some(db path override)` when the record should be persisted.
fn extract(
    extractor: &MetadataExtractor,
    file: &Path,
    store: Option<Option<PathBuf>>,
    uploaded_by: &str,
    out: &mut impl Write,
) -> Result<(), RunError> {
    let outcome = extractor.extract(file);
    let (record, db_path) = match (&outcome, store) {
        (ExtractionOutcome::Error { error }, _) => {
            writeln!(out, "{}", serde_json::to_string_pretty(&outcome)?)?;
            return Err(RunError::Extraction(error.clone()));
        }
        (ExtractionOutcome::Record(_), None) => {
            writeln!(out, "{}", serde_json::to_string_pretty(&outcome)?)?;
            return Ok(());
        }
        (ExtractionOutcome::Record(record), Some(db_path)) => (record, db_path),
    };

    // The outcome is a record, so the extension routed to a known kind.
    let source = file
        .extension()
        .and_then(|e| FileKind::from_extension(&e.to_string_lossy()))
        .map(|kind| kind.upload_source())
        .ok_or_else(|| RunError::Extraction("Unsupported file format".into()))?;

    let conn = open(db_path)?;
    let path = file.to_string_lossy();
    let id = db::store_record(&conn, record, source, Some(path.as_ref()), uploaded_by)?;
    let output = StoredOutput {
        image_id: id.to_string(),
        record: &outcome,
    };
    writeln!(out, "{}", serde_json::to_string_pretty(&output)?)?;
    Ok(())
}

fn open(db_path: Option<PathBuf>) -> Result<rusqlite::Connection, RunError> {
    let path = db_path.unwrap_or_else(config::default_database_path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    tracing::debug!(path = %path.display(), "Opening database");
    Ok(db::open_database(&path)?)
}
