use std::path::PathBuf;

use thiserror::Error;

/// Structured ingestion failures. Surfaced through `anyhow` with file context.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("unsupported file extension for {collection}: .{extension}")]
    UnsupportedExtension {
        collection: &'static str,
        extension: String,
    },

    #[error("no {collection} file (tried {tried}) in {}", .dir.display())]
    MissingCollection {
        collection: &'static str,
        tried: String,
        dir: PathBuf,
    },

    #[error("missing column '{0}'")]
    MissingColumn(String),

    #[error("column '{column}' has type {found}, expected {expected}")]
    ColumnType {
        column: String,
        found: String,
        expected: &'static str,
    },

    #[error("row {row}, column '{column}': value out of range")]
    OutOfRange { row: usize, column: String },

    #[error("row {row}, {column}: malformed pair '{token}' (expected key:value)")]
    MalformedPair {
        row: usize,
        column: &'static str,
        token: String,
    },
}
