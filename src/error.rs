// ABOUTME: Error types for the table sync core
// ABOUTME: Separates terminal copy failures from issues recorded in the copy report

use serde::Serialize;
use std::fmt;
use thiserror::Error;

use crate::mysql::DbError;

/// Terminal failure of a table copy. The copy stops as soon as one is raised.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The source table does not exist
    #[error("Could not find source table {table}")]
    SourceNotFound { table: String },

    /// The target table was missing and executing the source DDL failed
    #[error("Could not create table {table} in target: {source}\n  Statement: {statement}")]
    TargetCreationFailed {
        table: String,
        statement: String,
        #[source]
        source: DbError,
    },

    /// The change-selection query against the source failed
    #[error("Delta query on {table} failed: {source}\n  Statement: {statement}")]
    QueryFailed {
        table: String,
        statement: String,
        #[source]
        source: DbError,
    },

    /// The source cursor failed after rows had already been read.
    ///
    /// Rows read before the failure were flushed; `rows_flushed` of them are in
    /// the target. A re-run resumes from the target watermark.
    #[error("Delta query on {table} failed after {rows_read} rows ({rows_flushed} written in {batches_flushed} batches, {batches_failed} batches failed): {source}\n  Statement: {statement}")]
    QueryInterrupted {
        table: String,
        statement: String,
        rows_read: u64,
        rows_flushed: u64,
        batches_flushed: u64,
        batches_failed: u64,
        #[source]
        source: DbError,
    },

    /// A source row does not have one cell per column
    #[error("A row of {table} has {actual} cells, expected {expected}")]
    RowWidthMismatch {
        table: String,
        expected: usize,
        actual: usize,
    },

    /// A metadata query (SHOW CREATE TABLE, SHOW COLUMNS, MAX) failed
    #[error("Failed to inspect {table}: {source}\n  Statement: {statement}")]
    Introspection {
        table: String,
        statement: String,
        #[source]
        source: DbError,
    },

    /// SHOW COLUMNS returned nothing for an existing table
    #[error("Table {0} reported no columns")]
    NoColumns(String),

    /// The watermark column is not one of the table's columns
    #[error("Watermark column {column} does not exist in {table}")]
    UnknownWatermarkColumn { table: String, column: String },

    /// A column type cannot be serialized and the policy is to abort
    #[error("Column {column} of {table} has unsupported type '{declared_type}'")]
    SerializationTypeUnrecognized {
        table: String,
        column: String,
        declared_type: String,
    },

    /// Source and target definitions differ and the policy is to abort
    #[error("Schema drift detected on {table}: {detail}")]
    SchemaDrift { table: String, detail: String },

    /// A table or column name failed validation
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),
}

impl SyncError {
    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// A non-terminal problem recorded during a copy.
///
/// Any issue marks the copy as degraded, but the rows that could be copied are.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CopyIssue {
    /// A column whose declared type has no literal form; its cells were written as NULL
    UnsupportedType {
        column: String,
        declared_type: String,
    },
    /// One REPLACE batch was rejected by the target
    FlushFailed {
        batch: u64,
        rows: u64,
        error: String,
    },
    /// The existing target table differs from the source definition
    SchemaDrift { detail: String },
}

impl fmt::Display for CopyIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CopyIssue::UnsupportedType {
                column,
                declared_type,
            } => write!(
                f,
                "column {} has unsupported type '{}', values written as NULL",
                column, declared_type
            ),
            CopyIssue::FlushFailed { batch, rows, error } => {
                write!(f, "batch {} ({} rows) failed: {}", batch, rows, error)
            }
            CopyIssue::SchemaDrift { detail } => write!(f, "schema drift: {}", detail),
        }
    }
}

/// Result type alias for table sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
