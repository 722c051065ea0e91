// ABOUTME: Table copy orchestration - runs one incremental copy from source to target
// ABOUTME: Sequences inspection, schema reconciliation, watermark, delta query and batching

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

use crate::error::{CopyIssue, Result, SyncError};
use crate::mysql::Database;

use super::inspector::{get_columns, get_create_statement};
use super::reconciler::ensure_target;
use super::selector::select_changed;
use super::serializer::{RowSerializer, UnsupportedTypePolicy};
use super::watermark::{latest_update, Watermark};
use super::writer::{BatchWriter, DEFAULT_FLUSH_THRESHOLD};

/// What to do when an existing target table differs from the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum SchemaDriftPolicy {
    /// Copy anyway and record the difference in the report
    #[default]
    Warn,
    /// Refuse to copy the table
    Abort,
}

/// Tunables for a table copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyOptions {
    /// Flush a REPLACE batch once its VALUES list exceeds this many bytes
    pub flush_threshold_bytes: usize,
    pub unsupported_types: UnsupportedTypePolicy,
    pub schema_drift: SchemaDriftPolicy,
}

impl Default for CopyOptions {
    fn default() -> Self {
        Self {
            flush_threshold_bytes: DEFAULT_FLUSH_THRESHOLD,
            unsupported_types: UnsupportedTypePolicy::default(),
            schema_drift: SchemaDriftPolicy::default(),
        }
    }
}

/// Overall status of a copy that ran to completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CopyStatus {
    /// Every selected row was written
    Ok,
    /// The copy finished but at least one issue was recorded
    Degraded,
}

impl fmt::Display for CopyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CopyStatus::Ok => f.write_str("OK"),
            CopyStatus::Degraded => f.write_str("DEGRADED"),
        }
    }
}

/// Result of a table copy that was not aborted.
#[derive(Debug, Clone, Serialize)]
pub struct CopyReport {
    pub table: String,
    pub status: CopyStatus,
    /// True when the target table was created by this copy
    pub target_created: bool,
    /// Lower bound (inclusive) used to select changed rows
    pub watermark: Watermark,
    /// Rows read from the source and handed to the writer
    pub rows_attempted: u64,
    /// Rows in batches the target accepted
    pub rows_flushed: u64,
    pub batches_flushed: u64,
    pub batches_failed: u64,
    pub issues: Vec<CopyIssue>,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl CopyReport {
    pub fn is_success(&self) -> bool {
        self.status == CopyStatus::Ok
    }
}

impl fmt::Display for CopyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} - {}/{} rows copied in {} batches since {} ({}ms)",
            self.table,
            self.status,
            self.rows_flushed,
            self.rows_attempted,
            self.batches_flushed,
            self.watermark,
            self.duration_ms
        )?;
        if self.target_created {
            write!(f, ", target table created")?;
        }
        for issue in &self.issues {
            write!(f, "\n  - {}", issue)?;
        }
        Ok(())
    }
}

/// Copy rows of `table` changed since the target's high-water mark.
///
/// Steps, in order: verify the source table exists, read its columns, make
/// sure the target table exists, compute the target watermark on
/// `watermark_column`, select source rows at or after it and REPLACE them
/// into the target in batches.
///
/// Terminal failures (missing source table, failed target creation, failed
/// delta query, metadata errors) abort with `Err`. A failing batch does not:
/// later batches are still attempted and the report is marked degraded.
/// The copy is not atomic; batches already written stay written. If the
/// source cursor fails mid-stream, the rows read so far are flushed and the
/// returned `QueryInterrupted` carries how many reached the target.
///
/// `source` and `target` are borrowed for the whole call. Concurrent copies
/// into the same target table must be serialized by the caller.
pub async fn copy_table<S, T>(
    source: &mut S,
    target: &mut T,
    table: &str,
    watermark_column: &str,
    options: &CopyOptions,
) -> Result<CopyReport>
where
    S: Database + ?Sized,
    T: Database + ?Sized,
{
    let started_at = Utc::now();
    let start = Instant::now();

    crate::utils::validate_identifier(table)
        .map_err(|e| SyncError::InvalidIdentifier(e.to_string()))?;
    crate::utils::validate_identifier(watermark_column)
        .map_err(|e| SyncError::InvalidIdentifier(e.to_string()))?;

    let source_create_statement = get_create_statement(source, table)
        .await?
        .ok_or_else(|| SyncError::SourceNotFound {
            table: table.to_string(),
        })?;

    let columns = get_columns(source, table).await?;
    if columns.is_empty() {
        return Err(SyncError::NoColumns(table.to_string()));
    }
    if !columns.iter().any(|c| c.name == watermark_column) {
        return Err(SyncError::UnknownWatermarkColumn {
            table: table.to_string(),
            column: watermark_column.to_string(),
        });
    }
    if !columns.iter().any(|c| c.is_primary_key() || c.is_unique()) {
        tracing::warn!(
            "Table {} has no primary or unique key, REPLACE will append duplicates on re-runs",
            table
        );
    }

    let serializer = RowSerializer::new(table, &columns, options.unsupported_types)?;
    let mut issues: Vec<CopyIssue> = serializer.issues().to_vec();

    let reconciliation = ensure_target(target, table, &source_create_statement).await?;
    if let Some(detail) = reconciliation.drift() {
        match options.schema_drift {
            SchemaDriftPolicy::Abort => {
                return Err(SyncError::SchemaDrift {
                    table: table.to_string(),
                    detail: detail.to_string(),
                });
            }
            SchemaDriftPolicy::Warn => issues.push(CopyIssue::SchemaDrift {
                detail: detail.to_string(),
            }),
        }
    }

    let watermark = match latest_update(target, table, watermark_column).await? {
        Some(watermark) => watermark,
        None => {
            tracing::warn!(
                "Table {} vanished from target after reconciliation, copying from the floor",
                table
            );
            Watermark::floor()
        }
    };

    tracing::info!(
        "Copying {} rows with {} >= '{}'",
        table,
        watermark_column,
        watermark
    );

    let mut cursor = select_changed(source, table, &columns, watermark_column, &watermark).await?;
    let mut writer = BatchWriter::new(target, table, &columns, options.flush_threshold_bytes);

    loop {
        let row = match cursor.next_row().await {
            Ok(Some(row)) => row,
            Ok(None) => break,
            Err(SyncError::QueryFailed {
                statement, source, ..
            }) => {
                // Rows already read are complete; write them before giving up
                writer.final_flush().await;
                let summary = writer.finish();
                tracing::error!(
                    "Source cursor for {} failed after {} rows, {} of them written to target",
                    table,
                    cursor.rows_read(),
                    summary.rows_flushed
                );
                return Err(SyncError::QueryInterrupted {
                    table: table.to_string(),
                    statement,
                    rows_read: cursor.rows_read(),
                    rows_flushed: summary.rows_flushed,
                    batches_flushed: summary.batches_flushed,
                    batches_failed: summary.batches_failed,
                    source,
                });
            }
            Err(e) => return Err(e),
        };

        let tuple = serializer.serialize_row(&row)?;
        writer.append(&tuple);
        writer.maybe_flush().await;
    }

    if writer.final_flush().await.is_none() && cursor.rows_read() == 0 {
        tracing::info!("No records to copy for {}", table);
    }

    let summary = writer.finish();
    issues.extend(summary.issues);

    let status = if issues.is_empty() {
        CopyStatus::Ok
    } else {
        CopyStatus::Degraded
    };

    let report = CopyReport {
        table: table.to_string(),
        status,
        target_created: reconciliation.created(),
        watermark,
        rows_attempted: summary.rows_appended,
        rows_flushed: summary.rows_flushed,
        batches_flushed: summary.batches_flushed,
        batches_failed: summary.batches_failed,
        issues,
        started_at,
        duration_ms: start.elapsed().as_millis() as u64,
    };

    match report.status {
        CopyStatus::Ok => tracing::info!("{}", report),
        CopyStatus::Degraded => tracing::warn!("{}", report),
    }

    Ok(report)
}
