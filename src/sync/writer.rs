// ABOUTME: BatchWriter for table sync - applies serialized rows to the target
// ABOUTME: Buffers tuples and flushes REPLACE INTO statements bounded by packet size

use crate::error::CopyIssue;
use crate::mysql::{Database, DbError};
use crate::utils::quote_mysql_ident;

use super::inspector::ColumnSpec;

/// Default flush threshold in bytes.
///
/// Kept below the common 4 MiB `max_allowed_packet` so a flushed statement
/// (threshold plus one row plus the REPLACE prefix) still fits in one packet.
pub const DEFAULT_FLUSH_THRESHOLD: usize = 4_000_000;

/// Append-only buffer of serialized row tuples, joined by commas.
#[derive(Debug, Default)]
pub struct Batch {
    values: String,
    rows: u64,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, tuple: &str) {
        if self.rows > 0 {
            self.values.push(',');
        }
        self.values.push_str(tuple);
        self.rows += 1;
    }

    /// Current size of the VALUES list in bytes.
    pub fn len_bytes(&self) -> usize {
        self.values.len()
    }

    pub fn rows(&self) -> u64 {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    /// True once the buffer is strictly larger than `threshold` bytes.
    pub fn exceeds(&self, threshold: usize) -> bool {
        self.values.len() > threshold
    }

    pub fn values(&self) -> &str {
        &self.values
    }

    /// Take the buffered VALUES list and row count, leaving the batch empty.
    fn take(&mut self) -> (String, u64) {
        let rows = std::mem::take(&mut self.rows);
        (std::mem::take(&mut self.values), rows)
    }
}

/// Build the `REPLACE INTO <table> (<columns>) VALUES ` prefix.
///
/// Column order must match the SELECT list the tuples were read with.
pub fn build_replace_prefix(table: &str, columns: &[ColumnSpec]) -> String {
    let column_list = columns
        .iter()
        .map(|c| quote_mysql_ident(&c.name))
        .collect::<Vec<_>>()
        .join(",");

    format!(
        "REPLACE INTO {} ({}) VALUES ",
        quote_mysql_ident(table),
        column_list
    )
}

/// Outcome of one flushed batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushOutcome {
    /// 1-based batch sequence number within this copy
    pub batch: u64,
    pub rows: u64,
    pub bytes: usize,
    pub error: Option<DbError>,
}

impl FlushOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Totals of everything written by one `BatchWriter`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteSummary {
    pub rows_appended: u64,
    pub rows_flushed: u64,
    pub batches_flushed: u64,
    pub batches_failed: u64,
    pub issues: Vec<CopyIssue>,
}

/// Writes row tuples to the target in size-bounded REPLACE batches.
///
/// Flushes are strictly sequential. A failed batch is recorded and the writer
/// keeps going; batches already flushed are never rolled back.
pub struct BatchWriter<'a, D: ?Sized> {
    target: &'a mut D,
    table: String,
    prefix: String,
    threshold: usize,
    batch: Batch,
    summary: WriteSummary,
    batches_attempted: u64,
}

impl<'a, D> BatchWriter<'a, D>
where
    D: Database + ?Sized,
{
    pub fn new(target: &'a mut D, table: &str, columns: &[ColumnSpec], threshold: usize) -> Self {
        Self {
            target,
            table: table.to_string(),
            prefix: build_replace_prefix(table, columns),
            threshold,
            batch: Batch::new(),
            summary: WriteSummary::default(),
            batches_attempted: 0,
        }
    }

    /// Add one serialized row tuple to the buffer.
    pub fn append(&mut self, tuple: &str) {
        self.batch.push(tuple);
        self.summary.rows_appended += 1;
    }

    pub fn buffered_rows(&self) -> u64 {
        self.batch.rows()
    }

    pub fn buffered_bytes(&self) -> usize {
        self.batch.len_bytes()
    }

    /// Flush if the buffer has grown past the threshold.
    pub async fn maybe_flush(&mut self) -> Option<FlushOutcome> {
        if !self.batch.exceeds(self.threshold) {
            return None;
        }
        Some(self.flush().await)
    }

    /// Flush whatever is left, regardless of size. Returns `None` when the buffer is empty.
    pub async fn final_flush(&mut self) -> Option<FlushOutcome> {
        if self.batch.is_empty() {
            return None;
        }
        Some(self.flush().await)
    }

    async fn flush(&mut self) -> FlushOutcome {
        let (values, rows) = self.batch.take();
        self.batches_attempted += 1;
        let batch = self.batches_attempted;

        let mut statement = String::with_capacity(self.prefix.len() + values.len());
        statement.push_str(&self.prefix);
        statement.push_str(&values);
        let bytes = statement.len();

        tracing::debug!(
            "Flushing batch {} of {} ({} rows, {} bytes)",
            batch,
            self.table,
            rows,
            bytes
        );

        let error = match self.target.execute(&statement).await {
            Ok(_) => {
                self.summary.batches_flushed += 1;
                self.summary.rows_flushed += rows;
                tracing::info!(
                    "Progress: {} - {} rows posted ({} batches)",
                    self.table,
                    self.summary.rows_flushed,
                    self.summary.batches_flushed
                );
                None
            }
            Err(e) => {
                self.summary.batches_failed += 1;
                tracing::warn!(
                    "Batch {} of {} ({} rows) failed: {}",
                    batch,
                    self.table,
                    rows,
                    e
                );
                self.summary.issues.push(CopyIssue::FlushFailed {
                    batch,
                    rows,
                    error: e.to_string(),
                });
                Some(e)
            }
        };

        FlushOutcome {
            batch,
            rows,
            bytes,
            error,
        }
    }

    /// Consume the writer and return its totals. Unflushed rows are not counted as flushed.
    pub fn finish(self) -> WriteSummary {
        if !self.batch.is_empty() {
            tracing::warn!(
                "{} buffered rows for {} were never flushed",
                self.batch.rows(),
                self.table
            );
        }
        self.summary
    }
}
