// ABOUTME: DeltaSelector for table sync - reads changed rows from the source
// ABOUTME: Selects rows at or after the target's watermark through a forward-only cursor

use crate::error::{Result, SyncError};
use crate::mysql::{Database, DbError, RawRow, RowCursor};
use crate::utils::{quote_mysql_ident, quote_mysql_literal};

use super::inspector::ColumnSpec;
use super::watermark::Watermark;

/// Build the change-selection query.
///
/// The comparison is inclusive (`>=`): rows sharing the previous high-water
/// timestamp are fetched again on every run, so rows written in the same
/// second as the last copied row are never skipped. Re-applying them is safe
/// because the target write is a REPLACE by key.
pub fn build_select_query(
    table: &str,
    columns: &[ColumnSpec],
    watermark_column: &str,
    watermark: &Watermark,
) -> String {
    let column_list = columns
        .iter()
        .map(|c| quote_mysql_ident(&c.name))
        .collect::<Vec<_>>()
        .join(",");

    format!(
        "SELECT {} FROM {} WHERE {} >= {}",
        column_list,
        quote_mysql_ident(table),
        quote_mysql_ident(watermark_column),
        quote_mysql_literal(watermark.as_str())
    )
}

/// Lazily consumed rows changed since a watermark.
///
/// Forward-only and not restartable: each row is yielded once.
pub struct DeltaCursor<'a> {
    table: String,
    statement: String,
    inner: Box<dyn RowCursor + 'a>,
    rows_read: u64,
}

impl DeltaCursor<'_> {
    /// Fetch the next changed row, `Ok(None)` once the result set is exhausted.
    pub async fn next_row(&mut self) -> Result<Option<RawRow>> {
        let row = self
            .inner
            .next_row()
            .await
            .map_err(|e| self.query_failed(e))?;
        if row.is_some() {
            self.rows_read += 1;
        }
        Ok(row)
    }

    pub fn rows_read(&self) -> u64 {
        self.rows_read
    }

    pub fn statement(&self) -> &str {
        &self.statement
    }

    fn query_failed(&self, source: DbError) -> SyncError {
        SyncError::QueryFailed {
            table: self.table.clone(),
            statement: self.statement.clone(),
            source,
        }
    }
}

/// Run the change-selection query against the source.
pub async fn select_changed<'a, D>(
    source: &'a mut D,
    table: &str,
    columns: &[ColumnSpec],
    watermark_column: &str,
    watermark: &Watermark,
) -> Result<DeltaCursor<'a>>
where
    D: Database + ?Sized,
{
    let statement = build_select_query(table, columns, watermark_column, watermark);

    tracing::debug!("Selecting changes from {} with: {}", table, statement);

    let inner = source
        .query_stream(&statement)
        .await
        .map_err(|e| SyncError::QueryFailed {
            table: table.to_string(),
            statement: statement.clone(),
            source: e,
        })?;

    Ok(DeltaCursor {
        table: table.to_string(),
        statement,
        inner,
        rows_read: 0,
    })
}
