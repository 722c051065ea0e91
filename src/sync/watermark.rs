// ABOUTME: WatermarkTracker - computes the high-water mark of a target table
// ABOUTME: The target table itself is the durable store of sync progress

use serde::Serialize;
use std::fmt;

use crate::error::{Result, SyncError};
use crate::mysql::Database;
use crate::utils::quote_mysql_ident;

/// High-water mark of the update-timestamp column.
///
/// Values are sortable timestamp strings (`YYYY-MM-DD HH:MM:SS[.ffffff]`), so
/// lexicographic order matches temporal order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Watermark(String);

impl Watermark {
    /// Lowest possible watermark, used for empty tables so a first copy selects every row.
    pub const FLOOR: &'static str = "0000-01-01 00:00:00";

    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn floor() -> Self {
        Self(Self::FLOOR.to_string())
    }

    pub fn is_floor(&self) -> bool {
        self.0 == Self::FLOOR
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Watermark {
    fn default() -> Self {
        Self::floor()
    }
}

impl fmt::Display for Watermark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Compute `MAX(column)` over `table`.
///
/// Returns:
/// - `Ok(None)` when the table does not exist
/// - `Ok(Some(Watermark::floor()))` when the table is empty (or every value is NULL)
/// - `Ok(Some(max))` otherwise
pub async fn latest_update<D>(db: &mut D, table: &str, column: &str) -> Result<Option<Watermark>>
where
    D: Database + ?Sized,
{
    let statement = format!(
        "SELECT MAX({}) FROM {}",
        quote_mysql_ident(column),
        quote_mysql_ident(table)
    );

    let rows = match db.query(&statement).await {
        Ok(rows) => rows,
        Err(e) if e.is_unknown_table() => return Ok(None),
        Err(e) => {
            return Err(SyncError::Introspection {
                table: table.to_string(),
                statement,
                source: e,
            });
        }
    };

    let watermark = rows
        .first()
        .and_then(|row| row.get(0))
        .map(Watermark::new)
        .unwrap_or_else(Watermark::floor);

    tracing::debug!("Latest {}.{} in target: {}", table, column, watermark);

    Ok(Some(watermark))
}
