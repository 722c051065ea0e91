// ABOUTME: Database handle abstraction used by the table sync core
// ABOUTME: Rows travel as nullable string cells so the core never sees driver types

pub mod connection;

use async_trait::async_trait;
use std::fmt;

pub use connection::{connect, connect_with_retry, MySqlDatabase};

/// MySQL server error code for `ER_NO_SUCH_TABLE`.
pub const ER_NO_SUCH_TABLE: u16 = 1146;

/// A single row returned by a source query.
///
/// Every cell is either `None` (SQL `NULL`) or the textual form of the value
/// exactly as the server sent it. Keeping every value as text decouples the
/// serializer from driver-specific type handling.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawRow {
    cells: Vec<Option<String>>,
}

impl RawRow {
    pub fn new(cells: Vec<Option<String>>) -> Self {
        Self { cells }
    }

    pub fn cells(&self) -> &[Option<String>] {
        &self.cells
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Get the cell at `idx`, `None` if the index is out of range or the value is NULL.
    pub fn get(&self, idx: usize) -> Option<&str> {
        self.cells.get(idx).and_then(|c| c.as_deref())
    }

    pub fn is_null(&self, idx: usize) -> bool {
        matches!(self.cells.get(idx), Some(None))
    }

    pub fn into_cells(self) -> Vec<Option<String>> {
        self.cells
    }
}

impl From<Vec<Option<String>>> for RawRow {
    fn from(cells: Vec<Option<String>>) -> Self {
        Self::new(cells)
    }
}

/// Error reported by a database handle.
///
/// `code` carries the server error number when the failure came from the
/// server itself (as opposed to I/O or protocol failures).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbError {
    pub code: Option<u16>,
    pub message: String,
}

impl DbError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    pub fn server(code: u16, message: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            message: message.into(),
        }
    }

    /// True when the server rejected the statement because the table does not exist.
    pub fn is_unknown_table(&self) -> bool {
        self.code == Some(ER_NO_SUCH_TABLE)
    }
}

impl fmt::Display for DbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "Error {}: {}", code, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for DbError {}

/// Forward-only cursor over the rows of one query.
///
/// A cursor cannot be rewound; once `next_row` returns `Ok(None)` it is exhausted.
#[async_trait]
pub trait RowCursor: Send {
    async fn next_row(&mut self) -> Result<Option<RawRow>, DbError>;
}

/// A live database handle supplied by the caller.
///
/// The sync core never opens, pools or closes connections; it only borrows
/// a handle for the duration of one operation.
#[async_trait]
pub trait Database: Send {
    /// Run a query and return a lazily consumed cursor over its rows.
    async fn query_stream<'a>(&'a mut self, sql: &str)
        -> Result<Box<dyn RowCursor + 'a>, DbError>;

    /// Execute a statement that returns no rows, returning the affected row count.
    async fn execute(&mut self, sql: &str) -> Result<u64, DbError>;

    /// Run a query and collect every row. Intended for small metadata queries.
    async fn query(&mut self, sql: &str) -> Result<Vec<RawRow>, DbError> {
        let mut cursor = self.query_stream(sql).await?;
        let mut rows = Vec::new();
        while let Some(row) = cursor.next_row().await? {
            rows.push(row);
        }
        Ok(rows)
    }
}

/// A handle that can be closed once its work is done.
#[async_trait]
pub trait Disconnect: Send {
    async fn disconnect(self) -> Result<(), DbError>;
}

/// Close `db`, logging a failure instead of returning it.
pub async fn disconnect_quietly<D: Disconnect>(db: D, role: &str) {
    if let Err(e) = db.disconnect().await {
        tracing::warn!("Failed to close {} connection: {}", role, e);
    }
}
