// ABOUTME: Schema introspection for table sync - reads column specs and DDL
// ABOUTME: Distinguishes a missing table from any other metadata query failure

use crate::error::{Result, SyncError};
use crate::mysql::Database;
use crate::utils::quote_mysql_ident;

/// One column of a table, as reported by `SHOW COLUMNS`.
///
/// The order of a table's `ColumnSpec`s is the order used for both the
/// SELECT list on the source and the REPLACE column list on the target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: String,
    /// Raw type descriptor, e.g. `varchar(64)`, `int(11) unsigned`, `datetime`
    pub declared_type: String,
    /// `PRI`, `UNI`, `MUL` or empty
    pub key_role: String,
}

impl ColumnSpec {
    pub fn new(
        name: impl Into<String>,
        declared_type: impl Into<String>,
        key_role: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            declared_type: declared_type.into(),
            key_role: key_role.into(),
        }
    }

    pub fn is_primary_key(&self) -> bool {
        self.key_role.eq_ignore_ascii_case("PRI")
    }

    pub fn is_unique(&self) -> bool {
        self.key_role.eq_ignore_ascii_case("UNI")
    }
}

/// Fetch the `CREATE TABLE` statement that reproduces `table`.
///
/// Returns `Ok(None)` when the server reports the table does not exist
/// (error 1146). Any other failure is returned with the statement attached.
pub async fn get_create_statement<D>(db: &mut D, table: &str) -> Result<Option<String>>
where
    D: Database + ?Sized,
{
    let statement = format!("SHOW CREATE TABLE {}", quote_mysql_ident(table));

    let rows = match db.query(&statement).await {
        Ok(rows) => rows,
        Err(e) if e.is_unknown_table() => {
            tracing::debug!("Table {} not found", table);
            return Ok(None);
        }
        Err(e) => {
            return Err(SyncError::Introspection {
                table: table.to_string(),
                statement,
                source: e,
            })
        }
    };

    // SHOW CREATE TABLE returns (Table, Create Table)
    Ok(rows
        .into_iter()
        .next()
        .and_then(|row| row.get(1).map(str::to_string)))
}

/// Fetch every column of `table` in the server's natural column order.
pub async fn get_columns<D>(db: &mut D, table: &str) -> Result<Vec<ColumnSpec>>
where
    D: Database + ?Sized,
{
    let statement = format!("SHOW COLUMNS FROM {}", quote_mysql_ident(table));

    let rows = db
        .query(&statement)
        .await
        .map_err(|e| SyncError::Introspection {
            table: table.to_string(),
            statement: statement.clone(),
            source: e,
        })?;

    // SHOW COLUMNS returns (Field, Type, Null, Key, Default, Extra)
    let columns: Vec<ColumnSpec> = rows
        .iter()
        .filter_map(|row| {
            let name = row.get(0)?;
            Some(ColumnSpec::new(
                name,
                row.get(1).unwrap_or_default(),
                row.get(3).unwrap_or_default(),
            ))
        })
        .collect();

    tracing::debug!("Table {} has {} columns", table, columns.len());

    Ok(columns)
}
