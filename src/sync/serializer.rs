// ABOUTME: RowSerializer for table sync - turns text cells into SQL literals
// ABOUTME: Classifies declared column types and quotes values according to their class

use serde::{Deserialize, Serialize};

use crate::error::{CopyIssue, Result, SyncError};
use crate::mysql::RawRow;
use crate::utils::quote_mysql_literal;

use super::inspector::ColumnSpec;

/// How a column's values are written as SQL literals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeClass {
    /// Written as the raw text the server returned
    Numeric,
    /// Written as a quoted, escaped string literal
    Text,
    /// No safe literal form (binary, spatial, bit types)
    Unsupported,
}

/// What to do with columns whose type is `Unsupported`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum UnsupportedTypePolicy {
    /// Write NULL for the column and record an issue in the copy report
    #[default]
    Null,
    /// Refuse to copy the table
    Abort,
}

/// Base type name of a declared type: lower-cased, without length, precision
/// or attributes. `int(11) unsigned` becomes `int`, `DOUBLE PRECISION` becomes
/// `double precision`.
pub fn base_type_name(declared_type: &str) -> String {
    let lowered = declared_type.trim().to_ascii_lowercase();
    let base = lowered.split('(').next().unwrap_or_default().trim();

    let mut words = base.split_whitespace();
    match (words.next(), words.next()) {
        (Some("double"), Some("precision")) => "double precision".to_string(),
        (Some(first), _) => first.to_string(),
        (None, _) => String::new(),
    }
}

/// Classify a declared column type.
pub fn classify(declared_type: &str) -> TypeClass {
    match base_type_name(declared_type).as_str() {
        "tinyint" | "smallint" | "mediumint" | "int" | "integer" | "bigint" | "float"
        | "double" | "double precision" | "real" | "decimal" | "dec" | "numeric" | "fixed"
        | "bool" | "boolean" | "year" => TypeClass::Numeric,

        "char" | "varchar" | "tinytext" | "text" | "mediumtext" | "longtext" | "date"
        | "datetime" | "timestamp" | "time" | "enum" | "set" | "json" => TypeClass::Text,

        _ => TypeClass::Unsupported,
    }
}

/// Render one cell as a SQL literal for the given class.
///
/// NULL cells become `NULL` whatever their class. Unsupported columns never
/// carry their value through.
pub fn serialize_cell(class: TypeClass, cell: Option<&str>) -> String {
    match (class, cell) {
        (_, None) | (TypeClass::Unsupported, _) => "NULL".to_string(),
        (TypeClass::Numeric, Some(value)) => value.to_string(),
        (TypeClass::Text, Some(value)) => quote_mysql_literal(value),
    }
}

/// Serializes rows of one table into `(v1,v2,...)` tuple literals.
///
/// Column classes are resolved once, up front, so unsupported columns are
/// known before the first row is read.
#[derive(Debug, Clone)]
pub struct RowSerializer {
    table: String,
    classes: Vec<TypeClass>,
    issues: Vec<CopyIssue>,
}

impl RowSerializer {
    /// Build a serializer for `columns`.
    ///
    /// With `UnsupportedTypePolicy::Abort` the first unsupported column is an
    /// error. With `UnsupportedTypePolicy::Null` each one is recorded in `issues`.
    pub fn new(
        table: &str,
        columns: &[ColumnSpec],
        policy: UnsupportedTypePolicy,
    ) -> Result<Self> {
        let mut classes = Vec::with_capacity(columns.len());
        let mut issues = Vec::new();

        for column in columns {
            let class = classify(&column.declared_type);
            if class == TypeClass::Unsupported {
                match policy {
                    UnsupportedTypePolicy::Abort => {
                        return Err(SyncError::SerializationTypeUnrecognized {
                            table: table.to_string(),
                            column: column.name.clone(),
                            declared_type: column.declared_type.clone(),
                        });
                    }
                    UnsupportedTypePolicy::Null => {
                        tracing::warn!(
                            "Column {}.{} has unsupported type '{}', its values will be written as NULL",
                            table,
                            column.name,
                            column.declared_type
                        );
                        issues.push(CopyIssue::UnsupportedType {
                            column: column.name.clone(),
                            declared_type: column.declared_type.clone(),
                        });
                    }
                }
            }
            classes.push(class);
        }

        Ok(Self {
            table: table.to_string(),
            classes,
            issues,
        })
    }

    pub fn classes(&self) -> &[TypeClass] {
        &self.classes
    }

    /// Issues found while classifying the columns.
    pub fn issues(&self) -> &[CopyIssue] {
        &self.issues
    }

    /// Serialize one row as `(v1,v2,...,vn)`.
    ///
    /// The row's cells must be in the same order as the columns given to `new`.
    /// A row with more or fewer cells than columns is rejected rather than
    /// padded with NULLs.
    pub fn serialize_row(&self, row: &RawRow) -> Result<String> {
        if row.len() != self.classes.len() {
            return Err(SyncError::RowWidthMismatch {
                table: self.table.clone(),
                expected: self.classes.len(),
                actual: row.len(),
            });
        }

        let literals: Vec<String> = self
            .classes
            .iter()
            .enumerate()
            .map(|(idx, class)| serialize_cell(*class, row.get(idx)))
            .collect();

        Ok(format!("({})", literals.join(",")))
    }
}
