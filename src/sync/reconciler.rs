// ABOUTME: SchemaReconciler for table sync - makes sure the target table exists
// ABOUTME: Creates missing tables from source DDL and flags drift on existing ones

use crate::error::{Result, SyncError};
use crate::mysql::Database;

use super::inspector::get_create_statement;

/// What `ensure_target` found or did on the target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciliation {
    /// The table was missing and has been created from the source DDL
    Created,
    /// The table already existed. `drift` describes how its definition differs
    /// from the source, if it does. Nothing is migrated either way.
    Existing { drift: Option<String> },
}

impl Reconciliation {
    pub fn created(&self) -> bool {
        matches!(self, Reconciliation::Created)
    }

    pub fn drift(&self) -> Option<&str> {
        match self {
            Reconciliation::Existing { drift } => drift.as_deref(),
            Reconciliation::Created => None,
        }
    }
}

/// Ensure `table` exists in the target, creating it from `source_create_statement` if absent.
///
/// Calling this against a table that already exists is a no-op apart from the
/// drift comparison, so repeated calls are safe.
pub async fn ensure_target<D>(
    target: &mut D,
    table: &str,
    source_create_statement: &str,
) -> Result<Reconciliation>
where
    D: Database + ?Sized,
{
    if let Some(target_create_statement) = get_create_statement(target, table).await? {
        let drift = describe_drift(source_create_statement, &target_create_statement);
        if let Some(detail) = &drift {
            tracing::warn!(
                "Table {} exists in target with a different definition: {}",
                table,
                detail
            );
        }
        return Ok(Reconciliation::Existing { drift });
    }

    tracing::info!("Table {} not found in target, creating it", table);

    target
        .execute(source_create_statement)
        .await
        .map_err(|e| SyncError::TargetCreationFailed {
            table: table.to_string(),
            statement: source_create_statement.to_string(),
            source: e,
        })?;

    tracing::info!("Created table {} in target", table);

    Ok(Reconciliation::Created)
}

/// Normalize a `SHOW CREATE TABLE` statement for comparison.
///
/// Collapses whitespace and drops the `AUTO_INCREMENT=n` table option, which
/// only reflects the current counter and not the table's structure.
pub fn normalize_create_statement(statement: &str) -> String {
    statement
        .split_whitespace()
        .filter(|token| {
            !token
                .to_ascii_uppercase()
                .starts_with("AUTO_INCREMENT=")
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Describe how two table definitions differ, or `None` if they are equivalent.
pub fn describe_drift(source: &str, target: &str) -> Option<String> {
    if normalize_create_statement(source) == normalize_create_statement(target) {
        return None;
    }

    let source_lines = definition_lines(source);
    let target_lines = definition_lines(target);

    let only_source: Vec<&str> = source_lines
        .iter()
        .filter(|l| !target_lines.contains(l))
        .map(String::as_str)
        .collect();
    let only_target: Vec<&str> = target_lines
        .iter()
        .filter(|l| !source_lines.contains(l))
        .map(String::as_str)
        .collect();

    let mut parts = Vec::new();
    if !only_source.is_empty() {
        parts.push(format!("source has [{}]", only_source.join("; ")));
    }
    if !only_target.is_empty() {
        parts.push(format!("target has [{}]", only_target.join("; ")));
    }
    if parts.is_empty() {
        // Same lines in a different order
        parts.push("definitions differ in column or index order".to_string());
    }

    Some(parts.join(", "))
}

/// Split a DDL statement into normalized definition lines.
fn definition_lines(statement: &str) -> Vec<String> {
    statement
        .lines()
        .map(|line| normalize_create_statement(line.trim().trim_end_matches(',')))
        .filter(|line| !line.is_empty())
        .collect()
}
