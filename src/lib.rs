// ABOUTME: Library module for mysql-table-replicator
// ABOUTME: Exports the sync core, database seam and CLI commands for the binary and tests

pub mod commands;
pub mod config;
pub mod error;
pub mod mysql;
pub mod sync;
pub mod utils;

pub use error::{CopyIssue, SyncError};
pub use sync::{copy_table, CopyOptions, CopyReport, CopyStatus};
