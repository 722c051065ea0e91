// ABOUTME: Watermark-based incremental table sync between two MySQL databases
// ABOUTME: Detects changed rows by an update-timestamp column and REPLACEs them in batches

pub mod copier;
pub mod daemon;
pub mod inspector;
pub mod reconciler;
pub mod selector;
pub mod serializer;
pub mod watermark;
pub mod writer;

pub use copier::{copy_table, CopyOptions, CopyReport, CopyStatus, SchemaDriftPolicy};
pub use daemon::{
    run_jobs, run_jobs_until, shutdown_requested, DaemonConfig, RunSummary, SyncDaemon,
    TableFailure, TableJob,
};
pub use inspector::{get_columns, get_create_statement, ColumnSpec};
pub use reconciler::{describe_drift, ensure_target, Reconciliation};
pub use selector::{build_select_query, select_changed, DeltaCursor};
pub use serializer::{classify, RowSerializer, TypeClass, UnsupportedTypePolicy};
pub use watermark::{latest_update, Watermark};
pub use writer::{Batch, BatchWriter, FlushOutcome, WriteSummary, DEFAULT_FLUSH_THRESHOLD};
