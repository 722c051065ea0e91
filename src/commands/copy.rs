// ABOUTME: Copy command - replicates every configured table once
// ABOUTME: Connects to both databases, runs the copies and prints a summary

use anyhow::{Context, Result};
use std::io::Write;

use crate::config::ReplicatorConfig;
use crate::mysql::{connect_with_retry, disconnect_quietly, Database, Disconnect};
use crate::sync::{run_jobs, RunSummary};
use crate::utils::sanitize_url;

/// Copy every configured table once and print the outcome.
///
/// Terminal failures of individual tables are reported in the returned
/// summary rather than as an `Err`; `Err` means the run could not start.
pub async fn copy(config: &ReplicatorConfig, json: bool) -> Result<RunSummary> {
    config.validate()?;
    let source_url = config.source_url.as_deref().unwrap_or_default();
    let target_url = config.target_url.as_deref().unwrap_or_default();

    tracing::info!(
        "Copying {} tables from {} to {}",
        config.tables.len(),
        sanitize_url(source_url),
        sanitize_url(target_url)
    );

    let source = connect_with_retry(source_url)
        .await
        .context("Failed to connect to source database")?;
    let target = connect_with_retry(target_url)
        .await
        .context("Failed to connect to target database")?;

    run_and_report(source, target, config, json, &mut std::io::stdout()).await
}

/// Run every configured table, write the summary to `out`, then close both handles.
///
/// Closing happens after the summary is written and never fails the run.
pub async fn run_and_report<S, T, W>(
    mut source: S,
    mut target: T,
    config: &ReplicatorConfig,
    json: bool,
    out: &mut W,
) -> Result<RunSummary>
where
    S: Database + Disconnect,
    T: Database + Disconnect,
    W: Write,
{
    let summary = run_jobs(
        &mut source,
        &mut target,
        &config.jobs(),
        &config.copy_options(),
    )
    .await;

    write_summary(out, &summary, json)?;

    disconnect_quietly(source, "source").await;
    disconnect_quietly(target, "target").await;

    Ok(summary)
}

/// Write a run summary as JSON or as one line per table.
pub fn write_summary<W: Write>(out: &mut W, summary: &RunSummary, json: bool) -> Result<()> {
    if json {
        let text =
            serde_json::to_string_pretty(summary).context("Failed to serialize run summary")?;
        writeln!(out, "{}", text)?;
        return Ok(());
    }

    for report in &summary.reports {
        writeln!(out, "{}", report)?;
    }
    for failure in &summary.failures {
        writeln!(out, "{}: FAILED - {}", failure.table, failure.error)?;
    }
    writeln!(
        out,
        "Elapsed = {}ms, {} rows copied, {} failed, {} degraded",
        summary.duration_ms,
        summary.rows_flushed(),
        summary.failures.len(),
        summary.degraded()
    )?;
    Ok(())
}
