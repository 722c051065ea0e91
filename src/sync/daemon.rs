// ABOUTME: Multi-table runs and the watch loop for table sync
// ABOUTME: Copies each configured table in turn and repeats on an interval until shutdown

use anyhow::{Context, Result};
use serde::Serialize;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::TryRecvError;
use tokio::time::interval;

use crate::mysql::{connect_with_retry, disconnect_quietly, Database};

use super::copier::{copy_table, CopyOptions, CopyReport};

/// One table to replicate and the column that tracks its updates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableJob {
    pub table: String,
    pub watermark_column: String,
}

impl TableJob {
    pub fn new(table: impl Into<String>, watermark_column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            watermark_column: watermark_column.into(),
        }
    }
}

/// A table whose copy aborted with a terminal error.
#[derive(Debug, Clone, Serialize)]
pub struct TableFailure {
    pub table: String,
    pub error: String,
}

/// Outcome of copying every configured table once.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub reports: Vec<CopyReport>,
    pub failures: Vec<TableFailure>,
    /// Tables not started because shutdown was requested
    pub skipped: Vec<String>,
    pub duration_ms: u64,
}

impl RunSummary {
    /// True when every table copied without issues.
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
            && self.skipped.is_empty()
            && self.reports.iter().all(CopyReport::is_success)
    }

    /// True when shutdown stopped the run before every table was copied.
    pub fn interrupted(&self) -> bool {
        !self.skipped.is_empty()
    }

    pub fn degraded(&self) -> usize {
        self.reports.iter().filter(|r| !r.is_success()).count()
    }

    pub fn rows_flushed(&self) -> u64 {
        self.reports.iter().map(|r| r.rows_flushed).sum()
    }
}

/// Copy every job in order. A table that fails does not stop the others.
pub async fn run_jobs<S, T>(
    source: &mut S,
    target: &mut T,
    jobs: &[TableJob],
    options: &CopyOptions,
) -> RunSummary
where
    S: Database + ?Sized,
    T: Database + ?Sized,
{
    run_jobs_inner(source, target, jobs, options, None).await
}

/// Like `run_jobs`, but checks `shutdown` before each table.
///
/// A table that has started is always copied to completion, so the run stops
/// on a batch boundary. Tables not started are listed in `RunSummary::skipped`.
pub async fn run_jobs_until<S, T>(
    source: &mut S,
    target: &mut T,
    jobs: &[TableJob],
    options: &CopyOptions,
    shutdown: &mut broadcast::Receiver<()>,
) -> RunSummary
where
    S: Database + ?Sized,
    T: Database + ?Sized,
{
    run_jobs_inner(source, target, jobs, options, Some(shutdown)).await
}

/// True when a shutdown message is pending or every sender is gone.
pub fn shutdown_requested(shutdown: &mut broadcast::Receiver<()>) -> bool {
    !matches!(shutdown.try_recv(), Err(TryRecvError::Empty))
}

async fn run_jobs_inner<S, T>(
    source: &mut S,
    target: &mut T,
    jobs: &[TableJob],
    options: &CopyOptions,
    mut shutdown: Option<&mut broadcast::Receiver<()>>,
) -> RunSummary
where
    S: Database + ?Sized,
    T: Database + ?Sized,
{
    let start = Instant::now();
    let mut summary = RunSummary::default();

    for (idx, job) in jobs.iter().enumerate() {
        if shutdown.as_deref_mut().map_or(false, shutdown_requested) {
            summary.skipped = jobs[idx..].iter().map(|j| j.table.clone()).collect();
            tracing::info!(
                "Shutdown requested, stopping before {} ({} tables skipped)",
                job.table,
                summary.skipped.len()
            );
            break;
        }

        match copy_table(source, target, &job.table, &job.watermark_column, options).await {
            Ok(report) => summary.reports.push(report),
            Err(e) => {
                tracing::error!("Failed to copy {}: {}", job.table, e.format_detailed());
                summary.failures.push(TableFailure {
                    table: job.table.clone(),
                    error: e.to_string(),
                });
            }
        }
    }

    summary.duration_ms = start.elapsed().as_millis() as u64;
    summary
}

/// Configuration for the watch loop.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// Interval between copy cycles
    pub interval: Duration,
    pub jobs: Vec<TableJob>,
    pub options: CopyOptions,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300),
            jobs: Vec::new(),
            options: CopyOptions::default(),
        }
    }
}

/// SyncDaemon repeats a multi-table copy at a fixed interval.
///
/// Each cycle opens fresh connections, copies every table and closes them.
/// The loop stops when the shutdown receiver fires. During a cycle the signal
/// is honoured between tables: the table being copied finishes, the rest are
/// skipped and the connections are closed before the loop exits.
pub struct SyncDaemon {
    config: DaemonConfig,
    source_url: String,
    target_url: String,
}

impl SyncDaemon {
    pub fn new(source_url: String, target_url: String, config: DaemonConfig) -> Self {
        Self {
            config,
            source_url,
            target_url,
        }
    }

    /// Connect to both databases and copy every configured table once,
    /// stopping between tables if `shutdown` fires.
    pub async fn run_cycle(&self, shutdown: &mut broadcast::Receiver<()>) -> Result<RunSummary> {
        let mut source = connect_with_retry(&self.source_url)
            .await
            .context("Failed to connect to source database")?;
        let mut target = connect_with_retry(&self.target_url)
            .await
            .context("Failed to connect to target database")?;

        let summary = run_jobs_until(
            &mut source,
            &mut target,
            &self.config.jobs,
            &self.config.options,
            shutdown,
        )
        .await;

        disconnect_quietly(source, "source").await;
        disconnect_quietly(target, "target").await;

        Ok(summary)
    }

    /// Run cycles until `shutdown` receives a message or its sender is dropped.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
        let mut ticker = interval(self.config.interval);
        let mut cycles = 0u64;

        tracing::info!(
            "Starting watch loop for {} tables every {:?}",
            self.config.jobs.len(),
            self.config.interval
        );

        loop {
            tokio::select! {
                biased;

                _ = shutdown.recv() => {
                    tracing::info!("Shutdown signal received, stopping watch loop");
                    break;
                }
                _ = ticker.tick() => {
                    cycles += 1;
                    tracing::info!("Starting copy cycle {}", cycles);

                    match self.run_cycle(&mut shutdown).await {
                        Ok(summary) => {
                            tracing::info!(
                                "Copy cycle {} completed: {} tables, {} rows in {}ms",
                                cycles,
                                summary.reports.len(),
                                summary.rows_flushed(),
                                summary.duration_ms
                            );
                            if summary.interrupted() {
                                tracing::info!(
                                    "Copy cycle {} stopped by shutdown, skipped: {}",
                                    cycles,
                                    summary.skipped.join(", ")
                                );
                                break;
                            }
                            if !summary.is_success() {
                                tracing::warn!(
                                    "Copy cycle {} had {} failed and {} degraded tables",
                                    cycles,
                                    summary.failures.len(),
                                    summary.degraded()
                                );
                            }
                        }
                        Err(e) => {
                            tracing::error!("Copy cycle {} failed: {:#}", cycles, e);
                        }
                    }
                }
            }
        }

        Ok(())
    }
}
