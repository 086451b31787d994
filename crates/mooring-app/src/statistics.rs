//! Cumulative per-task statistics and the aggregate view.
//!
//! # Design
//! - Cumulative byte counters never decrease; maxima only grow.
//! - Averages are cumulative bytes over active seconds.
//! - Aggregate live figures are read from the engine at query time; a task
//!   whose status cannot be read is skipped.

use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use mooring_core::{
    LiveStatus, OverallStatistics, Statistics, Task, TaskError, TaskResult, TaskStatus, TaskStore,
    error_chain_message, share_ratio,
};
use mooring_engine::EngineFacade;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::locks::TaskLocks;
use crate::reconciler::PassSummary;

const BYTE_UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

/// Maintains per-task statistics rows and computes aggregate figures.
pub struct StatisticsAggregator {
    engine: Arc<EngineFacade>,
    store: Arc<dyn TaskStore>,
    locks: TaskLocks,
}

impl StatisticsAggregator {
    pub(crate) fn new(engine: Arc<EngineFacade>, store: Arc<dyn TaskStore>, locks: TaskLocks) -> Self {
        Self {
            engine,
            store,
            locks,
        }
    }

    /// Fold one live sample into the statistics row of every active task
    /// that has a live handle.
    ///
    /// # Errors
    ///
    /// Returns an error only when the task list cannot be read.
    pub async fn run_pass(&self) -> TaskResult<PassSummary> {
        let tasks = self
            .store
            .tasks_with_status(&TaskStatus::ACTIVE)
            .await
            .map_err(|err| TaskError::store("tasks_with_status", err))?;
        let mut summary = PassSummary {
            examined: tasks.len(),
            ..PassSummary::default()
        };
        for task in tasks {
            match self.sample(&task).await {
                Ok(true) => summary.updated += 1,
                Ok(false) => {}
                Err(err) => {
                    summary.failed += 1;
                    warn!(
                        task_id = %task.id,
                        error = %error_chain_message(&err),
                        "statistics update failed"
                    );
                }
            }
        }
        debug!(
            examined = summary.examined,
            updated = summary.updated,
            "statistics pass finished"
        );
        Ok(summary)
    }

    async fn sample(&self, task: &Task) -> TaskResult<bool> {
        let Some(handle) = self.engine.find_handle(&task.info_hash).await else {
            return Ok(false);
        };
        let live = self
            .engine
            .status(&handle)
            .await
            .map_err(|err| TaskError::engine("status", Some(task.id), err))?;

        let _guard = self.locks.acquire(task.id).await;
        let exists = self
            .store
            .task(task.id)
            .await
            .map_err(|err| TaskError::store("task", err))?
            .is_some();
        if !exists {
            return Ok(false);
        }

        let now = Utc::now();
        let mut stats = self
            .store
            .statistics(task.id)
            .await
            .map_err(|err| TaskError::store("statistics", err))?
            .unwrap_or_else(|| Statistics::new(task.id, now));
        fold_sample(&mut stats, &live, now);
        self.store
            .save_statistics(&stats)
            .await
            .map_err(|err| TaskError::store("save_statistics", err))?;
        Ok(true)
    }

    /// Statistics row of a task, if one has been recorded.
    ///
    /// # Errors
    ///
    /// Returns a store failure.
    pub async fn statistics(&self, task_id: Uuid) -> TaskResult<Option<Statistics>> {
        self.store
            .statistics(task_id)
            .await
            .map_err(|err| TaskError::store("statistics", err))
    }

    /// Seconds until completion at the current download rate.
    ///
    /// `None` when the task has no live handle or is not downloading.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown task, or the engine/store failure.
    pub async fn eta(&self, task_id: Uuid) -> TaskResult<Option<Duration>> {
        let task = self.require_task(task_id).await?;
        let Some(handle) = self.engine.find_handle(&task.info_hash).await else {
            return Ok(None);
        };
        let live = self
            .engine
            .status(&handle)
            .await
            .map_err(|err| TaskError::engine("status", Some(task_id), err))?;
        Ok(eta_secs(live.total_wanted, live.total_done, live.download_rate).map(Duration::from_secs))
    }

    /// Recorded upload/download ratio, zero without a statistics row.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown task, or a store failure.
    pub async fn share_ratio(&self, task_id: Uuid) -> TaskResult<f64> {
        self.require_task(task_id).await?;
        Ok(self
            .statistics(task_id)
            .await?
            .map_or(0.0, |stats| stats.ratio))
    }

    /// Aggregate figures across every task.
    ///
    /// # Errors
    ///
    /// Returns a store failure.
    pub async fn overall(&self) -> TaskResult<OverallStatistics> {
        let tasks = self
            .store
            .tasks()
            .await
            .map_err(|err| TaskError::store("tasks", err))?;
        let rows = self
            .store
            .all_statistics()
            .await
            .map_err(|err| TaskError::store("all_statistics", err))?;

        let mut overall = OverallStatistics {
            total_tasks: u64::try_from(tasks.len()).unwrap_or(u64::MAX),
            ..OverallStatistics::default()
        };
        for task in &tasks {
            match task.status {
                TaskStatus::Downloading => overall.downloading += 1,
                TaskStatus::Completed => {
                    overall.completed += 1;
                    overall.total_completed_size += task.total_size.unwrap_or(0);
                }
                TaskStatus::Seeding => overall.seeding += 1,
                TaskStatus::Paused => overall.paused += 1,
                TaskStatus::Error => overall.errored += 1,
                _ => {}
            }
        }
        overall.active = overall.downloading + overall.seeding;
        overall.total_downloaded = rows.iter().map(|row| row.total_downloaded).sum();
        overall.total_uploaded = rows.iter().map(|row| row.total_uploaded).sum();
        overall.overall_ratio = share_ratio(overall.total_uploaded, overall.total_downloaded);

        for task in tasks.iter().filter(|task| task.status.is_active()) {
            let Some(handle) = self.engine.find_handle(&task.info_hash).await else {
                continue;
            };
            match self.engine.status(&handle).await {
                Ok(live) => {
                    overall.download_rate += live.download_rate;
                    overall.upload_rate += live.upload_rate;
                    overall.peers += u64::from(live.peers);
                    overall.seeds += u64::from(live.seeds);
                }
                Err(err) => trace!(task_id = %task.id, error = %err, "skipping live figures"),
            }
        }
        Ok(overall)
    }

    /// Delete statistics rows whose task no longer exists.
    ///
    /// # Errors
    ///
    /// Returns an error when the rows cannot be listed.
    pub async fn cleanup_orphans(&self) -> TaskResult<usize> {
        let rows = self
            .store
            .all_statistics()
            .await
            .map_err(|err| TaskError::store("all_statistics", err))?;
        let mut removed = 0;
        for row in rows {
            let _guard = self.locks.acquire(row.task_id).await;
            match self.store.task(row.task_id).await {
                Ok(Some(_)) => {}
                Ok(None) => match self.store.delete_statistics(row.task_id).await {
                    Ok(true) => removed += 1,
                    Ok(false) => {}
                    Err(err) => warn!(task_id = %row.task_id, error = %err, "orphan delete failed"),
                },
                Err(err) => warn!(task_id = %row.task_id, error = %err, "orphan check failed"),
            }
        }
        if removed > 0 {
            info!(removed, "removed orphaned statistics rows");
        }
        Ok(removed)
    }

    /// Drop the statistics row of a task; the next pass starts afresh.
    ///
    /// # Errors
    ///
    /// Returns a store failure.
    pub async fn reset(&self, task_id: Uuid) -> TaskResult<bool> {
        let _guard = self.locks.acquire(task_id).await;
        let removed = self
            .store
            .delete_statistics(task_id)
            .await
            .map_err(|err| TaskError::store("delete_statistics", err))?;
        if removed {
            info!(task_id = %task_id, "statistics reset");
        }
        Ok(removed)
    }

    /// Plain-text report of the aggregate figures.
    ///
    /// # Errors
    ///
    /// Returns a store failure.
    pub async fn export_summary(&self) -> TaskResult<String> {
        Ok(render_summary(&self.overall().await?))
    }

    async fn require_task(&self, task_id: Uuid) -> TaskResult<Task> {
        self.store
            .task(task_id)
            .await
            .map_err(|err| TaskError::store("task", err))?
            .ok_or(TaskError::NotFound { task_id })
    }
}

/// Fold a live sample taken at `now` into `stats`.
pub(crate) fn fold_sample(stats: &mut Statistics, live: &LiveStatus, now: DateTime<Utc>) {
    stats.total_downloaded = stats.total_downloaded.max(live.all_time_download);
    stats.total_uploaded = stats.total_uploaded.max(live.all_time_upload);
    stats.time_active_secs = u64::try_from((now - stats.start_time).num_seconds()).unwrap_or(0);
    stats.max_download_rate = stats.max_download_rate.max(live.download_rate);
    stats.max_upload_rate = stats.max_upload_rate.max(live.upload_rate);
    if stats.time_active_secs > 0 {
        stats.average_download_rate = stats.total_downloaded / stats.time_active_secs;
        stats.average_upload_rate = stats.total_uploaded / stats.time_active_secs;
    }
    stats.peak_peers = stats.peak_peers.max(live.peers);
    if live.finished && stats.end_time.is_none() {
        stats.end_time = Some(now);
    }
    stats.recompute_ratio();
}

/// Remaining seconds at `rate` bytes per second.
pub(crate) const fn eta_secs(wanted: u64, done: u64, rate: u64) -> Option<u64> {
    if rate == 0 {
        None
    } else {
        Some(wanted.saturating_sub(done) / rate)
    }
}

/// Human-readable size with two decimals and base-1024 units.
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    if bytes == 0 {
        return "0 B".to_string();
    }
    let mut value = as_f64(bytes);
    let mut unit = 0;
    while value >= 1024.0 && unit < BYTE_UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.2} {}", BYTE_UNITS[unit])
}

fn render_summary(overall: &OverallStatistics) -> String {
    let mut out = String::from("=== Mooring Statistics Summary ===\n");
    let _ = writeln!(out, "Total Tasks: {}", overall.total_tasks);
    let _ = writeln!(
        out,
        "Active: {}, Downloading: {}, Seeding: {}",
        overall.active, overall.downloading, overall.seeding
    );
    let _ = writeln!(
        out,
        "Completed: {}, Paused: {}, Errors: {}",
        overall.completed, overall.paused, overall.errored
    );
    let _ = writeln!(out, "\nTotal Downloaded: {}", format_bytes(overall.total_downloaded));
    let _ = writeln!(out, "Total Uploaded: {}", format_bytes(overall.total_uploaded));
    let _ = writeln!(out, "Overall Ratio: {:.2}", overall.overall_ratio);
    let _ = writeln!(
        out,
        "\nCurrent Download Speed: {}/s",
        format_bytes(overall.download_rate)
    );
    let _ = writeln!(
        out,
        "Current Upload Speed: {}/s",
        format_bytes(overall.upload_rate)
    );
    let _ = writeln!(out, "Active Peers: {}, Seeds: {}", overall.peers, overall.seeds);
    out
}

#[expect(
    clippy::cast_precision_loss,
    reason = "byte counts are only displayed or turned into percentages"
)]
pub(crate) const fn as_f64(value: u64) -> f64 {
    value as f64
}
