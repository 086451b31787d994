//! Status reconciliation between persisted tasks and live engine state.
//!
//! # Design
//! - `derive_status` is a pure precedence table; the first matching rule wins.
//! - Files are matched by relative path, never by position.
//! - A task whose engine calls fail is marked ERROR; the pass always runs to the end.
//! - Every write happens under the task's lock and re-reads the record first.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use mooring_core::{
    LiveFile, LiveStatus, Task, TaskError, TaskFile, TaskResult, TaskStatus, TaskStore,
    error_chain_message,
};
use mooring_engine::EngineFacade;
use mooring_events::NotificationKind;
use mooring_telemetry::Metrics;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::broadcaster::Notifier;
use crate::commands::failure_detail;
use crate::locks::TaskLocks;
use crate::statistics::as_f64;

/// Error recorded when an active task has no engine handle.
pub const HANDLE_NOT_FOUND: &str = "Torrent handle not found in session";
/// Error recorded by the session sync for tasks the engine forgot.
pub const LOST_FROM_SESSION: &str = "Lost from session, requires restart";
/// Error recorded by the stall sweep.
pub const HANDLE_LOST_STALLED: &str = "Torrent handle lost, possibly stalled";

/// Outcome of applying the status precedence rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    /// Status the task should hold.
    pub status: TaskStatus,
    /// Error message to store; `None` clears it.
    pub error_message: Option<String>,
}

impl Transition {
    const fn clean(status: TaskStatus) -> Self {
        Self {
            status,
            error_message: None,
        }
    }

    fn failed(message: impl Into<String>) -> Self {
        Self {
            status: TaskStatus::Error,
            error_message: Some(message.into()),
        }
    }
}

/// Derive the persisted status from the live engine view.
///
/// Rules, first match wins: missing handle, paused, engine error, finished,
/// checking, downloading, otherwise pending. Terminal tasks keep their
/// status when the engine no longer knows them.
#[must_use]
pub fn derive_status(current: TaskStatus, live: Option<&LiveStatus>) -> Transition {
    let Some(live) = live else {
        return if current.is_terminal() {
            Transition::clean(current)
        } else {
            Transition::failed(HANDLE_NOT_FOUND)
        };
    };

    if live.paused {
        return Transition::clean(TaskStatus::Paused);
    }
    if let Some(message) = live.error.as_deref().filter(|msg| !msg.trim().is_empty()) {
        return Transition::failed(message);
    }
    if live.finished {
        return Transition::clean(if live.seeding {
            TaskStatus::Seeding
        } else {
            TaskStatus::Completed
        });
    }
    if live.state.is_checking() {
        Transition::clean(TaskStatus::Checking)
    } else if live.state.is_downloading() {
        Transition::clean(TaskStatus::Downloading)
    } else {
        Transition::clean(TaskStatus::Pending)
    }
}

/// Overwrite the transfer counters of `task` with the live snapshot.
pub(crate) fn merge_counters(task: &mut Task, live: &LiveStatus) {
    task.downloaded_bytes = live.total_done;
    task.uploaded_bytes = live.all_time_upload;
    task.progress = if live.progress.is_finite() {
        (live.progress * 100.0).clamp(0.0, 100.0)
    } else {
        0.0
    };
    task.download_rate = live.download_rate;
    task.upload_rate = live.upload_rate;
    task.peers = live.peers;
    task.seeds = live.seeds;
    if task.total_size.is_none_or(|size| size == 0) && live.total_wanted > 0 {
        task.total_size = Some(live.total_wanted);
    }
}

/// Result of merging engine file progress into persisted rows.
#[derive(Debug, Default)]
pub(crate) struct FileMerge {
    pub(crate) changed: Vec<TaskFile>,
    pub(crate) unknown: Vec<String>,
}

/// Merge engine file progress into persisted rows, matching by path.
///
/// Persisted files the engine does not report are left untouched, except
/// that skipped files always reconcile to zero progress.
pub(crate) fn merge_files(persisted: Vec<TaskFile>, live: &[LiveFile]) -> FileMerge {
    let mut files = persisted;
    let by_path: HashMap<String, usize> = files
        .iter()
        .enumerate()
        .map(|(slot, file)| (file.path.clone(), slot))
        .collect();
    let mut dirty = vec![false; files.len()];
    let mut unknown = Vec::new();

    for entry in live {
        let Some(&slot) = by_path.get(&entry.path) else {
            unknown.push(entry.path.clone());
            continue;
        };
        let file = &mut files[slot];
        let downloaded = if file.priority.is_skipped() {
            0
        } else {
            entry.downloaded
        };
        let progress = file_progress(downloaded, entry.size);
        if file.size != entry.size
            || file.downloaded_bytes != downloaded
            || (file.progress - progress).abs() > f64::EPSILON
        {
            file.size = entry.size;
            file.downloaded_bytes = downloaded;
            file.progress = progress;
            dirty[slot] = true;
        }
    }

    for (slot, file) in files.iter_mut().enumerate() {
        if file.priority.is_skipped() && (file.downloaded_bytes != 0 || file.progress > 0.0) {
            file.downloaded_bytes = 0;
            file.progress = 0.0;
            dirty[slot] = true;
        }
    }

    FileMerge {
        changed: files
            .into_iter()
            .zip(dirty)
            .filter_map(|(file, dirty)| dirty.then_some(file))
            .collect(),
        unknown,
    }
}

fn file_progress(downloaded: u64, size: u64) -> f64 {
    if size == 0 {
        return 0.0;
    }
    (as_f64(downloaded) * 100.0 / as_f64(size)).min(100.0)
}

/// Counts reported by a reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassSummary {
    /// Tasks considered.
    pub examined: usize,
    /// Tasks written back.
    pub updated: usize,
    /// Tasks whose reconciliation failed.
    pub failed: usize,
}

/// Pulls live status into persisted tasks and detects lost handles.
pub struct StatusReconciler {
    engine: Arc<EngineFacade>,
    store: Arc<dyn TaskStore>,
    notifier: Notifier,
    metrics: Metrics,
    locks: TaskLocks,
}

impl StatusReconciler {
    pub(crate) fn new(
        engine: Arc<EngineFacade>,
        store: Arc<dyn TaskStore>,
        notifier: Notifier,
        metrics: Metrics,
        locks: TaskLocks,
    ) -> Self {
        Self {
            engine,
            store,
            notifier,
            metrics,
            locks,
        }
    }

    /// Reconcile every downloading, seeding or checking task.
    ///
    /// # Errors
    ///
    /// Returns an error only when the task list cannot be read.
    pub async fn run_status_pass(&self) -> TaskResult<PassSummary> {
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
            match self.reconcile(task.id).await {
                Ok(_) => summary.updated += 1,
                Err(err) => {
                    summary.failed += 1;
                    warn!(
                        task_id = %task.id,
                        error = %error_chain_message(&err),
                        "status reconciliation failed"
                    );
                    if matches!(err, TaskError::Engine { .. }) {
                        self.record_engine_failure(task.id, &err).await;
                    }
                }
            }
        }

        self.metrics
            .set_live_handles(self.engine.live_handle_count());
        match self.store.count_with_status(&TaskStatus::ADMITTED).await {
            Ok(active) => self.metrics.set_active_tasks(active),
            Err(err) => debug!(error = %err, "could not count active tasks"),
        }
        debug!(
            examined = summary.examined,
            failed = summary.failed,
            "status pass finished"
        );
        Ok(summary)
    }

    /// Reconcile a single task immediately, whatever its status.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown task, or the engine/store failure.
    pub async fn force_update(&self, task_id: Uuid) -> TaskResult<Task> {
        self.reconcile(task_id).await
    }

    async fn reconcile(&self, task_id: Uuid) -> TaskResult<Task> {
        let _guard = self.locks.acquire(task_id).await;
        let mut task = self
            .store
            .task(task_id)
            .await
            .map_err(|err| TaskError::store("task", err))?
            .ok_or(TaskError::NotFound { task_id })?;

        let handle = self.engine.find_handle(&task.info_hash).await;
        let live = match &handle {
            Some(handle) => Some(
                self.engine
                    .status(handle)
                    .await
                    .map_err(|err| TaskError::engine("status", Some(task_id), err))?,
            ),
            None => None,
        };

        let previous = task.status;
        let transition = derive_status(previous, live.as_ref());
        task.status = transition.status;
        if task.status == TaskStatus::Error {
            if transition.error_message.is_some() {
                task.error_message = transition.error_message;
            }
        } else {
            task.error_message = None;
        }

        match &live {
            Some(live) => merge_counters(&mut task, live),
            None if task.status == TaskStatus::Error => task.clear_rates(),
            None => {}
        }

        let first_completion = live.is_some()
            && matches!(task.status, TaskStatus::Completed | TaskStatus::Seeding)
            && task.completed_at.is_none();
        if first_completion {
            task.completed_at = Some(Utc::now());
        }

        if let Some(handle) = &handle {
            let live_files = self
                .engine
                .files(handle)
                .await
                .map_err(|err| TaskError::engine("files", Some(task_id), err))?;
            if !live_files.is_empty() {
                self.reconcile_files(task_id, &live_files).await?;
            }
        }

        self.store
            .update_task(&task)
            .await
            .map_err(|err| TaskError::store("update_task", err))?;

        if previous != task.status {
            info!(
                task_id = %task.id,
                from = %previous,
                to = %task.status,
                "task status changed"
            );
        }
        if first_completion {
            info!(task_id = %task.id, name = %task.name, "task completed");
            self.notifier
                .notify(NotificationKind::TorrentCompleted, &task, "Download completed");
        }
        Ok(task)
    }

    async fn reconcile_files(&self, task_id: Uuid, live_files: &[LiveFile]) -> TaskResult<()> {
        let persisted = self
            .store
            .files(task_id)
            .await
            .map_err(|err| TaskError::store("files", err))?;
        let merge = merge_files(persisted, live_files);
        for path in &merge.unknown {
            debug!(task_id = %task_id, path = %path, "engine reported an untracked file");
        }
        if !merge.changed.is_empty() {
            self.store
                .update_files(&merge.changed)
                .await
                .map_err(|err| TaskError::store("update_files", err))?;
        }
        Ok(())
    }

    /// Mark active tasks the engine no longer knows about.
    ///
    /// # Errors
    ///
    /// Returns an error only when the task list cannot be read.
    pub async fn sync_session(&self) -> TaskResult<usize> {
        let tasks = self
            .store
            .tasks_with_status(&TaskStatus::ACTIVE)
            .await
            .map_err(|err| TaskError::store("tasks_with_status", err))?;
        let mut lost = 0;
        for task in tasks {
            if self.has_live_handle(&task).await {
                continue;
            }
            match self
                .mark_failed(task.id, LOST_FROM_SESSION, |task| task.status.is_active())
                .await
            {
                Ok(true) => lost += 1,
                Ok(false) => {}
                Err(err) => warn!(
                    task_id = %task.id,
                    error = %error_chain_message(&err),
                    "session sync could not mark task"
                ),
            }
        }
        if lost > 0 {
            warn!(lost, "tasks lost from engine session");
        }
        Ok(lost)
    }

    /// Evict dead handles, then fail stalled downloads with no handle.
    ///
    /// # Errors
    ///
    /// Returns an error only when the task list cannot be read.
    pub async fn sweep_stalled(&self) -> TaskResult<usize> {
        self.engine.sweep_invalid_handles();
        let tasks = self
            .store
            .tasks_with_status(&[TaskStatus::Downloading])
            .await
            .map_err(|err| TaskError::store("tasks_with_status", err))?;
        let mut failed = 0;
        for task in tasks.into_iter().filter(Task::is_stalled) {
            if self.has_live_handle(&task).await {
                continue;
            }
            match self
                .mark_failed(task.id, HANDLE_LOST_STALLED, Task::is_stalled)
                .await
            {
                Ok(true) => failed += 1,
                Ok(false) => {}
                Err(err) => warn!(
                    task_id = %task.id,
                    error = %error_chain_message(&err),
                    "stall sweep could not mark task"
                ),
            }
        }
        if failed > 0 {
            warn!(failed, "stalled tasks without handles marked as errors");
        }
        Ok(failed)
    }

    async fn record_engine_failure(&self, task_id: Uuid, err: &TaskError) {
        let message = format!("Reconciliation failed: {}", failure_detail(err));
        if let Err(mark_err) = self
            .mark_failed(task_id, &message, |task| task.status.is_active())
            .await
        {
            warn!(
                task_id = %task_id,
                error = %error_chain_message(&mark_err),
                "could not record reconciliation failure"
            );
        }
    }

    async fn has_live_handle(&self, task: &Task) -> bool {
        self.engine.is_live(&task.info_hash)
            || self.engine.find_handle(&task.info_hash).await.is_some()
    }

    async fn mark_failed(
        &self,
        task_id: Uuid,
        message: &str,
        still_applies: impl Fn(&Task) -> bool,
    ) -> TaskResult<bool> {
        let _guard = self.locks.acquire(task_id).await;
        let Some(mut task) = self
            .store
            .task(task_id)
            .await
            .map_err(|err| TaskError::store("task", err))?
        else {
            return Ok(false);
        };
        if !still_applies(&task) {
            return Ok(false);
        }
        task.fail(message);
        task.clear_rates();
        self.store
            .update_task(&task)
            .await
            .map_err(|err| TaskError::store("update_task", err))?;
        warn!(task_id = %task_id, reason = message, "task marked as error");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mooring_core::{EngineState, FilePriority};

    fn live(apply: impl FnOnce(&mut LiveStatus)) -> LiveStatus {
        let mut status = LiveStatus::default();
        apply(&mut status);
        status
    }

    fn file(path: &str, size: u64, priority: FilePriority) -> TaskFile {
        TaskFile {
            id: Uuid::new_v4(),
            task_id: Uuid::nil(),
            path: path.into(),
            size,
            downloaded_bytes: 0,
            progress: 0.0,
            priority,
        }
    }

    fn live_file(index: usize, path: &str, size: u64, downloaded: u64) -> LiveFile {
        LiveFile {
            index,
            path: path.into(),
            size,
            downloaded,
        }
    }

    #[test]
    fn missing_handle_fails_unless_terminal() {
        let lost = derive_status(TaskStatus::Downloading, None);
        assert_eq!(lost.status, TaskStatus::Error);
        assert_eq!(lost.error_message.as_deref(), Some(HANDLE_NOT_FOUND));

        assert_eq!(
            derive_status(TaskStatus::Completed, None),
            Transition::clean(TaskStatus::Completed)
        );
        assert_eq!(
            derive_status(TaskStatus::Stopped, None).status,
            TaskStatus::Stopped
        );
    }

    #[test]
    fn paused_wins_over_finished_and_error() {
        let status = live(|s| {
            s.paused = true;
            s.finished = true;
            s.error = Some("disk full".into());
        });
        assert_eq!(
            derive_status(TaskStatus::Seeding, Some(&status)).status,
            TaskStatus::Paused
        );
    }

    #[test]
    fn engine_error_is_copied() {
        let status = live(|s| {
            s.error = Some("tracker refused".into());
            s.finished = true;
        });
        let transition = derive_status(TaskStatus::Downloading, Some(&status));
        assert_eq!(transition.status, TaskStatus::Error);
        assert_eq!(transition.error_message.as_deref(), Some("tracker refused"));
    }

    #[test]
    fn finished_splits_on_seeding_then_state_groups_apply() {
        let seeding = live(|s| {
            s.finished = true;
            s.seeding = true;
        });
        assert_eq!(
            derive_status(TaskStatus::Downloading, Some(&seeding)).status,
            TaskStatus::Seeding
        );
        let done = live(|s| s.finished = true);
        assert_eq!(
            derive_status(TaskStatus::Downloading, Some(&done)).status,
            TaskStatus::Completed
        );
        let checking = live(|s| s.state = EngineState::CheckingResumeData);
        assert_eq!(
            derive_status(TaskStatus::Paused, Some(&checking)).status,
            TaskStatus::Checking
        );
        let metadata = live(|s| s.state = EngineState::DownloadingMetadata);
        assert_eq!(
            derive_status(TaskStatus::Pending, Some(&metadata)).status,
            TaskStatus::Downloading
        );
        let allocating = live(|s| s.state = EngineState::Allocating);
        assert_eq!(
            derive_status(TaskStatus::Downloading, Some(&allocating)).status,
            TaskStatus::Pending
        );
    }

    #[test]
    fn counters_are_overwritten_and_size_filled_once() {
        let mut task = mooring_test_support::samples::task('a', "t", TaskStatus::Downloading);
        task.total_size = Some(0);
        let status = live(|s| {
            s.total_done = 400;
            s.total_wanted = 1_000;
            s.all_time_upload = 50;
            s.progress = 0.4;
            s.download_rate = 60;
            s.peers = 3;
        });
        merge_counters(&mut task, &status);
        assert_eq!(task.downloaded_bytes, 400);
        assert_eq!(task.uploaded_bytes, 50);
        assert!((task.progress - 40.0).abs() < 1e-9);
        assert_eq!(task.total_size, Some(1_000));

        let grown = live(|s| {
            s.total_wanted = 2_000;
            s.progress = 1.7;
        });
        merge_counters(&mut task, &grown);
        assert_eq!(task.total_size, Some(1_000));
        assert!((task.progress - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn files_are_matched_by_path_not_position() {
        let persisted = vec![
            file("a.mkv", 100, FilePriority::NORMAL),
            file("b.nfo", 10, FilePriority::NORMAL),
        ];
        let live = [
            live_file(0, "b.nfo", 10, 10),
            live_file(1, "a.mkv", 100, 25),
            live_file(2, "extra.txt", 5, 5),
        ];
        let merge = merge_files(persisted, &live);

        assert_eq!(merge.unknown, vec!["extra.txt".to_string()]);
        let by_path: HashMap<_, _> = merge
            .changed
            .iter()
            .map(|file| (file.path.as_str(), file))
            .collect();
        assert_eq!(by_path["a.mkv"].downloaded_bytes, 25);
        assert!((by_path["a.mkv"].progress - 25.0).abs() < f64::EPSILON);
        assert!((by_path["b.nfo"].progress - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn skipped_files_reconcile_to_zero_and_unreported_stay() {
        let mut skipped = file("sample.mkv", 100, FilePriority::SKIP);
        skipped.downloaded_bytes = 40;
        skipped.progress = 40.0;
        let mut untouched = file("cover.jpg", 10, FilePriority::NORMAL);
        untouched.downloaded_bytes = 7;
        untouched.progress = 70.0;

        let merge = merge_files(vec![skipped, untouched], &[]);
        assert_eq!(merge.changed.len(), 1);
        assert_eq!(merge.changed[0].path, "sample.mkv");
        assert_eq!(merge.changed[0].downloaded_bytes, 0);
        assert!(merge.changed[0].progress.abs() < f64::EPSILON);
    }

    #[test]
    fn skipped_files_ignore_reported_progress() {
        let skipped = file("sample.mkv", 100, FilePriority::SKIP);
        let merge = merge_files(vec![skipped], &[live_file(0, "sample.mkv", 100, 40)]);
        assert_eq!(merge.changed.len(), 1);
        assert_eq!(merge.changed[0].downloaded_bytes, 0);
        assert!(merge.changed[0].progress.abs() < f64::EPSILON);
    }

    #[test]
    fn unchanged_files_are_not_rewritten() {
        let mut done = file("a.bin", 10, FilePriority::NORMAL);
        done.downloaded_bytes = 10;
        done.progress = 100.0;
        let merge = merge_files(vec![done], &[live_file(0, "a.bin", 10, 10)]);
        assert!(merge.changed.is_empty());
        assert!((file_progress(5, 0)).abs() < f64::EPSILON);
    }
}
