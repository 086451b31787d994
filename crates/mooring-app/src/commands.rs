//! User commands against tasks.
//!
//! # Design
//! - Every command holds the task's lock for its whole read-modify-write.
//! - Control toggles settle before they are verified; a failed verification
//!   is logged, not returned.
//! - An engine failure while starting or pausing demotes the task to ERROR
//!   and is still returned to the caller.
//! - Validation and lookup errors are returned as-is and never retried.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use mooring_core::{
    AddRequest, EngineError, EngineHandle, FilePriority, InfoHash, Metainfo, StoreError, Task,
    TaskError, TaskFile, TaskResult, TaskStatus, TaskStore, error_chain_message,
};
use mooring_engine::{EngineFacade, MagnetLink};
use mooring_events::NotificationKind;
use mooring_telemetry::{CommandOutcome, Metrics};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::broadcaster::Notifier;
use crate::engine_config::CommandSettings;
use crate::locks::TaskLocks;

const MAGNET_PREFIX: &str = "magnet:?";

/// Result of a successful `add`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddOutcome {
    /// Identifier of the new task.
    pub task_id: Uuid,
    /// Fingerprint of the new task.
    pub info_hash: InfoHash,
    /// Display name from the metadata.
    pub name: String,
    /// Sum of all file sizes.
    pub total_size: u64,
    /// Number of files in the task.
    pub file_count: usize,
    /// Human-readable summary.
    pub message: String,
    /// Whether the task was started.
    pub started: bool,
}

/// Acknowledgement of a control command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandReceipt {
    /// Task the command applied to.
    pub task_id: Uuid,
    /// Human-readable summary.
    pub message: String,
}

impl CommandReceipt {
    fn new(task_id: Uuid, message: &str) -> Self {
        Self {
            task_id,
            message: message.to_string(),
        }
    }
}

enum Origin {
    Magnet(MagnetLink),
    File(PathBuf),
}

impl Origin {
    async fn classify(origin: &str) -> TaskResult<Self> {
        let invalid = || TaskError::InvalidOrigin {
            origin: origin.to_string(),
        };
        if origin.starts_with(MAGNET_PREFIX) {
            return MagnetLink::parse(origin)
                .map(Self::Magnet)
                .map_err(|_| invalid());
        }
        if origin.is_empty() {
            return Err(invalid());
        }
        let path = PathBuf::from(origin);
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(Self::File(path)),
            _ => Err(invalid()),
        }
    }
}

/// Executes add, start, pause, remove and priority commands.
pub struct CommandExecutor {
    engine: Arc<EngineFacade>,
    store: Arc<dyn TaskStore>,
    notifier: Notifier,
    metrics: Metrics,
    locks: TaskLocks,
    settings: CommandSettings,
}

impl CommandExecutor {
    pub(crate) fn new(
        engine: Arc<EngineFacade>,
        store: Arc<dyn TaskStore>,
        notifier: Notifier,
        metrics: Metrics,
        locks: TaskLocks,
        settings: CommandSettings,
    ) -> Self {
        Self {
            engine,
            store,
            notifier,
            metrics,
            locks,
            settings,
        }
    }

    /// Admit a task from a magnet URI or a metainfo file path.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOrigin`, `ConcurrencyLimit`, `AlreadyExists`,
    /// `MetadataTimeout`, or the engine, store or IO failure.
    pub async fn add(
        &self,
        origin: &str,
        save_path: Option<&str>,
        start: bool,
    ) -> TaskResult<AddOutcome> {
        let result = self.add_task(origin.trim(), save_path, start).await;
        self.record("add", result)
    }

    async fn add_task(
        &self,
        origin: &str,
        save_path: Option<&str>,
        start: bool,
    ) -> TaskResult<AddOutcome> {
        let source = Origin::classify(origin).await?;
        self.admit().await?;
        let save_dir = self.prepare_save_path(save_path).await?;

        let metainfo = match &source {
            Origin::Magnet(link) => {
                self.reject_duplicate(&link.info_hash).await?;
                self.engine
                    .fetch_metadata(origin, self.settings.metadata_timeout)
                    .await
                    .map_err(|err| TaskError::engine("fetch_metadata", None, err))?
            }
            Origin::File(path) => self
                .engine
                .load_metainfo(path)
                .await
                .map_err(|err| TaskError::engine("load_metainfo", None, err))?,
        };
        self.reject_duplicate(&metainfo.info_hash).await?;

        let request = AddRequest {
            metainfo: metainfo.clone(),
            save_path: save_dir.clone(),
        };
        let handle = match self.engine.add(request).await {
            Ok(handle) => handle,
            Err(EngineError::Duplicate { info_hash }) => {
                return Err(TaskError::AlreadyExists { info_hash });
            }
            Err(err) => return Err(TaskError::engine("add", None, err)),
        };

        let mut task = match self
            .persist_paused(&handle, &metainfo, origin, &save_dir)
            .await
        {
            Ok(task) => task,
            Err(err) => {
                self.discard_handle(&handle).await;
                return Err(err);
            }
        };

        if start {
            let _guard = self.locks.acquire(task.id).await;
            let activated = self.activate(&handle, task.id, true).await;
            if let Err(err) = activated {
                self.fail_task(&mut task, "start", &err).await;
                return Err(err);
            }
            task.status = TaskStatus::Downloading;
            self.save(&task).await?;
            self.engine.reconcile_nudge().notify_one();
        }

        let message = if start {
            "Torrent added and started"
        } else {
            "Torrent added"
        };
        info!(
            task_id = %task.id,
            info_hash = %task.info_hash,
            name = %task.name,
            started = start,
            "task added"
        );
        self.notifier
            .notify(NotificationKind::TorrentAdded, &task, message);
        Ok(AddOutcome {
            task_id: task.id,
            info_hash: task.info_hash,
            name: task.name,
            total_size: metainfo.total_size(),
            file_count: metainfo.files.len(),
            message: message.to_string(),
            started: start,
        })
    }

    async fn admit(&self) -> TaskResult<()> {
        let active = self
            .store
            .count_with_status(&TaskStatus::ADMITTED)
            .await
            .map_err(|err| TaskError::store("count_with_status", err))?;
        let limit = self.settings.max_active_downloads;
        if active >= limit {
            warn!(active, limit, "admission rejected");
            return Err(TaskError::ConcurrencyLimit { active, limit });
        }
        Ok(())
    }

    async fn prepare_save_path(&self, requested: Option<&str>) -> TaskResult<PathBuf> {
        let dir = requested
            .map(str::trim)
            .filter(|path| !path.is_empty())
            .map_or_else(|| self.settings.downloads_path.clone(), PathBuf::from);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| TaskError::Io {
                operation: "create_save_path",
                path: dir.clone(),
                source,
            })?;
        Ok(dir)
    }

    async fn reject_duplicate(&self, info_hash: &InfoHash) -> TaskResult<()> {
        let exists = self
            .store
            .exists_by_info_hash(info_hash)
            .await
            .map_err(|err| TaskError::store("exists_by_info_hash", err))?;
        if exists {
            return Err(TaskError::AlreadyExists {
                info_hash: info_hash.clone(),
            });
        }
        Ok(())
    }

    async fn persist_paused(
        &self,
        handle: &EngineHandle,
        metainfo: &Metainfo,
        origin: &str,
        save_dir: &Path,
    ) -> TaskResult<Task> {
        self.reject_duplicate(&metainfo.info_hash).await?;
        self.engine
            .set_auto_managed(handle, false)
            .await
            .map_err(|err| TaskError::engine("set_auto_managed", None, err))?;
        self.engine
            .pause(handle)
            .await
            .map_err(|err| TaskError::engine("pause", None, err))?;

        let task = Task {
            id: Uuid::new_v4(),
            info_hash: metainfo.info_hash.clone(),
            name: metainfo.name.clone(),
            origin: origin.to_string(),
            total_size: Some(metainfo.total_size()),
            downloaded_bytes: 0,
            uploaded_bytes: 0,
            status: TaskStatus::Paused,
            progress: 0.0,
            download_rate: 0,
            upload_rate: 0,
            peers: 0,
            seeds: 0,
            save_path: save_dir.display().to_string(),
            added_at: Utc::now(),
            completed_at: None,
            error_message: None,
            comment: metainfo.comment.clone(),
            created_by: metainfo.created_by.clone(),
            creation_date: metainfo.creation_date,
        };
        let files: Vec<TaskFile> = metainfo
            .files
            .iter()
            .map(|file| TaskFile {
                id: Uuid::new_v4(),
                task_id: task.id,
                path: file.path.clone(),
                size: file.size,
                downloaded_bytes: 0,
                progress: 0.0,
                priority: FilePriority::NORMAL,
            })
            .collect();

        match self.store.insert_task(&task, &files).await {
            Ok(()) => Ok(task),
            Err(StoreError::Duplicate { .. }) => Err(TaskError::AlreadyExists {
                info_hash: task.info_hash,
            }),
            Err(err) => Err(TaskError::store("insert_task", err)),
        }
    }

    async fn discard_handle(&self, handle: &EngineHandle) {
        match self.engine.remove(handle, false).await {
            Ok(()) => debug!(info_hash = %handle.info_hash, "discarded engine handle"),
            Err(err) => warn!(
                info_hash = %handle.info_hash,
                error = %err,
                "could not discard engine handle"
            ),
        }
    }

    /// Resume a task under engine queue management.
    ///
    /// # Errors
    ///
    /// Returns `NotFound`, `NotActive`, or the engine failure after marking
    /// the task as ERROR.
    pub async fn start(&self, task_id: Uuid) -> TaskResult<CommandReceipt> {
        let result = self.start_task(task_id).await;
        self.record("start", result)
    }

    async fn start_task(&self, task_id: Uuid) -> TaskResult<CommandReceipt> {
        let _guard = self.locks.acquire(task_id).await;
        let mut task = self.require_task(task_id).await?;
        let handle = self.require_handle(&task).await?;

        if let Err(err) = self.activate(&handle, task_id, false).await {
            self.fail_task(&mut task, "start", &err).await;
            return Err(err);
        }
        tokio::time::sleep(self.settings.settle.start).await;
        match self.engine.status(&handle).await {
            Ok(live) if live.paused => {
                warn!(task_id = %task_id, "task still paused after resume");
            }
            Ok(_) => {}
            Err(err) => warn!(task_id = %task_id, error = %err, "could not verify resume"),
        }

        task.status = TaskStatus::Downloading;
        task.error_message = None;
        self.save(&task).await?;
        self.engine.reconcile_nudge().notify_one();
        info!(task_id = %task_id, "task started");
        Ok(CommandReceipt::new(task_id, "Torrent started"))
    }

    async fn activate(
        &self,
        handle: &EngineHandle,
        task_id: Uuid,
        managed_first: bool,
    ) -> TaskResult<()> {
        let engine_err = |operation: &'static str| {
            move |err: EngineError| TaskError::engine(operation, Some(task_id), err)
        };
        if managed_first {
            self.engine
                .set_auto_managed(handle, true)
                .await
                .map_err(engine_err("set_auto_managed"))?;
        }
        self.engine
            .resume(handle)
            .await
            .map_err(engine_err("resume"))?;
        if !managed_first {
            self.engine
                .set_auto_managed(handle, true)
                .await
                .map_err(engine_err("set_auto_managed"))?;
        }
        Ok(())
    }

    /// Pause a task and take it out of engine queue management.
    ///
    /// # Errors
    ///
    /// Returns `NotFound`, `NotActive`, or the engine failure after marking
    /// the task as ERROR.
    pub async fn pause(&self, task_id: Uuid) -> TaskResult<CommandReceipt> {
        let result = self.pause_task(task_id).await;
        self.record("pause", result)
    }

    async fn pause_task(&self, task_id: Uuid) -> TaskResult<CommandReceipt> {
        let _guard = self.locks.acquire(task_id).await;
        let mut task = self.require_task(task_id).await?;
        let handle = self.require_handle(&task).await?;

        let live = match self.engine.status(&handle).await {
            Ok(live) => live,
            Err(err) => {
                let err = TaskError::engine("status", Some(task_id), err);
                self.fail_task(&mut task, "pause", &err).await;
                return Err(err);
            }
        };
        if live.paused {
            debug!(task_id = %task_id, "pause requested for paused task");
            return Ok(CommandReceipt::new(task_id, "Torrent is already paused"));
        }

        if let Err(err) = self.halt(&handle, task_id, live.auto_managed).await {
            self.fail_task(&mut task, "pause", &err).await;
            return Err(err);
        }
        tokio::time::sleep(self.settings.settle.pause).await;
        match self.engine.status(&handle).await {
            Ok(live) if !live.paused => {
                warn!(task_id = %task_id, "engine did not report the task as paused");
            }
            Ok(_) => {}
            Err(err) => warn!(task_id = %task_id, error = %err, "could not verify pause"),
        }

        task.status = TaskStatus::Paused;
        task.clear_rates();
        self.save(&task).await?;
        info!(task_id = %task_id, "task paused");
        Ok(CommandReceipt::new(task_id, "Torrent paused"))
    }

    async fn halt(&self, handle: &EngineHandle, task_id: Uuid, auto_managed: bool) -> TaskResult<()> {
        if auto_managed {
            self.engine
                .set_auto_managed(handle, false)
                .await
                .map_err(|err| TaskError::engine("set_auto_managed", Some(task_id), err))?;
            tokio::time::sleep(self.settings.settle.auto_managed).await;
        }
        self.engine
            .pause(handle)
            .await
            .map_err(|err| TaskError::engine("pause", Some(task_id), err))
    }

    /// Remove a task, its files and its statistics.
    ///
    /// A missing engine handle is not an error; an engine removal failure is
    /// logged and the persisted records are removed regardless.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` or a store failure.
    pub async fn remove(&self, task_id: Uuid, delete_files: bool) -> TaskResult<CommandReceipt> {
        let result = self.remove_task(task_id, delete_files).await;
        self.record("remove", result)
    }

    async fn remove_task(&self, task_id: Uuid, delete_files: bool) -> TaskResult<CommandReceipt> {
        let guard = self.locks.acquire(task_id).await;
        let task = self.require_task(task_id).await?;

        match self.engine.find_handle(&task.info_hash).await {
            Some(handle) => {
                if let Err(err) = self.engine.remove(&handle, delete_files).await {
                    warn!(
                        task_id = %task_id,
                        error = %err,
                        "engine removal failed; removing persisted records"
                    );
                }
            }
            None => debug!(task_id = %task_id, "no engine handle to remove"),
        }

        self.store
            .delete_statistics(task_id)
            .await
            .map_err(|err| TaskError::store("delete_statistics", err))?;
        self.store
            .delete_task(task_id)
            .await
            .map_err(|err| TaskError::store("delete_task", err))?;
        drop(guard);
        self.locks.forget(task_id);

        info!(task_id = %task_id, delete_files, "task removed");
        self.notifier
            .notify(NotificationKind::TorrentRemoved, &task, "Torrent removed");
        Ok(CommandReceipt::new(task_id, "Torrent removed"))
    }

    /// Set `priority` on the given files of a task, keeping every other
    /// file's priority. Returns the number of files updated.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPriority`, `NotFound`, `NotActive`,
    /// `MissingMetadata`, `FileNotFound`, `FileMismatch`, or the engine or
    /// store failure.
    pub async fn update_file_priorities(
        &self,
        task_id: Uuid,
        file_ids: &[Uuid],
        priority: i64,
    ) -> TaskResult<usize> {
        let result = self.reprioritize(task_id, file_ids, priority).await;
        self.record("update_file_priorities", result)
    }

    async fn reprioritize(
        &self,
        task_id: Uuid,
        file_ids: &[Uuid],
        priority: i64,
    ) -> TaskResult<usize> {
        let level = FilePriority::new(priority)
            .map_err(|err| TaskError::InvalidPriority { value: err.value })?;
        let _guard = self.locks.acquire(task_id).await;
        let task = self.require_task(task_id).await?;
        let handle = self.require_handle(&task).await?;
        if file_ids.is_empty() {
            return Ok(0);
        }

        let live_files = self
            .engine
            .files(&handle)
            .await
            .map_err(|err| TaskError::engine("files", Some(task_id), err))?;
        if live_files.is_empty() {
            return Err(TaskError::MissingMetadata { task_id });
        }
        let mut levels = self
            .engine
            .file_priorities(&handle)
            .await
            .map_err(|err| TaskError::engine("file_priorities", Some(task_id), err))?;
        if levels.len() != live_files.len() {
            debug!(
                task_id = %task_id,
                reported = levels.len(),
                files = live_files.len(),
                "priority vector length mismatch; starting from normal"
            );
            levels = vec![FilePriority::NORMAL.level(); live_files.len()];
        }
        let slots: HashMap<&str, usize> = live_files
            .iter()
            .map(|file| (file.path.as_str(), file.index))
            .collect();

        let mut seen = HashSet::new();
        let mut changed = Vec::new();
        for &file_id in file_ids {
            if !seen.insert(file_id) {
                continue;
            }
            let mut file = self
                .store
                .file(file_id)
                .await
                .map_err(|err| TaskError::store("file", err))?
                .ok_or(TaskError::FileNotFound { file_id })?;
            let mismatch = TaskError::FileMismatch { task_id, file_id };
            if file.task_id != task_id {
                return Err(mismatch);
            }
            let slot = slots
                .get(file.path.as_str())
                .copied()
                .filter(|slot| *slot < levels.len())
                .ok_or(mismatch)?;
            levels[slot] = level.level();
            file.priority = level;
            if level.is_skipped() {
                file.downloaded_bytes = 0;
                file.progress = 0.0;
            }
            changed.push(file);
        }

        self.engine
            .set_file_priorities(&handle, &levels)
            .await
            .map_err(|err| TaskError::engine("set_file_priorities", Some(task_id), err))?;
        tokio::time::sleep(self.settings.settle.priority).await;
        self.store
            .update_files(&changed)
            .await
            .map_err(|err| TaskError::store("update_files", err))?;
        info!(
            task_id = %task_id,
            files = changed.len(),
            priority = level.level(),
            "file priorities updated"
        );
        Ok(changed.len())
    }

    /// Stop downloading the given files.
    ///
    /// # Errors
    ///
    /// See [`Self::update_file_priorities`].
    pub async fn skip_files(&self, task_id: Uuid, file_ids: &[Uuid]) -> TaskResult<usize> {
        self.update_file_priorities(task_id, file_ids, i64::from(FilePriority::SKIP.level()))
            .await
    }

    /// Download the given files at normal priority.
    ///
    /// # Errors
    ///
    /// See [`Self::update_file_priorities`].
    pub async fn download_files(&self, task_id: Uuid, file_ids: &[Uuid]) -> TaskResult<usize> {
        self.update_file_priorities(task_id, file_ids, i64::from(FilePriority::NORMAL.level()))
            .await
    }

    /// Download the given files first.
    ///
    /// # Errors
    ///
    /// See [`Self::update_file_priorities`].
    pub async fn prioritize_files(&self, task_id: Uuid, file_ids: &[Uuid]) -> TaskResult<usize> {
        self.update_file_priorities(task_id, file_ids, i64::from(FilePriority::HIGH.level()))
            .await
    }

    /// Download the given files last.
    ///
    /// # Errors
    ///
    /// See [`Self::update_file_priorities`].
    pub async fn deprioritize_files(&self, task_id: Uuid, file_ids: &[Uuid]) -> TaskResult<usize> {
        self.update_file_priorities(task_id, file_ids, i64::from(FilePriority::LOW.level()))
            .await
    }

    /// Put every file of a task back to normal priority.
    ///
    /// # Errors
    ///
    /// See [`Self::update_file_priorities`].
    pub async fn reset_file_priorities(&self, task_id: Uuid) -> TaskResult<usize> {
        let ids = self.file_ids(task_id, |_| true).await?;
        self.download_files(task_id, &ids).await
    }

    /// Skip every file whose extension matches `extension`, ignoring case
    /// and a leading dot.
    ///
    /// # Errors
    ///
    /// See [`Self::update_file_priorities`].
    pub async fn skip_files_by_extension(
        &self,
        task_id: Uuid,
        extension: &str,
    ) -> TaskResult<usize> {
        let wanted = extension.trim().trim_start_matches('.').to_ascii_lowercase();
        let ids = self
            .file_ids(task_id, |file| {
                file.extension().is_some_and(|ext| ext == wanted)
            })
            .await?;
        self.skip_files(task_id, &ids).await
    }

    async fn file_ids(
        &self,
        task_id: Uuid,
        keep: impl Fn(&TaskFile) -> bool,
    ) -> TaskResult<Vec<Uuid>> {
        self.require_task(task_id).await?;
        Ok(self
            .store
            .files(task_id)
            .await
            .map_err(|err| TaskError::store("files", err))?
            .into_iter()
            .filter(keep)
            .map(|file| file.id)
            .collect())
    }

    async fn require_task(&self, task_id: Uuid) -> TaskResult<Task> {
        self.store
            .task(task_id)
            .await
            .map_err(|err| TaskError::store("task", err))?
            .ok_or(TaskError::NotFound { task_id })
    }

    async fn require_handle(&self, task: &Task) -> TaskResult<EngineHandle> {
        self.engine
            .find_handle(&task.info_hash)
            .await
            .ok_or(TaskError::NotActive { task_id: task.id })
    }

    async fn save(&self, task: &Task) -> TaskResult<()> {
        self.store
            .update_task(task)
            .await
            .map_err(|err| TaskError::store("update_task", err))
    }

    async fn fail_task(&self, task: &mut Task, verb: &str, err: &TaskError) {
        task.fail(format!("Failed to {verb}: {}", failure_detail(err)));
        task.clear_rates();
        match self.save(task).await {
            Ok(()) => warn!(
                task_id = %task.id,
                error = %error_chain_message(err),
                "command failed; task marked as error"
            ),
            Err(save_err) => warn!(
                task_id = %task.id,
                error = %error_chain_message(&save_err),
                "could not record command failure"
            ),
        }
    }

    fn record<T>(&self, command: &'static str, result: TaskResult<T>) -> TaskResult<T> {
        let outcome = result.as_ref().map_or_else(outcome_of, |_| CommandOutcome::Succeeded);
        self.metrics.inc_command(command, outcome);
        result
    }
}

const fn outcome_of(err: &TaskError) -> CommandOutcome {
    match err {
        TaskError::Engine { .. }
        | TaskError::Store { .. }
        | TaskError::Io { .. }
        | TaskError::EngineNotReady { .. }
        | TaskError::MetadataTimeout { .. } => CommandOutcome::Failed,
        _ => CommandOutcome::Rejected,
    }
}

/// Engine message when the engine supplied one, otherwise the error chain.
pub(crate) fn failure_detail(err: &TaskError) -> String {
    match err {
        TaskError::Engine {
            source: EngineError::Rejected { message, .. },
            ..
        } => message.clone(),
        other => error_chain_message(other),
    }
}
