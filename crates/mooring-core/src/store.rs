//! Persistence trait for tasks, their files and statistics.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::StoreResult;
use crate::model::{InfoHash, Statistics, Task, TaskFile, TaskStatus};

/// Storage backend for reconciled task state.
///
/// Deleting a task deletes its files. Statistics reference tasks and must be
/// deleted first by callers.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Insert a task together with its files.
    async fn insert_task(&self, task: &Task, files: &[TaskFile]) -> StoreResult<()>;

    /// Overwrite every mutable field of an existing task.
    async fn update_task(&self, task: &Task) -> StoreResult<()>;

    /// Delete a task and its files. Returns whether a row was removed.
    async fn delete_task(&self, task_id: Uuid) -> StoreResult<bool>;

    /// Fetch a task by identifier.
    async fn task(&self, task_id: Uuid) -> StoreResult<Option<Task>>;

    /// Fetch a task by fingerprint.
    async fn task_by_info_hash(&self, info_hash: &InfoHash) -> StoreResult<Option<Task>>;

    /// Every task, newest first.
    async fn tasks(&self) -> StoreResult<Vec<Task>>;

    /// Tasks whose status is one of `statuses`, newest first.
    async fn tasks_with_status(&self, statuses: &[TaskStatus]) -> StoreResult<Vec<Task>>;

    /// Number of tasks whose status is one of `statuses`.
    async fn count_with_status(&self, statuses: &[TaskStatus]) -> StoreResult<u64>;

    /// Files of a task ordered by path.
    async fn files(&self, task_id: Uuid) -> StoreResult<Vec<TaskFile>>;

    /// Fetch a single file by identifier.
    async fn file(&self, file_id: Uuid) -> StoreResult<Option<TaskFile>>;

    /// Overwrite mutable fields of existing files.
    async fn update_files(&self, files: &[TaskFile]) -> StoreResult<()>;

    /// Statistics for a task, if created yet.
    async fn statistics(&self, task_id: Uuid) -> StoreResult<Option<Statistics>>;

    /// Every statistics row.
    async fn all_statistics(&self) -> StoreResult<Vec<Statistics>>;

    /// Insert or replace a statistics row.
    async fn save_statistics(&self, statistics: &Statistics) -> StoreResult<()>;

    /// Delete a statistics row. Returns whether a row was removed.
    async fn delete_statistics(&self, task_id: Uuid) -> StoreResult<bool>;

    /// Whether a task with the fingerprint exists.
    async fn exists_by_info_hash(&self, info_hash: &InfoHash) -> StoreResult<bool> {
        Ok(self.task_by_info_hash(info_hash).await?.is_some())
    }

    /// Tasks whose name contains `needle`, ignoring case.
    async fn search_by_name(&self, needle: &str) -> StoreResult<Vec<Task>> {
        let needle = needle.to_lowercase();
        Ok(self
            .tasks()
            .await?
            .into_iter()
            .filter(|task| task.name.to_lowercase().contains(&needle))
            .collect())
    }
}
