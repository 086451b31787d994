//! Read-only task and file queries.

use std::collections::BTreeMap;
use std::sync::Arc;

use mooring_core::{
    FilePriority, InfoHash, Task, TaskError, TaskFile, TaskResult, TaskStatus, TaskStore,
};
use uuid::Uuid;

/// Queries over persisted tasks and their files.
pub struct TaskCatalog {
    store: Arc<dyn TaskStore>,
}

impl TaskCatalog {
    pub(crate) fn new(store: Arc<dyn TaskStore>) -> Self {
        Self { store }
    }

    /// Task by identifier.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` or a store failure.
    pub async fn task(&self, task_id: Uuid) -> TaskResult<Task> {
        self.store
            .task(task_id)
            .await
            .map_err(|err| TaskError::store("task", err))?
            .ok_or(TaskError::NotFound { task_id })
    }

    /// Task by fingerprint; malformed input finds nothing.
    ///
    /// # Errors
    ///
    /// Returns a store failure.
    pub async fn task_by_info_hash(&self, raw: &str) -> TaskResult<Option<Task>> {
        let Ok(info_hash) = InfoHash::parse(raw) else {
            return Ok(None);
        };
        self.store
            .task_by_info_hash(&info_hash)
            .await
            .map_err(|err| TaskError::store("task_by_info_hash", err))
    }

    /// Every task, newest first.
    ///
    /// # Errors
    ///
    /// Returns a store failure.
    pub async fn tasks(&self) -> TaskResult<Vec<Task>> {
        self.store
            .tasks()
            .await
            .map_err(|err| TaskError::store("tasks", err))
    }

    /// Tasks in `status`, newest first.
    ///
    /// # Errors
    ///
    /// Returns a store failure.
    pub async fn tasks_with_status(&self, status: TaskStatus) -> TaskResult<Vec<Task>> {
        self.store
            .tasks_with_status(&[status])
            .await
            .map_err(|err| TaskError::store("tasks_with_status", err))
    }

    /// Downloading, seeding and checking tasks.
    ///
    /// # Errors
    ///
    /// Returns a store failure.
    pub async fn active_tasks(&self) -> TaskResult<Vec<Task>> {
        self.store
            .tasks_with_status(&TaskStatus::ACTIVE)
            .await
            .map_err(|err| TaskError::store("tasks_with_status", err))
    }

    /// Tasks whose name contains `needle`, ignoring case.
    ///
    /// # Errors
    ///
    /// Returns a store failure.
    pub async fn search_by_name(&self, needle: &str) -> TaskResult<Vec<Task>> {
        self.store
            .search_by_name(needle.trim())
            .await
            .map_err(|err| TaskError::store("search_by_name", err))
    }

    /// Files of a task, ordered by path.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` or a store failure.
    pub async fn files(&self, task_id: Uuid) -> TaskResult<Vec<TaskFile>> {
        self.task(task_id).await?;
        self.store
            .files(task_id)
            .await
            .map_err(|err| TaskError::store("files", err))
    }

    /// Files that will not be downloaded.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` or a store failure.
    pub async fn skipped_files(&self, task_id: Uuid) -> TaskResult<Vec<TaskFile>> {
        self.files_where(task_id, |file| file.priority.is_skipped())
            .await
    }

    /// Files at exactly `priority`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPriority`, `NotFound` or a store failure.
    pub async fn files_with_priority(
        &self,
        task_id: Uuid,
        priority: i64,
    ) -> TaskResult<Vec<TaskFile>> {
        let level = FilePriority::new(priority)
            .map_err(|err| TaskError::InvalidPriority { value: err.value })?;
        self.files_where(task_id, |file| file.priority == level)
            .await
    }

    /// Files below 100 % progress.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` or a store failure.
    pub async fn incomplete_files(&self, task_id: Uuid) -> TaskResult<Vec<TaskFile>> {
        self.files_where(task_id, TaskFile::is_incomplete).await
    }

    /// Files whose path contains `pattern`, ignoring case.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` or a store failure.
    pub async fn search_files(&self, task_id: Uuid, pattern: &str) -> TaskResult<Vec<TaskFile>> {
        let needle = pattern.trim().to_lowercase();
        self.files_where(task_id, |file| file.path.to_lowercase().contains(&needle))
            .await
    }

    /// Total bytes per priority level; levels without files are omitted.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` or a store failure.
    pub async fn size_by_priority(&self, task_id: Uuid) -> TaskResult<BTreeMap<FilePriority, u64>> {
        let mut totals = BTreeMap::new();
        for file in self.files(task_id).await? {
            *totals.entry(file.priority).or_insert(0) += file.size;
        }
        Ok(totals)
    }

    async fn files_where(
        &self,
        task_id: Uuid,
        keep: impl Fn(&TaskFile) -> bool,
    ) -> TaskResult<Vec<TaskFile>> {
        let mut files = self.files(task_id).await?;
        files.retain(keep);
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mooring_store::MemoryStore;
    use mooring_test_support::samples;

    async fn seeded() -> anyhow::Result<(TaskCatalog, Task, Vec<TaskFile>)> {
        let store = Arc::new(MemoryStore::new());
        let task = samples::task('d', "Debian Netinst", TaskStatus::Seeding);
        let mut files = samples::task_files(
            task.id,
            &[("iso/debian.ISO", 600), ("iso/SHA256SUMS", 4), ("extras/readme.txt", 2)],
        );
        files[1].priority = FilePriority::SKIP;
        files[2].progress = 100.0;
        store.insert_task(&task, &files).await?;
        Ok((TaskCatalog::new(store), task, files))
    }

    #[tokio::test]
    async fn lookups_by_id_and_fingerprint() -> anyhow::Result<()> {
        let (catalog, task, _) = seeded().await?;
        assert_eq!(catalog.task(task.id).await?.name, "Debian Netinst");
        assert!(matches!(
            catalog.task(Uuid::new_v4()).await,
            Err(TaskError::NotFound { .. })
        ));

        let upper = task.info_hash.as_str().to_ascii_uppercase();
        assert!(catalog.task_by_info_hash(&upper).await?.is_some());
        assert!(catalog.task_by_info_hash("not-a-hash").await?.is_none());

        assert_eq!(catalog.active_tasks().await?.len(), 1);
        assert!(catalog.tasks_with_status(TaskStatus::Paused).await?.is_empty());
        assert_eq!(catalog.search_by_name("netinst").await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn file_filters() -> anyhow::Result<()> {
        let (catalog, task, files) = seeded().await?;
        let skipped = catalog.skipped_files(task.id).await?;
        assert_eq!(skipped.len(), 1);
        assert_eq!(skipped[0].id, files[1].id);

        assert_eq!(catalog.files_with_priority(task.id, 4).await?.len(), 2);
        assert!(matches!(
            catalog.files_with_priority(task.id, 9).await,
            Err(TaskError::InvalidPriority { value: 9 })
        ));
        assert_eq!(catalog.incomplete_files(task.id).await?.len(), 2);
        assert_eq!(catalog.search_files(task.id, "ISO/").await?.len(), 2);

        let sizes = catalog.size_by_priority(task.id).await?;
        assert_eq!(sizes.get(&FilePriority::NORMAL), Some(&602));
        assert_eq!(sizes.get(&FilePriority::SKIP), Some(&4));
        assert_eq!(sizes.get(&FilePriority::HIGH), None);
        Ok(())
    }
}
