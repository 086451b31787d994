//! In-process store used by tests and by the binary without a database.

use std::collections::HashMap;

use async_trait::async_trait;
use mooring_core::{
    InfoHash, Statistics, StoreError, StoreResult, Task, TaskFile, TaskStatus, TaskStore,
};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    tasks: HashMap<Uuid, Task>,
    files: HashMap<Uuid, TaskFile>,
    statistics: HashMap<Uuid, Statistics>,
}

/// [`TaskStore`] backed by hash maps behind a single async lock.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn newest_first(mut tasks: Vec<Task>) -> Vec<Task> {
    tasks.sort_by(|a, b| b.added_at.cmp(&a.added_at).then_with(|| a.id.cmp(&b.id)));
    tasks
}

#[async_trait]
impl TaskStore for MemoryStore {
    async fn insert_task(&self, task: &Task, files: &[TaskFile]) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if tables.tasks.contains_key(&task.id)
            || tables
                .tasks
                .values()
                .any(|existing| existing.info_hash == task.info_hash)
        {
            return Err(StoreError::Duplicate {
                entity: "task",
                key: task.info_hash.to_string(),
            });
        }
        tables.tasks.insert(task.id, task.clone());
        for file in files {
            tables.files.insert(file.id, file.clone());
        }
        Ok(())
    }

    async fn update_task(&self, task: &Task) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        let slot = tables.tasks.get_mut(&task.id).ok_or(StoreError::Missing {
            entity: "task",
            id: task.id,
        })?;
        *slot = task.clone();
        Ok(())
    }

    async fn delete_task(&self, task_id: Uuid) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        let removed = tables.tasks.remove(&task_id).is_some();
        tables.files.retain(|_, file| file.task_id != task_id);
        Ok(removed)
    }

    async fn task(&self, task_id: Uuid) -> StoreResult<Option<Task>> {
        Ok(self.tables.read().await.tasks.get(&task_id).cloned())
    }

    async fn task_by_info_hash(&self, info_hash: &InfoHash) -> StoreResult<Option<Task>> {
        Ok(self
            .tables
            .read()
            .await
            .tasks
            .values()
            .find(|task| &task.info_hash == info_hash)
            .cloned())
    }

    async fn tasks(&self) -> StoreResult<Vec<Task>> {
        let tasks = self.tables.read().await.tasks.values().cloned().collect();
        Ok(newest_first(tasks))
    }

    async fn tasks_with_status(&self, statuses: &[TaskStatus]) -> StoreResult<Vec<Task>> {
        let tasks = self
            .tables
            .read()
            .await
            .tasks
            .values()
            .filter(|task| statuses.contains(&task.status))
            .cloned()
            .collect();
        Ok(newest_first(tasks))
    }

    async fn count_with_status(&self, statuses: &[TaskStatus]) -> StoreResult<u64> {
        let count = self
            .tables
            .read()
            .await
            .tasks
            .values()
            .filter(|task| statuses.contains(&task.status))
            .count();
        Ok(u64::try_from(count).unwrap_or(u64::MAX))
    }

    async fn files(&self, task_id: Uuid) -> StoreResult<Vec<TaskFile>> {
        let mut files: Vec<TaskFile> = self
            .tables
            .read()
            .await
            .files
            .values()
            .filter(|file| file.task_id == task_id)
            .cloned()
            .collect();
        files.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(files)
    }

    async fn file(&self, file_id: Uuid) -> StoreResult<Option<TaskFile>> {
        Ok(self.tables.read().await.files.get(&file_id).cloned())
    }

    async fn update_files(&self, files: &[TaskFile]) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if let Some(missing) = files
            .iter()
            .find(|file| !tables.files.contains_key(&file.id))
        {
            return Err(StoreError::Missing {
                entity: "task_file",
                id: missing.id,
            });
        }
        for file in files {
            tables.files.insert(file.id, file.clone());
        }
        Ok(())
    }

    async fn statistics(&self, task_id: Uuid) -> StoreResult<Option<Statistics>> {
        Ok(self.tables.read().await.statistics.get(&task_id).cloned())
    }

    async fn all_statistics(&self) -> StoreResult<Vec<Statistics>> {
        Ok(self
            .tables
            .read()
            .await
            .statistics
            .values()
            .cloned()
            .collect())
    }

    async fn save_statistics(&self, statistics: &Statistics) -> StoreResult<()> {
        self.tables
            .write()
            .await
            .statistics
            .insert(statistics.task_id, statistics.clone());
        Ok(())
    }

    async fn delete_statistics(&self, task_id: Uuid) -> StoreResult<bool> {
        Ok(self
            .tables
            .write()
            .await
            .statistics
            .remove(&task_id)
            .is_some())
    }
}
