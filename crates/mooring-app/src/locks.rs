//! Per-task write serialization.
//!
//! Every writer of a task (status pass, statistics pass, commands) holds the
//! task's lock for the duration of its read-modify-write. Different tasks
//! never contend.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

#[derive(Clone, Default)]
pub(crate) struct TaskLocks {
    inner: Arc<Mutex<HashMap<Uuid, Arc<AsyncMutex<()>>>>>,
}

impl TaskLocks {
    pub(crate) async fn acquire(&self, task_id: Uuid) -> OwnedMutexGuard<()> {
        let lock = Arc::clone(self.lock_map().entry(task_id).or_default());
        lock.lock_owned().await
    }

    /// Drop the lock entry of a removed task.
    pub(crate) fn forget(&self, task_id: Uuid) {
        self.lock_map().remove(&task_id);
    }

    fn lock_map(&self) -> MutexGuard<'_, HashMap<Uuid, Arc<AsyncMutex<()>>>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_task_is_serialized() {
        let locks = TaskLocks::default();
        let id = Uuid::new_v4();
        let guard = locks.acquire(id).await;

        let contender = locks.clone();
        let waiting = tokio::spawn(async move { contender.acquire(id).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiting.is_finished());

        drop(guard);
        assert!(
            tokio::time::timeout(Duration::from_secs(1), waiting)
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn different_tasks_do_not_contend() {
        let locks = TaskLocks::default();
        let _first = locks.acquire(Uuid::new_v4()).await;
        let second = tokio::time::timeout(
            Duration::from_millis(100),
            locks.acquire(Uuid::new_v4()),
        )
        .await;
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn forget_drops_entry() {
        let locks = TaskLocks::default();
        let id = Uuid::new_v4();
        drop(locks.acquire(id).await);
        locks.forget(id);
        assert!(locks.lock_map().is_empty());
    }
}
