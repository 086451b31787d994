//! Postgres-backed [`TaskStore`].

use async_trait::async_trait;
use mooring_core::{
    FilePriority, InfoHash, Statistics, StoreError, StoreResult, Task, TaskFile, TaskStatus,
    TaskStore,
};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::debug;
use uuid::Uuid;

const SELECT_TASKS_SQL: &str = r"
    SELECT
        id, info_hash, name, origin, total_size, downloaded_bytes, uploaded_bytes,
        status, progress, download_rate, upload_rate, peers, seeds, save_path,
        added_at, completed_at, error_message, comment, created_by, creation_date
    FROM mooring.tasks
    ORDER BY added_at DESC, id
";

const SELECT_TASKS_BY_STATUS_SQL: &str = r"
    SELECT
        id, info_hash, name, origin, total_size, downloaded_bytes, uploaded_bytes,
        status, progress, download_rate, upload_rate, peers, seeds, save_path,
        added_at, completed_at, error_message, comment, created_by, creation_date
    FROM mooring.tasks
    WHERE status = ANY($1)
    ORDER BY added_at DESC, id
";

const SELECT_TASK_BY_ID_SQL: &str = r"
    SELECT
        id, info_hash, name, origin, total_size, downloaded_bytes, uploaded_bytes,
        status, progress, download_rate, upload_rate, peers, seeds, save_path,
        added_at, completed_at, error_message, comment, created_by, creation_date
    FROM mooring.tasks
    WHERE id = $1
";

const SELECT_TASK_BY_INFO_HASH_SQL: &str = r"
    SELECT
        id, info_hash, name, origin, total_size, downloaded_bytes, uploaded_bytes,
        status, progress, download_rate, upload_rate, peers, seeds, save_path,
        added_at, completed_at, error_message, comment, created_by, creation_date
    FROM mooring.tasks
    WHERE info_hash = $1
";

const INSERT_TASK_SQL: &str = r"
    INSERT INTO mooring.tasks (
        id, info_hash, name, origin, total_size, downloaded_bytes, uploaded_bytes,
        status, progress, download_rate, upload_rate, peers, seeds, save_path,
        added_at, completed_at, error_message, comment, created_by, creation_date
    )
    VALUES (
        $1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
        $11, $12, $13, $14, $15, $16, $17, $18, $19, $20
    )
";

const UPDATE_TASK_SQL: &str = r"
    UPDATE mooring.tasks
    SET
        name = $2,
        origin = $3,
        total_size = $4,
        downloaded_bytes = $5,
        uploaded_bytes = $6,
        status = $7,
        progress = $8,
        download_rate = $9,
        upload_rate = $10,
        peers = $11,
        seeds = $12,
        save_path = $13,
        completed_at = $14,
        error_message = $15,
        comment = $16,
        created_by = $17,
        creation_date = $18
    WHERE id = $1
";

const DELETE_TASK_SQL: &str = r"
    DELETE FROM mooring.tasks
    WHERE id = $1
";

const INSERT_FILE_SQL: &str = r"
    INSERT INTO mooring.task_files (
        id, task_id, path, size, downloaded_bytes, progress, priority
    )
    VALUES ($1, $2, $3, $4, $5, $6, $7)
";

const UPDATE_FILE_SQL: &str = r"
    UPDATE mooring.task_files
    SET
        size = $2,
        downloaded_bytes = $3,
        progress = $4,
        priority = $5
    WHERE id = $1
";

const SELECT_FILES_SQL: &str = r"
    SELECT id, task_id, path, size, downloaded_bytes, progress, priority
    FROM mooring.task_files
    WHERE task_id = $1
    ORDER BY path
";

const SELECT_FILE_SQL: &str = r"
    SELECT id, task_id, path, size, downloaded_bytes, progress, priority
    FROM mooring.task_files
    WHERE id = $1
";

const COUNT_WITH_STATUS_SQL: &str = r"
    SELECT COUNT(*) AS total
    FROM mooring.tasks
    WHERE status = ANY($1)
";

const SELECT_STATISTICS_SQL: &str = r"
    SELECT
        task_id, total_downloaded, total_uploaded, ratio, time_active_secs,
        start_time, end_time, average_download_rate, average_upload_rate,
        max_download_rate, max_upload_rate, peak_peers
    FROM mooring.statistics
    WHERE task_id = $1
";

const SELECT_ALL_STATISTICS_SQL: &str = r"
    SELECT
        task_id, total_downloaded, total_uploaded, ratio, time_active_secs,
        start_time, end_time, average_download_rate, average_upload_rate,
        max_download_rate, max_upload_rate, peak_peers
    FROM mooring.statistics
";

const UPSERT_STATISTICS_SQL: &str = r"
    INSERT INTO mooring.statistics (
        task_id, total_downloaded, total_uploaded, ratio, time_active_secs,
        start_time, end_time, average_download_rate, average_upload_rate,
        max_download_rate, max_upload_rate, peak_peers
    )
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
    ON CONFLICT (task_id) DO UPDATE
    SET
        total_downloaded = EXCLUDED.total_downloaded,
        total_uploaded = EXCLUDED.total_uploaded,
        ratio = EXCLUDED.ratio,
        time_active_secs = EXCLUDED.time_active_secs,
        start_time = EXCLUDED.start_time,
        end_time = EXCLUDED.end_time,
        average_download_rate = EXCLUDED.average_download_rate,
        average_upload_rate = EXCLUDED.average_upload_rate,
        max_download_rate = EXCLUDED.max_download_rate,
        max_upload_rate = EXCLUDED.max_upload_rate,
        peak_peers = EXCLUDED.peak_peers
";

const DELETE_STATISTICS_SQL: &str = r"
    DELETE FROM mooring.statistics
    WHERE task_id = $1
";

/// Postgres implementation of [`TaskStore`].
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Wrap a pool, applying pending migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if migrations fail or the database is unreachable.
    pub async fn new(pool: PgPool) -> StoreResult<Self> {
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|err| StoreError::backend("store.migrate", err))?;
        Ok(Self { pool })
    }

    /// Connect to `database_url` and apply migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection or migrations fail.
    pub async fn connect(database_url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect(database_url)
            .await
            .map_err(|err| StoreError::backend("store.connect", err))?;
        Self::new(pool).await
    }

    /// Access the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn select_tasks(&self, filter: Option<&[TaskStatus]>) -> StoreResult<Vec<Task>> {
        let query = match filter {
            Some(statuses) => sqlx::query(SELECT_TASKS_BY_STATUS_SQL).bind(status_labels(statuses)),
            None => sqlx::query(SELECT_TASKS_SQL),
        };
        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|err| StoreError::backend("store.tasks", err))?;
        rows.iter().map(decode_task).collect()
    }

    async fn select_task(&self, key: TaskKey<'_>) -> StoreResult<Option<Task>> {
        let query = match key {
            TaskKey::Id(id) => sqlx::query(SELECT_TASK_BY_ID_SQL).bind(id),
            TaskKey::InfoHash(hash) => {
                sqlx::query(SELECT_TASK_BY_INFO_HASH_SQL).bind(hash.as_str().to_string())
            }
        };
        let row = query
            .fetch_optional(&self.pool)
            .await
            .map_err(|err| StoreError::backend("store.task", err))?;
        row.as_ref().map(decode_task).transpose()
    }
}

enum TaskKey<'a> {
    Id(Uuid),
    InfoHash(&'a InfoHash),
}

#[async_trait]
impl TaskStore for PgStore {
    async fn insert_task(&self, task: &Task, files: &[TaskFile]) -> StoreResult<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|err| StoreError::backend("store.insert_task.begin", err))?;

        sqlx::query(INSERT_TASK_SQL)
            .bind(task.id)
            .bind(task.info_hash.as_str())
            .bind(&task.name)
            .bind(&task.origin)
            .bind(task.total_size.map(to_db))
            .bind(to_db(task.downloaded_bytes))
            .bind(to_db(task.uploaded_bytes))
            .bind(task.status.as_str())
            .bind(task.progress)
            .bind(to_db(task.download_rate))
            .bind(to_db(task.upload_rate))
            .bind(i64::from(task.peers))
            .bind(i64::from(task.seeds))
            .bind(&task.save_path)
            .bind(task.added_at)
            .bind(task.completed_at)
            .bind(task.error_message.as_deref())
            .bind(task.comment.as_deref())
            .bind(task.created_by.as_deref())
            .bind(task.creation_date)
            .execute(&mut *tx)
            .await
            .map_err(|err| {
                if is_unique_violation(&err) {
                    StoreError::Duplicate {
                        entity: "task",
                        key: task.info_hash.to_string(),
                    }
                } else {
                    StoreError::backend("store.insert_task", err)
                }
            })?;

        for file in files {
            sqlx::query(INSERT_FILE_SQL)
                .bind(file.id)
                .bind(file.task_id)
                .bind(&file.path)
                .bind(to_db(file.size))
                .bind(to_db(file.downloaded_bytes))
                .bind(file.progress)
                .bind(i16::from(file.priority.level()))
                .execute(&mut *tx)
                .await
                .map_err(|err| StoreError::backend("store.insert_file", err))?;
        }

        tx.commit()
            .await
            .map_err(|err| StoreError::backend("store.insert_task.commit", err))?;
        debug!(task_id = %task.id, files = files.len(), "task inserted");
        Ok(())
    }

    async fn update_task(&self, task: &Task) -> StoreResult<()> {
        let result = sqlx::query(UPDATE_TASK_SQL)
            .bind(task.id)
            .bind(&task.name)
            .bind(&task.origin)
            .bind(task.total_size.map(to_db))
            .bind(to_db(task.downloaded_bytes))
            .bind(to_db(task.uploaded_bytes))
            .bind(task.status.as_str())
            .bind(task.progress)
            .bind(to_db(task.download_rate))
            .bind(to_db(task.upload_rate))
            .bind(i64::from(task.peers))
            .bind(i64::from(task.seeds))
            .bind(&task.save_path)
            .bind(task.completed_at)
            .bind(task.error_message.as_deref())
            .bind(task.comment.as_deref())
            .bind(task.created_by.as_deref())
            .bind(task.creation_date)
            .execute(&self.pool)
            .await
            .map_err(|err| StoreError::backend("store.update_task", err))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::Missing {
                entity: "task",
                id: task.id,
            });
        }
        Ok(())
    }

    async fn delete_task(&self, task_id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query(DELETE_TASK_SQL)
            .bind(task_id)
            .execute(&self.pool)
            .await
            .map_err(|err| StoreError::backend("store.delete_task", err))?;
        Ok(result.rows_affected() > 0)
    }

    async fn task(&self, task_id: Uuid) -> StoreResult<Option<Task>> {
        self.select_task(TaskKey::Id(task_id)).await
    }

    async fn task_by_info_hash(&self, info_hash: &InfoHash) -> StoreResult<Option<Task>> {
        self.select_task(TaskKey::InfoHash(info_hash)).await
    }

    async fn tasks(&self) -> StoreResult<Vec<Task>> {
        self.select_tasks(None).await
    }

    async fn tasks_with_status(&self, statuses: &[TaskStatus]) -> StoreResult<Vec<Task>> {
        self.select_tasks(Some(statuses)).await
    }

    async fn count_with_status(&self, statuses: &[TaskStatus]) -> StoreResult<u64> {
        let row = sqlx::query(COUNT_WITH_STATUS_SQL)
            .bind(status_labels(statuses))
            .fetch_one(&self.pool)
            .await
            .map_err(|err| StoreError::backend("store.count_with_status", err))?;
        let total: i64 = row
            .try_get("total")
            .map_err(|err| StoreError::backend("store.count_with_status", err))?;
        Ok(from_db(total))
    }

    async fn files(&self, task_id: Uuid) -> StoreResult<Vec<TaskFile>> {
        let rows = sqlx::query(SELECT_FILES_SQL)
            .bind(task_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|err| StoreError::backend("store.files", err))?;
        rows.iter().map(decode_file).collect()
    }

    async fn file(&self, file_id: Uuid) -> StoreResult<Option<TaskFile>> {
        let row = sqlx::query(SELECT_FILE_SQL)
            .bind(file_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|err| StoreError::backend("store.file", err))?;
        row.as_ref().map(decode_file).transpose()
    }

    async fn update_files(&self, files: &[TaskFile]) -> StoreResult<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|err| StoreError::backend("store.update_files.begin", err))?;
        for file in files {
            let result = sqlx::query(UPDATE_FILE_SQL)
                .bind(file.id)
                .bind(to_db(file.size))
                .bind(to_db(file.downloaded_bytes))
                .bind(file.progress)
                .bind(i16::from(file.priority.level()))
                .execute(&mut *tx)
                .await
                .map_err(|err| StoreError::backend("store.update_files", err))?;
            if result.rows_affected() == 0 {
                return Err(StoreError::Missing {
                    entity: "task_file",
                    id: file.id,
                });
            }
        }
        tx.commit()
            .await
            .map_err(|err| StoreError::backend("store.update_files.commit", err))
    }

    async fn statistics(&self, task_id: Uuid) -> StoreResult<Option<Statistics>> {
        let row = sqlx::query(SELECT_STATISTICS_SQL)
            .bind(task_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|err| StoreError::backend("store.statistics", err))?;
        row.as_ref().map(decode_statistics).transpose()
    }

    async fn all_statistics(&self) -> StoreResult<Vec<Statistics>> {
        let rows = sqlx::query(SELECT_ALL_STATISTICS_SQL)
            .fetch_all(&self.pool)
            .await
            .map_err(|err| StoreError::backend("store.all_statistics", err))?;
        rows.iter().map(decode_statistics).collect()
    }

    async fn save_statistics(&self, statistics: &Statistics) -> StoreResult<()> {
        sqlx::query(UPSERT_STATISTICS_SQL)
            .bind(statistics.task_id)
            .bind(to_db(statistics.total_downloaded))
            .bind(to_db(statistics.total_uploaded))
            .bind(statistics.ratio)
            .bind(to_db(statistics.time_active_secs))
            .bind(statistics.start_time)
            .bind(statistics.end_time)
            .bind(to_db(statistics.average_download_rate))
            .bind(to_db(statistics.average_upload_rate))
            .bind(to_db(statistics.max_download_rate))
            .bind(to_db(statistics.max_upload_rate))
            .bind(i64::from(statistics.peak_peers))
            .execute(&self.pool)
            .await
            .map_err(|err| StoreError::backend("store.save_statistics", err))?;
        Ok(())
    }

    async fn delete_statistics(&self, task_id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query(DELETE_STATISTICS_SQL)
            .bind(task_id)
            .execute(&self.pool)
            .await
            .map_err(|err| StoreError::backend("store.delete_statistics", err))?;
        Ok(result.rows_affected() > 0)
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(|db| db.is_unique_violation())
}

fn status_labels(statuses: &[TaskStatus]) -> Vec<String> {
    statuses
        .iter()
        .map(|status| status.as_str().to_string())
        .collect()
}

fn column<T>(row: &PgRow, name: &'static str) -> StoreResult<T>
where
    T: for<'r> sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(name)
        .map_err(|err| StoreError::backend("store.decode", err))
}

fn decode_task(row: &PgRow) -> StoreResult<Task> {
    let raw_hash: String = column(row, "info_hash")?;
    let info_hash = InfoHash::parse(&raw_hash).map_err(|_| StoreError::Corrupt {
        field: "info_hash",
        value: raw_hash.clone(),
    })?;
    let raw_status: String = column(row, "status")?;
    let status = raw_status
        .parse::<TaskStatus>()
        .map_err(|_| StoreError::Corrupt {
            field: "status",
            value: raw_status.clone(),
        })?;

    Ok(Task {
        id: column(row, "id")?,
        info_hash,
        name: column(row, "name")?,
        origin: column(row, "origin")?,
        total_size: column::<Option<i64>>(row, "total_size")?.map(from_db),
        downloaded_bytes: from_db(column(row, "downloaded_bytes")?),
        uploaded_bytes: from_db(column(row, "uploaded_bytes")?),
        status,
        progress: column(row, "progress")?,
        download_rate: from_db(column(row, "download_rate")?),
        upload_rate: from_db(column(row, "upload_rate")?),
        peers: to_count(column(row, "peers")?),
        seeds: to_count(column(row, "seeds")?),
        save_path: column(row, "save_path")?,
        added_at: column(row, "added_at")?,
        completed_at: column(row, "completed_at")?,
        error_message: column(row, "error_message")?,
        comment: column(row, "comment")?,
        created_by: column(row, "created_by")?,
        creation_date: column(row, "creation_date")?,
    })
}

fn decode_file(row: &PgRow) -> StoreResult<TaskFile> {
    let raw_priority: i16 = column(row, "priority")?;
    let priority = FilePriority::new(i64::from(raw_priority)).map_err(|_| StoreError::Corrupt {
        field: "priority",
        value: raw_priority.to_string(),
    })?;
    Ok(TaskFile {
        id: column(row, "id")?,
        task_id: column(row, "task_id")?,
        path: column(row, "path")?,
        size: from_db(column(row, "size")?),
        downloaded_bytes: from_db(column(row, "downloaded_bytes")?),
        progress: column(row, "progress")?,
        priority,
    })
}

fn decode_statistics(row: &PgRow) -> StoreResult<Statistics> {
    Ok(Statistics {
        task_id: column(row, "task_id")?,
        total_downloaded: from_db(column(row, "total_downloaded")?),
        total_uploaded: from_db(column(row, "total_uploaded")?),
        ratio: column(row, "ratio")?,
        time_active_secs: from_db(column(row, "time_active_secs")?),
        start_time: column(row, "start_time")?,
        end_time: column(row, "end_time")?,
        average_download_rate: from_db(column(row, "average_download_rate")?),
        average_upload_rate: from_db(column(row, "average_upload_rate")?),
        max_download_rate: from_db(column(row, "max_download_rate")?),
        max_upload_rate: from_db(column(row, "max_upload_rate")?),
        peak_peers: to_count(column(row, "peak_peers")?),
    })
}

fn to_db(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn from_db(value: i64) -> u64 {
    u64::try_from(value).unwrap_or_default()
}

fn to_count(value: i64) -> u32 {
    u32::try_from(value.max(0)).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_conversions_saturate() {
        assert_eq!(to_db(42), 42);
        assert_eq!(to_db(u64::MAX), i64::MAX);
        assert_eq!(from_db(-5), 0);
        assert_eq!(to_count(-1), 0);
        assert_eq!(to_count(i64::MAX), u32::MAX);
    }

    #[test]
    fn status_labels_match_stored_text() {
        assert_eq!(
            status_labels(&[TaskStatus::Downloading, TaskStatus::Checking]),
            vec!["DOWNLOADING".to_string(), "CHECKING".to_string()]
        );
    }
}
