//! Persisted task, file and statistics records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{FilePriority, InfoHash, TaskStatus};

/// Persisted download task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Store identifier.
    pub id: Uuid,
    /// Immutable content fingerprint.
    pub info_hash: InfoHash,
    /// Display name taken from the metainfo.
    pub name: String,
    /// Magnet URI or file path the task was added from.
    pub origin: String,
    /// Total wanted bytes; unknown until metadata arrives.
    pub total_size: Option<u64>,
    /// Bytes verified on disk.
    pub downloaded_bytes: u64,
    /// Bytes uploaded over the task's lifetime.
    pub uploaded_bytes: u64,
    /// Lifecycle status.
    pub status: TaskStatus,
    /// Completion percentage in `[0, 100]`.
    pub progress: f64,
    /// Instantaneous download rate in bytes per second.
    pub download_rate: u64,
    /// Instantaneous upload rate in bytes per second.
    pub upload_rate: u64,
    /// Connected peers.
    pub peers: u32,
    /// Connected seeds.
    pub seeds: u32,
    /// Directory the payload is written to.
    pub save_path: String,
    /// When the task was created.
    pub added_at: DateTime<Utc>,
    /// First entry into COMPLETED or SEEDING.
    pub completed_at: Option<DateTime<Utc>>,
    /// Present only while the task is in ERROR.
    pub error_message: Option<String>,
    /// Free-form comment from the metainfo.
    pub comment: Option<String>,
    /// Tool that produced the metainfo.
    pub created_by: Option<String>,
    /// Creation time recorded in the metainfo.
    pub creation_date: Option<DateTime<Utc>>,
}

impl Task {
    /// Demote the task to ERROR with the given message.
    pub fn fail(&mut self, message: impl Into<String>) {
        self.status = TaskStatus::Error;
        self.error_message = Some(message.into());
    }

    /// A downloading task with no throughput and no peers.
    #[must_use]
    pub fn is_stalled(&self) -> bool {
        self.status == TaskStatus::Downloading && self.download_rate == 0 && self.peers == 0
    }

    /// Zero out the instantaneous transfer fields.
    pub const fn clear_rates(&mut self) {
        self.download_rate = 0;
        self.upload_rate = 0;
    }
}

/// File belonging to a task, matched to engine files by `path`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskFile {
    /// Store identifier.
    pub id: Uuid,
    /// Owning task.
    pub task_id: Uuid,
    /// Path relative to the task's save directory.
    pub path: String,
    /// File size in bytes.
    pub size: u64,
    /// Bytes downloaded for this file.
    pub downloaded_bytes: u64,
    /// Completion percentage in `[0, 100]`.
    pub progress: f64,
    /// Engine priority.
    pub priority: FilePriority,
}

impl TaskFile {
    /// Whether the file still has bytes to fetch.
    #[must_use]
    pub fn is_incomplete(&self) -> bool {
        self.progress < 100.0
    }

    /// Lowercased extension without the leading dot.
    #[must_use]
    pub fn extension(&self) -> Option<String> {
        std::path::Path::new(&self.path)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
    }
}

/// Cumulative transfer statistics for one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    /// Task the statistics belong to.
    pub task_id: Uuid,
    /// All-time downloaded bytes.
    pub total_downloaded: u64,
    /// All-time uploaded bytes.
    pub total_uploaded: u64,
    /// Uploaded over downloaded; derived by [`Statistics::recompute_ratio`].
    pub ratio: f64,
    /// Wall-clock seconds since `start_time`.
    pub time_active_secs: u64,
    /// First observation of the task by the statistics pass.
    pub start_time: DateTime<Utc>,
    /// First observation of a finished state.
    pub end_time: Option<DateTime<Utc>>,
    /// Long-run average download rate.
    pub average_download_rate: u64,
    /// Long-run average upload rate.
    pub average_upload_rate: u64,
    /// Highest observed download rate.
    pub max_download_rate: u64,
    /// Highest observed upload rate.
    pub max_upload_rate: u64,
    /// Highest observed connected peer count.
    pub peak_peers: u32,
}

impl Statistics {
    /// Fresh row with every counter at zero.
    #[must_use]
    pub const fn new(task_id: Uuid, start_time: DateTime<Utc>) -> Self {
        Self {
            task_id,
            total_downloaded: 0,
            total_uploaded: 0,
            ratio: 0.0,
            time_active_secs: 0,
            start_time,
            end_time: None,
            average_download_rate: 0,
            average_upload_rate: 0,
            max_download_rate: 0,
            max_upload_rate: 0,
            peak_peers: 0,
        }
    }

    /// Refresh the derived ratio from the cumulative counters.
    pub fn recompute_ratio(&mut self) {
        self.ratio = share_ratio(self.total_uploaded, self.total_downloaded);
    }
}

/// Aggregate view over every task, computed at query time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OverallStatistics {
    /// Number of tasks in the store.
    pub total_tasks: u64,
    /// Tasks in DOWNLOADING.
    pub downloading: u64,
    /// Tasks in COMPLETED.
    pub completed: u64,
    /// Tasks in SEEDING.
    pub seeding: u64,
    /// Tasks in PAUSED.
    pub paused: u64,
    /// Tasks in ERROR.
    pub errored: u64,
    /// Downloading plus seeding.
    pub active: u64,
    /// Sum of downloaded bytes across tasks.
    pub total_downloaded: u64,
    /// Sum of uploaded bytes across tasks.
    pub total_uploaded: u64,
    /// Sum of total size over COMPLETED tasks.
    pub total_completed_size: u64,
    /// Uploaded over downloaded across all tasks.
    pub overall_ratio: f64,
    /// Summed live download rate over active tasks.
    pub download_rate: u64,
    /// Summed live upload rate over active tasks.
    pub upload_rate: u64,
    /// Summed connected peers over active tasks.
    pub peers: u64,
    /// Summed connected seeds over active tasks.
    pub seeds: u64,
}

/// Uploaded over downloaded, or zero when nothing was downloaded.
#[must_use]
pub fn share_ratio(uploaded: u64, downloaded: u64) -> f64 {
    if downloaded == 0 {
        0.0
    } else {
        to_f64(uploaded) / to_f64(downloaded)
    }
}

const fn to_f64(value: u64) -> f64 {
    #[expect(
        clippy::cast_precision_loss,
        reason = "byte counters are reported as floating point ratios"
    )]
    {
        value as f64
    }
}
