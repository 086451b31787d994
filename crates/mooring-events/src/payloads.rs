//! Event payload types published on the bus.

use chrono::{DateTime, Utc};
use mooring_core::{OverallStatistics, Task};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::topics::{NOTIFICATIONS_TOPIC, STATS_TOPIC, TASKS_TOPIC, task_topic};

/// Identifier assigned to each published event.
pub type EventId = u64;

/// Default buffer size for the in-memory replay ring.
pub const DEFAULT_REPLAY_CAPACITY: usize = 1_024;

/// Ad hoc lifecycle notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// A task was added.
    TorrentAdded,
    /// A task was removed.
    TorrentRemoved,
    /// A task finished downloading.
    TorrentCompleted,
}

impl NotificationKind {
    /// Wire name of the notification.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TorrentAdded => "torrent_added",
            Self::TorrentRemoved => "torrent_removed",
            Self::TorrentCompleted => "torrent_completed",
        }
    }
}

/// Typed events published by the broadcaster and command paths.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Periodic snapshot of a single active task.
    TaskSnapshot {
        /// Current persisted record.
        task: Task,
    },
    /// Periodic snapshot of every task, newest first.
    TaskList {
        /// Current persisted records.
        tasks: Vec<Task>,
    },
    /// Periodic aggregate statistics.
    Statistics {
        /// Figures computed at publish time.
        overall: OverallStatistics,
    },
    /// Lifecycle notification keyed by task identity.
    Notification {
        /// Notification kind.
        event: NotificationKind,
        /// Task the notification is about.
        task_id: Uuid,
        /// Human-readable message.
        message: String,
        /// Display name of the task.
        task_name: String,
    },
}

impl Event {
    /// Machine-friendly discriminator.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::TaskSnapshot { .. } => "task_snapshot",
            Self::TaskList { .. } => "task_list",
            Self::Statistics { .. } => "statistics",
            Self::Notification { event, .. } => event.as_str(),
        }
    }

    /// Destination the event is published to.
    #[must_use]
    pub fn topic(&self) -> String {
        match self {
            Self::TaskSnapshot { task } => task_topic(task.id),
            Self::TaskList { .. } => TASKS_TOPIC.to_string(),
            Self::Statistics { .. } => STATS_TOPIC.to_string(),
            Self::Notification { .. } => NOTIFICATIONS_TOPIC.to_string(),
        }
    }
}

/// Envelope carrying the id, topic and emission time of an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Sequential identifier.
    pub id: EventId,
    /// Destination topic.
    pub topic: String,
    /// Emission time.
    pub timestamp: DateTime<Utc>,
    /// Payload.
    pub event: Event,
}
