//! Core domain types shared across the workspace.
//!
//! Layout: `mod.rs` (identity, status and priority primitives), `task.rs`
//! (persisted records), `engine.rs` (live engine snapshots and events).

mod engine;
mod task;

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{InvalidInfoHash, PriorityOutOfRange};

pub use engine::{
    AddRequest, EngineEvent, EngineHandle, EngineState, LiveFile, LiveStatus, MetaFile, Metainfo,
    SessionSettings,
};
pub use task::{OverallStatistics, Statistics, Task, TaskFile, share_ratio};

/// Content fingerprint naming a task across the engine and the store.
///
/// Stored as lowercase hex so equality is case-insensitive with respect to
/// whatever casing the engine or the caller used.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct InfoHash(String);

impl InfoHash {
    /// Parse a v1 (40 hex chars) or v2 (64 hex chars) fingerprint.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidInfoHash`] when the value has the wrong length or
    /// contains non-hex characters.
    pub fn parse(raw: &str) -> Result<Self, InvalidInfoHash> {
        let trimmed = raw.trim();
        let valid_len = matches!(trimmed.len(), 40 | 64);
        if !valid_len || !trimmed.chars().all(|ch| ch.is_ascii_hexdigit()) {
            return Err(InvalidInfoHash {
                value: raw.to_string(),
            });
        }
        Ok(Self(trimmed.to_ascii_lowercase()))
    }

    /// Lowercase hex representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Compare against a raw engine-reported fingerprint ignoring case.
    #[must_use]
    pub fn matches(&self, raw: &str) -> bool {
        self.0.eq_ignore_ascii_case(raw.trim())
    }
}

impl Display for InfoHash {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

impl FromStr for InfoHash {
    type Err = InvalidInfoHash;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl TryFrom<String> for InfoHash {
    type Error = InvalidInfoHash;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<InfoHash> for String {
    fn from(value: InfoHash) -> Self {
        value.0
    }
}

/// Persisted lifecycle status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    /// Added but not yet doing anything observable.
    Pending,
    /// Transferring payload or fetching metadata.
    Downloading,
    /// Stopped by the user.
    Paused,
    /// All wanted data is present and the task is not uploading.
    Completed,
    /// All wanted data is present and the task is uploading.
    Seeding,
    /// Stopped for good; never demoted by reconciliation.
    Stopped,
    /// Something went wrong; see the task's error message.
    Error,
    /// Verifying on-disk data or resume data.
    Checking,
}

impl TaskStatus {
    /// Statuses the engine is expected to hold a live handle for.
    pub const ACTIVE: [Self; 3] = [Self::Downloading, Self::Seeding, Self::Checking];
    /// Statuses counted against the concurrent-download limit.
    pub const ADMITTED: [Self; 2] = [Self::Downloading, Self::Checking];
    /// Every status, in declaration order.
    pub const ALL: [Self; 8] = [
        Self::Pending,
        Self::Downloading,
        Self::Paused,
        Self::Completed,
        Self::Seeding,
        Self::Stopped,
        Self::Error,
        Self::Checking,
    ];

    /// Stable string form used in storage and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Downloading => "DOWNLOADING",
            Self::Paused => "PAUSED",
            Self::Completed => "COMPLETED",
            Self::Seeding => "SEEDING",
            Self::Stopped => "STOPPED",
            Self::Error => "ERROR",
            Self::Checking => "CHECKING",
        }
    }

    /// Terminal statuses survive a missing engine handle.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Stopped)
    }

    /// Whether the status belongs to [`Self::ACTIVE`].
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Downloading | Self::Seeding | Self::Checking)
    }
}

impl Display for TaskStatus {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(value))
            .ok_or_else(|| value.to_string())
    }
}

/// Per-file download priority on the engine's 0..=7 scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct FilePriority(u8);

impl FilePriority {
    /// Do not download the file.
    pub const SKIP: Self = Self(0);
    /// Lowest non-skip priority.
    pub const LOW: Self = Self(1);
    /// Engine default.
    pub const NORMAL: Self = Self(4);
    /// Highest priority.
    pub const HIGH: Self = Self(7);
    /// Largest accepted level.
    pub const MAX_LEVEL: u8 = 7;

    /// Validate a caller-supplied level.
    ///
    /// # Errors
    ///
    /// Returns [`PriorityOutOfRange`] when `level` is outside `0..=7`.
    pub fn new(level: i64) -> Result<Self, PriorityOutOfRange> {
        u8::try_from(level)
            .ok()
            .filter(|value| *value <= Self::MAX_LEVEL)
            .map(Self)
            .ok_or(PriorityOutOfRange { value: level })
    }

    /// Raw engine level.
    #[must_use]
    pub const fn level(self) -> u8 {
        self.0
    }

    /// Skipped files never report progress.
    #[must_use]
    pub const fn is_skipped(self) -> bool {
        self.0 == 0
    }
}

impl Default for FilePriority {
    fn default() -> Self {
        Self::NORMAL
    }
}

impl TryFrom<u8> for FilePriority {
    type Error = PriorityOutOfRange;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(i64::from(value))
    }
}

impl From<FilePriority> for u8 {
    fn from(value: FilePriority) -> Self {
        value.0
    }
}
