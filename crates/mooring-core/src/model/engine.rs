//! Snapshots and events exchanged with the download engine.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::InfoHash;

/// Reference to a task inside a running engine session.
///
/// Handles can silently go stale (the engine drops or re-adds the task), so
/// callers re-resolve them for every operation instead of retaining them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EngineHandle {
    /// Fingerprint of the task the handle points at.
    pub info_hash: InfoHash,
    /// Session-assigned generation; a re-added task gets a new one.
    pub generation: u64,
}

/// Coarse engine-side state reported alongside the flag set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    /// Hashing existing files on disk.
    CheckingFiles,
    /// Waiting on peers for the metainfo of a magnet.
    DownloadingMetadata,
    /// Transferring payload pieces.
    Downloading,
    /// Wanted pieces are all present.
    Finished,
    /// Uploading to peers after completion.
    Seeding,
    /// Validating previously saved resume data.
    CheckingResumeData,
    /// Preallocating storage.
    Allocating,
    /// State not recognised by the adapter.
    #[default]
    Unknown,
}

impl EngineState {
    /// Both file and resume-data checks.
    #[must_use]
    pub const fn is_checking(self) -> bool {
        matches!(self, Self::CheckingFiles | Self::CheckingResumeData)
    }

    /// Payload transfer, including the metadata-fetch phase.
    #[must_use]
    pub const fn is_downloading(self) -> bool {
        matches!(self, Self::Downloading | Self::DownloadingMetadata)
    }
}

/// Named facts extracted once from a single engine status read.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LiveStatus {
    /// The engine will not transfer data for this task.
    pub paused: bool,
    /// The engine queue may start or stop the task on its own.
    pub auto_managed: bool,
    /// Every wanted piece is present.
    pub finished: bool,
    /// The task is uploading to peers.
    pub seeding: bool,
    /// Engine-reported error, when an error code is set.
    pub error: Option<String>,
    /// Coarse engine state.
    pub state: EngineState,
    /// Completion as a fraction in `[0, 1]`.
    pub progress: f64,
    /// Bytes of wanted pieces that are present.
    pub total_done: u64,
    /// Bytes the engine intends to download.
    pub total_wanted: u64,
    /// Session-lifetime downloaded payload bytes.
    pub all_time_download: u64,
    /// Session-lifetime uploaded payload bytes.
    pub all_time_upload: u64,
    /// Current download rate in bytes per second.
    pub download_rate: u64,
    /// Current upload rate in bytes per second.
    pub upload_rate: u64,
    /// Connected peers.
    pub peers: u32,
    /// Connected seeds.
    pub seeds: u32,
}

/// Per-file progress as reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveFile {
    /// Position in the engine's file list; not stable across sessions.
    pub index: usize,
    /// Path relative to the save directory.
    pub path: String,
    /// File size in bytes.
    pub size: u64,
    /// Bytes present for this file.
    pub downloaded: u64,
}

/// One file listed in a metainfo document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaFile {
    /// Path relative to the save directory.
    pub path: String,
    /// File size in bytes.
    pub size: u64,
}

/// Parsed torrent metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metainfo {
    /// Content fingerprint.
    pub info_hash: InfoHash,
    /// Suggested display name.
    pub name: String,
    /// Files in engine order.
    pub files: Vec<MetaFile>,
    /// Optional comment.
    pub comment: Option<String>,
    /// Optional authoring tool.
    pub created_by: Option<String>,
    /// Optional creation time.
    pub creation_date: Option<DateTime<Utc>>,
}

impl Metainfo {
    /// Sum of all file sizes.
    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.files.iter().map(|file| file.size).sum()
    }
}

/// Request to admit a task into the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddRequest {
    /// Resolved metadata of the task.
    pub metainfo: Metainfo,
    /// Directory the payload is written to.
    pub save_path: PathBuf,
}

/// Events emitted by the engine session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    /// A task entered the session.
    Added {
        /// Task fingerprint.
        info_hash: InfoHash,
    },
    /// A task left the session.
    Removed {
        /// Task fingerprint.
        info_hash: InfoHash,
    },
    /// A task finished downloading its wanted pieces.
    Finished {
        /// Task fingerprint.
        info_hash: InfoHash,
    },
    /// A task hit an error.
    Error {
        /// Task fingerprint.
        info_hash: InfoHash,
        /// Engine-provided description.
        message: String,
    },
    /// Metadata for a magnet task arrived.
    MetadataReceived {
        /// Task fingerprint.
        info_hash: InfoHash,
    },
    /// Status for a batch of tasks changed.
    StateUpdate {
        /// Fingerprints of the tasks whose status changed.
        info_hashes: Vec<InfoHash>,
    },
}

impl EngineEvent {
    /// Machine-friendly discriminator for logs and metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Added { .. } => "added",
            Self::Removed { .. } => "removed",
            Self::Finished { .. } => "finished",
            Self::Error { .. } => "error",
            Self::MetadataReceived { .. } => "metadata_received",
            Self::StateUpdate { .. } => "state_update",
        }
    }
}

/// Session-wide knobs applied when the engine starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Global peer connection limit.
    pub connections_limit: u32,
    /// Auto-managed downloads allowed to run at once.
    pub active_downloads: u32,
    /// Auto-managed seeds allowed to run at once.
    pub active_seeds: u32,
    /// Distributed hash table discovery.
    pub enable_dht: bool,
    /// Local service discovery.
    pub enable_lsd: bool,
    /// UPnP port mapping.
    pub enable_upnp: bool,
    /// NAT-PMP port mapping.
    pub enable_natpmp: bool,
    /// `host:port` bootstrap nodes for the DHT.
    pub dht_bootstrap_nodes: Vec<String>,
    /// Capacity of the engine's internal event queue.
    pub alert_queue_size: u32,
    /// Announce to every tracker tier.
    pub announce_to_all_tiers: bool,
    /// Announce to every tracker within a tier.
    pub announce_to_all_trackers: bool,
    /// `address:port` the session listens on.
    pub listen_interface: String,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            connections_limit: 200,
            active_downloads: 5,
            active_seeds: 5,
            enable_dht: true,
            enable_lsd: true,
            enable_upnp: true,
            enable_natpmp: true,
            dht_bootstrap_nodes: [
                "dht.libtorrent.org:25401",
                "router.bittorrent.com:6881",
                "router.utorrent.com:6881",
                "dht.transmissionbt.com:6881",
            ]
            .into_iter()
            .map(str::to_string)
            .collect(),
            alert_queue_size: 10_000,
            announce_to_all_tiers: true,
            announce_to_all_trackers: true,
            listen_interface: "0.0.0.0:6881".to_string(),
        }
    }
}
