//! Default values for every configuration knob.
//!
//! # Design
//! - One constant per knob so the model defaults and the guard rails agree.

pub(crate) const CONNECTIONS_LIMIT: u32 = 200;
pub(crate) const MAX_ACTIVE_DOWNLOADS: u32 = 5;
pub(crate) const MAX_ACTIVE_SEEDS: u32 = 5;
pub(crate) const PORT_MIN: u16 = 6881;
pub(crate) const PORT_MAX: u16 = 6889;
pub(crate) const ALERT_QUEUE_SIZE: u32 = 10_000;
pub(crate) const DOWNLOADS_PATH: &str = "./downloads";
pub(crate) const DHT_BOOTSTRAP_NODES: [&str; 4] = [
    "dht.libtorrent.org:25401",
    "router.bittorrent.com:6881",
    "router.utorrent.com:6881",
    "dht.transmissionbt.com:6881",
];
pub(crate) const READINESS_TIMEOUT_SECS: u64 = 30;
pub(crate) const METADATA_TIMEOUT_SECS: u64 = 60;

pub(crate) const STATUS_INTERVAL_SECS: u64 = 5;
pub(crate) const STATISTICS_INTERVAL_SECS: u64 = 60;
pub(crate) const SESSION_SYNC_INTERVAL_SECS: u64 = 30;
pub(crate) const STALL_CHECK_INTERVAL_SECS: u64 = 3_600;
pub(crate) const CLEANUP_INTERVAL_SECS: u64 = 86_400;
pub(crate) const TASK_BROADCAST_INTERVAL_SECS: u64 = 2;
pub(crate) const STATS_BROADCAST_INTERVAL_SECS: u64 = 5;
pub(crate) const START_SETTLE_MS: u64 = 200;
pub(crate) const PAUSE_SETTLE_MS: u64 = 200;
pub(crate) const AUTO_MANAGED_SETTLE_MS: u64 = 100;
pub(crate) const PRIORITY_SETTLE_MS: u64 = 100;

pub(crate) const DB_MAX_CONNECTIONS: u32 = 5;
pub(crate) const LOG_LEVEL: &str = "info";

/// Longest settle delay accepted before falling back to the default.
pub(crate) const MAX_SETTLE_MS: u64 = 10_000;
