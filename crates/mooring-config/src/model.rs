//! Typed configuration model.
//!
//! Every section deserialises with defaults so a partial (or absent) file is
//! always valid input.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::defaults;

/// Root configuration document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MooringConfig {
    /// Engine session and admission settings.
    pub engine: EngineSettings,
    /// Cadences and settle delays.
    pub schedule: ScheduleSettings,
    /// Persistence backend selection.
    pub storage: StorageSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

/// Engine session and admission settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Global peer connection limit.
    pub connections_limit: u32,
    /// Tasks allowed to download or check at once. Drives both admission
    /// control and the engine's own active-download limit.
    pub max_active_downloads: u32,
    /// Seeds the engine keeps active at once.
    pub max_active_seeds: u32,
    /// Lowest peer port; the session listens here.
    pub port_min: u16,
    /// Highest peer port.
    pub port_max: u16,
    /// Distributed hash table discovery.
    pub enable_dht: bool,
    /// Local service discovery.
    pub enable_lsd: bool,
    /// UPnP port mapping.
    pub enable_upnp: bool,
    /// NAT-PMP port mapping.
    pub enable_natpmp: bool,
    /// DHT bootstrap nodes as `host:port`.
    pub dht_bootstrap_nodes: Vec<String>,
    /// Engine event queue capacity.
    pub alert_queue_size: u32,
    /// Save directory used when a request names none.
    pub downloads_path: String,
    /// Bound on the startup readiness wait.
    pub readiness_timeout_secs: u64,
    /// Bound on magnet metadata resolution.
    pub metadata_timeout_secs: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            connections_limit: defaults::CONNECTIONS_LIMIT,
            max_active_downloads: defaults::MAX_ACTIVE_DOWNLOADS,
            max_active_seeds: defaults::MAX_ACTIVE_SEEDS,
            port_min: defaults::PORT_MIN,
            port_max: defaults::PORT_MAX,
            enable_dht: true,
            enable_lsd: true,
            enable_upnp: true,
            enable_natpmp: true,
            dht_bootstrap_nodes: defaults::DHT_BOOTSTRAP_NODES
                .into_iter()
                .map(str::to_string)
                .collect(),
            alert_queue_size: defaults::ALERT_QUEUE_SIZE,
            downloads_path: defaults::DOWNLOADS_PATH.to_string(),
            readiness_timeout_secs: defaults::READINESS_TIMEOUT_SECS,
            metadata_timeout_secs: defaults::METADATA_TIMEOUT_SECS,
        }
    }
}

impl EngineSettings {
    /// `address:port` the session listens on.
    #[must_use]
    pub fn listen_interface(&self) -> String {
        format!("0.0.0.0:{}", self.port_min)
    }

    /// Readiness wait bound.
    #[must_use]
    pub const fn readiness_timeout(&self) -> Duration {
        Duration::from_secs(self.readiness_timeout_secs)
    }

    /// Metadata wait bound.
    #[must_use]
    pub const fn metadata_timeout(&self) -> Duration {
        Duration::from_secs(self.metadata_timeout_secs)
    }
}

/// Cadences of the periodic passes and settle delays of control commands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleSettings {
    /// Status reconciliation pass.
    pub status_interval_secs: u64,
    /// Statistics aggregation pass.
    pub statistics_interval_secs: u64,
    /// Persisted-versus-engine membership sync.
    pub session_sync_interval_secs: u64,
    /// Stalled task sweep.
    pub stall_check_interval_secs: u64,
    /// Orphaned statistics cleanup.
    pub cleanup_interval_secs: u64,
    /// Per-task and list snapshots.
    pub task_broadcast_interval_secs: u64,
    /// Overall statistics snapshot.
    pub stats_broadcast_interval_secs: u64,
    /// Wait after resume before verifying.
    pub start_settle_ms: u64,
    /// Wait after pause before verifying.
    pub pause_settle_ms: u64,
    /// Wait after clearing auto-management before pausing.
    pub auto_managed_settle_ms: u64,
    /// Wait after applying a priority vector.
    pub priority_settle_ms: u64,
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            status_interval_secs: defaults::STATUS_INTERVAL_SECS,
            statistics_interval_secs: defaults::STATISTICS_INTERVAL_SECS,
            session_sync_interval_secs: defaults::SESSION_SYNC_INTERVAL_SECS,
            stall_check_interval_secs: defaults::STALL_CHECK_INTERVAL_SECS,
            cleanup_interval_secs: defaults::CLEANUP_INTERVAL_SECS,
            task_broadcast_interval_secs: defaults::TASK_BROADCAST_INTERVAL_SECS,
            stats_broadcast_interval_secs: defaults::STATS_BROADCAST_INTERVAL_SECS,
            start_settle_ms: defaults::START_SETTLE_MS,
            pause_settle_ms: defaults::PAUSE_SETTLE_MS,
            auto_managed_settle_ms: defaults::AUTO_MANAGED_SETTLE_MS,
            priority_settle_ms: defaults::PRIORITY_SETTLE_MS,
        }
    }
}

impl ScheduleSettings {
    /// Settle delays as durations.
    #[must_use]
    pub const fn settle_delays(&self) -> SettleDelays {
        SettleDelays {
            start: Duration::from_millis(self.start_settle_ms),
            pause: Duration::from_millis(self.pause_settle_ms),
            auto_managed: Duration::from_millis(self.auto_managed_settle_ms),
            priority: Duration::from_millis(self.priority_settle_ms),
        }
    }
}

/// Fixed waits between a control toggle and its verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettleDelays {
    /// After resume.
    pub start: Duration,
    /// After pause.
    pub pause: Duration,
    /// After clearing auto-management.
    pub auto_managed: Duration,
    /// After applying priorities.
    pub priority: Duration,
}

impl SettleDelays {
    /// No waiting at all; used by tests.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            start: Duration::ZERO,
            pause: Duration::ZERO,
            auto_managed: Duration::ZERO,
            priority: Duration::ZERO,
        }
    }
}

/// Persistence backend selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Postgres URL; the in-memory store is used when absent.
    pub database_url: Option<String>,
    /// Pool size for Postgres.
    pub max_connections: u32,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            database_url: None,
            max_connections: defaults::DB_MAX_CONNECTIONS,
        }
    }
}

/// Log output settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Level directive; `RUST_LOG` takes precedence.
    pub level: String,
    /// Output format.
    pub format: LogFormatSetting,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: defaults::LOG_LEVEL.to_string(),
            format: LogFormatSetting::Auto,
        }
    }
}

/// Requested log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormatSetting {
    /// Pretty in debug builds, JSON otherwise.
    #[default]
    Auto,
    /// Structured JSON lines.
    Json,
    /// Human-readable output.
    Pretty,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() -> anyhow::Result<()> {
        let config: MooringConfig = serde_json::from_str("{}")?;
        assert_eq!(config, MooringConfig::default());
        assert_eq!(config.engine.max_active_downloads, 5);
        assert_eq!(config.engine.listen_interface(), "0.0.0.0:6881");
        assert_eq!(config.schedule.status_interval_secs, 5);
        assert_eq!(config.engine.metadata_timeout(), Duration::from_secs(60));
        Ok(())
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() -> anyhow::Result<()> {
        let config: MooringConfig = serde_json::from_str(
            r#"{"engine": {"max_active_downloads": 2}, "logging": {"format": "json"}}"#,
        )?;
        assert_eq!(config.engine.max_active_downloads, 2);
        assert_eq!(config.engine.connections_limit, 200);
        assert_eq!(config.logging.format, LogFormatSetting::Json);
        assert_eq!(config.logging.level, "info");
        Ok(())
    }

    #[test]
    fn settle_delays_convert_milliseconds() {
        let delays = ScheduleSettings::default().settle_delays();
        assert_eq!(delays.start, Duration::from_millis(200));
        assert_eq!(delays.auto_managed, Duration::from_millis(100));
        assert_eq!(SettleDelays::none().pause, Duration::ZERO);
    }
}
