//! Guard rails applied to a loaded configuration.
//!
//! # Design
//! - Normalisation never fails: out-of-range values fall back to defaults.
//! - Every substitution is reported as a warning for the caller to log.

use std::fmt::Display;

use crate::defaults;
use crate::model::{EngineSettings, MooringConfig, ScheduleSettings};

/// Configuration after guard rails, with the substitutions that were made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedConfig {
    /// Usable configuration.
    pub config: MooringConfig,
    /// One entry per replaced or dropped value.
    pub warnings: Vec<String>,
}

/// Replace zero, empty or inconsistent values with their defaults.
#[must_use]
pub fn normalize(mut config: MooringConfig) -> NormalizedConfig {
    let mut warnings = Vec::new();
    normalize_engine(&mut config.engine, &mut warnings);
    normalize_schedule(&mut config.schedule, &mut warnings);

    if config.storage.max_connections == 0 {
        replace(
            &mut config.storage.max_connections,
            defaults::DB_MAX_CONNECTIONS,
            "storage.max_connections",
            &mut warnings,
        );
    }
    if config
        .storage
        .database_url
        .as_deref()
        .is_some_and(|url| url.trim().is_empty())
    {
        config.storage.database_url = None;
        warnings.push("storage.database_url is empty; using the in-memory store".to_string());
    }
    if config.logging.level.trim().is_empty() {
        replace(
            &mut config.logging.level,
            defaults::LOG_LEVEL.to_string(),
            "logging.level",
            &mut warnings,
        );
    }

    NormalizedConfig { config, warnings }
}

fn normalize_engine(engine: &mut EngineSettings, warnings: &mut Vec<String>) {
    for (value, fallback, field) in [
        (
            &mut engine.connections_limit,
            defaults::CONNECTIONS_LIMIT,
            "engine.connections_limit",
        ),
        (
            &mut engine.max_active_downloads,
            defaults::MAX_ACTIVE_DOWNLOADS,
            "engine.max_active_downloads",
        ),
        (
            &mut engine.max_active_seeds,
            defaults::MAX_ACTIVE_SEEDS,
            "engine.max_active_seeds",
        ),
        (
            &mut engine.alert_queue_size,
            defaults::ALERT_QUEUE_SIZE,
            "engine.alert_queue_size",
        ),
    ] {
        if *value == 0 {
            replace(value, fallback, field, warnings);
        }
    }

    if engine.port_min == 0 {
        replace(
            &mut engine.port_min,
            defaults::PORT_MIN,
            "engine.port_min",
            warnings,
        );
    }
    if engine.port_max < engine.port_min {
        let floor = engine.port_min;
        replace(&mut engine.port_max, floor, "engine.port_max", warnings);
    }

    for (value, fallback, field) in [
        (
            &mut engine.readiness_timeout_secs,
            defaults::READINESS_TIMEOUT_SECS,
            "engine.readiness_timeout_secs",
        ),
        (
            &mut engine.metadata_timeout_secs,
            defaults::METADATA_TIMEOUT_SECS,
            "engine.metadata_timeout_secs",
        ),
    ] {
        if *value == 0 {
            replace(value, fallback, field, warnings);
        }
    }

    if engine.downloads_path.trim().is_empty() {
        replace(
            &mut engine.downloads_path,
            defaults::DOWNLOADS_PATH.to_string(),
            "engine.downloads_path",
            warnings,
        );
    }

    let before = engine.dht_bootstrap_nodes.len();
    engine
        .dht_bootstrap_nodes
        .retain(|node| node.rsplit_once(':').is_some_and(|(host, port)| {
            !host.is_empty() && port.parse::<u16>().is_ok()
        }));
    let dropped = before - engine.dht_bootstrap_nodes.len();
    if dropped > 0 {
        warnings.push(format!(
            "engine.dht_bootstrap_nodes: dropped {dropped} entries without host:port"
        ));
    }
}

fn normalize_schedule(schedule: &mut ScheduleSettings, warnings: &mut Vec<String>) {
    for (value, fallback, field) in [
        (
            &mut schedule.status_interval_secs,
            defaults::STATUS_INTERVAL_SECS,
            "schedule.status_interval_secs",
        ),
        (
            &mut schedule.statistics_interval_secs,
            defaults::STATISTICS_INTERVAL_SECS,
            "schedule.statistics_interval_secs",
        ),
        (
            &mut schedule.session_sync_interval_secs,
            defaults::SESSION_SYNC_INTERVAL_SECS,
            "schedule.session_sync_interval_secs",
        ),
        (
            &mut schedule.stall_check_interval_secs,
            defaults::STALL_CHECK_INTERVAL_SECS,
            "schedule.stall_check_interval_secs",
        ),
        (
            &mut schedule.cleanup_interval_secs,
            defaults::CLEANUP_INTERVAL_SECS,
            "schedule.cleanup_interval_secs",
        ),
        (
            &mut schedule.task_broadcast_interval_secs,
            defaults::TASK_BROADCAST_INTERVAL_SECS,
            "schedule.task_broadcast_interval_secs",
        ),
        (
            &mut schedule.stats_broadcast_interval_secs,
            defaults::STATS_BROADCAST_INTERVAL_SECS,
            "schedule.stats_broadcast_interval_secs",
        ),
    ] {
        if *value == 0 {
            replace(value, fallback, field, warnings);
        }
    }

    for (value, fallback, field) in [
        (
            &mut schedule.start_settle_ms,
            defaults::START_SETTLE_MS,
            "schedule.start_settle_ms",
        ),
        (
            &mut schedule.pause_settle_ms,
            defaults::PAUSE_SETTLE_MS,
            "schedule.pause_settle_ms",
        ),
        (
            &mut schedule.auto_managed_settle_ms,
            defaults::AUTO_MANAGED_SETTLE_MS,
            "schedule.auto_managed_settle_ms",
        ),
        (
            &mut schedule.priority_settle_ms,
            defaults::PRIORITY_SETTLE_MS,
            "schedule.priority_settle_ms",
        ),
    ] {
        if *value > defaults::MAX_SETTLE_MS {
            replace(value, fallback, field, warnings);
        }
    }
}

fn replace<T: Display>(value: &mut T, fallback: T, field: &str, warnings: &mut Vec<String>) {
    warnings.push(format!("{field}: replaced '{value}' with default '{fallback}'"));
    *value = fallback;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_pass_untouched() {
        let normalized = normalize(MooringConfig::default());
        assert!(normalized.warnings.is_empty());
        assert_eq!(normalized.config, MooringConfig::default());
    }

    #[test]
    fn zero_values_fall_back_with_warnings() {
        let mut config = MooringConfig::default();
        config.engine.max_active_downloads = 0;
        config.engine.port_min = 7000;
        config.engine.port_max = 10;
        config.schedule.status_interval_secs = 0;
        config.schedule.pause_settle_ms = 60_000;
        config.storage.database_url = Some("   ".into());

        let normalized = normalize(config);
        let engine = &normalized.config.engine;
        assert_eq!(engine.max_active_downloads, 5);
        assert_eq!(engine.port_max, 7000);
        assert_eq!(normalized.config.schedule.status_interval_secs, 5);
        assert_eq!(normalized.config.schedule.pause_settle_ms, 200);
        assert_eq!(normalized.config.storage.database_url, None);
        assert_eq!(normalized.warnings.len(), 5);
    }

    #[test]
    fn malformed_bootstrap_nodes_are_dropped() {
        let mut config = MooringConfig::default();
        config.engine.dht_bootstrap_nodes = vec![
            "router.example:6881".into(),
            "no-port".into(),
            ":6881".into(),
            "host:notaport".into(),
        ];
        let normalized = normalize(config);
        assert_eq!(
            normalized.config.engine.dht_bootstrap_nodes,
            vec!["router.example:6881".to_string()]
        );
        assert_eq!(normalized.warnings.len(), 1);
    }
}
