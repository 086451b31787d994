//! Mapping from loaded configuration to engine and command settings.
//!
//! # Design
//! - `engine.max_active_downloads` is the single concurrency authority: it
//!   feeds both the engine's own active limit and command admission control.
//! - Announce behaviour is fixed; it is not a configuration knob.

use std::path::PathBuf;
use std::time::Duration;

use mooring_config::{EngineSettings, MooringConfig, SettleDelays};
use mooring_core::SessionSettings;

/// Session settings applied when the engine starts.
#[must_use]
pub(crate) fn session_settings(engine: &EngineSettings) -> SessionSettings {
    SessionSettings {
        connections_limit: engine.connections_limit,
        active_downloads: engine.max_active_downloads,
        active_seeds: engine.max_active_seeds,
        enable_dht: engine.enable_dht,
        enable_lsd: engine.enable_lsd,
        enable_upnp: engine.enable_upnp,
        enable_natpmp: engine.enable_natpmp,
        dht_bootstrap_nodes: engine.dht_bootstrap_nodes.clone(),
        alert_queue_size: engine.alert_queue_size,
        announce_to_all_tiers: true,
        announce_to_all_trackers: true,
        listen_interface: engine.listen_interface(),
    }
}

/// Knobs consumed by the command executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CommandSettings {
    pub(crate) max_active_downloads: u64,
    pub(crate) downloads_path: PathBuf,
    pub(crate) metadata_timeout: Duration,
    pub(crate) settle: SettleDelays,
}

impl CommandSettings {
    #[must_use]
    pub(crate) fn from_config(config: &MooringConfig) -> Self {
        Self {
            max_active_downloads: u64::from(config.engine.max_active_downloads),
            downloads_path: PathBuf::from(&config.engine.downloads_path),
            metadata_timeout: config.engine.metadata_timeout(),
            settle: config.schedule.settle_delays(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_canonical_session_settings() {
        let settings = session_settings(&EngineSettings::default());
        assert_eq!(settings, SessionSettings::default());
    }

    #[test]
    fn concurrency_limit_flows_to_engine_and_admission() {
        let mut config = MooringConfig::default();
        config.engine.max_active_downloads = 3;
        config.engine.port_min = 7000;

        let session = session_settings(&config.engine);
        assert_eq!(session.active_downloads, 3);
        assert_eq!(session.listen_interface, "0.0.0.0:7000");

        let commands = CommandSettings::from_config(&config);
        assert_eq!(commands.max_active_downloads, 3);
        assert_eq!(commands.metadata_timeout, Duration::from_secs(60));
        assert_eq!(commands.downloads_path, PathBuf::from("./downloads"));
    }
}
