//! Layered configuration loading: defaults, then file, then environment.
//!
//! # Design
//! - The file is optional; an explicitly named file that cannot be read is an
//!   error.
//! - Environment overrides use the `MOORING_` prefix and win over the file.
//! - Guard rails run last and their warnings are logged once.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{ConfigError, ConfigResult};
use crate::model::{LogFormatSetting, MooringConfig};
use crate::validate::{NormalizedConfig, normalize};

/// Variable naming the JSON configuration file.
pub const CONFIG_PATH_ENV: &str = "MOORING_CONFIG";
/// Prefix shared by every override variable.
pub const ENV_PREFIX: &str = "MOORING_";

/// Builds a [`MooringConfig`] from a file and environment overrides.
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    path: Option<PathBuf>,
    overrides: Vec<(String, String)>,
}

impl ConfigLoader {
    /// Loader driven by the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_vars(std::env::vars())
    }

    /// Loader driven by an explicit variable set.
    #[must_use]
    pub fn from_vars(vars: impl IntoIterator<Item = (String, String)>) -> Self {
        let mut path = None;
        let mut overrides = Vec::new();
        for (key, value) in vars {
            if key == CONFIG_PATH_ENV {
                if !value.trim().is_empty() {
                    path = Some(PathBuf::from(value.trim()));
                }
            } else if key.starts_with(ENV_PREFIX) {
                overrides.push((key, value));
            }
        }
        Self { path, overrides }
    }

    /// Read from `path` in addition to any overrides.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Configuration file that will be read, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Produce the effective configuration.
    ///
    /// # Errors
    ///
    /// Returns an error when the named file cannot be read or parsed, or an
    /// override cannot be interpreted.
    pub async fn load(&self) -> ConfigResult<NormalizedConfig> {
        let mut config = match &self.path {
            Some(path) => read_file(path).await?,
            None => {
                debug!("no configuration file named; starting from defaults");
                MooringConfig::default()
            }
        };

        for (key, value) in &self.overrides {
            apply_override(&mut config, key, value)?;
        }

        let normalized = normalize(config);
        for warning in &normalized.warnings {
            warn!(warning = %warning, "configuration guard rail applied");
        }
        info!(
            file = ?self.path,
            overrides = self.overrides.len(),
            "configuration loaded"
        );
        Ok(normalized)
    }
}

async fn read_file(path: &Path) -> ConfigResult<MooringConfig> {
    let raw = tokio::fs::read(path)
        .await
        .map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    serde_json::from_slice(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn apply_override(config: &mut MooringConfig, key: &str, value: &str) -> ConfigResult<()> {
    let Some(name) = key.strip_prefix(ENV_PREFIX) else {
        return Ok(());
    };
    let engine = &mut config.engine;
    let schedule = &mut config.schedule;
    match name {
        "DATABASE_URL" => config.storage.database_url = Some(value.trim().to_string()),
        "DB_MAX_CONNECTIONS" => {
            config.storage.max_connections = parse("storage", "max_connections", value)?;
        }
        "LOG_LEVEL" => config.logging.level = value.trim().to_string(),
        "LOG_FORMAT" => config.logging.format = parse_format(value)?,
        "DOWNLOADS_PATH" => engine.downloads_path = value.trim().to_string(),
        "MAX_ACTIVE_DOWNLOADS" => {
            engine.max_active_downloads = parse("engine", "max_active_downloads", value)?;
        }
        "MAX_ACTIVE_SEEDS" => {
            engine.max_active_seeds = parse("engine", "max_active_seeds", value)?;
        }
        "CONNECTIONS_LIMIT" => {
            engine.connections_limit = parse("engine", "connections_limit", value)?;
        }
        "PORT_MIN" => engine.port_min = parse("engine", "port_min", value)?,
        "PORT_MAX" => engine.port_max = parse("engine", "port_max", value)?,
        "ENABLE_DHT" => engine.enable_dht = parse_flag("enable_dht", value)?,
        "ENABLE_LSD" => engine.enable_lsd = parse_flag("enable_lsd", value)?,
        "ENABLE_UPNP" => engine.enable_upnp = parse_flag("enable_upnp", value)?,
        "ENABLE_NATPMP" => engine.enable_natpmp = parse_flag("enable_natpmp", value)?,
        "METADATA_TIMEOUT_SECS" => {
            engine.metadata_timeout_secs = parse("engine", "metadata_timeout_secs", value)?;
        }
        "READINESS_TIMEOUT_SECS" => {
            engine.readiness_timeout_secs = parse("engine", "readiness_timeout_secs", value)?;
        }
        "STATUS_INTERVAL_SECS" => {
            schedule.status_interval_secs = parse("schedule", "status_interval_secs", value)?;
        }
        "STATISTICS_INTERVAL_SECS" => {
            schedule.statistics_interval_secs =
                parse("schedule", "statistics_interval_secs", value)?;
        }
        "SESSION_SYNC_INTERVAL_SECS" => {
            schedule.session_sync_interval_secs =
                parse("schedule", "session_sync_interval_secs", value)?;
        }
        "STALL_CHECK_INTERVAL_SECS" => {
            schedule.stall_check_interval_secs =
                parse("schedule", "stall_check_interval_secs", value)?;
        }
        other => debug!(variable = %other, "ignoring unrecognised override"),
    }
    Ok(())
}

fn parse<T: std::str::FromStr>(
    section: &'static str,
    field: &'static str,
    value: &str,
) -> ConfigResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidField {
            section,
            field,
            value: Some(value.to_string()),
            reason: "not a valid number",
        })
}

fn parse_flag(field: &'static str, value: &str) -> ConfigResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidField {
            section: "engine",
            field,
            value: Some(value.to_string()),
            reason: "not a boolean",
        }),
    }
}

fn parse_format(value: &str) -> ConfigResult<LogFormatSetting> {
    match value.trim().to_ascii_lowercase().as_str() {
        "auto" => Ok(LogFormatSetting::Auto),
        "json" => Ok(LogFormatSetting::Json),
        "pretty" => Ok(LogFormatSetting::Pretty),
        _ => Err(ConfigError::InvalidField {
            section: "logging",
            field: "format",
            value: Some(value.to_string()),
            reason: "expected auto, json or pretty",
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[tokio::test]
    async fn overrides_apply_without_file() -> anyhow::Result<()> {
        let loader = ConfigLoader::from_vars(vars(&[
            ("MOORING_MAX_ACTIVE_DOWNLOADS", "3"),
            ("MOORING_ENABLE_UPNP", "off"),
            ("MOORING_LOG_FORMAT", "JSON"),
            ("MOORING_SOMETHING_ELSE", "ignored"),
            ("HOME", "/root"),
        ]));
        assert!(loader.path().is_none());

        let loaded = loader.load().await?;
        assert_eq!(loaded.config.engine.max_active_downloads, 3);
        assert!(!loaded.config.engine.enable_upnp);
        assert_eq!(loaded.config.logging.format, LogFormatSetting::Json);
        Ok(())
    }

    #[tokio::test]
    async fn malformed_numbers_are_rejected() {
        let loader = ConfigLoader::from_vars(vars(&[("MOORING_PORT_MIN", "eighty")]));
        assert!(matches!(
            loader.load().await,
            Err(ConfigError::InvalidField {
                field: "port_min",
                ..
            })
        ));
    }

    #[test]
    fn config_path_variable_is_picked_up() {
        let loader = ConfigLoader::from_vars(vars(&[(CONFIG_PATH_ENV, " /etc/mooring.json ")]));
        assert_eq!(loader.path(), Some(Path::new("/etc/mooring.json")));
    }
}
