use std::fs;

use mooring_config::{ConfigError, ConfigLoader, LogFormatSetting};
use tempfile::TempDir;

fn write_config(dir: &TempDir, body: &str) -> anyhow::Result<std::path::PathBuf> {
    let path = dir.path().join("mooring.json");
    fs::write(&path, body)?;
    Ok(path)
}

#[tokio::test]
async fn file_values_are_overridden_by_environment() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let path = write_config(
        &dir,
        r#"{
            "engine": {"max_active_downloads": 2, "downloads_path": "/srv/data"},
            "storage": {"database_url": "postgres://db/mooring"},
            "logging": {"format": "pretty"}
        }"#,
    )?;

    let loader = ConfigLoader::from_vars([
        (
            "MOORING_CONFIG".to_string(),
            path.to_string_lossy().into_owned(),
        ),
        ("MOORING_MAX_ACTIVE_DOWNLOADS".to_string(), "7".to_string()),
    ]);
    let loaded = loader.load().await?;

    assert!(loaded.warnings.is_empty());
    let config = loaded.config;
    assert_eq!(config.engine.max_active_downloads, 7);
    assert_eq!(config.engine.downloads_path, "/srv/data");
    assert_eq!(
        config.storage.database_url.as_deref(),
        Some("postgres://db/mooring")
    );
    assert_eq!(config.logging.format, LogFormatSetting::Pretty);
    assert_eq!(config.engine.port_min, 6881);
    Ok(())
}

#[tokio::test]
async fn guard_rails_report_replaced_values() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let path = write_config(
        &dir,
        r#"{"engine": {"connections_limit": 0}, "schedule": {"statistics_interval_secs": 0}}"#,
    )?;

    let loaded = ConfigLoader::default().with_path(&path).load().await?;
    assert_eq!(loaded.config.engine.connections_limit, 200);
    assert_eq!(loaded.config.schedule.statistics_interval_secs, 60);
    assert_eq!(loaded.warnings.len(), 2);
    Ok(())
}

#[tokio::test]
async fn unreadable_and_malformed_files_fail() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let missing = ConfigLoader::default()
        .with_path(dir.path().join("absent.json"))
        .load()
        .await;
    assert!(matches!(missing, Err(ConfigError::Io { .. })));

    let path = write_config(&dir, "{not json")?;
    let malformed = ConfigLoader::default().with_path(&path).load().await;
    assert!(matches!(malformed, Err(ConfigError::Parse { .. })));
    Ok(())
}
