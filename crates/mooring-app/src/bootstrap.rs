//! Service wiring and the process boot sequence.
//!
//! # Design
//! - `Services::assemble` only wires; it performs no IO so suites can build
//!   the graph around a stub engine and an in-memory store.
//! - Engine start failure is fatal; the readiness wait is bounded.
//! - Shutdown stops the passes first, then the engine.

use std::sync::Arc;

use mooring_config::{ConfigLoader, LogFormatSetting, MooringConfig, NormalizedConfig};
use mooring_core::TaskStore;
use mooring_engine::{EngineFacade, StubSession};
use mooring_events::EventBus;
use mooring_store::{MemoryStore, PgStore};
use mooring_telemetry::{LogFormat, LoggingConfig, Metrics, init_logging};
use tracing::{info, warn};

use crate::broadcaster::{Broadcaster, Notifier};
use crate::catalog::TaskCatalog;
use crate::commands::CommandExecutor;
use crate::engine_config::{CommandSettings, session_settings};
use crate::error::{AppError, AppResult};
use crate::locks::TaskLocks;
use crate::reconciler::StatusReconciler;
use crate::scheduler::Scheduler;
use crate::statistics::StatisticsAggregator;

/// Wired application services sharing one engine, store and bus.
#[derive(Clone)]
pub struct Services {
    /// Engine facade.
    pub engine: Arc<EngineFacade>,
    /// Persistence backend.
    pub store: Arc<dyn TaskStore>,
    /// Event bus reconciled state is published on.
    pub events: EventBus,
    /// Metrics registry.
    pub metrics: Metrics,
    /// Status reconciliation and membership sweeps.
    pub reconciler: Arc<StatusReconciler>,
    /// Statistics passes and queries.
    pub statistics: Arc<StatisticsAggregator>,
    /// User commands.
    pub commands: Arc<CommandExecutor>,
    /// Read-only queries.
    pub catalog: Arc<TaskCatalog>,
    /// Periodic snapshot publisher.
    pub broadcaster: Arc<Broadcaster>,
}

impl Services {
    /// Wire every service around the given collaborators.
    #[must_use]
    pub fn assemble(
        config: &MooringConfig,
        engine: Arc<EngineFacade>,
        store: Arc<dyn TaskStore>,
        events: EventBus,
        metrics: Metrics,
    ) -> Self {
        let locks = TaskLocks::default();
        let notifier = Notifier::new(events.clone(), metrics.clone());
        let reconciler = Arc::new(StatusReconciler::new(
            Arc::clone(&engine),
            Arc::clone(&store),
            notifier.clone(),
            metrics.clone(),
            locks.clone(),
        ));
        let statistics = Arc::new(StatisticsAggregator::new(
            Arc::clone(&engine),
            Arc::clone(&store),
            locks.clone(),
        ));
        let commands = Arc::new(CommandExecutor::new(
            Arc::clone(&engine),
            Arc::clone(&store),
            notifier.clone(),
            metrics.clone(),
            locks,
            CommandSettings::from_config(config),
        ));
        let catalog = Arc::new(TaskCatalog::new(Arc::clone(&store)));
        let broadcaster = Arc::new(Broadcaster::new(
            Arc::clone(&store),
            Arc::clone(&statistics),
            notifier,
        ));
        Self {
            engine,
            store,
            events,
            metrics,
            reconciler,
            statistics,
            commands,
            catalog,
            broadcaster,
        }
    }
}

/// A started application: services plus their periodic passes.
pub struct App {
    services: Services,
    scheduler: Scheduler,
}

impl App {
    /// Start the engine, wait for readiness and schedule the passes.
    ///
    /// # Errors
    ///
    /// Returns an error when the engine fails to start or does not become
    /// ready within `engine.readiness_timeout_secs`.
    pub async fn start(
        config: &MooringConfig,
        engine: Arc<EngineFacade>,
        store: Arc<dyn TaskStore>,
        events: EventBus,
        metrics: Metrics,
    ) -> AppResult<Self> {
        engine
            .start(&session_settings(&config.engine))
            .await
            .map_err(|err| AppError::engine("engine.start", err))?;
        engine
            .await_ready(config.engine.readiness_timeout())
            .await
            .map_err(|err| AppError::engine("engine.await_ready", err))?;

        let services = Services::assemble(config, engine, store, events, metrics);
        let scheduler = Scheduler::spawn(&services, &config.schedule);
        info!("mooring started");
        Ok(Self {
            services,
            scheduler,
        })
    }

    /// Wired services.
    #[must_use]
    pub const fn services(&self) -> &Services {
        &self.services
    }

    /// Stop the passes, then persist resume data and stop the engine.
    pub async fn shutdown(self) {
        self.scheduler.shutdown().await;
        self.services.engine.shutdown().await;
        info!("mooring stopped");
    }
}

/// Entry point for the binary: load configuration, install logging, open
/// the store, start the engine and run until interrupted.
///
/// # Errors
///
/// Returns an error if any boot step fails or the interrupt signal cannot be
/// awaited.
pub async fn run_app() -> AppResult<()> {
    let NormalizedConfig { config, warnings } = ConfigLoader::from_env()
        .load()
        .await
        .map_err(|err| AppError::config("config.load", err))?;

    init_logging(&LoggingConfig {
        level: &config.logging.level,
        format: log_format(config.logging.format),
        build_sha: option_env!("MOORING_BUILD_SHA").unwrap_or("dev"),
    })
    .map_err(|err| AppError::telemetry("telemetry.init", err))?;
    for warning in &warnings {
        warn!(warning = %warning, "configuration guard rail applied");
    }

    let metrics = Metrics::new().map_err(|err| AppError::telemetry("telemetry.metrics", err))?;
    let store = open_store(&config).await?;
    let engine = Arc::new(EngineFacade::new(Arc::new(StubSession::default())));
    let app = App::start(&config, engine, store, EventBus::new(), metrics).await?;

    let interrupted = tokio::signal::ctrl_c()
        .await
        .map_err(|err| AppError::io("signal.ctrl_c", err));
    info!("shutdown requested");
    app.shutdown().await;
    interrupted
}

async fn open_store(config: &MooringConfig) -> AppResult<Arc<dyn TaskStore>> {
    match config.storage.database_url.as_deref() {
        Some(url) => {
            let store = PgStore::connect(url, config.storage.max_connections)
                .await
                .map_err(|err| AppError::store("store.connect", err))?;
            info!(backend = "postgres", "task store ready");
            Ok(Arc::new(store))
        }
        None => {
            info!(backend = "memory", "task store ready");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

const fn log_format(setting: LogFormatSetting) -> LogFormat {
    match setting {
        LogFormatSetting::Auto => LogFormat::infer(),
        LogFormatSetting::Json => LogFormat::Json,
        LogFormatSetting::Pretty => LogFormat::Pretty,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn log_format_maps_every_setting() {
        assert_eq!(log_format(LogFormatSetting::Json), LogFormat::Json);
        assert_eq!(log_format(LogFormatSetting::Pretty), LogFormat::Pretty);
        assert_eq!(log_format(LogFormatSetting::Auto), LogFormat::infer());
    }

    #[tokio::test]
    async fn memory_store_is_used_without_database_url() -> anyhow::Result<()> {
        let store = open_store(&MooringConfig::default()).await?;
        assert!(store.tasks().await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn app_starts_and_stops_around_stub_engine() -> anyhow::Result<()> {
        let session = Arc::new(StubSession::default());
        let engine = Arc::new(EngineFacade::new(Arc::<StubSession>::clone(&session)));
        let app = App::start(
            &MooringConfig::default(),
            engine,
            Arc::new(MemoryStore::new()),
            EventBus::new(),
            Metrics::new()?,
        )
        .await?;
        assert!(session.is_started());
        assert!(app.services().engine.is_ready());
        assert_eq!(
            session.settings().map(|settings| settings.active_downloads),
            Some(5)
        );

        tokio::time::timeout(Duration::from_secs(5), app.shutdown()).await?;
        assert!(!session.is_started());
        Ok(())
    }

    #[tokio::test]
    async fn engine_start_failure_is_fatal() -> anyhow::Result<()> {
        let session = Arc::new(StubSession::default());
        session.fail_next("start", "no listen port");
        let engine = Arc::new(EngineFacade::new(session));
        let result = App::start(
            &MooringConfig::default(),
            engine,
            Arc::new(MemoryStore::new()),
            EventBus::new(),
            Metrics::new()?,
        )
        .await;
        assert!(matches!(
            result,
            Err(AppError::Engine {
                operation: "engine.start",
                ..
            })
        ));
        Ok(())
    }
}
