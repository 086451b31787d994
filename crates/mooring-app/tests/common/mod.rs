//! Service graph around a stub engine and an in-memory store.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use mooring_app::{AddOutcome, Services};
use mooring_config::MooringConfig;
use mooring_core::{InfoHash, SessionSettings, Task, TaskFile, TaskStore};
use mooring_engine::{EngineFacade, FacadeOptions, StubCall, StubSession};
use mooring_events::{Event, EventStream, NotificationKind};
use mooring_store::MemoryStore;
use mooring_telemetry::Metrics;
use mooring_test_support::samples;
use tempfile::TempDir;

pub const PACK: &[(&str, u64)] = &[("pack/a.mkv", 100), ("pack/b.nfo", 20)];

pub struct Harness {
    pub services: Services,
    pub session: Arc<StubSession>,
    pub store: Arc<MemoryStore>,
    pub downloads: TempDir,
}

impl Harness {
    pub async fn new() -> anyhow::Result<Self> {
        Self::with_limit(5).await
    }

    pub async fn with_limit(limit: u32) -> anyhow::Result<Self> {
        let store = Arc::new(MemoryStore::new());
        Self::build(limit, Arc::clone(&store), store).await
    }

    /// Services write through `backend`, which is expected to wrap `store`.
    pub async fn with_backend(
        store: Arc<MemoryStore>,
        backend: Arc<dyn TaskStore>,
    ) -> anyhow::Result<Self> {
        Self::build(5, store, backend).await
    }

    async fn build(
        limit: u32,
        store: Arc<MemoryStore>,
        backend: Arc<dyn TaskStore>,
    ) -> anyhow::Result<Self> {
        let downloads = tempfile::tempdir()?;
        let mut config = MooringConfig::default();
        config.engine.max_active_downloads = limit;
        config.engine.downloads_path = downloads.path().display().to_string();
        config.engine.metadata_timeout_secs = 1;
        config.schedule.start_settle_ms = 0;
        config.schedule.pause_settle_ms = 0;
        config.schedule.auto_managed_settle_ms = 0;
        config.schedule.priority_settle_ms = 0;

        let session = Arc::new(StubSession::default());
        let engine = Arc::new(EngineFacade::with_options(
            session.clone(),
            FacadeOptions {
                poll_interval: Duration::from_millis(5),
                event_queue_capacity: 16,
            },
        ));
        engine.start(&SessionSettings::default()).await?;

        let services = Services::assemble(
            &config,
            engine,
            backend,
            mooring_events::EventBus::new(),
            Metrics::new()?,
        );
        Ok(Self {
            services,
            session,
            store,
            downloads,
        })
    }

    /// Register metadata for `ch` and add it by magnet.
    pub async fn add_magnet(
        &self,
        ch: char,
        name: &str,
        files: &[(&str, u64)],
        start: bool,
    ) -> anyhow::Result<AddOutcome> {
        self.session
            .register_metadata(samples::metainfo(ch, name, files));
        Ok(self.services.commands.add(&magnet(ch), None, start).await?)
    }

    /// Store a task directly, bypassing the engine.
    pub async fn seed(&self, task: &Task, files: &[TaskFile]) -> anyhow::Result<()> {
        self.store.insert_task(task, files).await?;
        Ok(())
    }

    pub async fn store_update(&self, task: &Task) -> anyhow::Result<()> {
        self.store.update_task(task).await?;
        Ok(())
    }

    pub async fn task(&self, task_id: uuid::Uuid) -> anyhow::Result<Task> {
        Ok(self.services.catalog.task(task_id).await?)
    }

    /// Wait for the engine pump to list `info_hash` as live.
    pub async fn wait_live(&self, info_hash: &InfoHash) -> bool {
        for _ in 0..200 {
            if self.services.engine.is_live(info_hash) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        false
    }

    /// Most recent priority vector applied to the engine.
    pub fn last_priority_vector(&self) -> Option<Vec<u8>> {
        self.session.calls().into_iter().rev().find_map(|call| match call {
            StubCall::SetFilePriorities { levels, .. } => Some(levels),
            _ => None,
        })
    }
}

pub fn magnet(ch: char) -> String {
    format!("magnet:?xt=urn:btih:{}", samples::info_hash(ch))
}

/// Notifications received until the stream goes quiet.
pub async fn notifications(stream: &mut EventStream) -> Vec<(NotificationKind, String)> {
    let mut seen = Vec::new();
    while let Ok(Some(envelope)) =
        tokio::time::timeout(Duration::from_millis(50), stream.next()).await
    {
        if let Event::Notification { event, message, .. } = envelope.event {
            seen.push((event, message));
        }
    }
    seen
}
