//! Single point of contact with the download engine.
//!
//! # Design
//! - The handle cache is a hint: it is written only by event handlers and the
//!   liveness sweep, and never consulted by `find_handle`.
//! - `find_handle` re-resolves on every call (direct lookup, then a full
//!   scan) because direct lookup can miss right after add/remove.
//! - Readiness is a one-shot gate; callers bound their wait.

use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use mooring_core::{
    AddRequest, EngineError, EngineHandle, EngineResult, EngineSession, InfoHash, LiveFile,
    LiveStatus, Metainfo, SessionSettings,
};
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::cache::HandleCache;
use crate::dispatch::Dispatcher;
use crate::{metainfo, worker};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(200);
const DEFAULT_EVENT_QUEUE: usize = 1_024;

/// Tuning for the event pump.
#[derive(Debug, Clone, Copy)]
pub struct FacadeOptions {
    /// How often the session is polled for events.
    pub poll_interval: Duration,
    /// Capacity of the queue between poller and dispatcher.
    pub event_queue_capacity: usize,
}

impl Default for FacadeOptions {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            event_queue_capacity: DEFAULT_EVENT_QUEUE,
        }
    }
}

/// Owns the engine session lifecycle and the live handle cache.
pub struct EngineFacade {
    session: Arc<dyn EngineSession>,
    cache: HandleCache,
    ready: watch::Sender<bool>,
    shutdown: watch::Sender<bool>,
    nudge: Arc<Notify>,
    options: FacadeOptions,
    pump: Mutex<Vec<JoinHandle<()>>>,
}

impl EngineFacade {
    /// Wrap a session with default pump options.
    #[must_use]
    pub fn new(session: Arc<dyn EngineSession>) -> Self {
        Self::with_options(session, FacadeOptions::default())
    }

    /// Wrap a session with explicit pump options.
    #[must_use]
    pub fn with_options(session: Arc<dyn EngineSession>, options: FacadeOptions) -> Self {
        let (ready, _) = watch::channel(false);
        let (shutdown, _) = watch::channel(false);
        Self {
            session,
            cache: HandleCache::default(),
            ready,
            shutdown,
            nudge: Arc::new(Notify::new()),
            options,
            pump: Mutex::new(Vec::new()),
        }
    }

    /// Configure and start the engine, then open the readiness gate.
    ///
    /// # Errors
    ///
    /// Returns the session's error when initialisation fails; callers treat
    /// this as fatal.
    pub async fn start(&self, settings: &SessionSettings) -> EngineResult<()> {
        if self.is_ready() {
            debug!("engine session already started");
            return Ok(());
        }
        info!(
            connections_limit = settings.connections_limit,
            active_downloads = settings.active_downloads,
            active_seeds = settings.active_seeds,
            listen = %settings.listen_interface,
            dht = settings.enable_dht,
            "starting engine session"
        );
        if let Err(err) = self.session.start(settings).await {
            error!(error = %err, "engine session failed to start");
            return Err(err);
        }

        let _ = self.shutdown.send_replace(false);
        let dispatcher = Dispatcher::new(
            Arc::clone(&self.session),
            self.cache.clone(),
            Arc::clone(&self.nudge),
        );
        let handles = worker::spawn(
            Arc::clone(&self.session),
            dispatcher,
            self.options.poll_interval,
            self.options.event_queue_capacity,
            self.shutdown.subscribe(),
        );
        self.lock_pump().extend(handles);

        let _ = self.ready.send_replace(true);
        info!("engine session ready");
        Ok(())
    }

    /// Whether the readiness gate has opened.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }

    /// Wait for the readiness gate.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotReady`] when `timeout` elapses first.
    pub async fn await_ready(&self, timeout: Duration) -> EngineResult<()> {
        let mut gate = self.ready.subscribe();
        match tokio::time::timeout(timeout, gate.wait_for(|ready| *ready)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(_)) | Err(_) => {
                warn!(waited_ms = timeout.as_millis(), "engine readiness wait timed out");
                Err(EngineError::NotReady { waited: timeout })
            }
        }
    }

    /// Signal raised whenever an event suggests the status pass should run.
    #[must_use]
    pub fn reconcile_nudge(&self) -> Arc<Notify> {
        Arc::clone(&self.nudge)
    }

    /// Resolve the current handle for `info_hash`.
    ///
    /// Tries the session's direct lookup first and falls back to scanning
    /// every live handle. Engine errors are logged and reported as absent.
    pub async fn find_handle(&self, info_hash: &InfoHash) -> Option<EngineHandle> {
        match self.session.find(info_hash).await {
            Ok(Some(handle)) if self.session.is_valid(&handle) => return Some(handle),
            Ok(_) => {}
            Err(err) => {
                debug!(info_hash = %info_hash, error = %err, "direct handle lookup failed");
            }
        }

        match self.session.handles().await {
            Ok(handles) => handles.into_iter().find(|handle| {
                handle.info_hash.matches(info_hash.as_str()) && self.session.is_valid(handle)
            }),
            Err(err) => {
                warn!(info_hash = %info_hash, error = %err, "handle scan failed");
                None
            }
        }
    }

    /// Hint: whether the cache currently lists `info_hash`.
    #[must_use]
    pub fn is_live(&self, info_hash: &InfoHash) -> bool {
        self.cache.contains(info_hash)
    }

    /// Hint: identities currently listed in the cache.
    #[must_use]
    pub fn live_identities(&self) -> Vec<InfoHash> {
        self.cache.identities()
    }

    /// Hint: number of cached handles.
    #[must_use]
    pub fn live_handle_count(&self) -> usize {
        self.cache.len()
    }

    /// Evict cached handles that fail the session's liveness check.
    pub fn sweep_invalid_handles(&self) -> usize {
        let evicted = self.cache.retain(|handle| self.session.is_valid(handle));
        if evicted > 0 {
            info!(evicted, "evicted invalid handles from cache");
        }
        evicted
    }

    /// Parse a metainfo file from disk.
    ///
    /// # Errors
    ///
    /// Returns an IO or parse error.
    pub async fn load_metainfo(&self, path: &Path) -> EngineResult<Metainfo> {
        metainfo::load_file(path).await
    }

    /// Resolve magnet metadata, waiting at most `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::MetadataTimeout`] when the wait elapses, or the
    /// session's error.
    pub async fn fetch_metadata(&self, magnet: &str, timeout: Duration) -> EngineResult<Metainfo> {
        info!(timeout_secs = timeout.as_secs(), "fetching magnet metadata");
        tokio::time::timeout(timeout, self.session.fetch_metadata(magnet))
            .await
            .map_err(|_| EngineError::MetadataTimeout {
                uri: magnet.to_string(),
                waited: timeout,
            })?
    }

    /// Admit a task into the engine.
    ///
    /// # Errors
    ///
    /// Returns the session's error.
    pub async fn add(&self, request: AddRequest) -> EngineResult<EngineHandle> {
        self.session.add(request).await
    }

    /// Read live status.
    ///
    /// # Errors
    ///
    /// Returns the session's error, including stale-handle failures.
    pub async fn status(&self, handle: &EngineHandle) -> EngineResult<LiveStatus> {
        self.session.status(handle).await
    }

    /// Read per-file progress.
    ///
    /// # Errors
    ///
    /// Returns the session's error.
    pub async fn files(&self, handle: &EngineHandle) -> EngineResult<Vec<LiveFile>> {
        self.session.files(handle).await
    }

    /// Read the per-file priority vector.
    ///
    /// # Errors
    ///
    /// Returns the session's error.
    pub async fn file_priorities(&self, handle: &EngineHandle) -> EngineResult<Vec<u8>> {
        self.session.file_priorities(handle).await
    }

    /// Replace the per-file priority vector.
    ///
    /// # Errors
    ///
    /// Returns the session's error.
    pub async fn set_file_priorities(
        &self,
        handle: &EngineHandle,
        levels: &[u8],
    ) -> EngineResult<()> {
        self.session.set_file_priorities(handle, levels).await
    }

    /// Pause a task.
    ///
    /// # Errors
    ///
    /// Returns the session's error.
    pub async fn pause(&self, handle: &EngineHandle) -> EngineResult<()> {
        self.session.pause(handle).await
    }

    /// Resume a task.
    ///
    /// # Errors
    ///
    /// Returns the session's error.
    pub async fn resume(&self, handle: &EngineHandle) -> EngineResult<()> {
        self.session.resume(handle).await
    }

    /// Toggle engine queue management for a task.
    ///
    /// # Errors
    ///
    /// Returns the session's error.
    pub async fn set_auto_managed(&self, handle: &EngineHandle, enabled: bool) -> EngineResult<()> {
        self.session.set_auto_managed(handle, enabled).await
    }

    /// Remove a task from the engine.
    ///
    /// # Errors
    ///
    /// Returns the session's error.
    pub async fn remove(&self, handle: &EngineHandle, delete_files: bool) -> EngineResult<()> {
        self.session.remove(handle, delete_files).await
    }

    /// Persist resume data for every live handle, stop the engine, clear the
    /// cache and stop the event pump. Failures are logged.
    pub async fn shutdown(&self) {
        info!("shutting down engine session");
        match self.session.handles().await {
            Ok(handles) => {
                for handle in handles
                    .iter()
                    .filter(|handle| self.session.is_valid(handle))
                {
                    if let Err(err) = self.session.save_resume_data(handle).await {
                        warn!(
                            info_hash = %handle.info_hash,
                            error = %err,
                            "failed to save resume data"
                        );
                    }
                }
            }
            Err(err) => warn!(error = %err, "could not enumerate handles during shutdown"),
        }

        if let Err(err) = self.session.stop().await {
            warn!(error = %err, "engine session stop failed");
        }
        self.cache.clear();
        let _ = self.ready.send_replace(false);

        let _ = self.shutdown.send_replace(true);
        let pump = std::mem::take(&mut *self.lock_pump());
        for task in pump {
            if let Err(err) = task.await {
                warn!(error = %err, "engine event pump join failed");
            }
        }
        info!("engine session stopped");
    }

    fn lock_pump(&self) -> std::sync::MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.pump.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::StubSession;
    use mooring_core::MetaFile;
    use std::path::PathBuf;

    fn hash(ch: char) -> InfoHash {
        InfoHash::parse(&ch.to_string().repeat(40)).expect("valid hash")
    }

    fn settings() -> SessionSettings {
        SessionSettings::default()
    }

    fn request(ch: char) -> AddRequest {
        AddRequest {
            metainfo: Metainfo {
                info_hash: hash(ch),
                name: format!("task-{ch}"),
                files: vec![MetaFile {
                    path: "a.bin".into(),
                    size: 10,
                }],
                comment: None,
                created_by: None,
                creation_date: None,
            },
            save_path: PathBuf::from("/tmp"),
        }
    }

    fn fast_options() -> FacadeOptions {
        FacadeOptions {
            poll_interval: Duration::from_millis(5),
            event_queue_capacity: 16,
        }
    }

    #[tokio::test]
    async fn await_ready_times_out_before_start() {
        let facade = EngineFacade::new(Arc::new(StubSession::default()));
        let result = facade.await_ready(Duration::from_millis(10)).await;
        assert!(matches!(result, Err(EngineError::NotReady { .. })));
    }

    #[tokio::test]
    async fn start_opens_gate_and_records_settings() -> anyhow::Result<()> {
        let session = Arc::new(StubSession::default());
        let facade = EngineFacade::with_options(session.clone(), fast_options());
        facade.start(&settings()).await?;
        facade.await_ready(Duration::from_millis(10)).await?;
        assert_eq!(session.settings().map(|s| s.connections_limit), Some(200));
        facade.shutdown().await;
        Ok(())
    }

    #[tokio::test]
    async fn start_failure_keeps_gate_closed() {
        let session = Arc::new(StubSession::default());
        session.fail_next("start", "bind failed");
        let facade = EngineFacade::new(session);
        assert!(facade.start(&settings()).await.is_err());
        assert!(!facade.is_ready());
    }

    #[tokio::test]
    async fn find_handle_falls_back_to_scan_when_direct_lookup_misses() -> anyhow::Result<()> {
        let session = Arc::new(StubSession::default());
        let facade = EngineFacade::with_options(session.clone(), fast_options());
        facade.start(&settings()).await?;
        let handle = facade.add(request('a')).await?;

        session.hide_from_lookup(&hash('a'));
        assert_eq!(facade.find_handle(&hash('a')).await, Some(handle));
        assert_eq!(facade.find_handle(&hash('b')).await, None);
        facade.shutdown().await;
        Ok(())
    }

    #[tokio::test]
    async fn added_events_populate_cache_and_nudge() -> anyhow::Result<()> {
        let session = Arc::new(StubSession::default());
        let facade = EngineFacade::with_options(session.clone(), fast_options());
        facade.start(&settings()).await?;
        let nudge = facade.reconcile_nudge();
        let notified = nudge.notified();
        tokio::pin!(notified);

        facade.add(request('a')).await?;
        tokio::time::timeout(Duration::from_secs(1), &mut notified).await?;
        for _ in 0..100 {
            if facade.is_live(&hash('a')) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(facade.is_live(&hash('a')));
        assert_eq!(facade.live_identities(), vec![hash('a')]);
        facade.shutdown().await;
        Ok(())
    }

    #[tokio::test]
    async fn sweep_evicts_silently_dropped_handles() -> anyhow::Result<()> {
        let session = Arc::new(StubSession::default());
        let facade = EngineFacade::with_options(session.clone(), fast_options());
        facade.start(&settings()).await?;
        facade.add(request('a')).await?;
        facade.add(request('b')).await?;
        for _ in 0..100 {
            if facade.live_handle_count() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(facade.live_handle_count(), 2);

        session.drop_silently(&hash('a'));
        assert_eq!(facade.sweep_invalid_handles(), 1);
        assert!(!facade.is_live(&hash('a')));
        assert!(facade.is_live(&hash('b')));
        facade.shutdown().await;
        Ok(())
    }

    #[tokio::test]
    async fn shutdown_saves_resume_data_and_clears_cache() -> anyhow::Result<()> {
        let session = Arc::new(StubSession::default());
        let facade = EngineFacade::with_options(session.clone(), fast_options());
        facade.start(&settings()).await?;
        facade.add(request('a')).await?;
        facade.add(request('b')).await?;
        session.fail_next("save_resume_data", "disk full");

        facade.shutdown().await;
        assert_eq!(session.resume_data_saved().len(), 1);
        assert!(!session.is_started());
        assert_eq!(facade.live_handle_count(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn metadata_fetch_is_bounded() -> anyhow::Result<()> {
        let session = Arc::new(StubSession::default());
        let facade = EngineFacade::with_options(session, fast_options());
        facade.start(&settings()).await?;
        let magnet = format!("magnet:?xt=urn:btih:{}", "d".repeat(40));
        let result = facade
            .fetch_metadata(&magnet, Duration::from_millis(20))
            .await;
        assert!(matches!(result, Err(EngineError::MetadataTimeout { .. })));
        facade.shutdown().await;
        Ok(())
    }
}
