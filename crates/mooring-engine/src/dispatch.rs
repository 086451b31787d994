//! Per-kind handlers for engine events.

use std::sync::Arc;

use mooring_core::{EngineEvent, EngineResult, EngineSession, InfoHash};
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::cache::HandleCache;

/// Routes each engine event to its handler.
///
/// Handlers update the handle cache and wake the status pass; a failing
/// handler is logged and never blocks the next event.
#[derive(Clone)]
pub(crate) struct Dispatcher {
    session: Arc<dyn EngineSession>,
    cache: HandleCache,
    nudge: Arc<Notify>,
}

impl Dispatcher {
    pub(crate) const fn new(
        session: Arc<dyn EngineSession>,
        cache: HandleCache,
        nudge: Arc<Notify>,
    ) -> Self {
        Self {
            session,
            cache,
            nudge,
        }
    }

    pub(crate) async fn dispatch(&self, event: EngineEvent) {
        let kind = event.kind();
        let outcome = match event {
            EngineEvent::Added { info_hash } => self.on_added(&info_hash).await,
            EngineEvent::Removed { info_hash } => {
                self.on_removed(&info_hash);
                Ok(())
            }
            EngineEvent::Finished { info_hash } => self.on_finished(&info_hash).await,
            EngineEvent::Error { info_hash, message } => {
                self.on_error(&info_hash, &message);
                Ok(())
            }
            EngineEvent::MetadataReceived { info_hash } => {
                self.on_metadata(&info_hash);
                Ok(())
            }
            EngineEvent::StateUpdate { info_hashes } => {
                self.on_state_update(&info_hashes);
                Ok(())
            }
        };
        if let Err(err) = outcome {
            warn!(event = kind, error = %err, "engine event handler failed");
        }
    }

    async fn on_added(&self, info_hash: &InfoHash) -> EngineResult<()> {
        if let Some(handle) = self.session.find(info_hash).await? {
            self.cache.insert(handle);
        }
        info!(info_hash = %info_hash, "task added to engine session");
        self.nudge.notify_one();
        Ok(())
    }

    fn on_removed(&self, info_hash: &InfoHash) {
        let evicted = self.cache.remove(info_hash).is_some();
        info!(info_hash = %info_hash, evicted, "task removed from engine session");
    }

    async fn on_finished(&self, info_hash: &InfoHash) -> EngineResult<()> {
        if let Some(handle) = self.session.find(info_hash).await? {
            self.cache.insert(handle);
        }
        info!(info_hash = %info_hash, "task finished downloading");
        self.nudge.notify_one();
        Ok(())
    }

    fn on_error(&self, info_hash: &InfoHash, message: &str) {
        warn!(info_hash = %info_hash, message, "engine reported task error");
        self.nudge.notify_one();
    }

    fn on_metadata(&self, info_hash: &InfoHash) {
        info!(info_hash = %info_hash, "metadata received");
        self.nudge.notify_one();
    }

    fn on_state_update(&self, info_hashes: &[InfoHash]) {
        debug!(count = info_hashes.len(), "engine state update");
        if !info_hashes.is_empty() {
            self.nudge.notify_one();
        }
    }
}
