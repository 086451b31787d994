//! Engine session trait implemented by download-engine adapters.

use async_trait::async_trait;

use crate::error::EngineResult;
use crate::model::{
    AddRequest, EngineEvent, EngineHandle, InfoHash, LiveFile, LiveStatus, Metainfo,
    SessionSettings,
};

/// Primitive operations offered by an external download engine.
///
/// Implementations must be safe to call concurrently. None of the calls are
/// expected to block for long except [`EngineSession::fetch_metadata`], which
/// callers bound with a timeout.
#[async_trait]
pub trait EngineSession: Send + Sync {
    /// Apply session settings and start discovery services.
    async fn start(&self, settings: &SessionSettings) -> EngineResult<()>;

    /// Stop the session and release engine resources.
    async fn stop(&self) -> EngineResult<()>;

    /// Direct lookup by fingerprint; may miss briefly around add/remove.
    async fn find(&self, info_hash: &InfoHash) -> EngineResult<Option<EngineHandle>>;

    /// Every handle currently known to the session.
    async fn handles(&self) -> EngineResult<Vec<EngineHandle>>;

    /// Liveness check for a previously obtained handle.
    fn is_valid(&self, handle: &EngineHandle) -> bool;

    /// Resolve metadata for a magnet URI. Callers apply their own timeout.
    async fn fetch_metadata(&self, magnet: &str) -> EngineResult<Metainfo>;

    /// Admit a task, returning its handle.
    async fn add(&self, request: AddRequest) -> EngineResult<EngineHandle>;

    /// Read the task's current flags and counters.
    async fn status(&self, handle: &EngineHandle) -> EngineResult<LiveStatus>;

    /// Per-file byte progress in engine order; empty without metadata.
    async fn files(&self, handle: &EngineHandle) -> EngineResult<Vec<LiveFile>>;

    /// Current per-file priority vector in engine order.
    async fn file_priorities(&self, handle: &EngineHandle) -> EngineResult<Vec<u8>>;

    /// Replace the whole per-file priority vector.
    async fn set_file_priorities(&self, handle: &EngineHandle, levels: &[u8]) -> EngineResult<()>;

    /// Stop transferring data for the task.
    async fn pause(&self, handle: &EngineHandle) -> EngineResult<()>;

    /// Resume transferring data for the task.
    async fn resume(&self, handle: &EngineHandle) -> EngineResult<()>;

    /// Hand queue control of the task to the engine, or take it back.
    async fn set_auto_managed(&self, handle: &EngineHandle, enabled: bool) -> EngineResult<()>;

    /// Remove the task from the session, optionally deleting its payload.
    async fn remove(&self, handle: &EngineHandle, delete_files: bool) -> EngineResult<()>;

    /// Ask the engine to persist fast-resume data for the task.
    async fn save_resume_data(&self, handle: &EngineHandle) -> EngineResult<()>;

    /// Drain events produced since the previous call.
    async fn poll_events(&self) -> EngineResult<Vec<EngineEvent>>;
}
