//! Error types for engine, store and task operations.
//!
//! # Design
//! - Messages are constant; operational context lives in fields.
//! - `TaskError` is the caller-facing taxonomy and wraps engine/store failures.

use std::error::Error;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

use crate::model::InfoHash;

/// Fingerprint failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid info hash")]
pub struct InvalidInfoHash {
    /// Rejected input.
    pub value: String,
}

/// File priority outside `0..=7`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("file priority out of range")]
pub struct PriorityOutOfRange {
    /// Rejected level.
    pub value: i64,
}

/// Failures raised by the engine session or its facade.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The session has not been started yet.
    #[error("engine session not started")]
    NotStarted {
        /// Operation that required a running session.
        operation: &'static str,
    },
    /// The readiness gate did not open in time.
    #[error("engine did not become ready in time")]
    NotReady {
        /// How long the caller waited.
        waited: Duration,
    },
    /// Magnet metadata did not arrive in time.
    #[error("metadata resolution timed out")]
    MetadataTimeout {
        /// Magnet being resolved.
        uri: String,
        /// How long the caller waited.
        waited: Duration,
    },
    /// The handle no longer refers to a task in the session.
    #[error("engine handle is no longer valid")]
    InvalidHandle {
        /// Operation attempted with the stale handle.
        operation: &'static str,
        /// Fingerprint the handle pointed at.
        info_hash: InfoHash,
    },
    /// A task with the same fingerprint is already in the session.
    #[error("task already present in engine session")]
    Duplicate {
        /// Fingerprint of the existing task.
        info_hash: InfoHash,
    },
    /// A magnet URI could not be interpreted.
    #[error("invalid magnet uri")]
    InvalidMagnet {
        /// Rejected URI.
        uri: String,
        /// Machine-readable reason.
        reason: &'static str,
    },
    /// A metainfo document could not be parsed.
    #[error("invalid metainfo")]
    InvalidMetainfo {
        /// Source document, when read from disk.
        path: Option<PathBuf>,
        /// Machine-readable reason.
        reason: &'static str,
        /// Parser detail when available.
        detail: Option<String>,
    },
    /// Engine-side call reported a failure.
    #[error("engine operation failed")]
    OperationFailed {
        /// Operation identifier.
        operation: &'static str,
        /// Fingerprint of the affected task when available.
        info_hash: Option<InfoHash>,
        /// Underlying failure.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// Engine-side call reported a failure with only a message.
    #[error("engine rejected operation")]
    Rejected {
        /// Operation identifier.
        operation: &'static str,
        /// Engine message.
        message: String,
    },
    /// File-system access on behalf of the engine failed.
    #[error("engine IO failure")]
    Io {
        /// Operation identifier.
        operation: &'static str,
        /// Path involved.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

/// Convenience alias for engine results.
pub type EngineResult<T> = Result<T, EngineError>;

/// Failures raised by a task store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A record referenced by an update was missing.
    #[error("record not found")]
    Missing {
        /// Entity kind.
        entity: &'static str,
        /// Identifier that was looked up.
        id: Uuid,
    },
    /// A unique key was violated.
    #[error("duplicate record")]
    Duplicate {
        /// Entity kind.
        entity: &'static str,
        /// Offending key.
        key: String,
    },
    /// Stored data could not be decoded into the model.
    #[error("stored value invalid")]
    Corrupt {
        /// Column or field that failed to decode.
        field: &'static str,
        /// Raw stored value.
        value: String,
    },
    /// Backend operation failed.
    #[error("store operation failed")]
    Backend {
        /// Operation identifier.
        operation: &'static str,
        /// Underlying failure.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
}

impl StoreError {
    /// Wrap a backend-specific failure.
    pub fn backend(operation: &'static str, source: impl Error + Send + Sync + 'static) -> Self {
        Self::Backend {
            operation,
            source: Box::new(source),
        }
    }
}

/// Convenience alias for store results.
pub type StoreResult<T> = Result<T, StoreError>;

/// Caller-facing error taxonomy for task commands and queries.
#[derive(Debug, Error)]
pub enum TaskError {
    /// No task with the identifier exists in the store.
    #[error("task not found")]
    NotFound {
        /// Requested task.
        task_id: Uuid,
    },
    /// No file with the identifier exists in the store.
    #[error("task file not found")]
    FileNotFound {
        /// Requested file.
        file_id: Uuid,
    },
    /// A task with the same fingerprint is already stored.
    #[error("task already exists")]
    AlreadyExists {
        /// Duplicate fingerprint.
        info_hash: InfoHash,
    },
    /// The engine holds no live handle for the task.
    #[error("task is not active in the engine")]
    NotActive {
        /// Requested task.
        task_id: Uuid,
    },
    /// Admission control rejected a new task.
    #[error("concurrent download limit reached")]
    ConcurrencyLimit {
        /// Tasks currently downloading or checking.
        active: u64,
        /// Configured limit.
        limit: u64,
    },
    /// Origin is neither a magnet URI nor an existing file.
    #[error("invalid task origin")]
    InvalidOrigin {
        /// Rejected origin.
        origin: String,
    },
    /// Requested priority is outside `0..=7`.
    #[error("invalid file priority")]
    InvalidPriority {
        /// Rejected level.
        value: i64,
    },
    /// A requested file does not belong to the task.
    #[error("file does not belong to task")]
    FileMismatch {
        /// Task that was targeted.
        task_id: Uuid,
        /// Foreign file.
        file_id: Uuid,
    },
    /// The engine has no file list for the task yet.
    #[error("task metadata not available")]
    MissingMetadata {
        /// Requested task.
        task_id: Uuid,
    },
    /// Engine readiness wait timed out.
    #[error("engine not ready")]
    EngineNotReady {
        /// How long the caller waited.
        waited: Duration,
    },
    /// Magnet metadata wait timed out.
    #[error("metadata resolution timed out")]
    MetadataTimeout {
        /// How long the caller waited.
        waited: Duration,
    },
    /// Engine call failed or did not take effect.
    #[error("engine operation failed")]
    Engine {
        /// Operation identifier.
        operation: &'static str,
        /// Affected task when known.
        task_id: Option<Uuid>,
        /// Underlying engine failure.
        #[source]
        source: EngineError,
    },
    /// Store call failed.
    #[error("store operation failed")]
    Store {
        /// Operation identifier.
        operation: &'static str,
        /// Underlying store failure.
        #[source]
        source: StoreError,
    },
    /// File-system call failed.
    #[error("filesystem operation failed")]
    Io {
        /// Operation identifier.
        operation: &'static str,
        /// Path involved.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

impl TaskError {
    /// Wrap an engine failure, lifting the bounded-wait timeouts into
    /// their dedicated variants.
    #[must_use]
    pub fn engine(operation: &'static str, task_id: Option<Uuid>, source: EngineError) -> Self {
        match source {
            EngineError::NotReady { waited } => Self::EngineNotReady { waited },
            EngineError::MetadataTimeout { waited, .. } => Self::MetadataTimeout { waited },
            other => Self::Engine {
                operation,
                task_id,
                source: other,
            },
        }
    }

    /// Wrap a store failure.
    #[must_use]
    pub const fn store(operation: &'static str, source: StoreError) -> Self {
        Self::Store { operation, source }
    }
}

/// Convenience alias for task results.
pub type TaskResult<T> = Result<T, TaskError>;

/// Render an error and its source chain as `outer: inner: root`.
#[must_use]
pub fn error_chain_message(error: &(dyn Error + 'static)) -> String {
    let mut message = error.to_string();
    let mut current = error.source();
    while let Some(source) = current {
        message.push_str(": ");
        message.push_str(&source.to_string());
        current = source.source();
    }
    message
}
