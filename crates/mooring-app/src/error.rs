//! # Design
//!
//! - Centralize bootstrap errors; task-level failures stay in `TaskError`.
//! - Keep error messages constant while carrying context fields for debugging.
//! - Preserve source errors without re-logging at call sites.

use std::io;

use mooring_config::ConfigError;
use mooring_core::{EngineError, StoreError};
use mooring_telemetry::TelemetryError;
use thiserror::Error;

/// Result alias for application operations.
pub type AppResult<T> = Result<T, AppError>;

/// Application-level error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration could not be loaded.
    #[error("configuration operation failed")]
    Config {
        /// Operation identifier.
        operation: &'static str,
        /// Source configuration error.
        source: ConfigError,
    },
    /// Telemetry could not be initialised.
    #[error("telemetry operation failed")]
    Telemetry {
        /// Operation identifier.
        operation: &'static str,
        /// Source telemetry error.
        source: TelemetryError,
    },
    /// The persistence backend could not be opened.
    #[error("store operation failed")]
    Store {
        /// Operation identifier.
        operation: &'static str,
        /// Source store error.
        source: StoreError,
    },
    /// The engine session could not be started.
    #[error("engine operation failed")]
    Engine {
        /// Operation identifier.
        operation: &'static str,
        /// Source engine error.
        source: EngineError,
    },
    /// IO operations failed.
    #[error("io operation failed")]
    Io {
        /// Operation identifier.
        operation: &'static str,
        /// Source IO error.
        source: io::Error,
    },
}

impl AppError {
    pub(crate) const fn config(operation: &'static str, source: ConfigError) -> Self {
        Self::Config { operation, source }
    }

    pub(crate) const fn telemetry(operation: &'static str, source: TelemetryError) -> Self {
        Self::Telemetry { operation, source }
    }

    pub(crate) const fn store(operation: &'static str, source: StoreError) -> Self {
        Self::Store { operation, source }
    }

    pub(crate) const fn engine(operation: &'static str, source: EngineError) -> Self {
        Self::Engine { operation, source }
    }

    pub(crate) const fn io(operation: &'static str, source: io::Error) -> Self {
        Self::Io { operation, source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;
    use std::path::PathBuf;

    #[test]
    fn constructors_keep_operation_and_source() {
        let err = AppError::config(
            "config.load",
            ConfigError::Io {
                path: PathBuf::from("/etc/mooring.json"),
                source: io::Error::other("denied"),
            },
        );
        assert_eq!(err.to_string(), "configuration operation failed");
        assert!(matches!(
            err,
            AppError::Config {
                operation: "config.load",
                ..
            }
        ));
        assert!(err.source().is_some());

        let err = AppError::engine(
            "engine.start",
            EngineError::NotStarted { operation: "add" },
        );
        assert_eq!(err.to_string(), "engine operation failed");

        let err = AppError::io("signal.ctrl_c", io::Error::other("gone"));
        assert_eq!(err.to_string(), "io operation failed");
    }
}
