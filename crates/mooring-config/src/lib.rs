#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::redundant_pub_crate)]

//! Layered configuration for the mooring service.
//!
//! Layout: `model.rs` (typed sections), `loader.rs` (file plus `MOORING_*`
//! overrides), `validate.rs` (guard rails producing an effective view).

mod defaults;
pub mod error;
pub mod loader;
pub mod model;
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use loader::{CONFIG_PATH_ENV, ConfigLoader, ENV_PREFIX};
pub use model::{
    EngineSettings, LogFormatSetting, LoggingSettings, MooringConfig, ScheduleSettings,
    SettleDelays, StorageSettings,
};
pub use validate::{NormalizedConfig, normalize};
