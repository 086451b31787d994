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

//! Mooring application: reconciliation, statistics, commands and wiring.
//!
//! Layout: `bootstrap.rs` (service wiring and boot sequence), `reconciler.rs`
//! (status precedence and membership sweeps), `statistics.rs` (per-task and
//! aggregate figures), `commands.rs` (user commands), `catalog.rs` (queries),
//! `broadcaster.rs` (event publication), `scheduler.rs` (periodic passes),
//! `locks.rs` (per-task write serialization), `engine_config.rs` (settings
//! mapping), `error.rs` (boot failures).

pub mod bootstrap;
pub mod broadcaster;
pub mod catalog;
pub mod commands;
mod engine_config;
pub mod error;
mod locks;
pub mod reconciler;
mod scheduler;
pub mod statistics;

pub use bootstrap::{App, Services, run_app};
pub use broadcaster::Broadcaster;
pub use catalog::TaskCatalog;
pub use commands::{AddOutcome, CommandExecutor, CommandReceipt};
pub use error::{AppError, AppResult};
pub use reconciler::{
    HANDLE_LOST_STALLED, HANDLE_NOT_FOUND, LOST_FROM_SESSION, PassSummary, StatusReconciler,
    Transition, derive_status,
};
pub use statistics::{StatisticsAggregator, format_bytes};
