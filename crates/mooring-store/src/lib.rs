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
    clippy::cargo,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::multiple_crate_versions)]

//! Persistence for reconciled task state.
//!
//! Two [`mooring_core::TaskStore`] implementations: [`MemoryStore`] for
//! tests and database-less runs, [`PgStore`] for Postgres with embedded
//! migrations.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;
