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

//! Engine facade: session lifecycle, handle cache and event dispatch.
//!
//! Layout: `facade.rs` (`EngineFacade`), `cache.rs` (identity → handle hint
//! map), `dispatch.rs` (per-event handlers), `worker.rs` (event pump),
//! `magnet.rs` and `metainfo.rs` (origin parsing), `session/` (in-memory
//! `StubSession`).

mod cache;
mod dispatch;
mod facade;
pub mod magnet;
pub mod metainfo;
pub mod session;
mod worker;

pub use facade::{EngineFacade, FacadeOptions};
pub use magnet::MagnetLink;
pub use session::{StubCall, StubSession};
