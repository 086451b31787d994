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

//! Engine-agnostic task model, collaborator traits, and error taxonomy.
//!
//! Layout: `model/` (persisted records and live engine snapshots), `service/`
//! (the `EngineSession` trait implemented by engine adapters), `store.rs`
//! (the `TaskStore` persistence trait), `error.rs` (engine, store and task
//! error enums).

pub mod error;
pub mod model;
pub mod service;
pub mod store;

pub use error::{
    EngineError, EngineResult, InvalidInfoHash, PriorityOutOfRange, StoreError, StoreResult,
    TaskError, TaskResult, error_chain_message,
};
pub use model::{
    AddRequest, EngineEvent, EngineHandle, EngineState, FilePriority, InfoHash, LiveFile,
    LiveStatus, MetaFile, Metainfo, OverallStatistics, SessionSettings, Statistics, Task,
    TaskFile, TaskStatus, share_ratio,
};
pub use service::EngineSession;
pub use store::TaskStore;
