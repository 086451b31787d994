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

//! Topic-addressed event bus used to publish reconciled task state.
//!
//! The bus assigns sequential identifiers and keeps a bounded replay ring so
//! late subscribers can catch up from a known id. Delivery is best effort:
//! when the broadcast channel overflows the oldest events are dropped.
//!
//! Layout: `payloads.rs` (event enum and envelope), `routing.rs` (`EventBus`
//! and `EventStream`), `topics.rs` (destination names).

pub mod payloads;
pub mod routing;
pub mod topics;

pub use payloads::{Event, EventEnvelope, EventId, NotificationKind};
pub use routing::{EventBus, EventStream};
pub use topics::{NOTIFICATIONS_TOPIC, STATS_TOPIC, TASKS_TOPIC, task_topic};
