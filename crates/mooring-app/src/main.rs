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

//! Binary entrypoint: runs the mooring services until interrupted.

use mooring_app::{AppResult, run_app};

/// Boots mooring and blocks until ctrl-c.
#[tokio::main]
async fn main() -> AppResult<()> {
    run_app().await
}
