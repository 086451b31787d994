//! Engine session implementations.

mod stub;

pub use stub::{StubCall, StubSession};
