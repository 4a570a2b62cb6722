//! Storage contracts implemented by the in-memory stores and consumed by the
//! monitor.

mod traits;

pub use traits::*;
