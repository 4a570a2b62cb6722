//! Shared service helpers such as the subscription bloom filter and telemetry
//! wiring.

pub mod bloom;
pub mod telemetry;

pub use bloom::*;
pub use telemetry::*;
