//! Domain-level building blocks shared across the API, monitor and storage
//! crates: address/transaction model, storage contracts, configuration and
//! telemetry wiring.

pub mod config;
pub mod model;
pub mod services;
pub mod storage;

pub use model::*;
pub use storage::*;
