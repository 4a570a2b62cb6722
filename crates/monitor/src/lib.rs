//! Block polling and transaction matching. The API process embeds this crate
//! and drives [`run_monitor`] on its own runtime.

pub mod pipeline;
pub mod rpc;
pub mod service;
pub mod worker;

pub use pipeline::{match_block, MatchError, MatchErrors, MatchOutcome, MatchStats};
pub use rpc::{ChainReader, EthRpcClient};
pub use service::{CycleReport, ServiceError, TxWatcher, WatchService};
pub use worker::{build_rpc_client, run_monitor, MonitorError};
