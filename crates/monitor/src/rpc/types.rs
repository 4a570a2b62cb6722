//! JSON-RPC 2.0 wire types for the subset of the Ethereum API the monitor
//! calls.

use serde::{Deserialize, Serialize};
use tx_watch_domain::model::Transaction;

pub const JSONRPC_VERSION: &str = "2.0";

#[derive(Debug, Serialize)]
pub struct JsonRpcRequest<T> {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'static str,
    pub params: T,
}

impl<T> JsonRpcRequest<T> {
    pub fn new(id: u64, method: &'static str, params: T) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            method,
            params,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct JsonRpcResponse<T> {
    pub result: Option<T>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
}

/// `eth_getBlockByNumber` result with full transaction objects.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BlockWithTransactions {
    #[serde(default)]
    pub transactions: Vec<Transaction>,
}
