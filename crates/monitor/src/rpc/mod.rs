use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;
use tx_watch_domain::model::{format_hex_u64, parse_hex_u64, Transaction};

use crate::worker::MonitorError;

mod types;

pub use types::{BlockWithTransactions, JsonRpcError, JsonRpcRequest, JsonRpcResponse};

/// Read side of the chain the monitor polls.
#[async_trait]
pub trait ChainReader: Send + Sync {
    /// Highest block number the node knows about.
    async fn chain_height(&self) -> Result<u64, MonitorError>;

    /// Full transaction list of `block`, in on-chain index order.
    async fn block_transactions(&self, block: u64) -> Result<Vec<Transaction>, MonitorError>;
}

static REQUEST_ID: AtomicU64 = AtomicU64::new(1);

fn next_request_id() -> u64 {
    REQUEST_ID.fetch_add(1, Ordering::Relaxed)
}

/// Ethereum JSON-RPC client over HTTP.
#[derive(Debug, Clone)]
pub struct EthRpcClient {
    url: String,
    http: reqwest::Client,
}

impl EthRpcClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, MonitorError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            url: url.into(),
            http,
        })
    }

    async fn call<P, R>(&self, method: &'static str, params: P) -> Result<Option<R>, MonitorError>
    where
        P: Serialize + Send,
        R: DeserializeOwned,
    {
        let request = JsonRpcRequest::new(next_request_id(), method, params);
        debug!(method, id = request.id, "rpc call");
        let response = self.http.post(&self.url).json(&request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MonitorError::Rpc(format!("{method}: HTTP {status}: {body}")));
        }

        let body: JsonRpcResponse<R> = response.json().await?;
        decode_response(method, body)
    }
}

fn decode_response<R>(
    method: &'static str,
    body: JsonRpcResponse<R>,
) -> Result<Option<R>, MonitorError> {
    if let Some(err) = body.error {
        return Err(MonitorError::Rpc(format!(
            "{method}: node error {}: {}",
            err.code, err.message
        )));
    }
    Ok(body.result)
}

#[async_trait]
impl ChainReader for EthRpcClient {
    async fn chain_height(&self) -> Result<u64, MonitorError> {
        let height: String = self
            .call("eth_blockNumber", [(); 0])
            .await?
            .ok_or_else(|| MonitorError::Rpc("eth_blockNumber: empty result".to_string()))?;
        Ok(parse_hex_u64(&height)?)
    }

    async fn block_transactions(&self, block: u64) -> Result<Vec<Transaction>, MonitorError> {
        let params = (format_hex_u64(block), true);
        let block_body: BlockWithTransactions = self
            .call("eth_getBlockByNumber", params)
            .await?
            .ok_or_else(|| MonitorError::Rpc(format!("eth_getBlockByNumber: block {block} not found")))?;
        Ok(block_body.transactions)
    }
}
