//! HTTP client for the tx-watch API.

use reqwest::{Response, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use tx_watch_domain::model::Transaction;

#[derive(Debug, Error)]
pub enum ClientError {
    /// The server answered with a non-success status. `body` is the raw
    /// response text, normally a `{"error", "msg"}` object.
    #[error("http {status}: {body}")]
    Http { status: StatusCode, body: String },
    #[error("transport error: {0}")]
    Transport(String),
}

impl From<reqwest::Error> for ClientError {
    fn from(value: reqwest::Error) -> Self {
        Self::Transport(value.to_string())
    }
}

impl ClientError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ClientError::Http { status, .. } => Some(*status),
            ClientError::Transport(_) => None,
        }
    }
}

#[derive(Debug, Serialize)]
struct SubscribeRequest<'a> {
    address: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CurrentBlockResponse {
    current_block_height: u64,
}

#[derive(Debug, Clone)]
pub struct TxWatchClient {
    base_url: String,
    http: reqwest::Client,
}

impl TxWatchClient {
    /// `base_url` is the server root, e.g. `http://127.0.0.1:8080`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, reqwest::Client::new())
    }

    pub fn with_client(base_url: impl Into<String>, http: reqwest::Client) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { base_url, http }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// Last block the server has processed.
    pub async fn current_block(&self) -> Result<u64, ClientError> {
        let response = self.http.get(self.url("getCurrentBlock")).send().await?;
        let body: CurrentBlockResponse = check(response).await?.json().await?;
        Ok(body.current_block_height)
    }

    pub async fn subscribe(&self, address: &str) -> Result<(), ClientError> {
        let response = self
            .http
            .post(self.url("subscribe"))
            .json(&SubscribeRequest { address })
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    /// Drains the transactions matched for `address` since the last call.
    pub async fn transactions(&self, address: &str) -> Result<Vec<Transaction>, ClientError> {
        let response = self
            .http
            .get(self.url(&format!("getTransactions/{address}")))
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }
}

async fn check(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ClientError::Http { status, body })
}
