//! Service surface shared by the HTTP API and the poll loop.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};
use tx_watch_domain::{
    model::{Address, AddressFormatError, Transaction},
    storage::{ProgressStore, StorageError, SubscriptionStore},
};

use crate::{
    pipeline::{match_block, MatchErrors, MatchStats},
    rpc::ChainReader,
    worker::MonitorError,
};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("invalid address: {0}")]
    InvalidAddress(#[from] AddressFormatError),
    #[error("address not subscribed")]
    AddressNotSubscribed,
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Structured context of one processed cycle, logged by the poll loop.
#[derive(Debug, Default)]
pub struct CycleReport {
    pub chain_height: u64,
    /// Cursor before the cycle.
    pub prev_block: u64,
    pub target_block: u64,
    pub resume_index: u64,
    pub tx_len: usize,
    pub highest_index: Option<u64>,
    pub stats: MatchStats,
    pub errors: MatchErrors,
}

impl CycleReport {
    /// `true` when the block advanced but some transactions failed.
    pub fn is_partial(&self) -> bool {
        !self.errors.is_empty()
    }
}

#[async_trait]
pub trait WatchService: Send + Sync {
    /// Last processed block, `0` before the first cycle.
    fn current_block(&self) -> u64;

    async fn subscribe(&self, address: &str) -> Result<(), ServiceError>;

    /// Drains everything matched for `address` since the last call.
    async fn matched_transactions(&self, address: &str) -> Result<Vec<Transaction>, ServiceError>;

    /// Fetches and matches at most one block. `Err` leaves all progress
    /// untouched.
    async fn run_one_cycle(&self) -> Result<CycleReport, MonitorError>;
}

/// Default [`WatchService`]: a chain reader plus the two stores.
pub struct TxWatcher<C, P, S> {
    reader: C,
    progress: Arc<P>,
    subscriptions: Arc<S>,
    workers: usize,
    cycle: Mutex<()>,
}

impl<C, P, S> TxWatcher<C, P, S>
where
    C: ChainReader,
    P: ProgressStore,
    S: SubscriptionStore + 'static,
{
    pub fn new(reader: C, progress: Arc<P>, subscriptions: Arc<S>, workers: usize) -> Self {
        Self {
            reader,
            progress,
            subscriptions,
            workers: workers.max(1),
            cycle: Mutex::new(()),
        }
    }

    pub fn reader(&self) -> &C {
        &self.reader
    }

    fn target_block(cursor: u64, chain_height: u64) -> u64 {
        if cursor == 0 {
            chain_height
        } else {
            chain_height.min(cursor.saturating_add(1))
        }
    }
}

#[async_trait]
impl<C, P, S> WatchService for TxWatcher<C, P, S>
where
    C: ChainReader,
    P: ProgressStore,
    S: SubscriptionStore + 'static,
{
    fn current_block(&self) -> u64 {
        self.progress.current_block()
    }

    async fn subscribe(&self, address: &str) -> Result<(), ServiceError> {
        let address = Address::parse(address)?;
        self.subscriptions.add_subscriber(&address).await?;
        info!(%address, "address subscribed");
        Ok(())
    }

    async fn matched_transactions(&self, address: &str) -> Result<Vec<Transaction>, ServiceError> {
        let address = Address::parse(address)?;
        if !self.subscriptions.is_subscribed(&address).await? {
            return Err(ServiceError::AddressNotSubscribed);
        }
        let txs = self.subscriptions.drain_transactions(&address).await?;
        debug!(%address, count = txs.len(), "mailbox drained");
        Ok(txs)
    }

    async fn run_one_cycle(&self) -> Result<CycleReport, MonitorError> {
        let _running = self.cycle.lock().await;

        let chain_height = self.reader.chain_height().await?;
        let prev_block = self.progress.current_block();
        let target_block = Self::target_block(prev_block, chain_height);
        let resume_index = if prev_block == target_block {
            self.progress.resume_index(target_block).unwrap_or(0)
        } else {
            0
        };

        let txs = self.reader.block_transactions(target_block).await?;
        let tx_len = txs.len();
        let outcome = match_block(
            Arc::clone(&self.subscriptions),
            target_block,
            resume_index,
            txs,
            self.workers,
        )
        .await;

        self.progress.set_current_block(target_block);
        if let Some(index) = outcome.highest_index {
            self.progress.set_resume_index(target_block, index);
        }

        Ok(CycleReport {
            chain_height,
            prev_block,
            target_block,
            resume_index,
            tx_len,
            highest_index: outcome.highest_index,
            stats: outcome.stats,
            errors: outcome.errors,
        })
    }
}
