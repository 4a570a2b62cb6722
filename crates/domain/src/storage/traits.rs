use async_trait::async_trait;
use thiserror::Error;

use crate::model::{Address, Transaction};

/// Common result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("address already subscribed")]
    AlreadySubscribed,
    #[error("no transactions")]
    NoTransactions,
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Block cursor plus the per-block resume index.
///
/// A resume index is only meaningful while the cursor still points at the
/// block it was recorded for. Implementations do not enforce cursor
/// monotonicity; the poll loop is the single writer.
pub trait ProgressStore: Send + Sync {
    /// Last block processed, `0` when nothing has been processed yet.
    fn current_block(&self) -> u64;
    fn set_current_block(&self, block: u64);
    fn resume_index(&self, block: u64) -> Option<u64>;
    fn set_resume_index(&self, block: u64, index: u64);
    fn clear_resume_index(&self, block: u64);
}

/// Watched addresses and their pending mailboxes.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Registers `address` with an empty mailbox. Fails with
    /// [`StorageError::AlreadySubscribed`] when it is already watched.
    async fn add_subscriber(&self, address: &Address) -> StorageResult<()>;

    async fn is_subscribed(&self, address: &Address) -> StorageResult<bool>;

    /// Queues `tx` for `address`. Callers check the subscription first.
    async fn append_transaction(&self, address: &Address, tx: Transaction) -> StorageResult<()>;

    /// Returns and clears everything queued for `address` in one step. Fails
    /// with [`StorageError::NoTransactions`] when nothing is queued.
    async fn drain_transactions(&self, address: &Address) -> StorageResult<Vec<Transaction>>;
}
