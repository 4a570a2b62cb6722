use std::{
    collections::{HashMap, HashSet},
    mem,
    sync::{Mutex, PoisonError, RwLock},
};

use async_trait::async_trait;
use tracing::debug;
use tx_watch_domain::model::{Address, Transaction};
use tx_watch_domain::services::bloom::AddressBloom;
use tx_watch_domain::storage::{StorageError, StorageResult, SubscriptionStore};

/// Watched addresses plus their mailboxes.
///
/// Membership and mailboxes sit behind separate locks. Lookups for addresses
/// the bloom filter has never seen return without touching either lock.
#[derive(Debug, Default)]
pub struct InMemorySubscriptions {
    bloom: AddressBloom,
    subscribers: RwLock<HashSet<Address>>,
    mailboxes: Mutex<HashMap<Address, Vec<Transaction>>>,
}

impl InMemorySubscriptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bloom(bloom: AddressBloom) -> Self {
        Self {
            bloom,
            subscribers: RwLock::default(),
            mailboxes: Mutex::default(),
        }
    }

    /// Number of watched addresses.
    pub fn len(&self) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Transactions currently queued for `address`, without draining.
    pub fn pending(&self, address: &Address) -> usize {
        self.mailboxes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(address)
            .map_or(0, Vec::len)
    }
}

#[async_trait]
impl SubscriptionStore for InMemorySubscriptions {
    async fn add_subscriber(&self, address: &Address) -> StorageResult<()> {
        {
            let mut subscribers = self
                .subscribers
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            if !subscribers.insert(address.clone()) {
                return Err(StorageError::AlreadySubscribed);
            }
            self.bloom.insert(address);
        }
        self.mailboxes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(address.clone())
            .or_default();
        debug!(%address, "subscriber added");
        Ok(())
    }

    async fn is_subscribed(&self, address: &Address) -> StorageResult<bool> {
        if !self.bloom.might_contain(address) {
            return Ok(false);
        }
        Ok(self
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(address))
    }

    async fn append_transaction(&self, address: &Address, tx: Transaction) -> StorageResult<()> {
        self.mailboxes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(address.clone())
            .or_default()
            .push(tx);
        Ok(())
    }

    async fn drain_transactions(&self, address: &Address) -> StorageResult<Vec<Transaction>> {
        let mut mailboxes = self.mailboxes.lock().unwrap_or_else(PoisonError::into_inner);
        match mailboxes.get_mut(address) {
            Some(queued) if !queued.is_empty() => Ok(mem::take(queued)),
            _ => Err(StorageError::NoTransactions),
        }
    }
}
