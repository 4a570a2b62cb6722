use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Mutex, PoisonError,
    },
};

use tx_watch_domain::storage::ProgressStore;

/// Block cursor and per-block resume indexes held in process memory.
///
/// Resume entries are kept for every block that was ever recorded; nothing
/// prunes them unless [`ProgressStore::clear_resume_index`] is called.
#[derive(Debug, Default)]
pub struct InMemoryProgress {
    current_block: AtomicU64,
    resume_indexes: Mutex<HashMap<u64, u64>>,
}

impl InMemoryProgress {
    pub fn new() -> Self {
        Self::default()
    }

    fn indexes(&self) -> std::sync::MutexGuard<'_, HashMap<u64, u64>> {
        self.resume_indexes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl ProgressStore for InMemoryProgress {
    fn current_block(&self) -> u64 {
        self.current_block.load(Ordering::Acquire)
    }

    fn set_current_block(&self, block: u64) {
        self.current_block.store(block, Ordering::Release);
    }

    fn resume_index(&self, block: u64) -> Option<u64> {
        self.indexes().get(&block).copied()
    }

    fn set_resume_index(&self, block: u64, index: u64) {
        self.indexes().insert(block, index);
    }

    fn clear_resume_index(&self, block: u64) {
        self.indexes().remove(&block);
    }
}
