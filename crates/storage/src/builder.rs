use tx_watch_domain::services::bloom::{AddressBloom, BloomConfigError};
use tx_watch_domain::storage::ProgressStore;

use crate::{InMemoryProgress, InMemorySubscriptions, MemoryStorage};

#[derive(Default)]
pub struct StorageBuilder {
    start_block: Option<u64>,
    bloom: Option<(u64, f64)>,
}

impl StorageBuilder {
    pub fn new() -> Self {
        Self {
            start_block: None,
            bloom: None,
        }
    }

    /// Seeds the block cursor, e.g. to resume from a known height after a
    /// restart.
    pub fn start_block(mut self, block: Option<u64>) -> Self {
        self.start_block = block;
        self
    }

    /// Sizes the subscription bloom filter.
    pub fn bloom(mut self, expected_items: u64, false_positive_rate: f64) -> Self {
        self.bloom = Some((expected_items, false_positive_rate));
        self
    }

    pub fn build(self) -> Result<MemoryStorage, BloomConfigError> {
        let bloom = match self.bloom {
            Some((expected_items, rate)) => AddressBloom::new(expected_items, rate)?,
            None => AddressBloom::default(),
        };
        let progress = InMemoryProgress::new();
        if let Some(block) = self.start_block {
            progress.set_current_block(block);
        }
        Ok(MemoryStorage::from_parts(
            progress,
            InMemorySubscriptions::with_bloom(bloom),
        ))
    }
}
