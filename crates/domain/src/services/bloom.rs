use fastbloom::AtomicBloomFilter;
use thiserror::Error;

use crate::model::Address;

/// Bloom filter over subscribed addresses. False positives are allowed; false
/// negatives are not expected from the underlying implementation, so a miss
/// proves the address was never inserted.
#[derive(Debug)]
pub struct AddressBloom {
    filter: AtomicBloomFilter,
}

impl AddressBloom {
    pub const DEFAULT_EXPECTED_ITEMS: u64 = 100_000;
    pub const DEFAULT_FALSE_POSITIVE_RATE: f64 = 0.01;

    pub fn new(expected_items: u64, false_positive_rate: f64) -> Result<Self, BloomConfigError> {
        if expected_items == 0 {
            return Err(BloomConfigError::InvalidEntries);
        }
        if !(false_positive_rate > 0.0 && false_positive_rate < 1.0) {
            return Err(BloomConfigError::InvalidFalsePositiveRate(
                false_positive_rate,
            ));
        }
        let filter = AtomicBloomFilter::with_false_pos(false_positive_rate)
            .seed(&0_u128)
            .expected_items(expected_items as usize);
        Ok(Self { filter })
    }

    #[inline]
    pub fn insert(&self, address: &Address) {
        self.filter.insert(address.as_str());
    }

    #[inline]
    pub fn might_contain(&self, address: &Address) -> bool {
        self.filter.contains(address.as_str())
    }
}

impl Default for AddressBloom {
    fn default() -> Self {
        let filter = AtomicBloomFilter::with_false_pos(Self::DEFAULT_FALSE_POSITIVE_RATE)
            .seed(&0_u128)
            .expected_items(Self::DEFAULT_EXPECTED_ITEMS as usize);
        Self { filter }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum BloomConfigError {
    #[error("expected_items must be greater than zero")]
    InvalidEntries,
    #[error("false positive rate must be in (0,1): {0}")]
    InvalidFalsePositiveRate(f64),
}
