//! In-memory storage adapters that satisfy the domain storage traits. State is
//! volatile: everything is lost when the process exits.

mod builder;
mod progress_store;
mod subscription_store;

use std::sync::Arc;

pub use builder::StorageBuilder;
pub use progress_store::InMemoryProgress;
pub use subscription_store::InMemorySubscriptions;

/// Shared storage handles used by the HTTP API and the monitor.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    progress: Arc<InMemoryProgress>,
    subscriptions: Arc<InMemorySubscriptions>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> StorageBuilder {
        StorageBuilder::new()
    }

    pub(crate) fn from_parts(
        progress: InMemoryProgress,
        subscriptions: InMemorySubscriptions,
    ) -> Self {
        Self {
            progress: Arc::new(progress),
            subscriptions: Arc::new(subscriptions),
        }
    }

    pub fn progress(&self) -> Arc<InMemoryProgress> {
        Arc::clone(&self.progress)
    }

    pub fn subscriptions(&self) -> Arc<InMemorySubscriptions> {
        Arc::clone(&self.subscriptions)
    }
}
