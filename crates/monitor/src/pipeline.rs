//! Concurrent matching of one block's transactions against the subscription
//! set.

use std::{
    fmt,
    ops::AddAssign,
    sync::{Arc, Mutex, PoisonError},
    vec,
};

use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{debug, warn};
use tx_watch_domain::{
    model::{Address, HexIntError, Transaction},
    storage::{StorageError, SubscriptionStore},
};

/// Per-transaction failure. Never aborts the block.
#[derive(Debug, Error)]
pub enum MatchError {
    #[error("transaction {hash}: {source}")]
    InvalidIndex {
        hash: String,
        #[source]
        source: HexIntError,
    },
    #[error("mailbox {address}: {source}")]
    Storage {
        address: Address,
        #[source]
        source: StorageError,
    },
    #[error("matcher task failed: {0}")]
    Worker(String),
}

/// Every error collected while matching one block.
#[derive(Debug, Default)]
pub struct MatchErrors(Vec<MatchError>);

impl MatchErrors {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MatchError> {
        self.0.iter()
    }

    fn push(&mut self, err: MatchError) {
        self.0.push(err);
    }

    fn extend(&mut self, other: MatchErrors) {
        self.0.extend(other.0);
    }
}

impl fmt::Display for MatchErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("\n")?;
            }
            write!(f, "{err}")?;
        }
        Ok(())
    }
}

impl std::error::Error for MatchErrors {}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MatchStats {
    /// Transactions checked against the subscription set.
    pub processed: usize,
    /// Transactions at or below the resume index.
    pub skipped: usize,
    /// Mailbox appends, one per matching role.
    pub matched: usize,
}

impl AddAssign for MatchStats {
    fn add_assign(&mut self, rhs: Self) {
        self.processed += rhs.processed;
        self.skipped += rhs.skipped;
        self.matched += rhs.matched;
    }
}

/// Result of matching one block.
#[derive(Debug, Default)]
pub struct MatchOutcome {
    pub stats: MatchStats,
    /// Highest transaction index parsed, `None` when no index parsed.
    pub highest_index: Option<u64>,
    pub errors: MatchErrors,
}

impl MatchOutcome {
    fn merge(&mut self, other: MatchOutcome) {
        self.stats += other.stats;
        self.highest_index = match (self.highest_index, other.highest_index) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
        self.errors.extend(other.errors);
    }
}

type SharedQueue = Arc<Mutex<vec::IntoIter<Transaction>>>;

/// Matches `txs` (block `block`) with up to `workers` concurrent tasks pulling
/// from one shared queue, and waits for all of them before returning.
///
/// Transactions whose index is `<= resume_index` are skipped unless
/// `resume_index` is `0`.
pub async fn match_block<S>(
    store: Arc<S>,
    block: u64,
    resume_index: u64,
    txs: Vec<Transaction>,
    workers: usize,
) -> MatchOutcome
where
    S: SubscriptionStore + 'static,
{
    if txs.is_empty() {
        return MatchOutcome::default();
    }

    let pool = workers.max(1).min(txs.len());
    let queue: SharedQueue = Arc::new(Mutex::new(txs.into_iter()));
    let mut tasks = JoinSet::new();
    for _ in 0..pool {
        tasks.spawn(run_matcher(
            Arc::clone(&store),
            Arc::clone(&queue),
            resume_index,
        ));
    }

    let mut outcome = MatchOutcome::default();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(partial) => outcome.merge(partial),
            Err(err) => {
                warn!(block, ?err, "matcher task aborted");
                outcome.errors.push(MatchError::Worker(err.to_string()));
            }
        }
    }

    debug!(
        block,
        pool,
        processed = outcome.stats.processed,
        skipped = outcome.stats.skipped,
        matched = outcome.stats.matched,
        "block matched"
    );
    outcome
}

fn next_transaction(queue: &SharedQueue) -> Option<Transaction> {
    queue
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .next()
}

async fn run_matcher<S>(store: Arc<S>, queue: SharedQueue, resume_index: u64) -> MatchOutcome
where
    S: SubscriptionStore,
{
    let mut outcome = MatchOutcome::default();

    while let Some(tx) = next_transaction(&queue) {
        let index = match tx.index() {
            Ok(index) => index,
            Err(source) => {
                outcome.errors.push(MatchError::InvalidIndex {
                    hash: tx.hash.clone(),
                    source,
                });
                continue;
            }
        };
        outcome.highest_index = Some(outcome.highest_index.map_or(index, |h| h.max(index)));

        if resume_index != 0 && index <= resume_index {
            outcome.stats.skipped += 1;
            continue;
        }

        outcome.stats.processed += 1;
        for party in tx.parties() {
            match deliver(store.as_ref(), party, &tx).await {
                Ok(true) => outcome.stats.matched += 1,
                Ok(false) => {}
                Err(source) => outcome.errors.push(MatchError::Storage {
                    address: party.clone(),
                    source,
                }),
            }
        }
    }

    outcome
}

async fn deliver<S>(store: &S, party: &Address, tx: &Transaction) -> Result<bool, StorageError>
where
    S: SubscriptionStore + ?Sized,
{
    if !store.is_subscribed(party).await? {
        return Ok(false);
    }
    store.append_transaction(party, tx.clone()).await?;
    Ok(true)
}
