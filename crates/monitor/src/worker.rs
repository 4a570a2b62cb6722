use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use metrics::{counter, gauge, histogram};
use strum_macros::AsRefStr;
use thiserror::Error;
use tokio::{sync::watch, time::sleep};
use tracing::{error, info, warn};
use tx_watch_domain::{
    config::MonitorConfig,
    model::HexIntError,
    services::telemetry::{
        MONITOR_CURRENT_BLOCK, MONITOR_CYCLES_TOTAL, MONITOR_CYCLE_SECONDS,
        MONITOR_TRANSACTIONS_TOTAL,
    },
};

use crate::{
    rpc::EthRpcClient,
    service::{CycleReport, WatchService},
};

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("rpc error: {0}")]
    Rpc(String),
    #[error("invalid hex quantity from node: {0}")]
    InvalidHex(#[from] HexIntError),
}

impl From<reqwest::Error> for MonitorError {
    fn from(value: reqwest::Error) -> Self {
        Self::Rpc(value.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr)]
#[strum(serialize_all = "snake_case")]
enum CycleResult {
    Processed,
    Partial,
    Failed,
}

pub fn build_rpc_client(config: &MonitorConfig) -> Result<EthRpcClient, MonitorError> {
    EthRpcClient::new(config.eth_rpc_url(), config.rpc_timeout())
}

/// Runs poll cycles until `shutdown` flips to `true` or its sender is dropped.
///
/// The first cycle starts immediately; every later one waits `interval` after
/// the previous cycle finished. Shutdown is observed between cycles and while
/// waiting, never in the middle of one.
pub async fn run_monitor<W>(service: Arc<W>, interval: Duration, mut shutdown: watch::Receiver<bool>)
where
    W: WatchService + ?Sized,
{
    let mut delay = Duration::ZERO;
    info!(?interval, "monitor started");

    loop {
        tokio::select! {
            biased;
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
            _ = sleep(delay) => {}
        }
        if *shutdown.borrow() {
            break;
        }

        let started = Instant::now();
        let result = service.run_one_cycle().await;
        record_cycle(&result, started.elapsed());
        delay = interval;
    }

    info!(
        current_block = service.current_block(),
        "monitor stopped"
    );
}

fn record_cycle(result: &Result<CycleReport, MonitorError>, elapsed: Duration) {
    let process_time = format!("{elapsed:?}");
    let outcome = match result {
        Ok(report) => {
            info!(
                chain_height = report.chain_height,
                prev_block = report.prev_block,
                target_block = report.target_block,
                resume_index = report.resume_index,
                tx_len = report.tx_len,
                highest_index = ?report.highest_index,
                processed = report.stats.processed,
                skipped = report.stats.skipped,
                matched = report.stats.matched,
                %process_time,
                "block processed"
            );
            if report.is_partial() {
                warn!(
                    target_block = report.target_block,
                    error_count = report.errors.len(),
                    errors = %report.errors,
                    "block processed with errors"
                );
            }
            gauge!(MONITOR_CURRENT_BLOCK).set(report.target_block as f64);
            counter!(MONITOR_TRANSACTIONS_TOTAL, "outcome" => "processed")
                .increment(report.stats.processed as u64);
            counter!(MONITOR_TRANSACTIONS_TOTAL, "outcome" => "skipped")
                .increment(report.stats.skipped as u64);
            counter!(MONITOR_TRANSACTIONS_TOTAL, "outcome" => "matched")
                .increment(report.stats.matched as u64);
            counter!(MONITOR_TRANSACTIONS_TOTAL, "outcome" => "error")
                .increment(report.errors.len() as u64);
            if report.is_partial() {
                CycleResult::Partial
            } else {
                CycleResult::Processed
            }
        }
        Err(err) => {
            error!(?err, %process_time, "poll cycle failed");
            CycleResult::Failed
        }
    };

    counter!(MONITOR_CYCLES_TOTAL, "result" => outcome.as_ref().to_string()).increment(1);
    histogram!(MONITOR_CYCLE_SECONDS).record(elapsed.as_secs_f64());
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use tokio::{sync::Notify, time::timeout};
    use tx_watch_domain::{model::Transaction, storage::ProgressStore};
    use tx_watch_storage::MemoryStorage;

    use super::*;
    use crate::{
        rpc::ChainReader,
        service::{
            tests::{watcher, StubChain},
            TxWatcher,
        },
    };

    /// Holds `block_transactions` open until `release` is notified.
    #[derive(Default)]
    struct GatedChain {
        entered: Notify,
        release: Notify,
        fetches: AtomicUsize,
    }

    #[async_trait]
    impl ChainReader for GatedChain {
        async fn chain_height(&self) -> Result<u64, MonitorError> {
            Ok(7)
        }

        async fn block_transactions(&self, _block: u64) -> Result<Vec<Transaction>, MonitorError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            self.entered.notify_one();
            self.release.notified().await;
            Ok(Vec::new())
        }
    }

    #[test]
    fn cycle_results_render_as_snake_case() {
        assert_eq!(CycleResult::Processed.as_ref(), "processed");
        assert_eq!(CycleResult::Partial.as_ref(), "partial");
        assert_eq!(CycleResult::Failed.as_ref(), "failed");
    }

    #[tokio::test]
    async fn stops_before_first_cycle_when_already_cancelled() {
        let storage = MemoryStorage::new();
        let service = Arc::new(watcher(StubChain::with_block(9, Vec::new()), &storage));
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();

        timeout(
            Duration::from_secs(1),
            run_monitor(Arc::clone(&service), Duration::from_millis(5), rx),
        )
        .await
        .expect("loop exits");

        assert!(service.reader().fetched.lock().unwrap().is_empty());
        assert_eq!(storage.progress().current_block(), 0);
    }

    #[tokio::test]
    async fn polls_until_shutdown() {
        let storage = MemoryStorage::new();
        let service = Arc::new(watcher(StubChain::with_block(9, Vec::new()), &storage));
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(run_monitor(
            Arc::clone(&service),
            Duration::from_millis(5),
            rx,
        ));
        sleep(Duration::from_millis(60)).await;
        tx.send(true).unwrap();
        timeout(Duration::from_secs(1), handle)
            .await
            .expect("loop exits")
            .expect("task joins");

        assert_eq!(storage.progress().current_block(), 9);
        assert!(service.reader().fetched.lock().unwrap().len() >= 2);
    }

    #[tokio::test]
    async fn shutdown_lets_the_running_cycle_finish() {
        let storage = MemoryStorage::new();
        let service = Arc::new(TxWatcher::new(
            GatedChain::default(),
            storage.progress(),
            storage.subscriptions(),
            2,
        ));
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(run_monitor(
            Arc::clone(&service),
            Duration::from_millis(5),
            rx,
        ));
        timeout(Duration::from_secs(1), service.reader().entered.notified())
            .await
            .expect("cycle starts");

        tx.send(true).unwrap();
        sleep(Duration::from_millis(20)).await;
        assert!(!handle.is_finished());
        assert_eq!(storage.progress().current_block(), 0);

        service.reader().release.notify_one();
        timeout(Duration::from_secs(1), handle)
            .await
            .expect("loop exits")
            .expect("task joins");

        assert_eq!(storage.progress().current_block(), 7);
        assert_eq!(service.reader().fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn upstream_failures_do_not_stop_the_loop() {
        let storage = MemoryStorage::new();
        let chain = StubChain::with_block(4, Vec::new());
        chain.fail.store(true, Ordering::SeqCst);
        let service = Arc::new(watcher(chain, &storage));
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(run_monitor(
            Arc::clone(&service),
            Duration::from_millis(5),
            rx,
        ));
        sleep(Duration::from_millis(30)).await;
        assert!(!handle.is_finished());
        assert_eq!(storage.progress().current_block(), 0);

        service.reader().fail.store(false, Ordering::SeqCst);
        sleep(Duration::from_millis(30)).await;
        assert_eq!(storage.progress().current_block(), 4);

        drop(tx);
        timeout(Duration::from_secs(1), handle)
            .await
            .expect("loop exits")
            .expect("task joins");
    }
}
