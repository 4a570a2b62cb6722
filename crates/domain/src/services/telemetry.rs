//! Tracing subscriber and Prometheus recorder setup, plus the names of every
//! metric the watcher emits.

use std::{env, net::SocketAddr, sync::Arc};

use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use thiserror::Error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::hydrate_env_file;

/// Poll cycles by `result` (`processed`, `partial`, `failed`).
pub const MONITOR_CYCLES_TOTAL: &str = "monitor_cycles_total";
/// Transactions seen by the matcher, by `outcome`.
pub const MONITOR_TRANSACTIONS_TOTAL: &str = "monitor_transactions_total";
/// Last block the cursor was advanced to.
pub const MONITOR_CURRENT_BLOCK: &str = "monitor_current_block";
/// Wall time of one poll cycle.
pub const MONITOR_CYCLE_SECONDS: &str = "monitor_cycle_seconds";
/// HTTP requests by `endpoint` and `status`.
pub const API_REQUESTS_TOTAL: &str = "api_requests_total";

/// Cycle durations are dominated by two RPC round trips and a block of
/// matching; anything past a minute is a stalled node.
const CYCLE_SECONDS_BUCKETS: &[f64] = &[0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0];

/// Our crates at `info`, everything else at `warn`.
pub const DEFAULT_LOG_FILTER: &str =
    "warn,tx_watch_api=info,tx_watch_monitor=info,tx_watch_storage=info,actix_web=info";

static SUBSCRIBER_INSTALLED: OnceCell<()> = OnceCell::new();
static METRICS_HANDLE: OnceCell<Arc<PrometheusHandle>> = OnceCell::new();

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    log_filter: String,
    metrics_address: Option<String>,
}

impl TelemetryConfig {
    /// Reads `<PREFIX>_LOG_FILTER` and `<PREFIX>_METRICS_ADDRESS`. Both are
    /// optional.
    pub fn from_env(prefix: &str) -> Self {
        let _ = hydrate_env_file();
        let upper = prefix.trim().to_ascii_uppercase();

        let log_filter = env::var(format!("{upper}_LOG_FILTER"))
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());
        let metrics_address = env::var(format!("{upper}_METRICS_ADDRESS"))
            .ok()
            .filter(|value| !value.trim().is_empty());

        Self {
            log_filter,
            metrics_address,
        }
    }

    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    pub fn metrics_address(&self) -> Option<&str> {
        self.metrics_address.as_deref()
    }
}

/// Handle to the process-wide Prometheus recorder.
#[derive(Clone)]
pub struct TelemetryGuard {
    metrics: Arc<PrometheusHandle>,
}

impl TelemetryGuard {
    pub fn render_metrics(&self) -> String {
        self.metrics.render()
    }
}

/// Installs the tracing subscriber and the metrics recorder. Later calls
/// reuse what the first one installed.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    install_tracing(config)?;
    let metrics = install_metrics(config)?;

    Ok(TelemetryGuard { metrics })
}

fn install_tracing(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    if SUBSCRIBER_INSTALLED.get().is_some() {
        return Ok(());
    }

    let env_filter = EnvFilter::try_new(config.log_filter())
        .map_err(|err| TelemetryError::InvalidLogFilter(err.to_string()))?;

    if SUBSCRIBER_INSTALLED.set(()).is_ok() {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init()
            .map_err(|err| TelemetryError::Tracing(err.to_string()))?;
    }

    Ok(())
}

fn install_metrics(config: &TelemetryConfig) -> Result<Arc<PrometheusHandle>, TelemetryError> {
    METRICS_HANDLE
        .get_or_try_init(|| {
            let mut builder = PrometheusBuilder::new()
                .set_buckets_for_metric(
                    Matcher::Full(MONITOR_CYCLE_SECONDS.to_string()),
                    CYCLE_SECONDS_BUCKETS,
                )
                .map_err(|err| TelemetryError::Metrics(err.to_string()))?;
            if let Some(addr) = config.metrics_address() {
                let socket: SocketAddr =
                    addr.parse().map_err(|err: std::net::AddrParseError| {
                        TelemetryError::InvalidMetricsAddress(addr.to_string(), err.to_string())
                    })?;
                builder = builder.with_http_listener(socket);
            }

            let handle = builder
                .install_recorder()
                .map_err(|err| TelemetryError::Metrics(err.to_string()))?;
            describe_metrics();
            Ok(Arc::new(handle))
        })
        .cloned()
}

/// Registers help text with the installed recorder.
fn describe_metrics() {
    describe_counter!(
        MONITOR_CYCLES_TOTAL,
        Unit::Count,
        "Poll cycles run by the monitor, by result"
    );
    describe_counter!(
        MONITOR_TRANSACTIONS_TOTAL,
        Unit::Count,
        "Block transactions handled by the matcher, by outcome"
    );
    describe_gauge!(
        MONITOR_CURRENT_BLOCK,
        "Block number the cursor was last advanced to"
    );
    describe_histogram!(
        MONITOR_CYCLE_SECONDS,
        Unit::Seconds,
        "Duration of one poll cycle"
    );
    describe_counter!(
        API_REQUESTS_TOTAL,
        Unit::Count,
        "HTTP requests served, by endpoint and status"
    );
}

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("invalid log filter: {0}")]
    InvalidLogFilter(String),
    #[error("failed to install tracing subscriber: {0}")]
    Tracing(String),
    #[error("invalid metrics address `{0}`: {1}")]
    InvalidMetricsAddress(String, String),
    #[error("failed to install metrics recorder: {0}")]
    Metrics(String),
}
