//! Environment-driven configuration structures shared by all binaries.

use std::{env, str::FromStr, time::Duration};

use thiserror::Error;

use crate::services::bloom::AddressBloom;

/// API-specific configuration (public + optional internal listeners).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    api_bind_address: String,
    api_unix_socket: Option<String>,
    internal_bind_address: Option<String>,
    internal_unix_socket: Option<String>,
}

impl ApiConfig {
    /// Loads only the environment variables required by the HTTP surface.
    pub fn load_from_env() -> Result<Self, ConfigError> {
        hydrate_env_file()?;

        Ok(Self {
            api_bind_address: get_required_var("API_BIND_ADDRESS")?,
            api_unix_socket: get_optional_var("API_UNIX_SOCKET"),
            internal_bind_address: get_optional_var("API_INTERNAL_BIND_ADDRESS"),
            internal_unix_socket: get_optional_var("API_INTERNAL_UNIX_SOCKET"),
        })
    }

    pub fn api_bind_address(&self) -> &str {
        &self.api_bind_address
    }

    pub fn api_unix_socket(&self) -> Option<&str> {
        self.api_unix_socket.as_deref()
    }

    pub fn internal_bind_address(&self) -> Option<&str> {
        self.internal_bind_address.as_deref()
    }

    pub fn internal_unix_socket(&self) -> Option<&str> {
        self.internal_unix_socket.as_deref()
    }

    pub fn has_internal_listener(&self) -> bool {
        self.internal_bind_address.is_some() || self.internal_unix_socket.is_some()
    }
}

/// Poll loop and chain reader settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorConfig {
    eth_rpc_url: String,
    poll_interval: Duration,
    matcher_workers: usize,
    start_block: Option<u64>,
    rpc_timeout: Duration,
    bloom_capacity: u64,
}

impl MonitorConfig {
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);
    pub const DEFAULT_MATCHER_WORKERS: usize = 10;
    pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(30);

    /// Loads configuration by hydrating `.env` (if present) and reading the
    /// process variables. Missing or malformed entries surface as
    /// `ConfigError` so binaries can refuse to start.
    pub fn load_from_env() -> Result<Self, ConfigError> {
        hydrate_env_file()?;

        let eth_rpc_url = get_required_var("ETH_RPC_URL")?;
        let poll_interval = get_parsed_var::<u64>("MONITOR_POLL_INTERVAL_MS")?
            .map(Duration::from_millis)
            .unwrap_or(Self::DEFAULT_POLL_INTERVAL);
        let matcher_workers = get_parsed_var::<usize>("MONITOR_MATCHER_WORKERS")?
            .unwrap_or(Self::DEFAULT_MATCHER_WORKERS);
        let start_block = get_parsed_var::<u64>("MONITOR_START_BLOCK")?;
        let rpc_timeout = get_parsed_var::<u64>("MONITOR_RPC_TIMEOUT_MS")?
            .map(Duration::from_millis)
            .unwrap_or(Self::DEFAULT_RPC_TIMEOUT);
        let bloom_capacity = get_parsed_var::<u64>("MONITOR_BLOOM_CAPACITY")?
            .unwrap_or(AddressBloom::DEFAULT_EXPECTED_ITEMS);

        Self::new(eth_rpc_url, poll_interval, matcher_workers)?
            .with_start_block(start_block)
            .with_rpc_timeout(rpc_timeout)?
            .with_bloom_capacity(bloom_capacity)
    }

    pub fn new(
        eth_rpc_url: impl Into<String>,
        poll_interval: Duration,
        matcher_workers: usize,
    ) -> Result<Self, ConfigError> {
        if matcher_workers == 0 {
            return Err(ConfigError::InvalidValue {
                key: "MONITOR_MATCHER_WORKERS",
                reason: "must be greater than zero",
            });
        }

        Ok(Self {
            eth_rpc_url: eth_rpc_url.into(),
            poll_interval,
            matcher_workers,
            start_block: None,
            rpc_timeout: Self::DEFAULT_RPC_TIMEOUT,
            bloom_capacity: AddressBloom::DEFAULT_EXPECTED_ITEMS,
        })
    }

    /// `Some(0)` is treated as unset: a zero cursor already means "start at
    /// the chain head".
    pub fn with_start_block(mut self, start_block: Option<u64>) -> Self {
        self.start_block = start_block.filter(|block| *block > 0);
        self
    }

    pub fn with_rpc_timeout(mut self, timeout: Duration) -> Result<Self, ConfigError> {
        if timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: "MONITOR_RPC_TIMEOUT_MS",
                reason: "must be greater than zero",
            });
        }
        self.rpc_timeout = timeout;
        Ok(self)
    }

    /// Expected number of subscribed addresses, used to size the bloom
    /// prefilter.
    pub fn with_bloom_capacity(mut self, capacity: u64) -> Result<Self, ConfigError> {
        if capacity == 0 {
            return Err(ConfigError::InvalidValue {
                key: "MONITOR_BLOOM_CAPACITY",
                reason: "must be greater than zero",
            });
        }
        self.bloom_capacity = capacity;
        Ok(self)
    }

    pub fn eth_rpc_url(&self) -> &str {
        &self.eth_rpc_url
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn matcher_workers(&self) -> usize {
        self.matcher_workers
    }

    pub fn start_block(&self) -> Option<u64> {
        self.start_block
    }

    pub fn rpc_timeout(&self) -> Duration {
        self.rpc_timeout
    }

    pub fn bloom_capacity(&self) -> u64 {
        self.bloom_capacity
    }
}

fn get_required_var(key: &'static str) -> Result<String, ConfigError> {
    get_optional_var(key).ok_or(ConfigError::MissingVar { key })
}

fn get_optional_var(key: &'static str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn get_parsed_var<T>(key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr<Err = std::num::ParseIntError>,
{
    get_optional_var(key)
        .map(|value| {
            value
                .parse()
                .map_err(|source| ConfigError::InvalidNumber { key, source })
        })
        .transpose()
}

pub fn hydrate_env_file() -> Result<(), ConfigError> {
    if env::var_os("TX_WATCH_SKIP_DOTENV").is_some() {
        return Ok(());
    }
    match dotenvy::dotenv() {
        Ok(_) => {}
        Err(dotenvy::Error::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => return Err(ConfigError::Dotenv { source: err }),
    }

    Ok(())
}

/// Errors emitted when `.env` hydration or environment parsing fails.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable `{key}`")]
    MissingVar { key: &'static str },
    #[error("invalid integer in `{key}`: {source}")]
    InvalidNumber {
        key: &'static str,
        #[source]
        source: std::num::ParseIntError,
    },
    #[error("invalid value for `{key}`: {reason}")]
    InvalidValue {
        key: &'static str,
        reason: &'static str,
    },
    #[error("failed to load .env file: {source}")]
    Dotenv {
        #[from]
        source: dotenvy::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_GUARD: Mutex<()> = Mutex::new(());

    fn set_env() {
        std::env::set_var("TX_WATCH_SKIP_DOTENV", "1");
        std::env::set_var("API_BIND_ADDRESS", "127.0.0.1:8080");
        std::env::remove_var("API_UNIX_SOCKET");
        std::env::remove_var("API_INTERNAL_BIND_ADDRESS");
        std::env::remove_var("API_INTERNAL_UNIX_SOCKET");
        std::env::set_var("ETH_RPC_URL", "http://localhost:8545");
        std::env::remove_var("MONITOR_POLL_INTERVAL_MS");
        std::env::remove_var("MONITOR_MATCHER_WORKERS");
        std::env::remove_var("MONITOR_START_BLOCK");
        std::env::remove_var("MONITOR_RPC_TIMEOUT_MS");
        std::env::remove_var("MONITOR_BLOOM_CAPACITY");
    }

    #[test]
    fn api_config_only_requires_api_env() {
        let _guard = ENV_GUARD.lock().unwrap();
        set_env();
        std::env::remove_var("ETH_RPC_URL");
        std::env::set_var("API_BIND_ADDRESS", "127.0.0.1:9999");

        let config = ApiConfig::load_from_env().expect("api config loads");
        assert_eq!(config.api_bind_address(), "127.0.0.1:9999");
        assert!(!config.has_internal_listener());

        set_env();
    }

    #[test]
    fn api_config_supports_unix_and_internal_listeners() {
        let _guard = ENV_GUARD.lock().unwrap();
        set_env();
        std::env::set_var("API_UNIX_SOCKET", "/tmp/api.sock");
        std::env::set_var("API_INTERNAL_BIND_ADDRESS", "127.0.0.1:9090");
        std::env::set_var("API_INTERNAL_UNIX_SOCKET", "/tmp/api-internal.sock");

        let config = ApiConfig::load_from_env().expect("config loads");
        assert_eq!(config.api_unix_socket(), Some("/tmp/api.sock"));
        assert_eq!(config.internal_bind_address(), Some("127.0.0.1:9090"));
        assert_eq!(
            config.internal_unix_socket(),
            Some("/tmp/api-internal.sock")
        );
        assert!(config.has_internal_listener());

        set_env();
    }

    #[test]
    fn required_env_vars_are_trimmed() {
        let _guard = ENV_GUARD.lock().unwrap();
        set_env();
        std::env::set_var("API_BIND_ADDRESS", " 127.0.0.1:8081 ");
        std::env::set_var("ETH_RPC_URL", "  http://node:8545  ");

        let api = ApiConfig::load_from_env().expect("config loads");
        assert_eq!(api.api_bind_address(), "127.0.0.1:8081");
        let monitor = MonitorConfig::load_from_env().expect("config loads");
        assert_eq!(monitor.eth_rpc_url(), "http://node:8545");

        set_env();
    }

    #[test]
    fn empty_required_env_var_is_treated_as_missing() {
        let _guard = ENV_GUARD.lock().unwrap();
        set_env();
        std::env::set_var("ETH_RPC_URL", "   ");

        let err = MonitorConfig::load_from_env().unwrap_err();
        assert!(matches!(err, ConfigError::MissingVar { key: "ETH_RPC_URL" }));

        set_env();
    }

    #[test]
    fn monitor_config_uses_defaults() {
        let _guard = ENV_GUARD.lock().unwrap();
        set_env();

        let config = MonitorConfig::load_from_env().expect("config loads");
        assert_eq!(config.poll_interval(), MonitorConfig::DEFAULT_POLL_INTERVAL);
        assert_eq!(config.matcher_workers(), MonitorConfig::DEFAULT_MATCHER_WORKERS);
        assert_eq!(config.start_block(), None);
        assert_eq!(config.rpc_timeout(), MonitorConfig::DEFAULT_RPC_TIMEOUT);
        assert_eq!(config.bloom_capacity(), AddressBloom::DEFAULT_EXPECTED_ITEMS);
    }

    #[test]
    fn monitor_config_reads_env() {
        let _guard = ENV_GUARD.lock().unwrap();
        set_env();
        std::env::set_var("MONITOR_POLL_INTERVAL_MS", "250");
        std::env::set_var("MONITOR_MATCHER_WORKERS", "4");
        std::env::set_var("MONITOR_START_BLOCK", "19000000");
        std::env::set_var("MONITOR_RPC_TIMEOUT_MS", "1500");
        std::env::set_var("MONITOR_BLOOM_CAPACITY", "5000000");

        let config = MonitorConfig::load_from_env().expect("config loads");
        assert_eq!(config.poll_interval(), Duration::from_millis(250));
        assert_eq!(config.matcher_workers(), 4);
        assert_eq!(config.start_block(), Some(19_000_000));
        assert_eq!(config.rpc_timeout(), Duration::from_millis(1500));
        assert_eq!(config.bloom_capacity(), 5_000_000);

        set_env();
    }

    #[test]
    fn monitor_config_rejects_bad_numbers() {
        let _guard = ENV_GUARD.lock().unwrap();
        set_env();
        std::env::set_var("MONITOR_START_BLOCK", "soon");

        let err = MonitorConfig::load_from_env().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidNumber {
                key: "MONITOR_START_BLOCK",
                ..
            }
        ));

        std::env::set_var("MONITOR_START_BLOCK", "1");
        std::env::set_var("MONITOR_MATCHER_WORKERS", "0");
        let err = MonitorConfig::load_from_env().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                key: "MONITOR_MATCHER_WORKERS",
                ..
            }
        ));

        set_env();
    }

    #[test]
    fn zero_start_block_means_unset() {
        let config = MonitorConfig::new("http://node", Duration::from_secs(1), 1)
            .map(|config| config.with_start_block(Some(0)))
            .expect("config builds");
        assert_eq!(config.start_block(), None);
    }

    #[test]
    fn monitor_config_rejects_zero_bloom_capacity() {
        let _guard = ENV_GUARD.lock().unwrap();
        set_env();
        std::env::set_var("MONITOR_BLOOM_CAPACITY", "0");

        let err = MonitorConfig::load_from_env().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                key: "MONITOR_BLOOM_CAPACITY",
                ..
            }
        ));

        set_env();
    }
}
