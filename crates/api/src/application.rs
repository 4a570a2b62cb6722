use std::{sync::Arc, thread};

use actix_web::{middleware::Logger, web, App, HttpServer};
use cfg_if::cfg_if;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{error, info};
use tx_watch_domain::config::{ApiConfig, ConfigError, MonitorConfig};
use tx_watch_domain::services::{
    bloom::{AddressBloom, BloomConfigError},
    telemetry::{init_telemetry, TelemetryConfig, TelemetryError},
};
use tx_watch_monitor::{build_rpc_client, run_monitor, MonitorError, TxWatcher, WatchService};
use tx_watch_storage::MemoryStorage;

use crate::{
    handlers::{
        current_block_handler, json_error_handler, metrics_handler, subscribe_handler,
        transactions_handler,
    },
    state::AppState,
};

/// Registers the public routes on `cfg`.
pub fn configure_public(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(json_error_handler))
        .route("/getCurrentBlock", web::get().to(current_block_handler))
        .route("/subscribe", web::post().to(subscribe_handler))
        .route(
            "/getTransactions/{address}",
            web::get().to(transactions_handler),
        );
}

pub async fn run() -> Result<(), BootstrapError> {
    let config = ApiConfig::load_from_env()?;
    let monitor_config = MonitorConfig::load_from_env()?;

    let telemetry_config = TelemetryConfig::from_env("API");
    let telemetry = init_telemetry(&telemetry_config)?;

    let storage = MemoryStorage::builder()
        .start_block(monitor_config.start_block())
        .bloom(
            monitor_config.bloom_capacity(),
            AddressBloom::DEFAULT_FALSE_POSITIVE_RATE,
        )
        .build()?;
    let reader = build_rpc_client(&monitor_config)?;
    let service: Arc<dyn WatchService> = Arc::new(TxWatcher::new(
        reader,
        storage.progress(),
        storage.subscriptions(),
        monitor_config.matcher_workers(),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let monitor = spawn_monitor(Arc::clone(&service), &monitor_config, shutdown_rx)?;
    info!(
        rpc_url = monitor_config.eth_rpc_url(),
        start_block = ?monitor_config.start_block(),
        workers = monitor_config.matcher_workers(),
        "monitor thread started"
    );

    let state = AppState::new(Arc::clone(&service), telemetry);
    let served = serve(&config, state).await;

    if shutdown_tx.send(true).is_err() {
        info!("monitor already stopped");
    }
    match tokio::task::spawn_blocking(move || monitor.join()).await {
        Ok(Ok(())) => {}
        Ok(Err(_)) => error!("monitor thread panicked"),
        Err(err) => error!(?err, "failed to join monitor thread"),
    }
    info!(last_block = service.current_block(), "shutdown complete");

    served
}

/// Runs the poll loop on a dedicated thread with its own multi-threaded
/// runtime, one worker thread per matcher.
fn spawn_monitor(
    service: Arc<dyn WatchService>,
    config: &MonitorConfig,
    shutdown: watch::Receiver<bool>,
) -> Result<thread::JoinHandle<()>, BootstrapError> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.matcher_workers())
        .thread_name("tx-watch-matcher")
        .enable_all()
        .build()?;
    let interval = config.poll_interval();

    let handle = thread::Builder::new()
        .name("tx-watch-monitor".into())
        .spawn(move || runtime.block_on(run_monitor(service, interval, shutdown)))?;
    Ok(handle)
}

async fn serve(config: &ApiConfig, state: AppState) -> Result<(), BootstrapError> {
    let include_metrics_on_public = !config.has_internal_listener();

    let public_state = state.clone();
    let mut public_server = HttpServer::new(move || {
        let mut app = App::new()
            .app_data(web::Data::new(public_state.clone()))
            .wrap(Logger::default())
            .configure(configure_public);

        if include_metrics_on_public {
            app = app.route("/metrics", web::get().to(metrics_handler));
        }

        app
    });

    if let Some(socket) = config.api_unix_socket() {
        ensure_uds_supported(socket)?;
        cleanup_socket(socket)?;
        #[cfg(unix)]
        {
            public_server = public_server.bind_uds(socket)?;
        }
    } else {
        public_server = public_server.bind(config.api_bind_address())?;
    }
    info!(
        bind = config.api_unix_socket().unwrap_or(config.api_bind_address()),
        "public listener bound"
    );
    let public_server = public_server.run();

    let internal_server = if config.has_internal_listener() {
        let internal_state = state.clone();
        let mut internal_server = HttpServer::new(move || {
            App::new()
                .app_data(web::Data::new(internal_state.clone()))
                .wrap(Logger::default())
                .route("/metrics", web::get().to(metrics_handler))
        });

        if let Some(socket) = config.internal_unix_socket() {
            ensure_uds_supported(socket)?;
            cleanup_socket(socket)?;
            #[cfg(unix)]
            {
                internal_server = internal_server.bind_uds(socket)?;
            }
        } else if let Some(addr) = config.internal_bind_address() {
            internal_server = internal_server.bind(addr)?;
        } else {
            return Err(BootstrapError::Io(std::io::Error::other(
                "internal listener configured but no bind target provided",
            )));
        }

        Some(internal_server.run())
    } else {
        None
    };

    if let Some(internal) = internal_server {
        tokio::try_join!(public_server, internal)?;
    } else {
        public_server.await?;
    }

    Ok(())
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),
    #[error("subscription filter error: {0}")]
    Bloom(#[from] BloomConfigError),
    #[error("monitor error: {0}")]
    Monitor(#[from] MonitorError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

cfg_if! {
    if #[cfg(unix)] {
        fn ensure_uds_supported(_socket: &str) -> std::io::Result<()> {
            Ok(())
        }

        /// Removes a stale socket file left by a previous run; binding fails
        /// otherwise.
        fn cleanup_socket(path: &str) -> std::io::Result<()> {
            let socket_path = std::path::Path::new(path);
            if socket_path.exists() {
                std::fs::remove_file(socket_path)?;
            }
            Ok(())
        }
    } else {
        fn ensure_uds_supported(socket: &str) -> std::io::Result<()> {
            Err(std::io::Error::other(format!(
                "unix socket '{socket}' requested but this platform does not support it"
            )))
        }

        fn cleanup_socket(_path: &str) -> std::io::Result<()> {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    #[cfg(unix)]
    #[actix_web::test]
    async fn cleanup_socket_removes_stale_file() {
        use super::cleanup_socket;

        let path = std::env::temp_dir().join(format!(
            "tx-watch-test-{}-{}.sock",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::SystemTime::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        std::fs::write(&path, b"stub").expect("write socket file");
        cleanup_socket(path.to_str().unwrap()).expect("cleanup succeeds");
        assert!(!path.exists());
    }

    #[cfg(unix)]
    #[test]
    fn cleanup_socket_ignores_missing_file() {
        let path = std::env::temp_dir().join("tx-watch-test-missing.sock");
        assert!(super::cleanup_socket(path.to_str().unwrap()).is_ok());
    }
}
