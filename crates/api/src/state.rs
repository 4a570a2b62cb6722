use std::sync::Arc;

use tx_watch_domain::services::telemetry::TelemetryGuard;
use tx_watch_monitor::WatchService;

#[derive(Clone)]
pub struct AppState {
    service: Arc<dyn WatchService>,
    telemetry: TelemetryGuard,
}

impl AppState {
    pub fn new(service: Arc<dyn WatchService>, telemetry: TelemetryGuard) -> Self {
        Self { service, telemetry }
    }

    pub fn service(&self) -> &dyn WatchService {
        self.service.as_ref()
    }

    pub fn telemetry(&self) -> &TelemetryGuard {
        &self.telemetry
    }
}
