use actix_web::{web, HttpResponse};
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::debug;
use tx_watch_domain::services::telemetry::API_REQUESTS_TOTAL;

use crate::state::AppState;

use super::ApiError;

#[derive(Debug, Deserialize, Serialize)]
pub struct SubscribeRequest {
    pub address: String,
}

pub async fn subscribe_handler(
    state: web::Data<AppState>,
    payload: web::Json<SubscribeRequest>,
) -> Result<HttpResponse, ApiError> {
    state
        .service()
        .subscribe(&payload.address)
        .await
        .map_err(ApiError::from)
        .inspect_err(|err| {
            debug!(address = %payload.address, %err, "subscribe rejected");
            record("subscribe", err.as_ref());
        })?;

    record("subscribe", "ok");
    Ok(HttpResponse::Ok().finish())
}

pub async fn transactions_handler(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let address = path.into_inner();
    let txs = state
        .service()
        .matched_transactions(&address)
        .await
        .map_err(ApiError::from)
        .inspect_err(|err| record("transactions", err.as_ref()))?;

    record("transactions", "ok");
    Ok(HttpResponse::Ok().json(txs))
}

fn record(endpoint: &'static str, status: &str) {
    counter!(API_REQUESTS_TOTAL, "endpoint" => endpoint, "status" => status.to_owned())
        .increment(1);
}
