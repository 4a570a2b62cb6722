use actix_web::{web, HttpResponse};
use metrics::counter;
use serde::{Deserialize, Serialize};
use tx_watch_domain::services::telemetry::API_REQUESTS_TOTAL;

use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentBlockResponse {
    pub current_block_height: u64,
}

pub async fn current_block_handler(state: web::Data<AppState>) -> HttpResponse {
    let current_block_height = state.service().current_block();
    counter!(API_REQUESTS_TOTAL, "endpoint" => "current_block", "status" => "ok").increment(1);
    HttpResponse::Ok().json(CurrentBlockResponse {
        current_block_height,
    })
}
