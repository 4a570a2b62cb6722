pub mod block;
pub mod metrics;
pub mod subscription;

pub use block::current_block_handler;
pub use metrics::metrics_handler;
pub use subscription::{subscribe_handler, transactions_handler};

use actix_web::{error::JsonPayloadError, http::StatusCode, HttpRequest, HttpResponse, ResponseError};
use serde::{Deserialize, Serialize};
use strum_macros::AsRefStr;
use thiserror::Error;

use tx_watch_domain::model::AddressFormatError;
use tx_watch_domain::storage::StorageError;
use tx_watch_monitor::ServiceError;

#[derive(Debug, Error, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum ApiError {
    #[error("invalid address")]
    InvalidAddress(#[source] AddressFormatError),
    #[error("address not subscribed")]
    NotSubscribed,
    #[error("no transactions")]
    NoTransactions,
    #[error("address already subscribed")]
    AlreadySubscribed,
    #[error("malformed request body: {0}")]
    MalformedBody(String),
    #[error("storage failure: {0}")]
    Storage(StorageError),
}

impl ApiError {
    /// Short, stable description sent next to the error text.
    pub fn message(&self) -> &'static str {
        match self {
            ApiError::InvalidAddress(_) => "invalid address",
            ApiError::NotSubscribed => "not found subscriber",
            ApiError::NoTransactions => "not found transactions",
            ApiError::AlreadySubscribed => "address already subscribed",
            ApiError::MalformedBody(_) => "malformed request",
            ApiError::Storage(_) => "internal error",
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(value: StorageError) -> Self {
        match value {
            StorageError::AlreadySubscribed => ApiError::AlreadySubscribed,
            StorageError::NoTransactions => ApiError::NoTransactions,
            other => ApiError::Storage(other),
        }
    }
}

impl From<ServiceError> for ApiError {
    fn from(value: ServiceError) -> Self {
        match value {
            ServiceError::InvalidAddress(err) => ApiError::InvalidAddress(err),
            ServiceError::AddressNotSubscribed => ApiError::NotSubscribed,
            ServiceError::Storage(err) => err.into(),
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidAddress(_) | ApiError::MalformedBody(_) => StatusCode::BAD_REQUEST,
            ApiError::NotSubscribed | ApiError::NoTransactions => StatusCode::NOT_FOUND,
            ApiError::AlreadySubscribed => StatusCode::CONFLICT,
            ApiError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorBody {
            error: self.to_string(),
            msg: self.message().to_string(),
        })
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub error: String,
    pub msg: String,
}

/// Routes JSON extractor failures through [`ApiError`] so every error body
/// has the same shape.
pub fn json_error_handler(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    ApiError::MalformedBody(err.to_string()).into()
}
