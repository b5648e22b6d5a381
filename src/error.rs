use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Adapter for {0} is not ready")]
    AdapterNotReady(String),

    #[error("Adapter for {currency} unavailable: {reason}")]
    AdapterUnavailable { currency: String, reason: String },

    #[error("Transfer rejected by {currency} backend: {reason}")]
    TransferFailed { currency: String, reason: String },

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("No payout queue exists for owner {owner_id} and currency {currency}")]
    PayoutQueueMissing { owner_id: Uuid, currency: String },

    #[error("{0} not found")]
    NotFound(String),

    #[error("Project and form id mismatch")]
    ProjectFormMismatch,

    #[error("Unknown currency: {0}")]
    UnknownCurrency(String),

    #[error("Store error: {0}")]
    Store(String),
}

impl From<redis::RedisError> for GatewayError {
    fn from(err: redis::RedisError) -> Self {
        GatewayError::Store(err.to_string())
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        GatewayError::Store(format!("serialization: {}", err))
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub error_code: String,
    pub timestamp: chrono::DateTime<Utc>,
    pub request_id: String,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let request_id = Uuid::new_v4().to_string();

        let (status, error_code) = match &self {
            GatewayError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            GatewayError::ProjectFormMismatch => (StatusCode::BAD_REQUEST, "PROJECT_FORM_MISMATCH"),
            GatewayError::ValidationFailed(_) => (StatusCode::BAD_REQUEST, "VALIDATION_FAILED"),
            GatewayError::UnknownCurrency(_) => (StatusCode::BAD_REQUEST, "UNKNOWN_CURRENCY"),
            GatewayError::AdapterNotReady(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "ADAPTER_NOT_READY")
            }
            GatewayError::AdapterUnavailable { .. } => {
                (StatusCode::BAD_GATEWAY, "ADAPTER_UNAVAILABLE")
            }
            GatewayError::TransferFailed { .. } => (StatusCode::BAD_GATEWAY, "TRANSFER_FAILED"),
            GatewayError::PayoutQueueMissing { .. } => {
                (StatusCode::CONFLICT, "PAYOUT_QUEUE_MISSING")
            }
            GatewayError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };

        let body = ErrorResponse {
            success: false,
            error: self.to_string(),
            error_code: error_code.to_string(),
            timestamp: Utc::now(),
            request_id,
        };

        tracing::error!(
            error = ?self,
            error_code = error_code,
            "Request failed"
        );

        (status, Json(body)).into_response()
    }
}
