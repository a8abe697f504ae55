use crate::services::storage::StorageError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Payload Too Large: {0}")]
    PayloadTooLarge(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Transform failed: {0}")]
    Transform(String),

    #[error("Transform timed out after {0:?}")]
    TransformTimeout(Duration),

    #[error("Delivery failed: {0}")]
    Delivery(String),
}

impl From<StorageError> for AppError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::TooLarge { .. } => AppError::PayloadTooLarge(e.to_string()),
            StorageError::Upload(_) => AppError::BadRequest(e.to_string()),
            StorageError::Area { .. } | StorageError::Write(_) => AppError::Storage(e.to_string()),
        }
    }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::Storage(_)
            | AppError::Transform(_)
            | AppError::TransformTimeout(_)
            | AppError::Delivery(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            AppError::BadRequest(msg) => msg,
            AppError::PayloadTooLarge(msg) => msg,
            AppError::Storage(msg) => {
                tracing::error!("Storage error: {}", msg);
                "Failed to store upload".to_string()
            }
            AppError::Transform(msg) => msg,
            AppError::TransformTimeout(after) => {
                tracing::error!("Transform timed out after {:?}", after);
                format!("Transform timed out after {:?}", after)
            }
            AppError::Delivery(msg) => {
                tracing::error!("Delivery error: {}", msg);
                "Failed to deliver transformed file".to_string()
            }
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}
