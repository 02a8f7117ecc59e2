use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Application-wide error type
///
/// The first six variants are the streaming pipeline's own failure modes;
/// each has a fixed recovery policy (see `stream::client`). None of them is
/// fatal to the process.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Codec not found: {0}")]
    CodecNotFound(String),

    #[error("Encoder backend init failed: {0}")]
    BackendInitFailed(String),

    #[error("Frame conversion failed: {0}")]
    ConversionFailed(String),

    #[error("Transport write failed: {0}")]
    TransportWriteFailed(String),

    #[error("Malformed control message: {0}")]
    MalformedControlMessage(String),

    #[error("Invalid capture binding: {0}")]
    InvalidCaptureBinding(String),

    #[error("Encoding failed: {0}")]
    EncodeFailed(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AppError {
    /// Errors that only affect the current frame; the pipeline keeps going.
    pub fn is_frame_local(&self) -> bool {
        matches!(self, AppError::ConversionFailed(_) | AppError::EncodeFailed(_))
    }

    /// Errors that mean the remote end is gone.
    pub fn is_transport(&self) -> bool {
        matches!(self, AppError::TransportWriteFailed(_))
    }
}

/// Error response body (unified success format)
#[derive(Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub message: String,
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) | AppError::CodecNotFound(_) => StatusCode::NOT_FOUND,
            AppError::MalformedControlMessage(_) | AppError::Config(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            success: false,
            message: self.to_string(),
        };

        tracing::error!(
            error_type = std::any::type_name_of_val(&self),
            error_message = %body.message,
            "Request failed"
        );

        (status, Json(body)).into_response()
    }
}

/// Result type alias used throughout the crate
pub type Result<T> = std::result::Result<T, AppError>;
