use crate::engines::Delegate;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Conversion from {0} is not supported")]
    UnsupportedConversion(String),

    #[error("{delegate} failed: {message}")]
    DelegateFailure { delegate: Delegate, message: String },

    #[error("Engine not available: {0}")]
    EngineUnavailable(String),

    #[error("No file selected")]
    NoFileSelected,

    #[error("No converted file to download")]
    NothingToDownload,

    #[error("Unknown session: {0}")]
    SessionNotFound(String),

    #[error("A conversion is already in progress")]
    ConversionInProgress,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn delegate(delegate: Delegate, message: impl ToString) -> Self {
        AppError::DelegateFailure {
            delegate,
            message: message.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::UnsupportedConversion(_) => StatusCode::BAD_REQUEST,
            AppError::DelegateFailure { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::EngineUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::NoFileSelected => StatusCode::BAD_REQUEST,
            AppError::NothingToDownload => StatusCode::NOT_FOUND,
            AppError::SessionNotFound(_) => StatusCode::NOT_FOUND,
            AppError::ConversionInProgress => StatusCode::CONFLICT,
            AppError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            AppError::IoError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": self.to_string(),
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
