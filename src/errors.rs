use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::services::admission::AdmissionError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("invalid input: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("{}", .0.join(" "))]
    Conflict(Vec<String>),

    #[error("{0}")]
    PastOrOutOfRange(String),

    #[error("unauthorized")]
    Unauthorized,
}

impl From<AdmissionError> for AppError {
    fn from(e: AdmissionError) -> Self {
        match e {
            AdmissionError::Validation(m) => AppError::Validation(m),
            AdmissionError::NotFound(m) => AppError::NotFound(m),
            AdmissionError::Conflict { messages } => AppError::Conflict(messages),
            AdmissionError::PastOrOutOfRange(m) => AppError::PastOrOutOfRange(m),
            AdmissionError::Storage(e) => AppError::Storage(e.to_string()),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(e: anyhow::Error) -> Self {
        AppError::Storage(e.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::PastOrOutOfRange(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
        };

        // Conflicts keep every specific reason so the guest can pick a
        // different time with full information.
        let body = match &self {
            AppError::Conflict(messages) => serde_json::json!({
                "error": self.to_string(),
                "conflicts": messages,
            }),
            _ => serde_json::json!({ "error": self.to_string() }),
        };
        (status, axum::Json(body)).into_response()
    }
}
