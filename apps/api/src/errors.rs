use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::llm_client::LlmError;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),
}

impl AppError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            AppError::Llm(err) => match err {
                LlmError::UnsupportedImageSource => (StatusCode::BAD_REQUEST, "FORMAT_ERROR"),
                LlmError::Configuration(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "CONFIGURATION_ERROR")
                }
                LlmError::Api(api) => (
                    StatusCode::from_u16(api.status).unwrap_or(StatusCode::BAD_GATEWAY),
                    "PROVIDER_API_ERROR",
                ),
                LlmError::Proxy { status, .. } => (
                    StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY),
                    "PROVIDER_API_ERROR",
                ),
                LlmError::Transport(_) => (StatusCode::BAD_GATEWAY, "TRANSPORT_ERROR"),
                LlmError::Unknown(_) | LlmError::Parse(_) | LlmError::EmptyContent => {
                    (StatusCode::BAD_GATEWAY, "LLM_ERROR")
                }
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        // Normalized error fields plus a stable `code`.
        let body = match &self {
            AppError::Validation(msg) => json!({ "code": code, "message": msg }),
            AppError::Llm(err) => {
                if status.is_server_error() {
                    tracing::error!("LLM error: {err}");
                } else {
                    tracing::warn!("LLM error: {err}");
                }
                let mut body = json!(err.normalized());
                // The proxy client adds its own prefix; send the provider's text.
                if let LlmError::Api(api) = err {
                    body["message"] = json!(api.message);
                }
                body["code"] = json!(code);
                body
            }
        };

        (status, Json(body)).into_response()
    }
}
