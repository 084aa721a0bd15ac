//! Error taxonomy for the completion layer and the classifier that every
//! direct-path failure passes through.

use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// Provider name used in log lines.
pub const PROVIDER_NAME: &str = "Anthropic";

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("{0} not set in environment")]
    Configuration(String),

    #[error("Unsupported image source type")]
    UnsupportedImageSource,

    #[error("Network error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Anthropic API error ({}): {}", .0.status, .0.message)]
    Api(ApiError),

    #[error("Anthropic API error: {status} - {message}")]
    Proxy { status: u16, message: String },

    #[error("{0}")]
    Unknown(String),

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("LLM returned empty content")]
    EmptyContent,
}

/// A well-formed provider error response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: u16,
    pub error_type: Option<String>,
    pub message: String,
    pub request_id: Option<String>,
}

/// The flat error shape handed to callers and written into proxy error bodies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedError {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl LlmError {
    /// HTTP status attached to the failure, if one was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            LlmError::Api(api) => Some(api.status),
            LlmError::Proxy { status, .. } => Some(*status),
            LlmError::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    pub fn normalized(&self) -> NormalizedError {
        let (error_type, request_id) = match self {
            LlmError::Api(api) => (api.error_type.clone(), api.request_id.clone()),
            _ => (None, None),
        };
        NormalizedError {
            message: self.to_string(),
            status: self.status(),
            error_type,
            request_id,
        }
    }

    /// Rate limits and connectivity failures are worth a user-initiated retry.
    pub fn is_retryable_by_caller(&self) -> bool {
        matches!(self, LlmError::Transport(_)) || self.status() == Some(429)
    }
}

/// A failure caught on the direct path, before classification.
#[derive(Debug)]
pub enum ProviderFailure {
    /// The provider answered with its error envelope.
    Api(ApiError),
    /// Any typed error raised on our side of the call.
    Error(LlmError),
    /// Something we could not interpret, kept in string form.
    Unknown(String),
}

impl From<LlmError> for ProviderFailure {
    fn from(err: LlmError) -> Self {
        ProviderFailure::Error(err)
    }
}

/// Maps a caught failure to the error returned to the caller, logging it.
///
/// Typed errors come back untouched so callers can still match on them.
pub fn classify(failure: ProviderFailure) -> LlmError {
    match failure {
        ProviderFailure::Api(api) => {
            error!(
                status = api.status,
                error_type = api.error_type.as_deref().unwrap_or("unknown"),
                request_id = api.request_id.as_deref().unwrap_or("none"),
                "{PROVIDER_NAME} API error ({}): {}",
                api.status,
                api.message
            );
            LlmError::Api(api)
        }
        ProviderFailure::Error(err) => {
            error!("{PROVIDER_NAME} error: {err}");
            err
        }
        ProviderFailure::Unknown(value) => {
            error!(unknown = true, "Unknown {PROVIDER_NAME} error: {value}");
            LlmError::Unknown(value)
        }
    }
}
