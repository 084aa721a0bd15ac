//! Backend half of the proxy path. These handlers run the direct path inside
//! the API process, which is the only place that holds the credential.

use axum::{
    body::Body,
    extract::State,
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use futures::StreamExt;
use tracing::{error, info};

use crate::errors::AppError;
use crate::llm_client::{
    generate_completion_direct, stream_completion_direct, CompletionResult, ProxyRequest,
};
use crate::state::AppState;

/// POST /api/ai/completion
///
/// Runs a completion and returns the canonical `CompletionResult`.
pub async fn handle_completion(
    State(state): State<AppState>,
    Json(request): Json<ProxyRequest>,
) -> Result<Json<CompletionResult>, AppError> {
    validate(&request)?;

    let result =
        generate_completion_direct(&state.provider, request.messages, &request.options).await?;

    info!(
        "Completion {} finished: input_tokens={}, output_tokens={}",
        result.id, result.usage.input_tokens, result.usage.output_tokens
    );
    Ok(Json(result))
}

/// POST /api/ai/stream
///
/// Streams completion text as a chunked `text/plain` body. Errors after the
/// first chunk abort the response body.
pub async fn handle_stream(
    State(state): State<AppState>,
    Json(request): Json<ProxyRequest>,
) -> Result<Response, AppError> {
    validate(&request)?;

    let deltas =
        stream_completion_direct(&state.provider, request.messages, &request.options).await?;

    let body = Body::from_stream(deltas.inspect(|item| {
        if let Err(e) = item {
            error!("Completion stream failed mid-response: {e}");
        }
    }));

    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        body,
    )
        .into_response())
}

fn validate(request: &ProxyRequest) -> Result<(), AppError> {
    if request.messages.is_empty() {
        return Err(AppError::Validation("messages cannot be empty".to_string()));
    }
    Ok(())
}
