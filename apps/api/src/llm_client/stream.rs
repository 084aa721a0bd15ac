//! Streaming channel.
//!
//! Both stream types are pull-based and single-use: the caller polls at its
//! own pace, and dropping the stream abandons it. Nothing is retried once
//! bytes start flowing, since a replayed generation would not match what was
//! already delivered.

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::stream::{BoxStream, Stream, StreamExt};
use reqwest::Response;
use serde::Deserialize;

use crate::llm_client::error::{classify, ApiError, LlmError, ProviderFailure};
use crate::llm_client::normalize::normalize_messages;
use crate::llm_client::provider::{ErrorBody, MessagesRequest, ProviderClientManager};
use crate::llm_client::proxy::{ProxyClient, ProxyRequest, STREAM_PATH};
use crate::llm_client::types::{CompletionOptions, Message, Prompt};

/// Raw completion bytes delivered by the proxy streaming endpoint.
pub struct CompletionStream {
    inner: BoxStream<'static, Result<Bytes, LlmError>>,
}

impl CompletionStream {
    fn new<S>(inner: S) -> Self
    where
        S: Stream<Item = Result<Bytes, LlmError>> + Send + 'static,
    {
        Self {
            inner: inner.boxed(),
        }
    }

    /// Drains the stream into a single string.
    pub async fn collect_text(mut self) -> Result<String, LlmError> {
        let mut buf = Vec::new();
        while let Some(chunk) = self.inner.next().await {
            buf.extend_from_slice(&chunk?);
        }
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}

impl Stream for CompletionStream {
    type Item = Result<Bytes, LlmError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().inner.poll_next_unpin(cx)
    }
}

impl std::fmt::Debug for CompletionStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionStream").finish_non_exhaustive()
    }
}

impl ProxyClient {
    /// Opens a streaming completion through the backend proxy.
    ///
    /// Errors before the first byte use the same format as
    /// `generate_completion`; later failures arrive as stream items.
    pub async fn stream_completion(
        &self,
        prompt: impl Into<Prompt>,
        options: &CompletionOptions,
    ) -> Result<CompletionStream, LlmError> {
        let body = ProxyRequest::new(prompt, options);
        let response = self.post(STREAM_PATH, &body).await?;
        Ok(CompletionStream::new(
            response
                .bytes_stream()
                .map(|chunk| chunk.map_err(LlmError::Transport)),
        ))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Direct streaming (server side)
// ────────────────────────────────────────────────────────────────────────────

/// Text deltas parsed from the provider's server-sent events.
pub type TextDeltaStream = BoxStream<'static, Result<String, LlmError>>;

/// Streams a completion straight from the provider. Trusted contexts only.
pub async fn stream_completion_direct(
    manager: &ProviderClientManager,
    prompt: impl Into<Prompt>,
    options: &CompletionOptions,
) -> Result<TextDeltaStream, LlmError> {
    let messages = prompt.into().into_messages();
    let response = open_provider_stream(manager, &messages, options)
        .await
        .map_err(classify)?;

    Ok(text_deltas(response.bytes_stream()).boxed())
}

async fn open_provider_stream(
    manager: &ProviderClientManager,
    messages: &[Message],
    options: &CompletionOptions,
) -> Result<Response, ProviderFailure> {
    let normalized = normalize_messages(messages)?;
    let client = manager.get()?;
    let request = MessagesRequest::new(normalized, options).streaming();
    client.open_stream(&request).await
}

#[derive(Debug, Deserialize)]
struct StreamEvent {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    delta: Option<Delta>,
    #[serde(default)]
    error: Option<ErrorBody>,
}

#[derive(Debug, Deserialize)]
struct Delta {
    #[serde(default)]
    text: Option<String>,
}

/// Documented HTTP status for each provider error type, used for errors that
/// arrive inside an already-open stream.
fn status_for_error_type(error_type: Option<&str>) -> u16 {
    match error_type {
        Some("invalid_request_error") => 400,
        Some("authentication_error") => 401,
        Some("permission_error") => 403,
        Some("not_found_error") => 404,
        Some("request_too_large") => 413,
        Some("rate_limit_error") => 429,
        Some("overloaded_error") => 529,
        _ => 500,
    }
}

/// Parses an SSE byte stream into text deltas. Ends at `message_stop` or at
/// the first error. A body that closes before `message_stop` yields an error,
/// since the generation was cut short.
fn text_deltas<S, E>(bytes: S) -> impl Stream<Item = Result<String, LlmError>> + Send + 'static
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Into<LlmError> + Send + 'static,
{
    async_stream::stream! {
        let mut bytes = Box::pin(bytes);
        let mut line_buf: Vec<u8> = Vec::new();

        while let Some(chunk) = bytes.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    yield Err(e.into());
                    return;
                }
            };
            line_buf.extend_from_slice(&chunk);

            while let Some(pos) = line_buf.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = line_buf.drain(..=pos).collect();
                let line = String::from_utf8_lossy(&line);
                let data = match line.trim().strip_prefix("data:") {
                    Some(data) => data,
                    None => continue,
                };
                let event: StreamEvent = match serde_json::from_str(data.trim()) {
                    Ok(event) => event,
                    Err(_) => continue,
                };

                match event.event_type.as_str() {
                    "content_block_delta" => {
                        if let Some(text) = event.delta.and_then(|d| d.text) {
                            yield Ok(text);
                        }
                    }
                    "error" => {
                        let body = event.error.unwrap_or(ErrorBody {
                            error_type: None,
                            message: "stream error".to_string(),
                        });
                        yield Err(classify(ProviderFailure::Api(ApiError {
                            status: status_for_error_type(body.error_type.as_deref()),
                            error_type: body.error_type,
                            message: body.message,
                            request_id: None,
                        })));
                        return;
                    }
                    "message_stop" => return,
                    _ => {}
                }
            }
        }

        yield Err(LlmError::Unknown(
            "Stream ended before message_stop".to_string(),
        ));
    }
}
