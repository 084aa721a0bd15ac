//! Anthropic Messages API client and the manager that owns the single cached
//! instance of it.
//!
//! The credential is read when the client is first needed, not at start-up,
//! so the API can boot (and serve health checks) without one.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::llm_client::error::{ApiError, LlmError, ProviderFailure};
use crate::llm_client::normalize::ProviderMessage;
use crate::llm_client::retry::{with_retry, AttemptError, RetryPolicy};
use crate::llm_client::types::{CompletionOptions, CompletionResult, ResultBlock, ToolSpec, Usage};

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";
/// Environment variable holding the provider credential.
pub const API_KEY_ENV: &str = "ANTHROPIC_API_KEY";
/// Model used when a call does not name one.
pub const MODEL: &str = "claude-sonnet-4-5";
/// The Messages API requires `max_tokens`; used when a call leaves it unset.
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub api_key_env: String,
    pub base_url: String,
    pub max_retries: u32,
    pub request_timeout: Duration,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            api_key_env: API_KEY_ENV.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            max_retries: 2,
            request_timeout: Duration::from_secs(120),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Wire types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<ProviderMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop_sequences: Option<&'a [String]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_k: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<&'a [ToolSpec]>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

impl<'a> MessagesRequest<'a> {
    pub fn new(messages: Vec<ProviderMessage>, options: &'a CompletionOptions) -> Self {
        Self {
            model: options.model.as_deref().unwrap_or(MODEL),
            max_tokens: options.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            messages,
            system: options.system.as_deref(),
            temperature: options.temperature,
            stop_sequences: options.stop_sequences.as_deref(),
            top_k: options.top_k,
            top_p: options.top_p,
            tools: options.tools.as_deref(),
            stream: false,
        }
    }

    pub fn streaming(mut self) -> Self {
        self.stream = true;
        self
    }
}

/// Raw Messages API response, in the provider's snake_case spelling.
#[derive(Debug, Deserialize)]
pub struct MessagesResponse {
    pub id: String,
    #[serde(rename = "type")]
    pub response_type: String,
    pub role: String,
    pub content: Vec<ResultBlock>,
    pub model: String,
    pub stop_reason: Option<String>,
    pub stop_sequence: Option<String>,
    pub usage: ProviderUsage,
}

#[derive(Debug, Deserialize)]
pub struct ProviderUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl From<MessagesResponse> for CompletionResult {
    fn from(response: MessagesResponse) -> Self {
        CompletionResult {
            id: response.id,
            result_type: response.response_type,
            role: response.role,
            content: response.content,
            model: response.model,
            stop_reason: response.stop_reason,
            stop_sequence: response.stop_sequence,
            usage: Usage {
                input_tokens: response.usage.input_tokens,
                output_tokens: response.usage.output_tokens,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(rename = "type")]
    pub(crate) error_type: Option<String>,
    pub(crate) message: String,
}

// ────────────────────────────────────────────────────────────────────────────
// Client
// ────────────────────────────────────────────────────────────────────────────

/// Holds the credential. Only ever constructed by `ProviderClientManager`.
pub struct AnthropicClient {
    http: Client,
    api_key: String,
    base_url: String,
    retry: RetryPolicy,
}

impl std::fmt::Debug for AnthropicClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicClient")
            .field("base_url", &self.base_url)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl AnthropicClient {
    fn from_settings(settings: &ProviderSettings) -> Result<Self, LlmError> {
        let api_key = std::env::var(&settings.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| LlmError::Configuration(settings.api_key_env.clone()))?;

        let http = Client::builder()
            .timeout(settings.request_timeout)
            .build()?;

        Ok(Self {
            http,
            api_key,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            retry: RetryPolicy::with_retries(settings.max_retries),
        })
    }

    fn post(&self, request: &MessagesRequest<'_>) -> RequestBuilder {
        self.http
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(request)
    }

    /// Sends the request, retrying connection failures. Any response that
    /// arrives, successful or not, ends the retry loop.
    async fn send(&self, request: &MessagesRequest<'_>) -> Result<Response, ProviderFailure> {
        let response = with_retry(&self.retry, || async move {
            self.post(request)
                .send()
                .await
                .map_err(AttemptError::Transport)
        })
        .await?;

        if response.status().is_success() {
            Ok(response)
        } else {
            Err(failure_from_response(response).await)
        }
    }

    /// Creates a message and waits for the whole completion.
    pub async fn create_message(
        &self,
        request: &MessagesRequest<'_>,
    ) -> Result<MessagesResponse, ProviderFailure> {
        let response = self.send(request).await?;
        let body = response.text().await.map_err(LlmError::Transport)?;
        let message: MessagesResponse = serde_json::from_str(&body).map_err(LlmError::Parse)?;

        debug!(
            "LLM call succeeded: input_tokens={}, output_tokens={}",
            message.usage.input_tokens, message.usage.output_tokens
        );

        Ok(message)
    }

    /// Opens a server-sent-event stream for a request built with `streaming()`.
    pub async fn open_stream(
        &self,
        request: &MessagesRequest<'_>,
    ) -> Result<Response, ProviderFailure> {
        self.send(request).await
    }
}

/// Splits a non-2xx response into a recognized provider error or an
/// unclassifiable one.
async fn failure_from_response(response: Response) -> ProviderFailure {
    let status = response.status();
    let request_id = response
        .headers()
        .get("request-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let body = match response.text().await {
        Ok(body) => body,
        Err(e) => return ProviderFailure::Error(LlmError::Transport(e)),
    };

    match serde_json::from_str::<ErrorEnvelope>(&body) {
        Ok(envelope) => ProviderFailure::Api(ApiError {
            status: status.as_u16(),
            error_type: envelope.error.error_type,
            message: envelope.error.message,
            request_id,
        }),
        Err(_) if body.trim().is_empty() => ProviderFailure::Unknown(status.to_string()),
        Err(_) => ProviderFailure::Unknown(body),
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Lifecycle
// ────────────────────────────────────────────────────────────────────────────

/// Owns the one live `AnthropicClient`, built lazily on first use.
///
/// Two callers racing on first use may both build a client; the last one
/// stored wins. Construction has no side effects beyond the slot itself.
#[derive(Debug)]
pub struct ProviderClientManager {
    settings: ProviderSettings,
    slot: RwLock<Option<Arc<AnthropicClient>>>,
}

impl ProviderClientManager {
    pub fn new(settings: ProviderSettings) -> Self {
        Self {
            settings,
            slot: RwLock::new(None),
        }
    }

    /// Returns the cached client, constructing it if needed.
    /// Fails with `LlmError::Configuration` if the credential is not set.
    pub fn get(&self) -> Result<Arc<AnthropicClient>, LlmError> {
        if let Some(client) = self
            .slot
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .as_ref()
        {
            return Ok(Arc::clone(client));
        }

        let client = Arc::new(AnthropicClient::from_settings(&self.settings)?);
        *self
            .slot
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(Arc::clone(&client));

        info!(
            base_url = %self.settings.base_url,
            max_retries = self.settings.max_retries,
            "Anthropic client initialized"
        );
        Ok(client)
    }

    /// Drops the cached client. The next `get()` rebuilds it and re-reads the credential.
    pub fn reset(&self) {
        let previous = self
            .slot
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if previous.is_some() {
            info!("Anthropic client reset");
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::llm_client::test_support::{manager_for, message_response};
    use crate::llm_client::types::Message;

    fn user_messages(text: &str) -> Vec<ProviderMessage> {
        crate::llm_client::normalize::normalize_messages(&[Message::user(text)]).unwrap()
    }

    #[test]
    fn test_get_returns_cached_instance() {
        let manager = manager_for("http://localhost:1", "TAILOR_TEST_KEY_CACHED");
        let first = manager.get().unwrap();
        let second = manager.get().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_reset_discards_cached_instance() {
        let manager = manager_for("http://localhost:1", "TAILOR_TEST_KEY_RESET");
        let first = manager.get().unwrap();
        manager.reset();
        let second = manager.get().unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_missing_credential_is_configuration_error() {
        let manager = ProviderClientManager::new(ProviderSettings {
            api_key_env: "TAILOR_TEST_KEY_NEVER_SET".to_string(),
            ..ProviderSettings::default()
        });
        let err = manager.get().unwrap_err();
        assert!(matches!(err, LlmError::Configuration(_)));
        assert_eq!(err.to_string(), "TAILOR_TEST_KEY_NEVER_SET not set in environment");
    }

    #[test]
    fn test_request_translates_option_names() {
        let options = CompletionOptions {
            temperature: Some(0.2),
            max_tokens: Some(256),
            system: Some("Be precise".to_string()),
            stop_sequences: Some(vec!["</json>".to_string()]),
            top_k: Some(40),
            ..Default::default()
        };
        let value = serde_json::to_value(MessagesRequest::new(user_messages("hi"), &options)).unwrap();

        assert_eq!(value["model"], MODEL);
        assert_eq!(value["max_tokens"], 256);
        assert_eq!(value["system"], "Be precise");
        assert_eq!(value["stop_sequences"], json!(["</json>"]));
        assert_eq!(value["top_k"], 40);
        assert!(value.get("top_p").is_none());
        assert!(value.get("tools").is_none());
        assert!(value.get("stream").is_none());
    }

    #[tokio::test]
    async fn test_create_message_sends_credential_headers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "sk-test"))
            .and(header("anthropic-version", ANTHROPIC_VERSION))
            .and(body_partial_json(json!({"max_tokens": DEFAULT_MAX_TOKENS})))
            .respond_with(ResponseTemplate::new(200).set_body_json(message_response("Hello")))
            .expect(1)
            .mount(&server)
            .await;

        let manager = manager_for(&server.uri(), "TAILOR_TEST_KEY_HEADERS");
        let client = manager.get().unwrap();
        let options = CompletionOptions::default();
        let response = client
            .create_message(&MessagesRequest::new(user_messages("Hi"), &options))
            .await
            .unwrap();

        assert_eq!(response.usage.output_tokens, 5);
        assert_eq!(response.stop_reason.as_deref(), Some("end_turn"));
    }

    #[tokio::test]
    async fn test_error_envelope_becomes_api_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(
                ResponseTemplate::new(429)
                    .insert_header("request-id", "req123")
                    .set_body_json(json!({
                        "type": "error",
                        "error": {"type": "rate_limit_error", "message": "Too many requests"}
                    })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let manager = manager_for(&server.uri(), "TAILOR_TEST_KEY_ENVELOPE");
        let client = manager.get().unwrap();
        let options = CompletionOptions::default();
        let failure = client
            .create_message(&MessagesRequest::new(user_messages("Hi"), &options))
            .await
            .unwrap_err();

        match failure {
            ProviderFailure::Api(api) => {
                assert_eq!(api.status, 429);
                assert_eq!(api.error_type.as_deref(), Some("rate_limit_error"));
                assert_eq!(api.message, "Too many requests");
                assert_eq!(api.request_id.as_deref(), Some("req123"));
            }
            other => panic!("expected API failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unparseable_error_body_is_unknown_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(502).set_body_string("upstream unavailable"))
            .mount(&server)
            .await;

        let manager = manager_for(&server.uri(), "TAILOR_TEST_KEY_UNKNOWN");
        let client = manager.get().unwrap();
        let options = CompletionOptions::default();
        let failure = client
            .create_message(&MessagesRequest::new(user_messages("Hi"), &options))
            .await
            .unwrap_err();

        assert!(matches!(failure, ProviderFailure::Unknown(ref body) if body == "upstream unavailable"));
    }
}
