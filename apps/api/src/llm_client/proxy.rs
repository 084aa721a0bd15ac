//! Proxy path: sends completion requests to this API's own `/api/ai/*`
//! endpoints instead of the provider. Holds no credential, so it is the path
//! for any context that must not see one.

use std::time::Duration;

use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::llm_client::error::LlmError;
use crate::llm_client::retry::{with_retry, AttemptError, RetryPolicy};
use crate::llm_client::types::{CompletionOptions, CompletionResult, Message, Prompt};

pub const COMPLETION_PATH: &str = "/api/ai/completion";
pub const STREAM_PATH: &str = "/api/ai/stream";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// JSON body accepted by both proxy endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyRequest {
    pub messages: Vec<Message>,
    #[serde(flatten)]
    pub options: CompletionOptions,
}

impl ProxyRequest {
    pub fn new(prompt: impl Into<Prompt>, options: &CompletionOptions) -> Self {
        Self {
            messages: prompt.into().into_messages(),
            options: options.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ProxyErrorBody {
    message: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ProxyClient {
    http: Client,
    base_url: String,
    retry: RetryPolicy,
}

impl ProxyClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, LlmError> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self, LlmError> {
        let base_url: String = base_url.into();
        Ok(Self {
            http: Client::builder().timeout(timeout).build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// POSTs `body` to `path`, retrying connection failures. A non-2xx
    /// response is returned as `LlmError::Proxy` without retrying.
    pub(crate) async fn post(&self, path: &str, body: &ProxyRequest) -> Result<Response, LlmError> {
        let url = format!("{}{}", self.base_url, path);
        let url = url.as_str();

        let response = with_retry(&self.retry, || async move {
            self.http
                .post(url)
                .json(body)
                .send()
                .await
                .map_err(AttemptError::Transport)
        })
        .await?;

        if response.status().is_success() {
            Ok(response)
        } else {
            Err(proxy_error(response).await)
        }
    }

    /// Generates a completion through the backend proxy endpoint.
    pub async fn generate_completion(
        &self,
        prompt: impl Into<Prompt>,
        options: &CompletionOptions,
    ) -> Result<CompletionResult, LlmError> {
        let body = ProxyRequest::new(prompt, options);
        let response = self.post(COMPLETION_PATH, &body).await?;
        let text = response.text().await?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Runs `text` as the sole user message under `system_prompt`.
    /// Used for extraction-style calls such as job description analysis.
    pub async fn analyze_text(
        &self,
        text: &str,
        system_prompt: &str,
        options: &CompletionOptions,
    ) -> Result<CompletionResult, LlmError> {
        let options = CompletionOptions {
            system: Some(system_prompt.to_string()),
            ..options.clone()
        };
        self.generate_completion(text, &options).await
    }
}

async fn proxy_error(response: Response) -> LlmError {
    let status = response.status();
    let status_text = status.canonical_reason().unwrap_or("Unknown Status");
    let message = response
        .json::<ProxyErrorBody>()
        .await
        .ok()
        .and_then(|body| body.message)
        .filter(|message| !message.trim().is_empty())
        .unwrap_or_else(|| status_text.to_string());

    warn!(status = status.as_u16(), "Proxy completion request failed: {message}");
    LlmError::Proxy {
        status: status.as_u16(),
        message,
    }
}
