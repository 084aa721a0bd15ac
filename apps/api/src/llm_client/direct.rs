//! Direct path: calls the provider with the credential held by this process.
//! Only valid inside the API server, never in an untrusted context.

use crate::llm_client::error::{classify, LlmError, ProviderFailure};
use crate::llm_client::normalize::normalize_messages;
use crate::llm_client::provider::{MessagesRequest, ProviderClientManager};
use crate::llm_client::types::{CompletionOptions, CompletionResult, Message, Prompt};

/// Generates a completion by calling the provider directly.
/// Every failure passes through `classify` before it is returned.
pub async fn generate_completion_direct(
    manager: &ProviderClientManager,
    prompt: impl Into<Prompt>,
    options: &CompletionOptions,
) -> Result<CompletionResult, LlmError> {
    let messages = prompt.into().into_messages();
    call_provider(manager, &messages, options)
        .await
        .map_err(classify)
}

async fn call_provider(
    manager: &ProviderClientManager,
    messages: &[Message],
    options: &CompletionOptions,
) -> Result<CompletionResult, ProviderFailure> {
    let normalized = normalize_messages(messages)?;
    let client = manager.get()?;
    let request = MessagesRequest::new(normalized, options);
    let response = client.create_message(&request).await?;
    Ok(response.into())
}
