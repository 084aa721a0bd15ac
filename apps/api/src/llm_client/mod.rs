//! LLM Client — the single point of entry for all Claude API calls.
//!
//! ARCHITECTURAL RULE: No other module may call the Anthropic API directly.
//! All LLM interactions MUST go through this module.
//!
//! Two call paths:
//! - proxy (`ProxyClient`): POSTs to this API's `/api/ai/*` endpoints and never
//!   sees the credential. Use it from anything outside the API process.
//! - direct (`generate_completion_direct`, `stream_completion_direct`): calls
//!   the provider with the credential held by `ProviderClientManager`. Server only.

pub mod direct;
pub mod error;
pub mod normalize;
pub mod provider;
pub mod proxy;
pub mod retry;
pub mod stream;
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

pub use direct::generate_completion_direct;
pub use error::{classify, ApiError, LlmError, NormalizedError, ProviderFailure};
pub use normalize::normalize_messages;
pub use provider::{ProviderClientManager, ProviderSettings, MODEL};
pub use proxy::{ProxyClient, ProxyRequest};
pub use retry::RetryPolicy;
pub use stream::{stream_completion_direct, CompletionStream, TextDeltaStream};
pub use types::{
    CompletionOptions, CompletionResult, ContentBlock, ImageSource, Message, MessageContent,
    Prompt, Role, ToolSpec, Usage,
};
