use std::time::Duration;

use anyhow::{Context, Result};

use crate::llm_client::provider::{ProviderSettings, API_KEY_ENV, DEFAULT_BASE_URL};

/// Application configuration loaded from environment variables.
///
/// The Anthropic key is deliberately absent: `ProviderClientManager` reads it
/// the first time a direct-path call needs it.
#[derive(Debug, Clone)]
pub struct Config {
    pub anthropic_base_url: String,
    pub anthropic_max_retries: u32,
    pub llm_request_timeout_secs: u64,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            anthropic_base_url: std::env::var("ANTHROPIC_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            anthropic_max_retries: parse_env("ANTHROPIC_MAX_RETRIES", 2)?,
            llm_request_timeout_secs: parse_env("LLM_REQUEST_TIMEOUT_SECS", 120)?,
            port: parse_env("PORT", 8080)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }

    pub fn provider_settings(&self) -> ProviderSettings {
        ProviderSettings {
            api_key_env: API_KEY_ENV.to_string(),
            base_url: self.anthropic_base_url.clone(),
            max_retries: self.anthropic_max_retries,
            request_timeout: Duration::from_secs(self.llm_request_timeout_secs),
        }
    }
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .with_context(|| format!("Environment variable '{key}' has an invalid value: {raw}")),
        Err(_) => Ok(default),
    }
}
