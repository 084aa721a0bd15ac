use std::sync::Arc;

use crate::config::Config;
use crate::llm_client::ProviderClientManager;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    /// Owner of the process-wide provider client. Every clone of the state
    /// shares the same manager, so there is at most one live client.
    pub provider: Arc<ProviderClientManager>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let provider = Arc::new(ProviderClientManager::new(config.provider_settings()));
        Self { config, provider }
    }
}
