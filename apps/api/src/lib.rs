//! Résumé tailoring API: the AI completion layer and the HTTP endpoints that
//! expose it to clients without the provider credential.

pub mod config;
pub mod errors;
pub mod llm_client;
pub mod routes;
pub mod state;
