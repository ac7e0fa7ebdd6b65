use std::sync::Arc;

use crate::config::Config;
use crate::llm_client::CompletionProvider;

/// Shared application state injected into all route handlers via Axum extractors.
/// Read-only: requests never share mutable data.
#[derive(Clone)]
pub struct AppState {
    /// Model backend. `LlmClient` in production, a stub in tests.
    pub llm: Arc<dyn CompletionProvider>,
    pub config: Config,
}
