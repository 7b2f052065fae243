use std::sync::Arc;

use supporthive_core::{ChatAgent, Services, SupportConfig};
use supporthive_knowledge::DocumentLoader;
use supporthive_search::WebSearchClient;

/// Shared application state accessible from all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<SupportConfig>,
    pub agent: Arc<ChatAgent>,
    pub loader: Arc<DocumentLoader>,
    pub search: Arc<WebSearchClient>,
}

impl From<Services> for AppState {
    fn from(services: Services) -> Self {
        Self {
            config: services.config,
            agent: services.agent,
            loader: services.loader,
            search: services.search,
        }
    }
}
