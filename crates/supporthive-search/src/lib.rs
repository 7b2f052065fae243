//! Web search fallback: a ranked chain of search providers.
//!
//! `search` asks only the primary provider. `search_with_fallback` asks the
//! primary and, when it returns nothing or fails, the next provider once.

pub mod google;
pub mod serpapi;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use supporthive_schema::WebResult;

pub use google::GoogleSearch;
pub use serpapi::SerpApiSearch;

pub(crate) const DEFAULT_TIMEOUT_SECS: u64 = 15;

#[async_trait]
pub trait SearchProvider: Send + Sync {
    fn name(&self) -> &str;
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<WebResult>>;
}

/// Providers in preference order; the first one is primary.
#[derive(Clone, Default)]
pub struct WebSearchClient {
    providers: Vec<Arc<dyn SearchProvider>>,
}

impl WebSearchClient {
    pub fn new(providers: Vec<Arc<dyn SearchProvider>>) -> Self {
        Self { providers }
    }

    /// Build the chain from whichever credentials are present.
    /// Google Custom Search ranks ahead of SerpAPI.
    pub fn from_credentials(
        google: Option<(String, String)>,
        serpapi_key: Option<String>,
    ) -> Self {
        let mut providers: Vec<Arc<dyn SearchProvider>> = Vec::new();
        if let Some((api_key, cse_id)) = google {
            providers.push(Arc::new(GoogleSearch::new(api_key, cse_id)));
        }
        if let Some(key) = serpapi_key {
            providers.push(Arc::new(SerpApiSearch::new(key)));
        }
        if providers.is_empty() {
            tracing::warn!("no web search provider configured");
        }
        Self { providers }
    }

    pub fn is_configured(&self) -> bool {
        !self.providers.is_empty()
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.name().to_string()).collect()
    }

    /// Search with the primary provider only.
    pub async fn search(&self, query: &str, limit: usize) -> Vec<WebResult> {
        match self.providers.first() {
            Some(primary) => run(primary.as_ref(), query, limit).await,
            None => Vec::new(),
        }
    }

    /// Primary first; on zero results try the next provider exactly once.
    pub async fn search_with_fallback(&self, query: &str, limit: usize) -> Vec<WebResult> {
        let mut providers = self.providers.iter();
        let Some(primary) = providers.next() else {
            return Vec::new();
        };

        let results = run(primary.as_ref(), query, limit).await;
        if !results.is_empty() {
            return results;
        }

        match providers.next() {
            Some(fallback) => {
                tracing::info!(
                    primary = primary.name(),
                    fallback = fallback.name(),
                    "primary search returned nothing, trying fallback"
                );
                run(fallback.as_ref(), query, limit).await
            }
            None => results,
        }
    }
}

async fn run(provider: &dyn SearchProvider, query: &str, limit: usize) -> Vec<WebResult> {
    match provider.search(query, limit).await {
        Ok(results) => {
            tracing::debug!(provider = provider.name(), count = results.len(), "web search finished");
            results
        }
        Err(e) => {
            tracing::warn!(provider = provider.name(), "web search failed: {e:#}");
            Vec::new()
        }
    }
}
