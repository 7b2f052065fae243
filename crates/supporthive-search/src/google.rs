use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use supporthive_schema::WebResult;

use crate::{SearchProvider, DEFAULT_TIMEOUT_SECS};

const GOOGLE_CSE_URL: &str = "https://www.googleapis.com/customsearch/v1";
/// Custom Search caps `num` at 10.
const MAX_RESULTS_PER_REQUEST: usize = 10;

pub struct GoogleSearch {
    api_key: String,
    cse_id: String,
    base_url: String,
    client: reqwest::Client,
}

impl GoogleSearch {
    pub fn new(api_key: String, cse_id: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();
        Self {
            api_key,
            cse_id,
            base_url: GOOGLE_CSE_URL.to_string(),
            client,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[derive(Deserialize)]
struct GoogleResponse {
    #[serde(default)]
    items: Vec<GoogleItem>,
}

#[derive(Deserialize)]
struct GoogleItem {
    #[serde(default)]
    title: String,
    #[serde(default)]
    link: String,
    #[serde(default)]
    snippet: String,
}

#[async_trait]
impl SearchProvider for GoogleSearch {
    fn name(&self) -> &str {
        "google"
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<WebResult>> {
        let num = limit.clamp(1, MAX_RESULTS_PER_REQUEST).to_string();
        let resp = self
            .client
            .get(&self.base_url)
            .query(&[
                ("q", query),
                ("key", self.api_key.as_str()),
                ("cx", self.cse_id.as_str()),
                ("num", num.as_str()),
            ])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow!("Google Custom Search error (HTTP {status}): {body}"));
        }

        let parsed: GoogleResponse = resp.json().await?;
        let now = Utc::now();
        Ok(parsed
            .items
            .into_iter()
            .take(limit)
            .map(|item| WebResult {
                title: item.title,
                snippet: item.snippet,
                url: item.link,
                source: "google".to_string(),
                timestamp: now,
            })
            .collect())
    }
}
