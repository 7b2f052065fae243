use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use supporthive_schema::WebResult;

use crate::{SearchProvider, DEFAULT_TIMEOUT_SECS};

const SERPAPI_URL: &str = "https://serpapi.com/search.json";

pub struct SerpApiSearch {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl SerpApiSearch {
    pub fn new(api_key: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();
        Self {
            api_key,
            base_url: SERPAPI_URL.to_string(),
            client,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[derive(Deserialize)]
struct SerpApiResponse {
    #[serde(default)]
    organic_results: Vec<OrganicResult>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct OrganicResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    link: String,
    #[serde(default)]
    snippet: String,
}

#[async_trait]
impl SearchProvider for SerpApiSearch {
    fn name(&self) -> &str {
        "serpapi"
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<WebResult>> {
        let num = limit.max(1).to_string();
        let resp = self
            .client
            .get(&self.base_url)
            .query(&[
                ("engine", "google"),
                ("q", query),
                ("api_key", self.api_key.as_str()),
                ("num", num.as_str()),
            ])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow!("SerpAPI error (HTTP {status}): {body}"));
        }

        let parsed: SerpApiResponse = resp.json().await?;
        if let Some(error) = parsed.error {
            return Err(anyhow!("SerpAPI error: {error}"));
        }

        let now = Utc::now();
        Ok(parsed
            .organic_results
            .into_iter()
            .take(limit)
            .map(|item| WebResult {
                title: item.title,
                snippet: item.snippet,
                url: item.link,
                source: "serpapi".to_string(),
                timestamp: now,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn maps_organic_results_and_truncates() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("engine", "google"))
            .and(query_param("api_key", "serp-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "organic_results": [
                    {"position": 1, "title": "One", "link": "https://one.example", "snippet": "first"},
                    {"position": 2, "title": "Two", "link": "https://two.example", "snippet": "second"},
                    {"position": 3, "title": "Three", "link": "https://three.example"}
                ]
            })))
            .mount(&server)
            .await;

        let serp = SerpApiSearch::new("serp-key".into()).with_base_url(server.uri());
        let results = serp.search("track order", 2).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].title, "One");
        assert_eq!(results[1].source, "serpapi");
    }

    #[tokio::test]
    async fn error_field_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "error": "Invalid API key."
            })))
            .mount(&server)
            .await;

        let serp = SerpApiSearch::new("bad".into()).with_base_url(server.uri());
        let err = serp.search("x", 3).await.unwrap_err();
        assert!(err.to_string().contains("Invalid API key"));
    }
}
