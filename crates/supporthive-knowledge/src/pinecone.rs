use std::collections::HashMap;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use supporthive_schema::Document;

use crate::index::{
    document_from_metadata, document_to_metadata, IndexMatch, IndexRecord, IndexStats,
    VectorIndex,
};

const UPSERT_BATCH_SIZE: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PineconeConfig {
    pub api_key: String,
    pub index_name: String,
    #[serde(default)]
    pub environment: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
    /// Full data-plane URL; wins over the derived host when set.
    #[serde(default)]
    pub host: Option<String>,
    pub dimension: usize,
}

impl PineconeConfig {
    pub fn resolve_host(&self) -> Result<String> {
        if let Some(host) = self.host.as_deref().filter(|h| !h.trim().is_empty()) {
            let host = host.trim_end_matches('/');
            return Ok(if host.starts_with("http://") || host.starts_with("https://") {
                host.to_string()
            } else {
                format!("https://{host}")
            });
        }
        match (&self.project_id, &self.environment) {
            (Some(project), Some(environment)) => Ok(format!(
                "https://{}-{}.svc.{}.pinecone.io",
                self.index_name, project, environment
            )),
            _ => Err(anyhow!(
                "pinecone needs PINECONE_HOST, or PINECONE_PROJECT_ID together with PINECONE_ENV"
            )),
        }
    }
}

/// Managed vector index reached over the Pinecone data-plane REST API.
pub struct PineconeIndex {
    client: reqwest::Client,
    api_key: String,
    host: String,
    name: String,
    dimension: usize,
}

impl PineconeIndex {
    pub fn new(config: &PineconeConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            host: config.resolve_host()?,
            name: config.index_name.clone(),
            dimension: config.dimension,
        })
    }

    async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<reqwest::Response> {
        let resp = self
            .client
            .post(format!("{}{}", self.host, path))
            .header("Api-Key", &self.api_key)
            .json(body)
            .send()
            .await?;
        check_status(resp, path).await
    }
}

async fn check_status(resp: reqwest::Response, path: &str) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(anyhow!("pinecone {path} failed ({status}): {body}"))
}

#[async_trait]
impl VectorIndex for PineconeIndex {
    fn name(&self) -> &str {
        &self.name
    }

    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<IndexMatch>> {
        let body = QueryRequest {
            vector,
            top_k,
            include_metadata: true,
        };
        let parsed: QueryResponse = self.post("/query", &body).await?.json().await?;
        Ok(parsed
            .matches
            .into_iter()
            .map(|m| IndexMatch {
                document: document_from_metadata(&m.id, &m.metadata),
                score: m.score,
            })
            .collect())
    }

    async fn upsert(&self, records: Vec<IndexRecord>) -> Result<()> {
        for batch in records.chunks(UPSERT_BATCH_SIZE) {
            let vectors: Vec<VectorPayload> = batch
                .iter()
                .map(|record| VectorPayload {
                    id: record.document.id.clone(),
                    values: record.values.clone(),
                    metadata: document_to_metadata(&record.document),
                })
                .collect();
            self.post("/vectors/upsert", &serde_json::json!({ "vectors": vectors }))
                .await?;
            tracing::debug!(count = batch.len(), index = %self.name, "upserted vectors");
        }
        Ok(())
    }

    async fn fetch(&self, id: &str) -> Result<Option<Document>> {
        let resp = self
            .client
            .get(format!("{}/vectors/fetch", self.host))
            .query(&[("ids", id)])
            .header("Api-Key", &self.api_key)
            .send()
            .await?;
        let mut parsed: FetchResponse = check_status(resp, "/vectors/fetch").await?.json().await?;
        Ok(parsed
            .vectors
            .remove(id)
            .map(|vector| document_from_metadata(id, &vector.metadata)))
    }

    async fn update_metadata(&self, document: &Document) -> Result<()> {
        self.post(
            "/vectors/update",
            &serde_json::json!({
                "id": document.id,
                "setMetadata": document_to_metadata(document),
            }),
        )
        .await?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.post("/vectors/delete", &serde_json::json!({ "ids": [id] }))
            .await?;
        Ok(())
    }

    async fn stats(&self) -> Result<IndexStats> {
        let parsed: DescribeStatsResponse = self
            .post("/describe_index_stats", &serde_json::json!({}))
            .await?
            .json()
            .await?;
        Ok(IndexStats {
            total_vectors: parsed.total_vector_count,
            dimension: parsed.dimension.unwrap_or(self.dimension),
            index_name: self.name.clone(),
        })
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    vector: &'a [f32],
    top_k: usize,
    include_metadata: bool,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<QueryMatch>,
}

#[derive(Deserialize)]
struct QueryMatch {
    id: String,
    #[serde(default)]
    score: f64,
    #[serde(default)]
    metadata: serde_json::Value,
}

#[derive(Serialize)]
struct VectorPayload {
    id: String,
    values: Vec<f32>,
    metadata: serde_json::Value,
}

#[derive(Deserialize)]
struct FetchResponse {
    #[serde(default)]
    vectors: HashMap<String, FetchedVector>,
}

#[derive(Deserialize)]
struct FetchedVector {
    #[serde(default)]
    metadata: serde_json::Value,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DescribeStatsResponse {
    #[serde(default)]
    dimension: Option<usize>,
    #[serde(default)]
    total_vector_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use supporthive_schema::NewDocument;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(host: Option<String>) -> PineconeConfig {
        PineconeConfig {
            api_key: "pc-key".into(),
            index_name: "customer-support".into(),
            environment: Some("us-west1-gcp".into()),
            project_id: Some("abc123".into()),
            host,
            dimension: 3,
        }
    }

    #[test]
    fn host_is_derived_from_index_project_and_environment() {
        assert_eq!(
            config(None).resolve_host().unwrap(),
            "https://customer-support-abc123.svc.us-west1-gcp.pinecone.io"
        );
    }

    #[test]
    fn explicit_host_wins_and_gets_scheme() {
        let cfg = config(Some("my-index.svc.pinecone.io/".into()));
        assert_eq!(cfg.resolve_host().unwrap(), "https://my-index.svc.pinecone.io");
    }

    #[test]
    fn host_requires_project_or_explicit_host() {
        let cfg = PineconeConfig {
            project_id: None,
            ..config(None)
        };
        let err = cfg.resolve_host().unwrap_err().to_string();
        assert!(err.contains("PINECONE_PROJECT_ID"));
        assert!(err.contains("PINECONE_HOST"));
    }

    #[tokio::test]
    async fn query_sends_api_key_and_maps_matches() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/query"))
            .and(header("Api-Key", "pc-key"))
            .and(body_partial_json(serde_json::json!({"topK": 2, "includeMetadata": true})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "matches": [
                    {"id": "d1", "score": 0.91, "metadata": {"content": "Reset via settings", "title": "Passwords"}},
                    {"id": "d2", "score": 0.42, "metadata": {"content": "Refunds in 30 days"}}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let index = PineconeIndex::new(&config(Some(server.uri()))).unwrap();
        let matches = index.query(&[0.1, 0.2, 0.3], 2).await.unwrap();
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].document.id, "d1");
        assert_eq!(matches[0].document.title, "Passwords");
        assert_eq!(matches[1].document.title, "Untitled");
        assert!((matches[0].score - 0.91).abs() < 1e-9);
    }

    #[tokio::test]
    async fn upsert_splits_into_batches() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/vectors/upsert"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"upsertedCount": 1})))
            .expect(2)
            .mount(&server)
            .await;

        let index = PineconeIndex::new(&config(Some(server.uri()))).unwrap();
        let records = (0..150)
            .map(|i| IndexRecord {
                values: vec![0.0, 0.0, 1.0],
                document: NewDocument::new(format!("doc {i}")).into_document(Utc::now()),
            })
            .collect();
        index.upsert(records).await.unwrap();
    }

    #[tokio::test]
    async fn fetch_returns_document_or_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/vectors/fetch"))
            .and(query_param("ids", "d1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "vectors": {"d1": {"id": "d1", "values": [0.1, 0.2, 0.3], "metadata": {"content": "hi", "category": "faq"}}}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/vectors/fetch"))
            .and(query_param("ids", "missing"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"vectors": {}})))
            .mount(&server)
            .await;

        let index = PineconeIndex::new(&config(Some(server.uri()))).unwrap();
        let doc = index.fetch("d1").await.unwrap().unwrap();
        assert_eq!(doc.category, "faq");
        assert!(index.fetch("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_and_delete_hit_their_endpoints() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/vectors/update"))
            .and(body_partial_json(serde_json::json!({"id": "d1", "setMetadata": {"title": "New"}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/vectors/delete"))
            .and(body_partial_json(serde_json::json!({"ids": ["d1"]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let index = PineconeIndex::new(&config(Some(server.uri()))).unwrap();
        let doc = NewDocument {
            id: Some("d1".into()),
            ..NewDocument::new("body").with_title("New")
        }
        .into_document(Utc::now());
        index.update_metadata(&doc).await.unwrap();
        index.delete("d1").await.unwrap();
    }

    #[tokio::test]
    async fn stats_parse_camel_case() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/describe_index_stats"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "dimension": 1536, "totalVectorCount": 42, "namespaces": {}
            })))
            .mount(&server)
            .await;

        let index = PineconeIndex::new(&config(Some(server.uri()))).unwrap();
        let stats = index.stats().await.unwrap();
        assert_eq!(stats.total_vectors, 42);
        assert_eq!(stats.dimension, 1536);
        assert_eq!(stats.index_name, "customer-support");
    }

    #[tokio::test]
    async fn http_errors_surface_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/query"))
            .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
            .mount(&server)
            .await;

        let index = PineconeIndex::new(&config(Some(server.uri()))).unwrap();
        let err = index.query(&[0.0, 0.0, 1.0], 3).await.unwrap_err();
        assert!(err.to_string().contains("403"));
    }
}
