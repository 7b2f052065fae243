use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use supporthive_schema::{Document, DEFAULT_CATEGORY, DEFAULT_TITLE};

/// A vector plus the document it was derived from.
#[derive(Debug, Clone)]
pub struct IndexRecord {
    pub values: Vec<f32>,
    pub document: Document,
}

#[derive(Debug, Clone)]
pub struct IndexMatch {
    pub document: Document,
    /// Raw similarity reported by the backend (cosine, may be negative).
    pub score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexStats {
    pub total_vectors: u64,
    pub dimension: usize,
    pub index_name: String,
}

/// Nearest-neighbour storage for embedded documents.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    fn name(&self) -> &str;
    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<IndexMatch>>;
    async fn upsert(&self, records: Vec<IndexRecord>) -> Result<()>;
    async fn fetch(&self, id: &str) -> Result<Option<Document>>;
    /// Replace stored metadata without touching the vector.
    async fn update_metadata(&self, document: &Document) -> Result<()>;
    async fn delete(&self, id: &str) -> Result<()>;
    async fn stats(&self) -> Result<IndexStats>;
}

/// Flat metadata map stored next to every vector.
pub(crate) fn document_to_metadata(document: &Document) -> serde_json::Value {
    let mut metadata = serde_json::json!({
        "document_id": document.id,
        "content": document.content,
        "title": document.title,
        "category": document.category,
        "tags": document.tags,
        "created_at": document.created_at.to_rfc3339(),
    });
    if let Some(updated_at) = document.updated_at {
        metadata["updated_at"] = serde_json::Value::String(updated_at.to_rfc3339());
    }
    metadata
}

/// Rebuild a document from stored metadata, tolerating missing fields.
pub(crate) fn document_from_metadata(id: &str, metadata: &serde_json::Value) -> Document {
    let text = |key: &str| metadata[key].as_str().map(str::to_string);
    let timestamp = |key: &str| {
        metadata[key]
            .as_str()
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|dt| dt.with_timezone(&Utc))
    };

    Document {
        id: id.to_string(),
        content: text("content").unwrap_or_default(),
        title: text("title").unwrap_or_else(|| DEFAULT_TITLE.to_string()),
        category: text("category").unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
        tags: metadata["tags"]
            .as_array()
            .map(|tags| {
                tags.iter()
                    .filter_map(|tag| tag.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default(),
        created_at: timestamp("created_at").unwrap_or_default(),
        updated_at: timestamp("updated_at"),
    }
}

pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use supporthive_schema::NewDocument;

    #[test]
    fn metadata_roundtrip_preserves_fields() {
        let mut doc = NewDocument::new("Support is 24/7")
            .with_title("Hours")
            .with_category("support")
            .with_tags(["hours", "availability"])
            .into_document(Utc::now());
        doc.updated_at = Some(Utc::now());

        let metadata = document_to_metadata(&doc);
        assert_eq!(metadata["document_id"], doc.id.as_str());
        let restored = document_from_metadata(&doc.id, &metadata);
        assert_eq!(restored.title, "Hours");
        assert_eq!(restored.tags, doc.tags);
        assert_eq!(
            restored.created_at.timestamp_millis(),
            doc.created_at.timestamp_millis()
        );
        assert!(restored.updated_at.is_some());
    }

    #[test]
    fn metadata_without_updated_at_omits_key() {
        let doc = NewDocument::new("x").into_document(Utc::now());
        assert!(document_to_metadata(&doc).get("updated_at").is_none());
    }

    #[test]
    fn sparse_metadata_gets_defaults() {
        let doc = document_from_metadata("d1", &serde_json::json!({"content": "c"}));
        assert_eq!(doc.title, DEFAULT_TITLE);
        assert_eq!(doc.category, DEFAULT_CATEGORY);
        assert!(doc.tags.is_empty());
    }

    #[test]
    fn cosine_similarity_identical() {
        let a = [0.3, 0.4, 0.5];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_similarity_orthogonal() {
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
    }

    #[test]
    fn cosine_similarity_mismatched_lengths() {
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    }
}
