use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use supporthive_schema::{Document, DocumentPatch, KnowledgeHit, NewDocument, OperationResult};

use crate::embedding::EmbeddingProvider;
use crate::index::{IndexRecord, VectorIndex};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KnowledgeStatistics {
    pub total_documents: u64,
    pub dimension: usize,
    pub index_name: String,
}

/// Embeds documents and queries and keeps them in a [`VectorIndex`].
#[derive(Clone)]
pub struct KnowledgeStore {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
}

impl KnowledgeStore {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, index: Arc<dyn VectorIndex>) -> Self {
        Self { embedder, index }
    }

    pub fn index_name(&self) -> &str {
        self.index.name()
    }

    /// Top `limit` documents most similar to `query`, scores clamped to [0, 1].
    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<KnowledgeHit>> {
        let vector = self
            .embedder
            .embed_one(query)
            .await
            .context("failed to embed query")?;
        let matches = self.index.query(&vector, limit).await?;
        tracing::debug!(hits = matches.len(), limit, "knowledge search finished");

        Ok(matches
            .into_iter()
            .map(|m| KnowledgeHit {
                id: m.document.id,
                content: m.document.content,
                title: m.document.title,
                category: m.document.category,
                tags: m.document.tags,
                score: m.score.clamp(0.0, 1.0),
                created_at: Some(m.document.created_at),
            })
            .collect())
    }

    pub async fn add(&self, new_doc: NewDocument) -> OperationResult {
        let document = new_doc.into_document(Utc::now());
        let id = document.id.clone();
        match self.embed_and_upsert(document).await {
            Ok(()) => {
                tracing::info!(document_id = %id, "document added to knowledge base");
                OperationResult::ok(id, "Document added successfully")
            }
            Err(e) => {
                tracing::error!(document_id = %id, "failed to add document: {e:#}");
                OperationResult::failed(Some(id), format!("Failed to add document: {e}"))
            }
        }
    }

    /// Apply a patch. Only a content change triggers a new embedding.
    pub async fn update(&self, id: &str, patch: DocumentPatch) -> OperationResult {
        let existing = match self.index.fetch(id).await {
            Ok(Some(doc)) => doc,
            Ok(None) => {
                return OperationResult::failed(Some(id.to_string()), "Document not found");
            }
            Err(e) => {
                tracing::error!(document_id = %id, "failed to fetch document: {e:#}");
                return OperationResult::failed(
                    Some(id.to_string()),
                    format!("Failed to update document: {e}"),
                );
            }
        };

        let content_changed = patch
            .content
            .as_ref()
            .is_some_and(|content| *content != existing.content);
        let updated = apply_patch(existing, patch);

        let outcome = if content_changed {
            self.embed_and_upsert(updated).await
        } else {
            self.index.update_metadata(&updated).await
        };

        match outcome {
            Ok(()) => {
                tracing::info!(document_id = %id, reembedded = content_changed, "document updated");
                OperationResult::ok(id, "Document updated successfully")
            }
            Err(e) => {
                tracing::error!(document_id = %id, "failed to update document: {e:#}");
                OperationResult::failed(
                    Some(id.to_string()),
                    format!("Failed to update document: {e}"),
                )
            }
        }
    }

    pub async fn delete(&self, id: &str) -> OperationResult {
        match self.index.delete(id).await {
            Ok(()) => {
                tracing::info!(document_id = %id, "document deleted");
                OperationResult::ok(id, "Document deleted successfully")
            }
            Err(e) => {
                tracing::error!(document_id = %id, "failed to delete document: {e:#}");
                OperationResult::failed(
                    Some(id.to_string()),
                    format!("Failed to delete document: {e}"),
                )
            }
        }
    }

    pub async fn get(&self, id: &str) -> Result<Option<Document>> {
        self.index.fetch(id).await
    }

    pub async fn statistics(&self) -> Result<KnowledgeStatistics> {
        let stats = self.index.stats().await?;
        Ok(KnowledgeStatistics {
            total_documents: stats.total_vectors,
            dimension: stats.dimension,
            index_name: stats.index_name,
        })
    }

    pub async fn is_available(&self) -> bool {
        match self.index.stats().await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!("knowledge store unavailable: {e:#}");
                false
            }
        }
    }

    async fn embed_and_upsert(&self, document: Document) -> Result<()> {
        let values = self
            .embedder
            .embed_one(&document.content)
            .await
            .context("failed to embed document")?;
        self.index
            .upsert(vec![IndexRecord { values, document }])
            .await
    }
}

fn apply_patch(mut document: Document, patch: DocumentPatch) -> Document {
    if let Some(content) = patch.content {
        document.content = content;
    }
    if let Some(title) = patch.title {
        document.title = title;
    }
    if let Some(category) = patch.category {
        document.category = category;
    }
    if let Some(tags) = patch.tags {
        document.tags = tags.into_iter().collect();
    }
    document.updated_at = Some(Utc::now());
    document
}
