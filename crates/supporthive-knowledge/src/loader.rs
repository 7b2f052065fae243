use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use supporthive_schema::{
    BatchItem, BatchResult, Document, DocumentPatch, KnowledgeHit, NewDocument, OperationResult,
};

use crate::normalize::{normalize, ContentFormat};
use crate::store::KnowledgeStore;

/// Largest file accepted for ingestion.
pub const MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Reasons an ingestion request is rejected before reaching the store.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum IngestError {
    #[error("Document content cannot be empty")]
    EmptyContent,

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Path is not a file: {0}")]
    NotAFile(PathBuf),

    #[error("File too large: {size} bytes (max: {max})")]
    FileTooLarge { size: u64, max: u64 },

    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("Failed to read file: {0}")]
    Unreadable(PathBuf),

    #[error("Directory not found: {0}")]
    DirectoryNotFound(PathBuf),

    #[error("Path is not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("No supported files found in directory: {0}")]
    NoSupportedFiles(PathBuf),
}

impl From<IngestError> for OperationResult {
    fn from(error: IngestError) -> Self {
        OperationResult::failed(None, error.to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoaderStatistics {
    pub total_documents: u64,
    pub index_name: String,
    pub dimension: usize,
    pub supported_formats: Vec<String>,
    pub max_file_size: u64,
}

/// Validates, normalizes and stores documents from text, files and directories.
#[derive(Clone)]
pub struct DocumentLoader {
    store: Arc<KnowledgeStore>,
    max_file_size: u64,
}

impl DocumentLoader {
    pub fn new(store: Arc<KnowledgeStore>) -> Self {
        Self {
            store,
            max_file_size: MAX_FILE_SIZE,
        }
    }

    pub fn with_max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = bytes;
        self
    }

    pub fn store(&self) -> &Arc<KnowledgeStore> {
        &self.store
    }

    pub async fn add_document(&self, mut new_doc: NewDocument) -> OperationResult {
        if new_doc.content.trim().is_empty() {
            return IngestError::EmptyContent.into();
        }
        new_doc.content = normalize(&new_doc.content, ContentFormat::Text);
        if new_doc.content.is_empty() {
            return IngestError::EmptyContent.into();
        }
        self.store.add(new_doc).await
    }

    pub async fn load_file(
        &self,
        path: &Path,
        category: Option<String>,
        tags: Vec<String>,
    ) -> OperationResult {
        match self.read_file(path).await {
            Ok(content) => {
                let title = path
                    .file_stem()
                    .map(|stem| stem.to_string_lossy().into_owned());
                let new_doc = NewDocument {
                    content,
                    title,
                    category,
                    tags,
                    id: None,
                };
                let result = self.store.add(new_doc).await;
                if result.success {
                    tracing::info!(path = %path.display(), "loaded file into knowledge base");
                }
                result
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), "rejected file: {e}");
                e.into()
            }
        }
    }

    async fn read_file(&self, path: &Path) -> Result<String, IngestError> {
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|_| IngestError::FileNotFound(path.to_path_buf()))?;
        if !metadata.is_file() {
            return Err(IngestError::NotAFile(path.to_path_buf()));
        }
        if metadata.len() > self.max_file_size {
            return Err(IngestError::FileTooLarge {
                size: metadata.len(),
                max: self.max_file_size,
            });
        }
        let format = ContentFormat::from_path(path).ok_or_else(|| {
            IngestError::UnsupportedFormat(
                path.extension()
                    .map(|ext| format!(".{}", ext.to_string_lossy()))
                    .unwrap_or_default(),
            )
        })?;

        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|_| IngestError::Unreadable(path.to_path_buf()))?;
        let content = normalize(&raw, format);
        if content.is_empty() {
            return Err(IngestError::EmptyContent);
        }
        Ok(content)
    }

    /// Recursively load every supported file under `dir`, one at a time.
    pub async fn load_directory(
        &self,
        dir: &Path,
        category: Option<String>,
        tags: Vec<String>,
    ) -> BatchResult {
        let files = match collect_supported_files(dir).await {
            Ok(files) => files,
            Err(e) => return BatchResult::rejected(e.to_string()),
        };

        let mut items = Vec::with_capacity(files.len());
        for file in files {
            let result = self.load_file(&file, category.clone(), tags.clone()).await;
            items.push(BatchItem {
                name: file.display().to_string(),
                result,
            });
        }

        let batch = BatchResult::from_items(items);
        tracing::info!(
            dir = %dir.display(),
            total = batch.total,
            succeeded = batch.succeeded,
            failed = batch.failed,
            "directory load finished"
        );
        batch
    }

    /// Add documents sequentially; one embedding request per document.
    pub async fn batch_add(&self, documents: Vec<NewDocument>) -> BatchResult {
        if documents.is_empty() {
            return BatchResult::rejected("No documents provided");
        }
        let mut items = Vec::with_capacity(documents.len());
        for (i, doc) in documents.into_iter().enumerate() {
            let name = doc
                .title
                .clone()
                .unwrap_or_else(|| format!("document {}", i + 1));
            let result = self.add_document(doc).await;
            items.push(BatchItem { name, result });
        }
        BatchResult::from_items(items)
    }

    pub async fn update_document(&self, id: &str, mut patch: DocumentPatch) -> OperationResult {
        if let Some(content) = patch.content.take() {
            let cleaned = normalize(&content, ContentFormat::Text);
            if cleaned.is_empty() {
                return OperationResult::failed(
                    Some(id.to_string()),
                    IngestError::EmptyContent.to_string(),
                );
            }
            patch.content = Some(cleaned);
        }
        self.store.update(id, patch).await
    }

    pub async fn delete_document(&self, id: &str) -> OperationResult {
        self.store.delete(id).await
    }

    pub async fn get_document(&self, id: &str) -> Option<Document> {
        match self.store.get(id).await {
            Ok(doc) => doc,
            Err(e) => {
                tracing::error!(document_id = %id, "failed to fetch document: {e:#}");
                None
            }
        }
    }

    pub async fn search(&self, query: &str, limit: usize) -> Vec<KnowledgeHit> {
        match self.store.search(query, limit).await {
            Ok(hits) => hits,
            Err(e) => {
                tracing::error!("document search failed: {e:#}");
                Vec::new()
            }
        }
    }

    pub async fn statistics(&self) -> Result<LoaderStatistics> {
        let stats = self.store.statistics().await?;
        Ok(LoaderStatistics {
            total_documents: stats.total_documents,
            index_name: stats.index_name,
            dimension: stats.dimension,
            supported_formats: ContentFormat::SUPPORTED_EXTENSIONS
                .iter()
                .map(|ext| format!(".{ext}"))
                .collect(),
            max_file_size: self.max_file_size,
        })
    }
}

async fn collect_supported_files(dir: &Path) -> Result<Vec<PathBuf>, IngestError> {
    let metadata = tokio::fs::metadata(dir)
        .await
        .map_err(|_| IngestError::DirectoryNotFound(dir.to_path_buf()))?;
    if !metadata.is_dir() {
        return Err(IngestError::NotADirectory(dir.to_path_buf()));
    }

    let mut files = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        let mut entries = match tokio::fs::read_dir(&current).await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(dir = %current.display(), "skipping unreadable directory: {e}");
                continue;
            }
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            match entry.file_type().await {
                Ok(kind) if kind.is_dir() => pending.push(path),
                Ok(kind) if kind.is_file() && ContentFormat::from_path(&path).is_some() => {
                    files.push(path)
                }
                _ => {}
            }
        }
    }

    if files.is_empty() {
        return Err(IngestError::NoSupportedFiles(dir.to_path_buf()));
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::StubEmbeddingProvider;
    use crate::sqlite_index::SqliteIndex;

    fn loader() -> DocumentLoader {
        let index = SqliteIndex::open_in_memory("test", 16).unwrap();
        let store = KnowledgeStore::new(
            Arc::new(StubEmbeddingProvider::new(16)),
            Arc::new(index),
        );
        DocumentLoader::new(Arc::new(store))
    }

    #[tokio::test]
    async fn empty_content_is_rejected() {
        let result = loader().add_document(NewDocument::new("   \n ")).await;
        assert!(!result.success);
        assert_eq!(result.message, "Document content cannot be empty");
    }

    #[tokio::test]
    async fn add_document_normalizes_content() {
        let loader = loader();
        let result = loader
            .add_document(NewDocument::new("  Hello   world!  \r\n\r\nBye ~~"))
            .await;
        assert!(result.success);
        let doc = loader
            .get_document(&result.document_id.unwrap())
            .await
            .unwrap();
        assert_eq!(doc.content, "Hello world!\nBye");
        assert_eq!(doc.title, "Untitled");
    }

    #[tokio::test]
    async fn load_file_uses_stem_as_title_and_flattens_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("refunds.json");
        std::fs::write(&path, r#"{"policy": "30 days", "contact": {"email": "help"}}"#).unwrap();

        let loader = loader();
        let result = loader
            .load_file(&path, Some("billing".into()), vec!["faq".into()])
            .await;
        assert!(result.success, "{}", result.message);

        let doc = loader
            .get_document(&result.document_id.unwrap())
            .await
            .unwrap();
        assert_eq!(doc.title, "refunds");
        assert_eq!(doc.category, "billing");
        assert!(doc.tags.contains("faq"));
        assert_eq!(doc.content, "policy: 30 days\ncontact:\nemail: help");
    }

    #[tokio::test]
    async fn load_file_boundary_checks() {
        let dir = tempfile::tempdir().unwrap();
        let loader = loader();

        let missing = loader.load_file(&dir.path().join("nope.txt"), None, vec![]).await;
        assert!(!missing.success);
        assert!(missing.message.starts_with("File not found"));

        let not_file = loader.load_file(dir.path(), None, vec![]).await;
        assert!(not_file.message.starts_with("Path is not a file"));

        let pdf = dir.path().join("manual.pdf");
        std::fs::write(&pdf, "binary").unwrap();
        let unsupported = loader.load_file(&pdf, None, vec![]).await;
        assert_eq!(unsupported.message, "Unsupported file format: .pdf");

        let blank = dir.path().join("blank.md");
        std::fs::write(&blank, "  \n\n ").unwrap();
        let empty = loader.load_file(&blank, None, vec![]).await;
        assert_eq!(empty.message, "Document content cannot be empty");
    }

    #[tokio::test]
    async fn oversized_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.txt");
        std::fs::write(&path, "x".repeat(64)).unwrap();

        let result = loader().with_max_file_size(16).load_file(&path, None, vec![]).await;
        assert!(!result.success);
        assert_eq!(result.message, "File too large: 64 bytes (max: 16)");
    }

    #[tokio::test]
    async fn load_directory_walks_recursively() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("a.txt"), "Shipping info").unwrap();
        std::fs::write(dir.path().join("nested/b.csv"), "q,a\nhours,9-5").unwrap();
        std::fs::write(dir.path().join("nested/empty.md"), "   ").unwrap();
        std::fs::write(dir.path().join("ignored.bin"), "zzz").unwrap();

        let loader = loader();
        let batch = loader.load_directory(dir.path(), None, vec![]).await;
        assert!(batch.success);
        assert_eq!(batch.total, 3);
        assert_eq!(batch.succeeded, 2);
        assert_eq!(batch.failed, 1);
        assert_eq!(loader.statistics().await.unwrap().total_documents, 2);
    }

    #[tokio::test]
    async fn directory_without_supported_files_fails() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("x.bin"), "zzz").unwrap();

        let batch = loader().load_directory(dir.path(), None, vec![]).await;
        assert!(!batch.success);
        assert!(batch.message.starts_with("No supported files found"));

        let missing = loader()
            .load_directory(&dir.path().join("absent"), None, vec![])
            .await;
        assert!(missing.message.starts_with("Directory not found"));
    }

    #[tokio::test]
    async fn batch_add_counts_each_document() {
        let batch = loader()
            .batch_add(vec![
                NewDocument::new("first").with_title("one"),
                NewDocument::new(""),
                NewDocument::new("third"),
            ])
            .await;
        assert_eq!(batch.total, 3);
        assert_eq!(batch.succeeded, 2);
        assert_eq!(batch.results[0].name, "one");
        assert_eq!(batch.results[1].name, "document 2");
        assert!(!batch.results[1].result.success);
    }

    #[tokio::test]
    async fn update_document_rejects_blank_content() {
        let loader = loader();
        let id = loader
            .add_document(NewDocument::new("original"))
            .await
            .document_id
            .unwrap();
        let result = loader
            .update_document(
                &id,
                DocumentPatch {
                    content: Some(" ~~ ".into()),
                    ..DocumentPatch::default()
                },
            )
            .await;
        assert!(!result.success);
        assert_eq!(loader.get_document(&id).await.unwrap().content, "original");
    }

    #[tokio::test]
    async fn statistics_list_supported_formats() {
        let stats = loader().statistics().await.unwrap();
        assert!(stats.supported_formats.contains(&".csv".to_string()));
        assert_eq!(stats.max_file_size, MAX_FILE_SIZE);
        assert_eq!(stats.dimension, 16);
    }
}
