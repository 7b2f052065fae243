use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use supporthive_schema::Document;
use tokio::task;

use crate::index::{
    cosine_similarity, document_from_metadata, document_to_metadata, IndexMatch, IndexRecord,
    IndexStats, VectorIndex,
};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS documents (
    id TEXT PRIMARY KEY,
    embedding TEXT NOT NULL,
    metadata TEXT NOT NULL,
    updated_at INTEGER NOT NULL
);
";

/// Local vector index: JSON-encoded embeddings scanned with cosine similarity.
#[derive(Clone)]
pub struct SqliteIndex {
    db: Arc<Mutex<Connection>>,
    name: String,
    dimension: usize,
}

impl SqliteIndex {
    pub fn open(path: impl AsRef<Path>, name: impl Into<String>, dimension: usize) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open sqlite index at {}", path.display()))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::from_connection(conn, name.into(), dimension)
    }

    pub fn open_in_memory(name: impl Into<String>, dimension: usize) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn, name.into(), dimension)
    }

    fn from_connection(conn: Connection, name: String, dimension: usize) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
            name,
            dimension,
        })
    }
}

fn lock(db: &Mutex<Connection>) -> Result<std::sync::MutexGuard<'_, Connection>> {
    db.lock()
        .map_err(|_| anyhow!("failed to lock sqlite connection"))
}

#[async_trait]
impl VectorIndex for SqliteIndex {
    fn name(&self) -> &str {
        &self.name
    }

    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<IndexMatch>> {
        let db = Arc::clone(&self.db);
        let query = vector.to_vec();
        task::spawn_blocking(move || -> Result<Vec<IndexMatch>> {
            let conn = lock(&db)?;
            let mut stmt = conn.prepare("SELECT id, embedding, metadata FROM documents")?;
            let rows = stmt.query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?;

            let mut scored = Vec::new();
            for row in rows {
                let (id, embedding_json, metadata_json) = row?;
                let embedding: Vec<f32> = serde_json::from_str(&embedding_json)?;
                let metadata: serde_json::Value = serde_json::from_str(&metadata_json)?;
                let score = cosine_similarity(&query, &embedding).clamp(0.0, 1.0) as f64;
                scored.push(IndexMatch {
                    document: document_from_metadata(&id, &metadata),
                    score,
                });
            }

            scored.sort_by(|a, b| {
                b.score
                    .partial_cmp(&a.score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            scored.truncate(top_k);
            Ok(scored)
        })
        .await?
    }

    async fn upsert(&self, records: Vec<IndexRecord>) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let db = Arc::clone(&self.db);
        let now = chrono::Utc::now().timestamp();
        task::spawn_blocking(move || -> Result<()> {
            let conn = lock(&db)?;
            let tx = conn.unchecked_transaction()?;
            for record in &records {
                tx.execute(
                    "INSERT INTO documents(id, embedding, metadata, updated_at) VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(id) DO UPDATE SET embedding = excluded.embedding,
                         metadata = excluded.metadata, updated_at = excluded.updated_at",
                    params![
                        record.document.id,
                        serde_json::to_string(&record.values)?,
                        document_to_metadata(&record.document).to_string(),
                        now
                    ],
                )?;
            }
            tx.commit()?;
            Ok(())
        })
        .await?
    }

    async fn fetch(&self, id: &str) -> Result<Option<Document>> {
        let db = Arc::clone(&self.db);
        let id = id.to_owned();
        task::spawn_blocking(move || -> Result<Option<Document>> {
            let conn = lock(&db)?;
            let metadata: Option<String> = conn
                .query_row(
                    "SELECT metadata FROM documents WHERE id = ?1",
                    params![id],
                    |row| row.get(0),
                )
                .optional()?;
            match metadata {
                Some(raw) => {
                    let value: serde_json::Value = serde_json::from_str(&raw)?;
                    Ok(Some(document_from_metadata(&id, &value)))
                }
                None => Ok(None),
            }
        })
        .await?
    }

    async fn update_metadata(&self, document: &Document) -> Result<()> {
        let db = Arc::clone(&self.db);
        let id = document.id.clone();
        let metadata = document_to_metadata(document).to_string();
        let now = chrono::Utc::now().timestamp();
        task::spawn_blocking(move || -> Result<()> {
            let conn = lock(&db)?;
            let changed = conn.execute(
                "UPDATE documents SET metadata = ?1, updated_at = ?2 WHERE id = ?3",
                params![metadata, now, id],
            )?;
            if changed == 0 {
                return Err(anyhow!("document {id} not found"));
            }
            Ok(())
        })
        .await?
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let db = Arc::clone(&self.db);
        let id = id.to_owned();
        task::spawn_blocking(move || -> Result<()> {
            let conn = lock(&db)?;
            conn.execute("DELETE FROM documents WHERE id = ?1", params![id])?;
            Ok(())
        })
        .await?
    }

    async fn stats(&self) -> Result<IndexStats> {
        let db = Arc::clone(&self.db);
        let name = self.name.clone();
        let dimension = self.dimension;
        task::spawn_blocking(move || -> Result<IndexStats> {
            let conn = lock(&db)?;
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))?;
            Ok(IndexStats {
                total_vectors: count as u64,
                dimension,
                index_name: name,
            })
        })
        .await?
    }
}
