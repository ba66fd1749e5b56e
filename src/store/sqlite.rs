//! SQLite-backed [`ChunkStore`].
//!
//! Schema is created by [`crate::migrate::run_migrations`]: `documents`,
//! `chunks`, and `embeddings`, each keyed by UUID text. Vectors are stored
//! as little-endian `f32` BLOBs next to the model id that produced them.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::embedding::{blob_to_vec, vec_to_blob};
use crate::error::{EngineError, Result};
use crate::models::{Chunk, ChunkId, Document, DocumentId, Embedding};

use super::{ChunkStore, DocumentVersion};

const CHUNK_COLUMNS: &str = r#"
    c.id, c.document_id, c.chunk_index, c.start_offset, c.end_offset, c.text, c.hash,
    e.model AS embedding_model, e.vector AS embedding_vector
"#;

pub struct SqliteChunkStore {
    pool: SqlitePool,
}

impl SqliteChunkStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn parse_uuid(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|e| EngineError::Store(format!("bad uuid {:?}: {}", raw, e)))
}

fn row_to_chunk(row: &SqliteRow) -> Result<Chunk> {
    let id: String = row.try_get("id")?;
    let document_id: String = row.try_get("document_id")?;
    let index: i64 = row.try_get("chunk_index")?;
    let start: i64 = row.try_get("start_offset")?;
    let end: i64 = row.try_get("end_offset")?;
    let model: Option<String> = row.try_get("embedding_model")?;
    let vector: Option<Vec<u8>> = row.try_get("embedding_vector")?;
    Ok(Chunk {
        id: parse_uuid(&id)?,
        document_id: parse_uuid(&document_id)?,
        index: index as usize,
        start: start as usize,
        end: end as usize,
        text: row.try_get("text")?,
        hash: row.try_get("hash")?,
        embedding: model.zip(vector).map(|(model, blob)| Embedding {
            model,
            vector: blob_to_vec(&blob),
        }),
    })
}

fn row_to_document(row: &SqliteRow) -> Result<Document> {
    let id: String = row.try_get("id")?;
    let metadata_json: String = row.try_get("metadata_json")?;
    let metadata: BTreeMap<String, String> = serde_json::from_str(&metadata_json)
        .map_err(|e| EngineError::Store(format!("bad metadata for {}: {}", id, e)))?;
    let ingested_ms: i64 = row.try_get("ingested_at")?;
    Ok(Document {
        id: parse_uuid(&id)?,
        source: row.try_get("source")?,
        content_type: row.try_get("content_type")?,
        content: row.try_get("content")?,
        metadata,
        ingested_at: DateTime::<Utc>::from_timestamp_millis(ingested_ms).unwrap_or_default(),
    })
}

#[async_trait]
impl ChunkStore for SqliteChunkStore {
    async fn upsert_document(&self, doc: &Document) -> Result<()> {
        let metadata_json = serde_json::to_string(&doc.metadata)
            .map_err(|e| EngineError::Store(e.to_string()))?;
        sqlx::query(
            r#"
            INSERT INTO documents (id, source, content_type, content, content_hash,
                                   metadata_json, ingested_at, deleted)
            VALUES (?, ?, ?, ?, ?, ?, ?, 0)
            ON CONFLICT(id) DO UPDATE SET
                source = excluded.source,
                content_type = excluded.content_type,
                content = excluded.content,
                content_hash = excluded.content_hash,
                metadata_json = excluded.metadata_json,
                ingested_at = excluded.ingested_at
            "#,
        )
        .bind(doc.id.to_string())
        .bind(&doc.source)
        .bind(&doc.content_type)
        .bind(&doc.content)
        .bind(doc.content_hash())
        .bind(metadata_json)
        .bind(doc.ingested_at.timestamp_millis())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_document(&self, id: &DocumentId) -> Result<Option<Document>> {
        let row = sqlx::query(
            r#"
            SELECT id, source, content_type, content, metadata_json, ingested_at
            FROM documents
            WHERE id = ? AND deleted = 0
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_document).transpose()
    }

    async fn latest_version(&self, source: &str) -> Result<Option<DocumentVersion>> {
        let row = sqlx::query(
            r#"
            SELECT d.id, d.content_hash,
                   (SELECT COUNT(*) FROM chunks c WHERE c.document_id = d.id AND c.deleted = 0)
                       AS live_chunks
            FROM documents d
            WHERE d.source = ? AND d.deleted = 0
            ORDER BY d.ingested_at DESC, d.rowid DESC
            LIMIT 1
            "#,
        )
        .bind(source)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let id: String = row.try_get("id")?;
                let live: i64 = row.try_get("live_chunks")?;
                Ok(Some(DocumentVersion {
                    id: parse_uuid(&id)?,
                    content_hash: row.try_get("content_hash")?,
                    live_chunks: live as usize,
                }))
            }
            None => Ok(None),
        }
    }

    async fn upsert_chunks(&self, chunks: &[Chunk]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for chunk in chunks {
            sqlx::query(
                r#"
                INSERT INTO chunks (id, document_id, chunk_index, start_offset, end_offset,
                                    text, hash, deleted)
                VALUES (?, ?, ?, ?, ?, ?, ?, 0)
                ON CONFLICT(id) DO UPDATE SET
                    chunk_index = excluded.chunk_index,
                    start_offset = excluded.start_offset,
                    end_offset = excluded.end_offset,
                    text = excluded.text,
                    hash = excluded.hash
                "#,
            )
            .bind(chunk.id.to_string())
            .bind(chunk.document_id.to_string())
            .bind(chunk.index as i64)
            .bind(chunk.start as i64)
            .bind(chunk.end as i64)
            .bind(&chunk.text)
            .bind(&chunk.hash)
            .execute(&mut *tx)
            .await?;

            if let Some(embedding) = &chunk.embedding {
                insert_embedding(&mut tx, &chunk.id, embedding).await?;
            }
        }
        tx.commit().await?;
        Ok(())
    }

    async fn get_chunk(&self, id: &ChunkId) -> Result<Option<Chunk>> {
        let sql = format!(
            r#"
            SELECT {CHUNK_COLUMNS}
            FROM chunks c
            JOIN documents d ON d.id = c.document_id
            LEFT JOIN embeddings e ON e.chunk_id = c.id
            WHERE c.id = ? AND c.deleted = 0 AND d.deleted = 0
            "#
        );
        let row = sqlx::query(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_chunk).transpose()
    }

    async fn get_chunks(&self, ids: &[ChunkId]) -> Result<Vec<Chunk>> {
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(chunk) = self.get_chunk(id).await? {
                out.push(chunk);
            }
        }
        Ok(out)
    }

    async fn upsert_embedding(&self, chunk_id: &ChunkId, embedding: &Embedding) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        insert_embedding(&mut tx, chunk_id, embedding).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn tombstone_chunk(&self, id: &ChunkId) -> Result<bool> {
        let result = sqlx::query("UPDATE chunks SET deleted = 1 WHERE id = ? AND deleted = 0")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn tombstone_document(&self, id: &DocumentId) -> Result<Vec<ChunkId>> {
        let mut tx = self.pool.begin().await?;
        let doc = sqlx::query("UPDATE documents SET deleted = 1 WHERE id = ? AND deleted = 0")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;
        if doc.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(Vec::new());
        }

        let rows: Vec<String> = sqlx::query_scalar(
            "SELECT id FROM chunks WHERE document_id = ? AND deleted = 0 ORDER BY chunk_index",
        )
        .bind(id.to_string())
        .fetch_all(&mut *tx)
        .await?;
        sqlx::query("UPDATE chunks SET deleted = 1 WHERE document_id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        rows.iter().map(|raw| parse_uuid(raw)).collect()
    }

    async fn live_chunks(&self) -> Result<Vec<Chunk>> {
        let sql = format!(
            r#"
            SELECT {CHUNK_COLUMNS}
            FROM chunks c
            JOIN documents d ON d.id = c.document_id
            LEFT JOIN embeddings e ON e.chunk_id = c.id
            WHERE c.deleted = 0 AND d.deleted = 0
            ORDER BY d.ingested_at, d.rowid, c.chunk_index
            "#
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(row_to_chunk).collect()
    }
}

async fn insert_embedding(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    chunk_id: &ChunkId,
    embedding: &Embedding,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO embeddings (chunk_id, model, dims, vector)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(chunk_id) DO UPDATE SET
            model = excluded.model,
            dims = excluded.dims,
            vector = excluded.vector
        "#,
    )
    .bind(chunk_id.to_string())
    .bind(&embedding.model)
    .bind(embedding.vector.len() as i64)
    .bind(vec_to_blob(&embedding.vector))
    .execute(&mut **tx)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DbConfig;
    use crate::normalize::{ChunkStrategy, Normalizer};

    async fn open(dir: &tempfile::TempDir) -> SqliteChunkStore {
        let config = DbConfig {
            path: dir.path().join("store.sqlite"),
        };
        let pool = crate::db::connect(&config).await.unwrap();
        crate::migrate::run_migrations(&pool).await.unwrap();
        SqliteChunkStore::new(pool)
    }

    #[tokio::test]
    async fn roundtrips_documents_chunks_and_embeddings() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir).await;

        let doc = Document::new("file:///notes/a.md", "alpha beta gamma delta")
            .with_content_type("md")
            .with_metadata("label", "notes");
        let mut chunks =
            Normalizer::new(ChunkStrategy::Window { tokens: 2 }).chunk_text(doc.id, "alpha beta gamma delta");
        chunks[0].embedding = Some(Embedding {
            model: "hashing-v1-4".into(),
            vector: vec![0.5, -0.5, 0.25, 0.0],
        });
        store.upsert_document(&doc).await.unwrap();
        store.upsert_chunks(&chunks).await.unwrap();

        let got = store.get_document(&doc.id).await.unwrap().unwrap();
        assert_eq!(got.content, doc.content);
        assert_eq!(got.metadata, doc.metadata);
        assert_eq!(got.content_type.as_deref(), Some("md"));

        assert_eq!(store.live_chunks().await.unwrap(), chunks);
        let latest = store.latest_version("file:///notes/a.md").await.unwrap().unwrap();
        assert_eq!(latest.id, doc.id);
        assert_eq!(latest.live_chunks, 2);
    }

    #[tokio::test]
    async fn tombstones_persist() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir).await;
        let doc = Document::new("mine://x", "one two three");
        let chunks = Normalizer::new(ChunkStrategy::Window { tokens: 1 }).chunk_text(doc.id, "one two three");
        store.upsert_document(&doc).await.unwrap();
        store.upsert_chunks(&chunks).await.unwrap();

        assert!(store.tombstone_chunk(&chunks[1].id).await.unwrap());
        let ids: Vec<ChunkId> = chunks.iter().map(|c| c.id).collect();
        assert_eq!(store.get_chunks(&ids).await.unwrap().len(), 2);

        let removed = store.tombstone_document(&doc.id).await.unwrap();
        assert_eq!(removed, vec![chunks[0].id, chunks[2].id]);
        assert!(store.tombstone_document(&doc.id).await.unwrap().is_empty());
        assert!(store.live_chunks().await.unwrap().is_empty());
        assert!(store.get_document(&doc.id).await.unwrap().is_none());
    }
}
