use crate::db::DbPool;
use crate::error::CoreError;
use crate::models::Chunk;
use chrono::{DateTime, Utc};
use pgvector::Vector;
use sqlx::FromRow;
use uuid::Uuid;

/// Flat row shape for a chunk plus its sub-search score. `sqlx::FromRow`
/// decodes positionally column-by-column, so the score column can't be
/// bolted onto a nested `Chunk` inside a tuple — it needs its own struct.
#[derive(Debug, Clone, FromRow)]
struct ScoredChunkRow {
    id: Uuid,
    document_id: Uuid,
    user_id: Uuid,
    chat_id: Uuid,
    chunk_index: i32,
    content: String,
    content_hash: String,
    page_number: Option<i32>,
    slide_number: Option<i32>,
    section_title: Option<String>,
    token_count: i32,
    #[sqlx(default)]
    embedding: Option<Vector>,
    created_at: DateTime<Utc>,
    score: f32,
}

impl From<ScoredChunkRow> for ScoredChunk {
    fn from(row: ScoredChunkRow) -> Self {
        ScoredChunk {
            chunk: Chunk {
                id: row.id,
                document_id: row.document_id,
                user_id: row.user_id,
                chat_id: row.chat_id,
                chunk_index: row.chunk_index,
                content: row.content,
                content_hash: row.content_hash,
                page_number: row.page_number,
                slide_number: row.slide_number,
                section_title: row.section_title,
                token_count: row.token_count,
                embedding: row.embedding,
                created_at: row.created_at,
            },
            score: row.score,
        }
    }
}

/// Chunk persistence and retrieval: an upsert transaction plus keyword and
/// vector sub-search queries, run as inline SQL against the
/// `document_chunks` table rather than stored procedures.
pub struct ChunkStore {
    pool: DbPool,
}

/// One row of a keyword or vector sub-search, before RRF fusion (C7).
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

impl ChunkStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Inserts or replaces all chunks for a document in one transaction;
    /// the `ON CONFLICT (document_id, chunk_index) DO UPDATE` upsert makes
    /// re-ingestion of a document idempotent.
    pub async fn insert_chunks_batch(&self, chunks: &[Chunk]) -> Result<(), CoreError> {
        if chunks.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.get_pool().begin().await?;

        for chunk in chunks {
            sqlx::query(
                r#"INSERT INTO document_chunks
                   (id, document_id, user_id, chat_id, chunk_index, content,
                    content_hash, page_number, slide_number, section_title,
                    token_count, embedding, created_at)
                   VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, now())
                   ON CONFLICT (document_id, chunk_index)
                   DO UPDATE SET
                       content = EXCLUDED.content,
                       content_hash = EXCLUDED.content_hash,
                       page_number = EXCLUDED.page_number,
                       slide_number = EXCLUDED.slide_number,
                       section_title = EXCLUDED.section_title,
                       token_count = EXCLUDED.token_count,
                       embedding = EXCLUDED.embedding"#,
            )
            .bind(chunk.id)
            .bind(chunk.document_id)
            .bind(chunk.user_id)
            .bind(chunk.chat_id)
            .bind(chunk.chunk_index)
            .bind(&chunk.content)
            .bind(&chunk.content_hash)
            .bind(chunk.page_number)
            .bind(chunk.slide_number)
            .bind(&chunk.section_title)
            .bind(chunk.token_count)
            .bind(chunk.embedding.clone())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn update_embedding(&self, chunk_id: Uuid, embedding: Vector) -> Result<(), CoreError> {
        sqlx::query("UPDATE document_chunks SET embedding = $1 WHERE id = $2")
            .bind(embedding)
            .bind(chunk_id)
            .execute(self.pool.get_pool())
            .await?;
        Ok(())
    }

    /// Chunks awaiting embedding for a document, oldest-chunk-index first,
    /// capped at `limit` — the unit of work the Embedding Backfill Sweeper
    /// (C6) pulls per batch.
    pub async fn find_pending_embeddings(
        &self,
        document_id: Uuid,
        limit: i64,
    ) -> Result<Vec<Chunk>, CoreError> {
        let chunks = sqlx::query_as::<_, Chunk>(
            r#"SELECT id, document_id, user_id, chat_id, chunk_index, content,
                      content_hash, page_number, slide_number, section_title,
                      token_count, embedding, created_at
               FROM document_chunks
               WHERE document_id = $1 AND embedding IS NULL
               ORDER BY chunk_index ASC
               LIMIT $2"#,
        )
        .bind(document_id)
        .bind(limit)
        .fetch_all(self.pool.get_pool())
        .await?;

        Ok(chunks)
    }

    pub async fn count_pending_embeddings(&self, document_id: Uuid) -> Result<i64, CoreError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM document_chunks WHERE document_id = $1 AND embedding IS NULL",
        )
        .bind(document_id)
        .fetch_one(self.pool.get_pool())
        .await?;
        Ok(count)
    }

    /// Full-text keyword search via `ts_rank` over `content_tsv`, scoped to
    /// the owning chat (and optionally a single document). Joins
    /// `documents` to exclude chunks whose parent isn't COMPLETED yet, so
    /// a document still in CHUNKED/EMBEDDING never leaks partial results.
    pub async fn keyword_search(
        &self,
        chat_id: Uuid,
        query_text: &str,
        document_id: Option<Uuid>,
        limit: i64,
    ) -> Result<Vec<ScoredChunk>, CoreError> {
        let rows = sqlx::query_as::<_, ScoredChunkRow>(
            r#"SELECT
                   c.id, c.document_id, c.user_id, c.chat_id, c.chunk_index, c.content,
                   c.content_hash, c.page_number, c.slide_number, c.section_title,
                   c.token_count, c.embedding, c.created_at,
                   ts_rank(c.content_tsv, plainto_tsquery('english', $2)) AS score
               FROM document_chunks c
               JOIN documents d ON d.id = c.document_id AND d.tier = 'COMPLETED'
               WHERE c.chat_id = $1
                 AND c.content_tsv @@ plainto_tsquery('english', $2)
                 AND ($3::uuid IS NULL OR c.document_id = $3)
               ORDER BY score DESC
               LIMIT $4"#,
        )
        .bind(chat_id)
        .bind(query_text)
        .bind(document_id)
        .bind(limit)
        .fetch_all(self.pool.get_pool())
        .await?;

        Ok(rows.into_iter().map(ScoredChunk::from).collect())
    }

    /// ANN vector search via pgvector's `<=>` cosine-distance operator,
    /// converted to a similarity score (`1 - distance`). Joins `documents`
    /// to exclude chunks whose parent isn't COMPLETED yet, matching
    /// `keyword_search`'s partial-result exclusion.
    pub async fn vector_search(
        &self,
        chat_id: Uuid,
        query_embedding: Vector,
        document_id: Option<Uuid>,
        limit: i64,
    ) -> Result<Vec<ScoredChunk>, CoreError> {
        let rows = sqlx::query_as::<_, ScoredChunkRow>(
            r#"SELECT
                   c.id, c.document_id, c.user_id, c.chat_id, c.chunk_index, c.content,
                   c.content_hash, c.page_number, c.slide_number, c.section_title,
                   c.token_count, c.embedding, c.created_at,
                   1.0 - (c.embedding <=> $2) AS score
               FROM document_chunks c
               JOIN documents d ON d.id = c.document_id AND d.tier = 'COMPLETED'
               WHERE c.chat_id = $1
                 AND c.embedding IS NOT NULL
                 AND ($3::uuid IS NULL OR c.document_id = $3)
               ORDER BY c.embedding <=> $2 ASC
               LIMIT $4"#,
        )
        .bind(chat_id)
        .bind(query_embedding)
        .bind(document_id)
        .bind(limit)
        .fetch_all(self.pool.get_pool())
        .await?;

        Ok(rows.into_iter().map(ScoredChunk::from).collect())
    }

    pub async fn delete_by_document(&self, document_id: Uuid) -> Result<u64, CoreError> {
        let result = sqlx::query("DELETE FROM document_chunks WHERE document_id = $1")
            .bind(document_id)
            .execute(self.pool.get_pool())
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn delete_by_chat(&self, chat_id: Uuid) -> Result<u64, CoreError> {
        let result = sqlx::query("DELETE FROM document_chunks WHERE chat_id = $1")
            .bind(chat_id)
            .execute(self.pool.get_pool())
            .await?;
        Ok(result.rows_affected())
    }
}
