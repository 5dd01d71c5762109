use crate::db::DbPool;
use crate::error::CoreError;
use crate::models::{Document, DocumentTier};
use uuid::Uuid;

/// Document lifecycle persistence, in the same `sqlx::query_as` style as
/// [`crate::store::ChunkStore`].
pub struct DocumentStore {
    pool: DbPool,
}

impl DocumentStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        user_id: Uuid,
        chat_id: Uuid,
        display_name: &str,
        byte_size: i64,
        file_type: &str,
    ) -> Result<Document, CoreError> {
        let doc = sqlx::query_as::<_, Document>(
            r#"INSERT INTO documents
                   (id, user_id, chat_id, display_name, byte_size, file_type, tier,
                    total_chunks, chunks_embedded, created_at)
               VALUES (gen_random_uuid(), $1, $2, $3, $4, $5, 'PENDING', 0, 0, now())
               RETURNING id, user_id, chat_id, display_name, byte_size, file_type, tier,
                         total_chunks, chunks_embedded, error_message, created_at, completed_at"#,
        )
        .bind(user_id)
        .bind(chat_id)
        .bind(display_name)
        .bind(byte_size)
        .bind(file_type)
        .fetch_one(self.pool.get_pool())
        .await?;
        Ok(doc)
    }

    pub async fn get(&self, document_id: Uuid) -> Result<Option<Document>, CoreError> {
        let doc = sqlx::query_as::<_, Document>(
            r#"SELECT id, user_id, chat_id, display_name, byte_size, file_type, tier,
                      total_chunks, chunks_embedded, error_message, created_at, completed_at
               FROM documents WHERE id = $1"#,
        )
        .bind(document_id)
        .fetch_optional(self.pool.get_pool())
        .await?;
        Ok(doc)
    }

    pub async fn list_by_chat(&self, chat_id: Uuid) -> Result<Vec<Document>, CoreError> {
        let docs = sqlx::query_as::<_, Document>(
            r#"SELECT id, user_id, chat_id, display_name, byte_size, file_type, tier,
                      total_chunks, chunks_embedded, error_message, created_at, completed_at
               FROM documents WHERE chat_id = $1 ORDER BY created_at ASC"#,
        )
        .bind(chat_id)
        .fetch_all(self.pool.get_pool())
        .await?;
        Ok(docs)
    }

    pub async fn set_tier(&self, document_id: Uuid, tier: DocumentTier) -> Result<(), CoreError> {
        sqlx::query("UPDATE documents SET tier = $1 WHERE id = $2")
            .bind(tier)
            .bind(document_id)
            .execute(self.pool.get_pool())
            .await?;
        Ok(())
    }

    pub async fn set_total_chunks(&self, document_id: Uuid, total: i32) -> Result<(), CoreError> {
        sqlx::query("UPDATE documents SET total_chunks = $1 WHERE id = $2")
            .bind(total)
            .bind(document_id)
            .execute(self.pool.get_pool())
            .await?;
        Ok(())
    }

    /// Called once per successfully embedded chunk by the sweeper (C6).
    /// When `chunks_embedded` reaches `total_chunks` the document advances
    /// to COMPLETED.
    pub async fn increment_chunks_embedded(
        &self,
        document_id: Uuid,
        by: i32,
    ) -> Result<(), CoreError> {
        sqlx::query(
            r#"UPDATE documents
               SET chunks_embedded = chunks_embedded + $1,
                   tier = CASE WHEN chunks_embedded + $1 >= total_chunks THEN 'COMPLETED' ELSE tier END,
                   completed_at = CASE WHEN chunks_embedded + $1 >= total_chunks THEN now() ELSE completed_at END
               WHERE id = $2"#,
        )
        .bind(by)
        .bind(document_id)
        .execute(self.pool.get_pool())
        .await?;
        Ok(())
    }

    pub async fn mark_failed(&self, document_id: Uuid, error: &str) -> Result<(), CoreError> {
        sqlx::query("UPDATE documents SET tier = 'FAILED', error_message = $1 WHERE id = $2")
            .bind(error)
            .bind(document_id)
            .execute(self.pool.get_pool())
            .await?;
        Ok(())
    }

    /// The readiness gate the Query Orchestrator (C8) checks before
    /// answering: are any of this chat's documents still mid-pipeline.
    pub async fn count_still_processing(&self, chat_id: Uuid) -> Result<i64, CoreError> {
        let count: i64 = sqlx::query_scalar(
            r#"SELECT COUNT(*) FROM documents
               WHERE chat_id = $1 AND tier IN ('PENDING', 'EXTRACTING', 'CHUNKED')"#,
        )
        .bind(chat_id)
        .fetch_one(self.pool.get_pool())
        .await?;
        Ok(count)
    }

    /// Documents in EMBEDDING or later that the sweeper still needs to
    /// consider for the next backfill pass.
    pub async fn list_embedding_candidates(&self, limit: i64) -> Result<Vec<Document>, CoreError> {
        let docs = sqlx::query_as::<_, Document>(
            r#"SELECT id, user_id, chat_id, display_name, byte_size, file_type, tier,
                      total_chunks, chunks_embedded, error_message, created_at, completed_at
               FROM documents
               WHERE tier = 'EMBEDDING'
               ORDER BY created_at ASC
               LIMIT $1"#,
        )
        .bind(limit)
        .fetch_all(self.pool.get_pool())
        .await?;
        Ok(docs)
    }
}
