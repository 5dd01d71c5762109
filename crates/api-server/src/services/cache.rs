//! Query cache: exact-hash + semantic lookup backed by the `query_cache`
//! Postgres table rather than an in-memory map, so cache state survives
//! restarts and is visible across worker processes.

use chrono::{Duration as ChronoDuration, Utc};
use pgvector::Vector;
use rag_core::db::DbPool;
use rag_core::error::CoreError;
use rag_core::models::CacheEntry;
use uuid::Uuid;

pub struct CachedAnswer {
    pub entry_id: Uuid,
    pub response_text: String,
    pub sources: serde_json::Value,
}

pub struct QueryCache {
    pool: DbPool,
    ttl_seconds: i64,
    semantic_threshold: f32,
}

impl QueryCache {
    pub fn new(pool: DbPool, ttl_seconds: i64, semantic_threshold: f32) -> Self {
        Self {
            pool,
            ttl_seconds,
            semantic_threshold,
        }
    }

    /// O(1) exact lookup via the unique `(chat_id, query_hash)` index,
    /// excluding expired rows. Callers should try this before paying for a
    /// query embedding, since a literal-question cache hit needs no
    /// semantic comparison at all.
    pub async fn lookup_exact(&self, chat_id: Uuid, query_hash: &str) -> Result<Option<CachedAnswer>, CoreError> {
        let row = sqlx::query_as::<_, CacheEntry>(
            r#"SELECT id, user_id, chat_id, query_text, query_hash, query_embedding,
                      response_text, sources, created_at, expires_at, hit_count
               FROM query_cache
               WHERE chat_id = $1 AND query_hash = $2 AND expires_at > now()"#,
        )
        .bind(chat_id)
        .bind(query_hash)
        .fetch_optional(self.pool.get_pool())
        .await?;

        Ok(row.map(|entry| CachedAnswer {
            entry_id: entry.id,
            response_text: entry.response_text,
            sources: entry.sources,
        }))
    }

    /// Nearest cached embedding for this chat at cosine similarity >=
    /// threshold, excluding expired rows. Only worth calling on an exact
    /// miss, since it requires the caller to have already computed a
    /// query embedding.
    pub async fn lookup_semantic(
        &self,
        chat_id: Uuid,
        query_embedding: &Vector,
    ) -> Result<Option<CachedAnswer>, CoreError> {
        let row = sqlx::query_as::<_, CacheEntry>(
            r#"SELECT id, user_id, chat_id, query_text, query_hash, query_embedding,
                      response_text, sources, created_at, expires_at, hit_count
               FROM query_cache
               WHERE chat_id = $1
                 AND query_embedding IS NOT NULL
                 AND expires_at > now()
                 AND 1.0 - (query_embedding <=> $2) >= $3
               ORDER BY query_embedding <=> $2 ASC
               LIMIT 1"#,
        )
        .bind(chat_id)
        .bind(query_embedding)
        .bind(self.semantic_threshold)
        .fetch_optional(self.pool.get_pool())
        .await?;

        Ok(row.map(|entry| CachedAnswer {
            entry_id: entry.id,
            response_text: entry.response_text,
            sources: entry.sources,
        }))
    }

    /// Upserts on `(chat_id, query_hash)`; hit-count starts at 0 on insert
    /// and is left untouched on a re-store of the same question.
    pub async fn store(
        &self,
        user_id: Uuid,
        chat_id: Uuid,
        query_text: &str,
        query_hash: &str,
        query_embedding: &Vector,
        response_text: &str,
        sources: &serde_json::Value,
    ) -> Result<(), CoreError> {
        let expires_at = Utc::now() + ChronoDuration::seconds(self.ttl_seconds);

        sqlx::query(
            r#"INSERT INTO query_cache
                   (id, user_id, chat_id, query_text, query_hash, query_embedding,
                    response_text, sources, created_at, expires_at, hit_count)
               VALUES (gen_random_uuid(), $1, $2, $3, $4, $5, $6, $7, now(), $8, 0)
               ON CONFLICT (chat_id, query_hash)
               DO UPDATE SET
                   query_embedding = EXCLUDED.query_embedding,
                   response_text = EXCLUDED.response_text,
                   sources = EXCLUDED.sources,
                   expires_at = EXCLUDED.expires_at"#,
        )
        .bind(user_id)
        .bind(chat_id)
        .bind(query_text)
        .bind(query_hash)
        .bind(query_embedding)
        .bind(response_text)
        .bind(sources)
        .bind(expires_at)
        .execute(self.pool.get_pool())
        .await?;

        Ok(())
    }

    pub async fn increment_hit(&self, entry_id: Uuid) -> Result<(), CoreError> {
        sqlx::query("UPDATE query_cache SET hit_count = hit_count + 1 WHERE id = $1")
            .bind(entry_id)
            .execute(self.pool.get_pool())
            .await?;
        Ok(())
    }

    pub async fn evict_expired(&self) -> Result<u64, CoreError> {
        let result = sqlx::query("DELETE FROM query_cache WHERE expires_at < now()")
            .execute(self.pool.get_pool())
            .await?;
        Ok(result.rows_affected())
    }
}
