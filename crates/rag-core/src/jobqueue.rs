use crate::db::DbPool;
use crate::error::CoreError;
use crate::models::{JobStatus, ProcessingJob};
use chrono::{Duration as ChronoDuration, Utc};
use uuid::Uuid;

/// Priority levels, used as an ORDER BY tiebreaker on the durable
/// `processing_jobs` table rather than an in-memory sort key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum JobPriority {
    Low = 0,
    Normal = 1,
    High = 2,
}

/// Durable, multi-worker-safe job queue backed by `SELECT ... FOR UPDATE
/// SKIP LOCKED` leasing against the `processing_jobs` table, so a worker
/// crash mid-job or multiple concurrent worker processes are both safe —
/// unlike dispatching purely in-process off LISTEN/NOTIFY into an
/// in-memory queue.
pub struct JobQueue {
    pool: DbPool,
}

impl JobQueue {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn enqueue(
        &self,
        document_id: Uuid,
        priority: JobPriority,
        max_attempts: i32,
    ) -> Result<Uuid, CoreError> {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"INSERT INTO processing_jobs
                   (id, document_id, status, priority, attempts, max_attempts, created_at)
               VALUES ($1, $2, 'QUEUED', $3, 0, $4, now())"#,
        )
        .bind(id)
        .bind(document_id)
        .bind(priority as i32)
        .bind(max_attempts)
        .execute(self.pool.get_pool())
        .await?;
        Ok(id)
    }

    /// Leases the next queued (or stale-abandoned) job to `worker_id` for
    /// `lease_seconds`, highest priority and oldest first, skipping rows
    /// already locked by a concurrent lease attempt.
    pub async fn lease_next(
        &self,
        worker_id: &str,
        lease_seconds: i64,
    ) -> Result<Option<ProcessingJob>, CoreError> {
        let mut tx = self.pool.get_pool().begin().await?;

        let candidate = sqlx::query_as::<_, ProcessingJob>(
            r#"SELECT id, document_id, status, priority, attempts, max_attempts,
                      last_error, locked_by, locked_until, created_at, started_at, completed_at
               FROM processing_jobs
               WHERE status = 'QUEUED'
                  OR (status = 'PROCESSING' AND locked_until < now())
               ORDER BY priority DESC, created_at ASC
               LIMIT 1
               FOR UPDATE SKIP LOCKED"#,
        )
        .fetch_optional(&mut *tx)
        .await?;

        let Some(mut job) = candidate else {
            tx.commit().await?;
            return Ok(None);
        };

        let locked_until = Utc::now() + ChronoDuration::seconds(lease_seconds);
        sqlx::query(
            r#"UPDATE processing_jobs
               SET status = 'PROCESSING', locked_by = $1, locked_until = $2,
                   attempts = attempts + 1, started_at = COALESCE(started_at, now())
               WHERE id = $3"#,
        )
        .bind(worker_id)
        .bind(locked_until)
        .bind(job.id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        job.status = JobStatus::Processing;
        job.locked_by = Some(worker_id.to_string());
        job.locked_until = Some(locked_until);
        job.attempts += 1;
        Ok(Some(job))
    }

    /// Extends a lease for long-running jobs, called periodically by the
    /// worker holding it so another worker's `lease_next` doesn't reclaim
    /// it out from under an in-progress pipeline.
    pub async fn renew_lease(
        &self,
        job_id: Uuid,
        worker_id: &str,
        lease_seconds: i64,
    ) -> Result<(), CoreError> {
        let locked_until = Utc::now() + ChronoDuration::seconds(lease_seconds);
        sqlx::query(
            r#"UPDATE processing_jobs SET locked_until = $1
               WHERE id = $2 AND locked_by = $3 AND status = 'PROCESSING'"#,
        )
        .bind(locked_until)
        .bind(job_id)
        .bind(worker_id)
        .execute(self.pool.get_pool())
        .await?;
        Ok(())
    }

    pub async fn complete(&self, job_id: Uuid) -> Result<(), CoreError> {
        sqlx::query(
            r#"UPDATE processing_jobs
               SET status = 'COMPLETED', completed_at = now(), locked_by = NULL, locked_until = NULL
               WHERE id = $1"#,
        )
        .bind(job_id)
        .execute(self.pool.get_pool())
        .await?;
        Ok(())
    }

    /// Marks a job failed. If `attempts < max_attempts` it goes back to
    /// QUEUED for another lease attempt instead of terminal FAILED.
    pub async fn fail(&self, job_id: Uuid, error: &str) -> Result<(), CoreError> {
        sqlx::query(
            r#"UPDATE processing_jobs
               SET status = CASE WHEN attempts < max_attempts THEN 'QUEUED' ELSE 'FAILED' END,
                   last_error = $2,
                   locked_by = NULL,
                   locked_until = NULL,
                   completed_at = CASE WHEN attempts < max_attempts THEN NULL ELSE now() END
               WHERE id = $1"#,
        )
        .bind(job_id)
        .bind(error)
        .execute(self.pool.get_pool())
        .await?;
        Ok(())
    }

    /// Sweeps jobs whose lease expired without being renewed or completed
    /// back to QUEUED, for workers that died without calling `fail`.
    pub async fn release_stale(&self) -> Result<u64, CoreError> {
        let result = sqlx::query(
            r#"UPDATE processing_jobs
               SET status = 'QUEUED', locked_by = NULL, locked_until = NULL
               WHERE status = 'PROCESSING' AND locked_until < now()"#,
        )
        .execute(self.pool.get_pool())
        .await?;
        Ok(result.rows_affected())
    }
}
