//! PostgreSQL Queue and Outbox
//!
//! Reservation uses `FOR UPDATE SKIP LOCKED`, so any number of worker loops
//! and processes can poll the same table without handing out a job twice.

use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::domain::entities::{Job, Lease, OutboxBatch, OutboxMessage, Task, TaskInfo};
use crate::domain::repository::{JobQueue, OutboxRepository};
use crate::domain::value_objects::{
    EnqueueOptions, JobId, JobState, LeaseToken, OutboxMessageId, QueueName,
};
use crate::error::{JobError, JobResult};

fn to_chrono(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or_else(|_| chrono::Duration::days(365 * 100))
}

const JOB_COLUMNS: &str = r#"
    job_id,
    task_type,
    payload,
    queue,
    state,
    retried,
    max_retry,
    process_at,
    lease_expires_at,
    lease_token,
    last_error,
    created_at,
    updated_at
"#;

#[derive(Clone)]
pub struct PgJobQueue {
    pool: PgPool,
}

impl PgJobQueue {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl JobQueue for PgJobQueue {
    async fn enqueue(&self, task: &Task, options: EnqueueOptions) -> JobResult<TaskInfo> {
        let job = Job::pending(task, &options, Utc::now());

        let inserted = sqlx::query(
            r#"
            INSERT INTO jobs (
                job_id,
                task_type,
                payload,
                queue,
                state,
                retried,
                max_retry,
                process_at,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, 0, $6, $7, $8, $8)
            ON CONFLICT (job_id) DO NOTHING
            "#,
        )
        .bind(job.id.as_uuid())
        .bind(&job.task_type)
        .bind(&job.payload)
        .bind(job.queue.as_str())
        .bind(JobState::Pending.as_i16())
        .bind(job.max_retry as i32)
        .bind(job.process_at)
        .bind(job.created_at)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if inserted == 0 {
            return Err(JobError::TaskIdConflict(job.id));
        }

        tracing::debug!(
            job_id = %job.id,
            task_type = %job.task_type,
            queue = %job.queue,
            "Job enqueued"
        );

        Ok(job.info())
    }

    async fn reserve(&self, queue: QueueName, lease: Duration) -> JobResult<Option<Job>> {
        let now = Utc::now();

        // Crashed on the final attempt: dead-letter instead of redelivering
        let exhausted = sqlx::query(
            r#"
            UPDATE jobs
            SET state = $1,
                lease_expires_at = NULL,
                lease_token = NULL,
                last_error = 'lease expired on final attempt',
                updated_at = $2
            WHERE queue = $3
              AND state = $4
              AND lease_expires_at < $2
              AND retried >= max_retry
            "#,
        )
        .bind(JobState::Dead.as_i16())
        .bind(now)
        .bind(queue.as_str())
        .bind(JobState::Active.as_i16())
        .execute(&self.pool)
        .await?
        .rows_affected();

        if exhausted > 0 {
            tracing::error!(queue = %queue, count = exhausted, "Jobs dead-lettered after lease expiry");
        }

        let row = sqlx::query_as::<_, JobRow>(&format!(
            r#"
            UPDATE jobs
            SET state = $1,
                retried = CASE WHEN state = $1 THEN retried + 1 ELSE retried END,
                lease_expires_at = $2,
                lease_token = $6,
                updated_at = $3
            WHERE job_id = (
                SELECT job_id FROM jobs
                WHERE queue = $4
                  AND (
                    (state = $5 AND process_at <= $3)
                    OR (state = $1 AND lease_expires_at < $3)
                  )
                ORDER BY process_at
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(JobState::Active.as_i16())
        .bind(now + to_chrono(lease))
        .bind(now)
        .bind(queue.as_str())
        .bind(JobState::Pending.as_i16())
        .bind(LeaseToken::new().as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(JobRow::into_job).transpose()
    }

    async fn complete(&self, lease: &Lease) -> JobResult<()> {
        let updated = sqlx::query(
            r#"
            UPDATE jobs
            SET state = $4, lease_expires_at = NULL, lease_token = NULL, updated_at = now()
            WHERE job_id = $1 AND state = $2 AND lease_token = $3
            "#,
        )
        .bind(lease.job_id.as_uuid())
        .bind(JobState::Active.as_i16())
        .bind(lease.token.as_uuid())
        .bind(JobState::Completed.as_i16())
        .execute(&self.pool)
        .await?
        .rows_affected();

        settled(lease, updated)
    }

    async fn retry(&self, lease: &Lease, run_at: DateTime<Utc>, error: &str) -> JobResult<()> {
        let updated = sqlx::query(
            r#"
            UPDATE jobs
            SET state = $4,
                retried = retried + 1,
                process_at = $5,
                lease_expires_at = NULL,
                lease_token = NULL,
                last_error = $6,
                updated_at = now()
            WHERE job_id = $1 AND state = $2 AND lease_token = $3
            "#,
        )
        .bind(lease.job_id.as_uuid())
        .bind(JobState::Active.as_i16())
        .bind(lease.token.as_uuid())
        .bind(JobState::Pending.as_i16())
        .bind(run_at)
        .bind(error)
        .execute(&self.pool)
        .await?
        .rows_affected();

        settled(lease, updated)
    }

    async fn kill(&self, lease: &Lease, error: &str) -> JobResult<()> {
        let updated = sqlx::query(
            r#"
            UPDATE jobs
            SET state = $4,
                lease_expires_at = NULL,
                lease_token = NULL,
                last_error = $5,
                updated_at = now()
            WHERE job_id = $1 AND state = $2 AND lease_token = $3
            "#,
        )
        .bind(lease.job_id.as_uuid())
        .bind(JobState::Active.as_i16())
        .bind(lease.token.as_uuid())
        .bind(JobState::Dead.as_i16())
        .bind(error)
        .execute(&self.pool)
        .await?
        .rows_affected();

        settled(lease, updated)
    }

    async fn dead_letters(&self, limit: i64) -> JobResult<Vec<Job>> {
        let rows = sqlx::query_as::<_, JobRow>(&format!(
            r#"
            SELECT {JOB_COLUMNS}
            FROM jobs
            WHERE state = $1
            ORDER BY updated_at DESC
            LIMIT $2
            "#
        ))
        .bind(JobState::Dead.as_i16())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(JobRow::into_job).collect()
    }

    async fn purge_completed(&self, older_than: Duration) -> JobResult<u64> {
        let cutoff = Utc::now() - to_chrono(older_than);

        let deleted = sqlx::query("DELETE FROM jobs WHERE state = $1 AND updated_at < $2")
            .bind(JobState::Completed.as_i16())
            .bind(cutoff)
            .execute(&self.pool)
            .await?
            .rows_affected();

        tracing::info!(jobs = deleted, "Purged completed jobs");
        Ok(deleted)
    }
}

/// No row matched the lease: the job was handed out again or settled
fn settled(lease: &Lease, updated: u64) -> JobResult<()> {
    if updated == 0 {
        return Err(JobError::LeaseLost(lease.job_id));
    }
    Ok(())
}

/// Write outbox rows on the caller's connection, normally inside the same
/// transaction as the rows that produced them.
pub async fn insert_outbox(conn: &mut PgConnection, batch: &OutboxBatch) -> JobResult<()> {
    for message in batch.iter() {
        sqlx::query(
            r#"
            INSERT INTO outbox (
                outbox_id,
                task_type,
                payload,
                queue,
                max_retry,
                process_in_ms
            ) VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(message.id.as_uuid())
        .bind(&message.task.task_type)
        .bind(&message.task.payload)
        .bind(message.options.queue.as_str())
        .bind(message.options.max_retry as i32)
        .bind(message.options.process_in_ms())
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

#[derive(Clone)]
pub struct PgOutbox {
    pool: PgPool,
}

impl PgOutbox {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl OutboxRepository for PgOutbox {
    async fn claim_pending(&self, limit: i64, lease: Duration) -> JobResult<Vec<OutboxMessage>> {
        let now = Utc::now();

        let rows = sqlx::query_as::<_, OutboxRow>(
            r#"
            UPDATE outbox
            SET claimed_until = $2, attempts = attempts + 1
            WHERE outbox_id IN (
                SELECT outbox_id FROM outbox
                WHERE dispatched_at IS NULL
                  AND (claimed_until IS NULL OR claimed_until <= $1)
                ORDER BY created_at
                LIMIT $3
                FOR UPDATE SKIP LOCKED
            )
            RETURNING
                outbox_id,
                task_type,
                payload,
                queue,
                max_retry,
                process_in_ms,
                attempts,
                last_error,
                created_at,
                claimed_until,
                dispatched_at
            "#,
        )
        .bind(now)
        .bind(now + to_chrono(lease))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(OutboxRow::into_message).collect()
    }

    async fn mark_dispatched(&self, id: OutboxMessageId) -> JobResult<()> {
        sqlx::query(
            "UPDATE outbox SET dispatched_at = now(), claimed_until = NULL WHERE outbox_id = $1",
        )
        .bind(id.as_uuid())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_failure(&self, id: OutboxMessageId, error: &str) -> JobResult<()> {
        sqlx::query("UPDATE outbox SET last_error = $2 WHERE outbox_id = $1")
            .bind(id.as_uuid())
            .bind(error)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn purge_dispatched(&self, older_than: Duration) -> JobResult<u64> {
        let cutoff = Utc::now() - to_chrono(older_than);

        let deleted = sqlx::query("DELETE FROM outbox WHERE dispatched_at <= $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?
            .rows_affected();

        tracing::info!(rows = deleted, "Purged dispatched outbox rows");
        Ok(deleted)
    }
}

// Internal row types for sqlx mapping
#[derive(sqlx::FromRow)]
struct JobRow {
    job_id: Uuid,
    task_type: String,
    payload: Vec<u8>,
    queue: String,
    state: i16,
    retried: i32,
    max_retry: i32,
    process_at: DateTime<Utc>,
    lease_expires_at: Option<DateTime<Utc>>,
    lease_token: Option<Uuid>,
    last_error: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl JobRow {
    fn into_job(self) -> JobResult<Job> {
        let queue: QueueName = self.queue.parse().map_err(JobError::Internal)?;
        let state = JobState::from_i16(self.state)
            .ok_or_else(|| JobError::Internal(format!("invalid job state {}", self.state)))?;

        Ok(Job {
            id: JobId::from_uuid(self.job_id),
            task_type: self.task_type,
            payload: self.payload,
            queue,
            state,
            retried: self.retried.max(0) as u32,
            max_retry: self.max_retry.max(0) as u32,
            process_at: self.process_at,
            lease_expires_at: self.lease_expires_at,
            lease_token: self.lease_token.map(LeaseToken::from_uuid),
            last_error: self.last_error,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct OutboxRow {
    outbox_id: Uuid,
    task_type: String,
    payload: Vec<u8>,
    queue: String,
    max_retry: i32,
    process_in_ms: i64,
    attempts: i32,
    last_error: Option<String>,
    created_at: DateTime<Utc>,
    claimed_until: Option<DateTime<Utc>>,
    dispatched_at: Option<DateTime<Utc>>,
}

impl OutboxRow {
    fn into_message(self) -> JobResult<OutboxMessage> {
        let queue: QueueName = self.queue.parse().map_err(JobError::Internal)?;
        let options = EnqueueOptions::new()
            .queue(queue)
            .max_retry(self.max_retry.max(0) as u32)
            .process_in(Duration::from_millis(self.process_in_ms.max(0) as u64));

        Ok(OutboxMessage {
            id: OutboxMessageId::from_uuid(self.outbox_id),
            task: Task::new(self.task_type, self.payload),
            options,
            attempts: self.attempts.max(0) as u32,
            last_error: self.last_error,
            created_at: self.created_at,
            claimed_until: self.claimed_until,
            dispatched_at: self.dispatched_at,
        })
    }
}
