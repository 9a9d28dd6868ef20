//! Repository Traits
//!
//! Interfaces for the queue and the outbox. Implementations are in the
//! infrastructure layer.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::domain::entities::{Job, Lease, OutboxMessage, Task, TaskInfo};
use crate::domain::value_objects::{EnqueueOptions, OutboxMessageId, QueueName};
use crate::error::JobResult;

/// Durable job queue
///
/// Delivery is at-least-once: a reserved job holds a lease, and a job whose
/// lease expires is handed to the next `reserve` call with `retried + 1`.
/// Settling takes the [`Lease`] from the reservation; once a job has been
/// handed out again, the old lease yields `LeaseLost`.
#[trait_variant::make(JobQueue: Send)]
pub trait LocalJobQueue {
    /// Queue a task; `TaskIdConflict` if `options.task_id` was used before
    async fn enqueue(&self, task: &Task, options: EnqueueOptions) -> JobResult<TaskInfo>;

    /// Take the next ready job of one priority class
    async fn reserve(&self, queue: QueueName, lease: Duration) -> JobResult<Option<Job>>;

    async fn complete(&self, lease: &Lease) -> JobResult<()>;

    /// Back to pending at `run_at`, counting one retry
    async fn retry(&self, lease: &Lease, run_at: DateTime<Utc>, error: &str) -> JobResult<()>;

    /// Dead-letter
    async fn kill(&self, lease: &Lease, error: &str) -> JobResult<()>;

    async fn dead_letters(&self, limit: i64) -> JobResult<Vec<Job>>;

    /// Delete completed jobs last touched before `now - older_than`
    async fn purge_completed(&self, older_than: Duration) -> JobResult<u64>;
}

/// Outbox rows waiting for the relay
#[trait_variant::make(OutboxRepository: Send)]
pub trait LocalOutboxRepository {
    /// Claim up to `limit` undispatched rows whose previous claim lapsed
    async fn claim_pending(&self, limit: i64, lease: Duration) -> JobResult<Vec<OutboxMessage>>;

    async fn mark_dispatched(&self, id: OutboxMessageId) -> JobResult<()>;

    /// Keep the row pending; it is retried once its claim lapses
    async fn record_failure(&self, id: OutboxMessageId, error: &str) -> JobResult<()>;

    /// Delete rows dispatched before `now - older_than`
    async fn purge_dispatched(&self, older_than: Duration) -> JobResult<u64>;
}
