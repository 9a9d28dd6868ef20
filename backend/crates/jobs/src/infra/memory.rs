//! In-memory queue and outbox
//!
//! Same contract as the Postgres implementations, for tests and for running
//! the service without a database-backed queue. The queue clock can be moved
//! forward to make delayed jobs ready and leases expire.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::domain::entities::{Job, Lease, OutboxBatch, OutboxMessage, Task, TaskInfo};
use crate::domain::repository::{JobQueue, OutboxRepository};
use crate::domain::value_objects::{
    EnqueueOptions, JobId, JobState, LeaseToken, OutboxMessageId, QueueName,
};
use crate::error::{JobError, JobResult};

fn to_chrono(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or_else(|_| chrono::Duration::days(365 * 100))
}

struct QueueState {
    jobs: HashMap<JobId, Job>,
    clock_offset: chrono::Duration,
    failing_enqueues: u32,
}

impl Default for QueueState {
    fn default() -> Self {
        Self {
            jobs: HashMap::new(),
            clock_offset: chrono::Duration::zero(),
            failing_enqueues: 0,
        }
    }
}

impl QueueState {
    fn now(&self) -> DateTime<Utc> {
        Utc::now() + self.clock_offset
    }

    /// The job `lease` was issued for, if that lease is still the current one
    fn leased(&mut self, lease: &Lease) -> JobResult<&mut Job> {
        let job = self
            .jobs
            .get_mut(&lease.job_id)
            .ok_or(JobError::NotFound(lease.job_id))?;
        if job.state != JobState::Active || job.lease_token != Some(lease.token) {
            return Err(JobError::LeaseLost(lease.job_id));
        }
        Ok(job)
    }
}

#[derive(Default)]
pub struct MemoryJobQueue {
    state: Mutex<QueueState>,
}

impl MemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> JobResult<MutexGuard<'_, QueueState>> {
        self.state
            .lock()
            .map_err(|_| JobError::Internal("memory queue lock poisoned".to_string()))
    }

    /// Move the queue clock forward
    pub fn advance(&self, by: Duration) {
        if let Ok(mut state) = self.state.lock() {
            state.clock_offset += to_chrono(by);
        }
    }

    /// Fail the next `n` enqueue calls with an internal error
    pub fn fail_next_enqueues(&self, n: u32) {
        if let Ok(mut state) = self.state.lock() {
            state.failing_enqueues = n;
        }
    }

    /// Snapshot of every job, oldest first
    pub fn jobs(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self
            .state
            .lock()
            .map(|s| s.jobs.values().cloned().collect())
            .unwrap_or_default();
        jobs.sort_by_key(|j| j.created_at);
        jobs
    }

    pub fn get(&self, id: JobId) -> Option<Job> {
        self.state.lock().ok()?.jobs.get(&id).cloned()
    }
}

impl JobQueue for MemoryJobQueue {
    async fn enqueue(&self, task: &Task, options: EnqueueOptions) -> JobResult<TaskInfo> {
        let mut state = self.lock()?;

        if state.failing_enqueues > 0 {
            state.failing_enqueues -= 1;
            return Err(JobError::Internal("injected enqueue failure".to_string()));
        }

        let job = Job::pending(task, &options, state.now());
        if state.jobs.contains_key(&job.id) {
            return Err(JobError::TaskIdConflict(job.id));
        }

        let info = job.info();
        state.jobs.insert(job.id, job);
        Ok(info)
    }

    async fn reserve(&self, queue: QueueName, lease: Duration) -> JobResult<Option<Job>> {
        let mut state = self.lock()?;
        let now = state.now();

        // A lapsed lease on the last allowed attempt is a dead job
        for job in state.jobs.values_mut() {
            if job.queue == queue && job.lease_expired(now) && job.retries_exhausted() {
                job.state = JobState::Dead;
                job.lease_expires_at = None;
                job.lease_token = None;
                job.last_error = Some("lease expired on final attempt".to_string());
                job.updated_at = now;
            }
        }

        let next = state
            .jobs
            .values()
            .filter(|j| j.queue == queue && (j.is_ready(now) || j.lease_expired(now)))
            .min_by_key(|j| (j.process_at, j.created_at))
            .map(|j| j.id);

        let Some(id) = next else {
            return Ok(None);
        };
        let Some(job) = state.jobs.get_mut(&id) else {
            return Ok(None);
        };

        if job.state == JobState::Active {
            job.retried += 1;
        }
        job.state = JobState::Active;
        job.lease_expires_at = Some(now + to_chrono(lease));
        job.lease_token = Some(LeaseToken::new());
        job.updated_at = now;

        Ok(Some(job.clone()))
    }

    async fn complete(&self, lease: &Lease) -> JobResult<()> {
        let mut state = self.lock()?;
        let now = state.now();
        let job = state.leased(lease)?;
        job.state = JobState::Completed;
        job.lease_expires_at = None;
        job.lease_token = None;
        job.updated_at = now;
        Ok(())
    }

    async fn retry(&self, lease: &Lease, run_at: DateTime<Utc>, error: &str) -> JobResult<()> {
        let mut state = self.lock()?;
        let now = state.now();
        let offset = state.clock_offset;
        let job = state.leased(lease)?;
        job.state = JobState::Pending;
        job.retried += 1;
        // run_at comes from the wall clock
        job.process_at = run_at + offset;
        job.lease_expires_at = None;
        job.lease_token = None;
        job.last_error = Some(error.to_string());
        job.updated_at = now;
        Ok(())
    }

    async fn kill(&self, lease: &Lease, error: &str) -> JobResult<()> {
        let mut state = self.lock()?;
        let now = state.now();
        let job = state.leased(lease)?;
        job.state = JobState::Dead;
        job.lease_expires_at = None;
        job.lease_token = None;
        job.last_error = Some(error.to_string());
        job.updated_at = now;
        Ok(())
    }

    async fn dead_letters(&self, limit: i64) -> JobResult<Vec<Job>> {
        let state = self.lock()?;
        let mut dead: Vec<Job> = state
            .jobs
            .values()
            .filter(|j| j.state == JobState::Dead)
            .cloned()
            .collect();
        dead.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        dead.truncate(limit.max(0) as usize);
        Ok(dead)
    }

    async fn purge_completed(&self, older_than: Duration) -> JobResult<u64> {
        let mut state = self.lock()?;
        let cutoff = state.now() - to_chrono(older_than);
        let before = state.jobs.len();
        state
            .jobs
            .retain(|_, j| !(j.state == JobState::Completed && j.updated_at < cutoff));
        Ok((before - state.jobs.len()) as u64)
    }
}

#[derive(Default)]
pub struct MemoryOutbox {
    rows: Mutex<Vec<OutboxMessage>>,
}

impl MemoryOutbox {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> JobResult<MutexGuard<'_, Vec<OutboxMessage>>> {
        self.rows
            .lock()
            .map_err(|_| JobError::Internal("memory outbox lock poisoned".to_string()))
    }

    /// Append a batch; the caller's own transaction decides when
    pub fn insert_batch(&self, batch: OutboxBatch) -> JobResult<()> {
        let now = Utc::now();
        let mut rows = self.lock()?;
        rows.extend(batch.into_iter().map(|m| OutboxMessage {
            id: m.id,
            task: m.task,
            options: m.options,
            attempts: 0,
            last_error: None,
            created_at: now,
            claimed_until: None,
            dispatched_at: None,
        }));
        Ok(())
    }

    pub fn messages(&self) -> Vec<OutboxMessage> {
        self.rows.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn pending_count(&self) -> usize {
        self.rows
            .lock()
            .map(|r| r.iter().filter(|m| m.dispatched_at.is_none()).count())
            .unwrap_or_default()
    }
}

impl OutboxRepository for MemoryOutbox {
    async fn claim_pending(&self, limit: i64, lease: Duration) -> JobResult<Vec<OutboxMessage>> {
        let now = Utc::now();
        let mut rows = self.lock()?;
        let mut claimed = Vec::new();

        for row in rows.iter_mut() {
            if claimed.len() as i64 >= limit {
                break;
            }
            if row.is_claimable(now) {
                row.claimed_until = Some(now + to_chrono(lease));
                row.attempts += 1;
                claimed.push(row.clone());
            }
        }

        Ok(claimed)
    }

    async fn mark_dispatched(&self, id: OutboxMessageId) -> JobResult<()> {
        let mut rows = self.lock()?;
        let row = rows
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| JobError::Internal(format!("outbox row {id} missing")))?;
        row.dispatched_at = Some(Utc::now());
        row.claimed_until = None;
        Ok(())
    }

    async fn record_failure(&self, id: OutboxMessageId, error: &str) -> JobResult<()> {
        let mut rows = self.lock()?;
        let row = rows
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| JobError::Internal(format!("outbox row {id} missing")))?;
        row.last_error = Some(error.to_string());
        Ok(())
    }

    async fn purge_dispatched(&self, older_than: Duration) -> JobResult<u64> {
        let cutoff = Utc::now() - to_chrono(older_than);
        let mut rows = self.lock()?;
        let before = rows.len();
        rows.retain(|r| r.dispatched_at.is_none_or(|at| at > cutoff));
        Ok((before - rows.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task() -> Task {
        Task::new("task:test", br#"{"name":"alice"}"#.to_vec())
    }

    #[test]
    fn test_empty_queue_reserves_nothing() {
        let queue = MemoryJobQueue::new();
        let reserved =
            tokio_test::block_on(queue.reserve(QueueName::Critical, Duration::from_secs(30)));
        assert!(reserved.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delayed_job_waits_for_process_at() {
        let queue = MemoryJobQueue::new();
        queue
            .enqueue(&task(), EnqueueOptions::new().process_in(Duration::from_secs(5)))
            .await
            .unwrap();

        let lease = Duration::from_secs(30);
        assert!(queue.reserve(QueueName::Default, lease).await.unwrap().is_none());

        queue.advance(Duration::from_secs(5));
        assert!(queue.reserve(QueueName::Default, lease).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_queues_are_separate() {
        let queue = MemoryJobQueue::new();
        queue
            .enqueue(&task(), EnqueueOptions::new().queue(QueueName::Critical))
            .await
            .unwrap();

        let lease = Duration::from_secs(30);
        assert!(queue.reserve(QueueName::Default, lease).await.unwrap().is_none());
        assert!(queue.reserve(QueueName::Critical, lease).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_task_id_conflict() {
        let queue = MemoryJobQueue::new();
        let id = JobId::new();
        queue
            .enqueue(&task(), EnqueueOptions::new().task_id(id))
            .await
            .unwrap();

        let err = queue
            .enqueue(&task(), EnqueueOptions::new().task_id(id))
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::TaskIdConflict(conflict) if conflict == id));
        assert_eq!(queue.jobs().len(), 1);
    }

    #[tokio::test]
    async fn test_reserved_job_is_exclusive_until_lease_expires() {
        let queue = MemoryJobQueue::new();
        queue.enqueue(&task(), EnqueueOptions::new()).await.unwrap();

        let lease = Duration::from_secs(30);
        let first = queue.reserve(QueueName::Default, lease).await.unwrap().unwrap();
        assert!(queue.reserve(QueueName::Default, lease).await.unwrap().is_none());

        queue.advance(Duration::from_secs(31));
        let again = queue.reserve(QueueName::Default, lease).await.unwrap().unwrap();
        assert_eq!(again.id, first.id);
        assert_eq!(again.retried, 1);
    }

    #[tokio::test]
    async fn test_lapsed_lease_on_last_attempt_goes_dead() {
        let queue = MemoryJobQueue::new();
        queue
            .enqueue(&task(), EnqueueOptions::new().max_retry(0))
            .await
            .unwrap();

        let lease = Duration::from_secs(1);
        let job = queue.reserve(QueueName::Default, lease).await.unwrap().unwrap();
        queue.advance(Duration::from_secs(2));

        assert!(queue.reserve(QueueName::Default, lease).await.unwrap().is_none());
        assert_eq!(queue.get(job.id).unwrap().state, JobState::Dead);
    }

    #[tokio::test]
    async fn test_stale_worker_cannot_settle_redelivered_job() {
        let queue = MemoryJobQueue::new();
        queue.enqueue(&task(), EnqueueOptions::new()).await.unwrap();

        let lease = Duration::from_secs(1);
        let stale = queue.reserve(QueueName::Default, lease).await.unwrap().unwrap();
        queue.advance(Duration::from_secs(2));
        let current = queue.reserve(QueueName::Default, lease).await.unwrap().unwrap();
        assert_eq!(current.id, stale.id);
        assert_ne!(current.lease_token, stale.lease_token);

        let stale_lease = stale.lease().unwrap();
        let past = Utc::now() - chrono::Duration::seconds(10);
        for err in [
            queue.retry(&stale_lease, past, "stale").await.unwrap_err(),
            queue.complete(&stale_lease).await.unwrap_err(),
            queue.kill(&stale_lease, "stale").await.unwrap_err(),
        ] {
            assert!(matches!(err, JobError::LeaseLost(id) if id == stale.id));
        }

        // Still held by the current worker, nobody else gets it
        assert!(queue.reserve(QueueName::Default, lease).await.unwrap().is_none());
        assert_eq!(queue.get(stale.id).unwrap().state, JobState::Active);

        queue.complete(&current.lease().unwrap()).await.unwrap();
        assert_eq!(queue.get(stale.id).unwrap().state, JobState::Completed);
    }

    #[tokio::test]
    async fn test_settled_lease_cannot_be_reused() {
        let queue = MemoryJobQueue::new();
        queue.enqueue(&task(), EnqueueOptions::new()).await.unwrap();
        let job = queue
            .reserve(QueueName::Default, Duration::from_secs(30))
            .await
            .unwrap()
            .unwrap();
        let lease = job.lease().unwrap();

        queue.complete(&lease).await.unwrap();
        assert!(matches!(
            queue.kill(&lease, "late").await,
            Err(JobError::LeaseLost(_))
        ));
        assert_eq!(queue.get(job.id).unwrap().state, JobState::Completed);
    }

    #[tokio::test]
    async fn test_purge_completed() {
        let queue = MemoryJobQueue::new();
        queue.enqueue(&task(), EnqueueOptions::new()).await.unwrap();
        let job = queue
            .reserve(QueueName::Default, Duration::from_secs(30))
            .await
            .unwrap()
            .unwrap();
        queue.complete(&job.lease().unwrap()).await.unwrap();

        assert_eq!(queue.purge_completed(Duration::from_secs(60)).await.unwrap(), 0);
        queue.advance(Duration::from_secs(61));
        assert_eq!(queue.purge_completed(Duration::from_secs(60)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_outbox_purge_only_touches_dispatched_rows() {
        let outbox = MemoryOutbox::new();
        let mut batch = OutboxBatch::new();
        for _ in 0..2 {
            batch.push(crate::domain::entities::NewOutboxMessage::new(
                task(),
                EnqueueOptions::new(),
            ));
        }
        outbox.insert_batch(batch).unwrap();

        let dispatched = outbox.messages()[0].id;
        outbox.mark_dispatched(dispatched).await.unwrap();

        assert_eq!(outbox.purge_dispatched(Duration::from_secs(3600)).await.unwrap(), 0);
        assert_eq!(outbox.purge_dispatched(Duration::ZERO).await.unwrap(), 1);

        let left = outbox.messages();
        assert_eq!(left.len(), 1);
        assert_ne!(left[0].id, dispatched);
        assert_eq!(outbox.pending_count(), 1);
    }

    #[tokio::test]
    async fn test_outbox_claim_hides_rows_until_lease_lapses() {
        let outbox = MemoryOutbox::new();
        let mut batch = OutboxBatch::new();
        batch.push(crate::domain::entities::NewOutboxMessage::new(
            task(),
            EnqueueOptions::new(),
        ));
        outbox.insert_batch(batch).unwrap();

        let claimed = outbox
            .claim_pending(10, Duration::from_secs(30))
            .await
            .unwrap();
        assert_eq!(claimed.len(), 1);
        assert!(
            outbox
                .claim_pending(10, Duration::from_secs(30))
                .await
                .unwrap()
                .is_empty()
        );

        outbox.mark_dispatched(claimed[0].id).await.unwrap();
        assert_eq!(outbox.pending_count(), 0);
    }
}
