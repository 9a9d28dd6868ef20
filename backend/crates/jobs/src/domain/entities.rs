//! Domain Entities

use chrono::{DateTime, Utc};
use serde::{Serialize, de::DeserializeOwned};

use crate::domain::value_objects::{
    EnqueueOptions, JobId, JobState, LeaseToken, OutboxMessageId, QueueName,
};

/// A unit of work before it is queued: type tag plus opaque payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub task_type: String,
    pub payload: Vec<u8>,
}

impl Task {
    pub fn new(task_type: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            task_type: task_type.into(),
            payload,
        }
    }

    /// JSON payload, the convention for every task in this service
    pub fn json<T: Serialize>(
        task_type: impl Into<String>,
        payload: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::new(task_type, serde_json::to_vec(payload)?))
    }
}

/// Receipt returned by `enqueue`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskInfo {
    pub id: JobId,
    pub task_type: String,
    pub queue: QueueName,
    pub max_retry: u32,
    pub process_at: DateTime<Utc>,
}

/// A queued job
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub task_type: String,
    pub payload: Vec<u8>,
    pub queue: QueueName,
    pub state: JobState,
    /// Failed or abandoned attempts so far
    pub retried: u32,
    pub max_retry: u32,
    pub process_at: DateTime<Utc>,
    pub lease_expires_at: Option<DateTime<Utc>>,
    /// Set while active; replaced on every reservation
    pub lease_token: Option<LeaseToken>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Proof of holding a reserved job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lease {
    pub job_id: JobId,
    pub token: LeaseToken,
}

impl Job {
    /// Fresh pending job; `task_id` in the options wins over a random id
    pub fn pending(task: &Task, options: &EnqueueOptions, now: DateTime<Utc>) -> Self {
        let process_at = now
            + chrono::Duration::from_std(options.process_in).unwrap_or(chrono::Duration::zero());
        Self {
            id: options.task_id.unwrap_or_default(),
            task_type: task.task_type.clone(),
            payload: task.payload.clone(),
            queue: options.queue,
            state: JobState::Pending,
            retried: 0,
            max_retry: options.max_retry,
            process_at,
            lease_expires_at: None,
            lease_token: None,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// The lease handed out by the reservation that returned this job
    pub fn lease(&self) -> Option<Lease> {
        self.lease_token.map(|token| Lease {
            job_id: self.id,
            token,
        })
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.payload)
    }

    /// No retry budget left; the next failure dead-letters the job
    pub fn retries_exhausted(&self) -> bool {
        self.retried >= self.max_retry
    }

    pub fn is_ready(&self, now: DateTime<Utc>) -> bool {
        self.state == JobState::Pending && self.process_at <= now
    }

    /// Active, but the worker holding it stopped renewing
    pub fn lease_expired(&self, now: DateTime<Utc>) -> bool {
        self.state == JobState::Active && self.lease_expires_at.is_some_and(|until| until < now)
    }

    pub fn info(&self) -> TaskInfo {
        TaskInfo {
            id: self.id,
            task_type: self.task_type.clone(),
            queue: self.queue,
            max_retry: self.max_retry,
            process_at: self.process_at,
        }
    }
}

/// Outbox row to be written inside a store transaction
#[derive(Debug, Clone)]
pub struct NewOutboxMessage {
    pub id: OutboxMessageId,
    pub task: Task,
    pub options: EnqueueOptions,
}

impl NewOutboxMessage {
    pub fn new(task: Task, options: EnqueueOptions) -> Self {
        Self {
            id: OutboxMessageId::new(),
            task,
            options,
        }
    }

    pub fn json<T: Serialize>(
        task_type: impl Into<String>,
        payload: &T,
        options: EnqueueOptions,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::new(Task::json(task_type, payload)?, options))
    }
}

/// Outbox rows collected while a transaction is open
#[derive(Debug, Clone, Default)]
pub struct OutboxBatch {
    messages: Vec<NewOutboxMessage>,
}

impl OutboxBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: NewOutboxMessage) {
        self.messages.push(message);
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, NewOutboxMessage> {
        self.messages.iter()
    }
}

impl IntoIterator for OutboxBatch {
    type Item = NewOutboxMessage;
    type IntoIter = std::vec::IntoIter<NewOutboxMessage>;

    fn into_iter(self) -> Self::IntoIter {
        self.messages.into_iter()
    }
}

/// Stored outbox row
#[derive(Debug, Clone)]
pub struct OutboxMessage {
    pub id: OutboxMessageId,
    pub task: Task,
    pub options: EnqueueOptions,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub claimed_until: Option<DateTime<Utc>>,
    pub dispatched_at: Option<DateTime<Utc>>,
}

impl OutboxMessage {
    /// The job id a relay uses, so a second relay of this row is a no-op
    pub fn job_id(&self) -> JobId {
        JobId::from_uuid(*self.id.as_uuid())
    }

    /// Options with the dedup key filled in
    pub fn enqueue_options(&self) -> EnqueueOptions {
        self.options.clone().task_id(self.job_id())
    }

    pub fn is_claimable(&self, now: DateTime<Utc>) -> bool {
        self.dispatched_at.is_none() && self.claimed_until.is_none_or(|until| until <= now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::time::Duration;

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Payload {
        name: String,
    }

    #[test]
    fn test_pending_job_honors_options() {
        let now = Utc::now();
        let task_id = JobId::new();
        let task = Task::json("task:test", &Payload { name: "alice".into() }).unwrap();
        let options = EnqueueOptions::new()
            .queue(QueueName::Critical)
            .max_retry(3)
            .process_in(Duration::from_secs(5))
            .task_id(task_id);

        let job = Job::pending(&task, &options, now);
        assert_eq!(job.id, task_id);
        assert_eq!(job.queue, QueueName::Critical);
        assert_eq!(job.process_at, now + chrono::Duration::seconds(5));
        assert!(!job.is_ready(now));
        assert!(job.is_ready(now + chrono::Duration::seconds(5)));
        assert_eq!(
            job.decode::<Payload>().unwrap(),
            Payload { name: "alice".into() }
        );
    }

    #[test]
    fn test_decode_ignores_unknown_fields() {
        let task = Task::new("t", br#"{"name":"bob","extra":1}"#.to_vec());
        let job = Job::pending(&task, &EnqueueOptions::default(), Utc::now());
        assert_eq!(job.decode::<Payload>().unwrap().name, "bob");
    }

    #[test]
    fn test_retries_exhausted() {
        let task = Task::new("t", vec![]);
        let mut job = Job::pending(&task, &EnqueueOptions::new().max_retry(2), Utc::now());
        assert!(!job.retries_exhausted());
        job.retried = 2;
        assert!(job.retries_exhausted());
    }

    #[test]
    fn test_lease_only_while_reserved() {
        let mut job = Job::pending(&Task::new("t", vec![]), &EnqueueOptions::default(), Utc::now());
        assert!(job.lease().is_none());

        let token = LeaseToken::new();
        job.lease_token = Some(token);
        assert_eq!(job.lease(), Some(Lease { job_id: job.id, token }));
    }

    #[test]
    fn test_outbox_job_id_matches_row_id() {
        let msg = NewOutboxMessage::new(Task::new("t", vec![]), EnqueueOptions::default());
        let stored = OutboxMessage {
            id: msg.id,
            task: msg.task,
            options: msg.options,
            attempts: 0,
            last_error: None,
            created_at: Utc::now(),
            claimed_until: None,
            dispatched_at: None,
        };
        assert_eq!(stored.job_id().as_uuid(), stored.id.as_uuid());
        assert_eq!(stored.enqueue_options().task_id, Some(stored.job_id()));
        assert!(stored.is_claimable(Utc::now()));
    }
}
