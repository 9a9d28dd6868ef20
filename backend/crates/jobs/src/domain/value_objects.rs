//! Value Objects

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use kernel::id::Id;
use serde::{Deserialize, Serialize};

pub struct JobMarker;
pub type JobId = Id<JobMarker>;

pub struct OutboxMarker;
pub type OutboxMessageId = Id<OutboxMarker>;

/// Fresh for every reservation; settling a job requires the current one
pub struct LeaseMarker;
pub type LeaseToken = Id<LeaseMarker>;

/// Default retry budget when the caller does not set one
pub const DEFAULT_MAX_RETRY: u32 = 25;

/// Priority class. Each class has its own worker loops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueName {
    Critical,
    Default,
}

impl QueueName {
    pub const ALL: [QueueName; 2] = [QueueName::Critical, QueueName::Default];

    pub const fn as_str(&self) -> &'static str {
        match self {
            QueueName::Critical => "critical",
            QueueName::Default => "default",
        }
    }
}

impl fmt::Display for QueueName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueueName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "critical" => Ok(QueueName::Critical),
            "default" => Ok(QueueName::Default),
            other => Err(format!("unknown queue: {other}")),
        }
    }
}

/// Job lifecycle, stored as SMALLINT
///
/// ```text
/// pending -> active -> completed
///   ^          |
///   +- retry --+--> dead
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i16)]
pub enum JobState {
    Pending = 0,
    Active = 1,
    Completed = 2,
    Dead = 3,
}

impl JobState {
    pub const fn as_i16(&self) -> i16 {
        *self as i16
    }

    pub const fn from_i16(value: i16) -> Option<Self> {
        match value {
            0 => Some(JobState::Pending),
            1 => Some(JobState::Active),
            2 => Some(JobState::Completed),
            3 => Some(JobState::Dead),
            _ => None,
        }
    }
}

/// Per-enqueue options
///
/// ```rust
/// use jobs::domain::value_objects::{EnqueueOptions, QueueName};
/// use std::time::Duration;
///
/// let opts = EnqueueOptions::new()
///     .queue(QueueName::Critical)
///     .max_retry(10)
///     .process_in(Duration::from_secs(5));
/// assert_eq!(opts.queue, QueueName::Critical);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnqueueOptions {
    pub queue: QueueName,
    pub max_retry: u32,
    pub process_in: Duration,
    /// Deduplication key; reusing it yields `TaskIdConflict`
    pub task_id: Option<JobId>,
}

impl Default for EnqueueOptions {
    fn default() -> Self {
        Self {
            queue: QueueName::Default,
            max_retry: DEFAULT_MAX_RETRY,
            process_in: Duration::ZERO,
            task_id: None,
        }
    }
}

impl EnqueueOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue(mut self, queue: QueueName) -> Self {
        self.queue = queue;
        self
    }

    pub fn max_retry(mut self, max_retry: u32) -> Self {
        self.max_retry = max_retry;
        self
    }

    pub fn process_in(mut self, delay: Duration) -> Self {
        self.process_in = delay;
        self
    }

    pub fn task_id(mut self, id: JobId) -> Self {
        self.task_id = Some(id);
        self
    }

    pub fn process_in_ms(&self) -> i64 {
        self.process_in.as_millis() as i64
    }
}
