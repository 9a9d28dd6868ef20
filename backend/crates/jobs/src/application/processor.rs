//! Job Processing
//!
//! Reserve one job, run its handler under a timeout, and report the result
//! back to the queue:
//! - `Ok` completes the job
//! - `Terminal` dead-letters it at once
//! - `Retryable` reschedules it with backoff, or dead-letters it once the
//!   retry budget is spent
//!
//! A job whose lease lapsed mid-run may already belong to another worker;
//! its result is dropped instead of settled.

use std::sync::Arc;

use chrono::Utc;

use crate::application::config::WorkerConfig;
use crate::application::handler::TaskMux;
use crate::domain::entities::Job;
use crate::domain::repository::JobQueue;
use crate::domain::value_objects::{JobId, QueueName};
use crate::error::{JobError, JobResult, ProcessError};

/// What happened to a processed job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Completed(JobId),
    Retried {
        id: JobId,
        run_at: chrono::DateTime<Utc>,
    },
    Dead {
        id: JobId,
        error: String,
    },
    /// Handed to another worker before this one finished
    LeaseLost(JobId),
}

impl Outcome {
    pub fn job_id(&self) -> JobId {
        match self {
            Outcome::Completed(id) | Outcome::LeaseLost(id) => *id,
            Outcome::Retried { id, .. } | Outcome::Dead { id, .. } => *id,
        }
    }
}

pub struct Processor<Q> {
    queue: Arc<Q>,
    mux: Arc<TaskMux>,
    config: WorkerConfig,
}

impl<Q> Processor<Q>
where
    Q: JobQueue + Send + Sync,
{
    pub fn new(queue: Arc<Q>, mux: Arc<TaskMux>, config: WorkerConfig) -> Self {
        Self { queue, mux, config }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Reserve and process at most one job. `None` when the queue is idle.
    pub async fn run_once(&self, queue: QueueName) -> JobResult<Option<Outcome>> {
        match self.queue.reserve(queue, self.config.lease).await? {
            Some(job) => self.process(job).await.map(Some),
            None => Ok(None),
        }
    }

    /// Process until nothing is ready in `queue`
    pub async fn drain(&self, queue: QueueName) -> JobResult<Vec<Outcome>> {
        let mut outcomes = Vec::new();
        while let Some(outcome) = self.run_once(queue).await? {
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    /// Run the handler for an already reserved job and settle it
    pub async fn process(&self, job: Job) -> JobResult<Outcome> {
        let lease = job
            .lease()
            .ok_or_else(|| JobError::Internal(format!("job {} is not reserved", job.id)))?;

        tracing::debug!(
            job_id = %job.id,
            task_type = %job.task_type,
            queue = %job.queue,
            retried = job.retried,
            "Processing job"
        );

        let result = match tokio::time::timeout(self.config.job_timeout, self.mux.dispatch(&job))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(ProcessError::Retryable(format!(
                "handler timed out after {:?}",
                self.config.job_timeout
            ))),
        };

        match result {
            Ok(()) => {
                if let Some(lost) = lease_lost(self.queue.complete(&lease).await)? {
                    return Ok(lost);
                }
                tracing::info!(
                    job_id = %job.id,
                    task_type = %job.task_type,
                    "Job completed"
                );
                Ok(Outcome::Completed(job.id))
            }
            Err(ProcessError::Terminal(error)) => {
                if let Some(lost) = lease_lost(self.queue.kill(&lease, &error).await)? {
                    return Ok(lost);
                }
                tracing::warn!(
                    job_id = %job.id,
                    task_type = %job.task_type,
                    error = %error,
                    "Job failed terminally, skipping retry"
                );
                Ok(Outcome::Dead { id: job.id, error })
            }
            Err(ProcessError::Retryable(error)) if job.retries_exhausted() => {
                if let Some(lost) = lease_lost(self.queue.kill(&lease, &error).await)? {
                    return Ok(lost);
                }
                tracing::error!(
                    job_id = %job.id,
                    task_type = %job.task_type,
                    retried = job.retried,
                    max_retry = job.max_retry,
                    error = %error,
                    "Job retries exhausted, moved to dead letters"
                );
                Ok(Outcome::Dead { id: job.id, error })
            }
            Err(ProcessError::Retryable(error)) => {
                let delay = self.config.retry.backoff(job.retried);
                let run_at = Utc::now()
                    + chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::zero());
                if let Some(lost) = lease_lost(self.queue.retry(&lease, run_at, &error).await)? {
                    return Ok(lost);
                }
                tracing::warn!(
                    job_id = %job.id,
                    task_type = %job.task_type,
                    retried = job.retried + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "Job failed, retry scheduled"
                );
                Ok(Outcome::Retried { id: job.id, run_at })
            }
        }
    }
}

/// A lost lease is an outcome, not a failure of the worker loop
fn lease_lost(settled: JobResult<()>) -> JobResult<Option<Outcome>> {
    match settled {
        Ok(()) => Ok(None),
        Err(err @ JobError::LeaseLost(id)) => {
            err.log();
            Ok(Some(Outcome::LeaseLost(id)))
        }
        Err(err) => Err(err),
    }
}
