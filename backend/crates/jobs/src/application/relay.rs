//! Outbox Relay
//!
//! Moves committed outbox rows into the job queue. Each row is enqueued with
//! its own id as the task id, so relaying a row twice (crash after enqueue,
//! before `mark_dispatched`) finds a `TaskIdConflict` and does not create a
//! second job.

use std::sync::Arc;

use platform::shutdown::ShutdownSignal;

use crate::application::config::RelayConfig;
use crate::domain::repository::{JobQueue, OutboxRepository};
use crate::error::{JobError, JobResult};

/// Counts for one relay pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayReport {
    pub dispatched: usize,
    /// Already enqueued by an earlier pass
    pub duplicates: usize,
    pub failed: usize,
}

impl RelayReport {
    pub fn claimed(&self) -> usize {
        self.dispatched + self.duplicates + self.failed
    }
}

pub struct OutboxRelay<O, Q> {
    outbox: Arc<O>,
    queue: Arc<Q>,
    config: RelayConfig,
}

impl<O, Q> OutboxRelay<O, Q>
where
    O: OutboxRepository + Send + Sync + 'static,
    Q: JobQueue + Send + Sync + 'static,
{
    pub fn new(outbox: Arc<O>, queue: Arc<Q>, config: RelayConfig) -> Self {
        Self {
            outbox,
            queue,
            config,
        }
    }

    /// Claim one batch and push it into the queue
    pub async fn relay_once(&self) -> JobResult<RelayReport> {
        let batch = self
            .outbox
            .claim_pending(self.config.batch_size, self.config.claim_lease)
            .await?;

        let mut report = RelayReport::default();

        for message in batch {
            match self
                .queue
                .enqueue(&message.task, message.enqueue_options())
                .await
            {
                Ok(info) => {
                    self.outbox.mark_dispatched(message.id).await?;
                    report.dispatched += 1;
                    tracing::info!(
                        outbox_id = %message.id,
                        job_id = %info.id,
                        task_type = %info.task_type,
                        queue = %info.queue,
                        max_retry = info.max_retry,
                        "Outbox message relayed"
                    );
                }
                Err(JobError::TaskIdConflict(job_id)) => {
                    self.outbox.mark_dispatched(message.id).await?;
                    report.duplicates += 1;
                    tracing::debug!(
                        outbox_id = %message.id,
                        job_id = %job_id,
                        "Outbox message already relayed"
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        outbox_id = %message.id,
                        attempts = message.attempts,
                        error = %e,
                        "Outbox relay failed, will retry after claim lapses"
                    );
                    self.outbox
                        .record_failure(message.id, &e.to_string())
                        .await?;
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    /// Poll until shutdown. The batch in progress is always finished.
    pub async fn run(self, mut shutdown: ShutdownSignal) {
        tracing::info!(
            batch_size = self.config.batch_size,
            "Outbox relay started"
        );

        while !shutdown.is_shutdown() {
            let drained_full_batch = match self.relay_once().await {
                Ok(report) => {
                    if report.claimed() > 0 {
                        tracing::debug!(?report, "Outbox relay pass");
                    }
                    report.claimed() as i64 >= self.config.batch_size
                }
                Err(e) if e.is_transient() => {
                    tracing::warn!(error = %e, "Outbox store unavailable, backing off");
                    false
                }
                Err(e) => {
                    e.log();
                    false
                }
            };

            if drained_full_batch {
                continue;
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }

        tracing::info!("Outbox relay stopped");
    }
}
