//! Unit tests for the jobs crate
//! Processor outcomes and outbox relay behavior against the in-memory backends

#[cfg(test)]
mod processor_tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use crate::application::config::{RetryPolicy, WorkerConfig};
    use crate::application::handler::{TaskHandler, TaskMux};
    use crate::application::processor::{Outcome, Processor};
    use crate::domain::entities::{Job, Task};
    use crate::domain::repository::JobQueue;
    use crate::domain::value_objects::{EnqueueOptions, JobState, QueueName};
    use crate::error::ProcessError;
    use crate::infra::memory::MemoryJobQueue;

    /// Fails with a fixed error until `failures` calls have happened
    struct Flaky {
        calls: Arc<AtomicUsize>,
        failures: usize,
        terminal: bool,
    }

    impl TaskHandler for Flaky {
        async fn process(&self, _job: &Job) -> Result<(), ProcessError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                if self.terminal {
                    return Err(ProcessError::terminal("bad payload"));
                }
                return Err(ProcessError::retryable("mail provider unavailable"));
            }
            Ok(())
        }
    }

    struct Slow;

    impl TaskHandler for Slow {
        async fn process(&self, _job: &Job) -> Result<(), ProcessError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        }
    }

    fn config() -> WorkerConfig {
        WorkerConfig {
            retry: RetryPolicy::immediate(),
            ..WorkerConfig::default()
        }
    }

    fn setup(failures: usize, terminal: bool) -> (Arc<MemoryJobQueue>, Processor<MemoryJobQueue>, Arc<AtomicUsize>) {
        let queue = Arc::new(MemoryJobQueue::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let mut mux = TaskMux::new();
        mux.handle(
            "task:flaky",
            Flaky {
                calls: calls.clone(),
                failures,
                terminal,
            },
        );
        let processor = Processor::new(queue.clone(), Arc::new(mux), config());
        (queue, processor, calls)
    }

    #[tokio::test]
    async fn test_success_completes_job() {
        let (queue, processor, calls) = setup(0, false);
        let info = queue
            .enqueue(&Task::new("task:flaky", vec![]), EnqueueOptions::new())
            .await
            .unwrap();

        let outcome = processor.run_once(QueueName::Default).await.unwrap();
        assert_eq!(outcome, Some(Outcome::Completed(info.id)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(queue.get(info.id).unwrap().state, JobState::Completed);
    }

    #[tokio::test]
    async fn test_idle_queue_returns_none() {
        let (_queue, processor, _calls) = setup(0, false);
        assert!(processor.run_once(QueueName::Critical).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_retryable_failure_is_retried_then_completes() {
        let (queue, processor, calls) = setup(2, false);
        let info = queue
            .enqueue(&Task::new("task:flaky", vec![]), EnqueueOptions::new())
            .await
            .unwrap();

        let outcomes = processor.drain(QueueName::Default).await.unwrap();
        assert_eq!(outcomes.len(), 3);
        assert!(matches!(outcomes[0], Outcome::Retried { .. }));
        assert!(matches!(outcomes[1], Outcome::Retried { .. }));
        assert_eq!(outcomes[2], Outcome::Completed(info.id));
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let job = queue.get(info.id).unwrap();
        assert_eq!(job.retried, 2);
        assert_eq!(job.last_error.as_deref(), Some("mail provider unavailable"));
    }

    #[tokio::test]
    async fn test_retries_exhausted_goes_dead() {
        let (queue, processor, calls) = setup(usize::MAX, false);
        let info = queue
            .enqueue(
                &Task::new("task:flaky", vec![]),
                EnqueueOptions::new().max_retry(2),
            )
            .await
            .unwrap();

        let outcomes = processor.drain(QueueName::Default).await.unwrap();

        // max_retry + 1 attempts in total
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(matches!(
            outcomes.last(),
            Some(Outcome::Dead { id, .. }) if *id == info.id
        ));
        assert_eq!(queue.get(info.id).unwrap().state, JobState::Dead);

        let dead = queue.dead_letters(10).await.unwrap();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].id, info.id);
    }

    #[tokio::test]
    async fn test_terminal_failure_skips_retry() {
        let (queue, processor, calls) = setup(1, true);
        let info = queue
            .enqueue(&Task::new("task:flaky", vec![]), EnqueueOptions::new())
            .await
            .unwrap();

        let outcomes = processor.drain(QueueName::Default).await.unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(
            outcomes[0],
            Outcome::Dead {
                id: info.id,
                error: "bad payload".to_string()
            }
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(queue.get(info.id).unwrap().retried, 0);
    }

    #[tokio::test]
    async fn test_unknown_task_type_goes_dead() {
        let (queue, processor, _calls) = setup(0, false);
        let info = queue
            .enqueue(&Task::new("task:unknown", vec![]), EnqueueOptions::new())
            .await
            .unwrap();

        let outcome = processor.run_once(QueueName::Default).await.unwrap().unwrap();
        assert!(matches!(outcome, Outcome::Dead { .. }));
        assert_eq!(queue.get(info.id).unwrap().state, JobState::Dead);
    }

    #[tokio::test]
    async fn test_result_of_lapsed_reservation_is_dropped() {
        let (queue, processor, calls) = setup(0, false);
        let info = queue
            .enqueue(&Task::new("task:flaky", vec![]), EnqueueOptions::new())
            .await
            .unwrap();

        // A worker reserves, stalls past its lease, and another one finishes the job
        let stalled = queue
            .reserve(QueueName::Default, Duration::from_secs(1))
            .await
            .unwrap()
            .unwrap();
        queue.advance(Duration::from_secs(2));
        assert_eq!(
            processor.run_once(QueueName::Default).await.unwrap(),
            Some(Outcome::Completed(info.id))
        );

        let outcome = processor.process(stalled).await.unwrap();
        assert_eq!(outcome, Outcome::LeaseLost(info.id));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(queue.get(info.id).unwrap().state, JobState::Completed);
    }

    #[tokio::test]
    async fn test_unreserved_job_is_rejected() {
        let (_queue, processor, calls) = setup(0, false);
        let job = Job::pending(
            &Task::new("task:flaky", vec![]),
            &EnqueueOptions::new(),
            chrono::Utc::now(),
        );

        assert!(processor.process(job).await.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_handler_timeout_is_retryable() {
        let queue = Arc::new(MemoryJobQueue::new());
        let mut mux = TaskMux::new();
        mux.handle("task:slow", Slow);
        let processor = Processor::new(
            queue.clone(),
            Arc::new(mux),
            WorkerConfig {
                job_timeout: Duration::from_millis(10),
                ..config()
            },
        );

        let info = queue
            .enqueue(&Task::new("task:slow", vec![]), EnqueueOptions::new())
            .await
            .unwrap();

        let outcome = processor.run_once(QueueName::Default).await.unwrap().unwrap();
        assert!(matches!(outcome, Outcome::Retried { id, .. } if id == info.id));
        assert!(
            queue
                .get(info.id)
                .unwrap()
                .last_error
                .unwrap()
                .contains("timed out")
        );
    }

    #[tokio::test]
    async fn test_delayed_retry_waits_for_backoff() {
        let queue = Arc::new(MemoryJobQueue::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let mut mux = TaskMux::new();
        mux.handle(
            "task:flaky",
            Flaky {
                calls: calls.clone(),
                failures: 1,
                terminal: false,
            },
        );
        let processor = Processor::new(
            queue.clone(),
            Arc::new(mux),
            WorkerConfig {
                retry: RetryPolicy {
                    initial_backoff: Duration::from_secs(10),
                    max_backoff: Duration::from_secs(10),
                    multiplier: 1.0,
                    jitter: 0.0,
                },
                ..WorkerConfig::default()
            },
        );

        queue
            .enqueue(&Task::new("task:flaky", vec![]), EnqueueOptions::new())
            .await
            .unwrap();

        assert!(matches!(
            processor.run_once(QueueName::Default).await.unwrap(),
            Some(Outcome::Retried { .. })
        ));
        assert!(processor.run_once(QueueName::Default).await.unwrap().is_none());

        queue.advance(Duration::from_secs(11));
        assert!(matches!(
            processor.run_once(QueueName::Default).await.unwrap(),
            Some(Outcome::Completed(_))
        ));
    }
}

#[cfg(test)]
mod relay_tests {
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::json;

    use crate::application::config::RelayConfig;
    use crate::application::relay::{OutboxRelay, RelayReport};
    use crate::domain::entities::{NewOutboxMessage, OutboxBatch};
    use crate::domain::repository::JobQueue;
    use crate::domain::value_objects::{EnqueueOptions, QueueName};
    use crate::infra::memory::{MemoryJobQueue, MemoryOutbox};

    fn batch_of(n: usize) -> OutboxBatch {
        let mut batch = OutboxBatch::new();
        for i in 0..n {
            batch.push(
                NewOutboxMessage::json(
                    "task:send_verify_email",
                    &json!({ "name": format!("user{i}") }),
                    EnqueueOptions::new()
                        .queue(QueueName::Critical)
                        .max_retry(10)
                        .process_in(Duration::from_secs(5)),
                )
                .unwrap(),
            );
        }
        batch
    }

    fn relay(
        outbox: &Arc<MemoryOutbox>,
        queue: &Arc<MemoryJobQueue>,
        claim_lease: Duration,
    ) -> OutboxRelay<MemoryOutbox, MemoryJobQueue> {
        OutboxRelay::new(
            outbox.clone(),
            queue.clone(),
            RelayConfig {
                claim_lease,
                ..RelayConfig::default()
            },
        )
    }

    #[tokio::test]
    async fn test_relay_enqueues_with_stored_options() {
        let outbox = Arc::new(MemoryOutbox::new());
        let queue = Arc::new(MemoryJobQueue::new());
        outbox.insert_batch(batch_of(2)).unwrap();

        let report = relay(&outbox, &queue, Duration::from_secs(30))
            .relay_once()
            .await
            .unwrap();
        assert_eq!(
            report,
            RelayReport {
                dispatched: 2,
                duplicates: 0,
                failed: 0
            }
        );
        assert_eq!(outbox.pending_count(), 0);

        let jobs = queue.jobs();
        assert_eq!(jobs.len(), 2);
        for job in &jobs {
            assert_eq!(job.queue, QueueName::Critical);
            assert_eq!(job.max_retry, 10);
            assert!(job.process_at > job.created_at);
        }
    }

    #[tokio::test]
    async fn test_relay_twice_creates_one_job() {
        let outbox = Arc::new(MemoryOutbox::new());
        let queue = Arc::new(MemoryJobQueue::new());
        outbox.insert_batch(batch_of(1)).unwrap();

        // Previous relay enqueued, then died before marking the row
        let message = outbox.messages().remove(0);
        queue
            .enqueue(&message.task, message.enqueue_options())
            .await
            .unwrap();

        let report = relay(&outbox, &queue, Duration::from_secs(30))
            .relay_once()
            .await
            .unwrap();
        assert_eq!(report.duplicates, 1);
        assert_eq!(report.dispatched, 0);
        assert_eq!(queue.jobs().len(), 1);
        assert_eq!(outbox.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_enqueue_stays_pending() {
        let outbox = Arc::new(MemoryOutbox::new());
        let queue = Arc::new(MemoryJobQueue::new());
        outbox.insert_batch(batch_of(1)).unwrap();
        queue.fail_next_enqueues(1);

        let relay = relay(&outbox, &queue, Duration::ZERO);
        let report = relay.relay_once().await.unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(outbox.pending_count(), 1);
        assert!(outbox.messages()[0].last_error.is_some());

        // Claim lapsed immediately, so the next pass picks it up again
        let report = relay.relay_once().await.unwrap();
        assert_eq!(report.dispatched, 1);
        assert_eq!(outbox.messages()[0].attempts, 2);
        assert_eq!(queue.jobs().len(), 1);
    }

    #[tokio::test]
    async fn test_claimed_rows_are_skipped_by_second_relay() {
        let outbox = Arc::new(MemoryOutbox::new());
        let queue = Arc::new(MemoryJobQueue::new());
        outbox.insert_batch(batch_of(1)).unwrap();
        queue.fail_next_enqueues(1);

        let first = relay(&outbox, &queue, Duration::from_secs(30));
        assert_eq!(first.relay_once().await.unwrap().failed, 1);

        let second = relay(&outbox, &queue, Duration::from_secs(30));
        assert_eq!(second.relay_once().await.unwrap().claimed(), 0);
        assert!(queue.jobs().is_empty());
    }
}

/// Against a real Postgres. Point `DATABASE_URL` at a scratch database and
/// run `cargo test -p jobs -- --ignored`. Each test owns one queue class and
/// clears it first.
#[cfg(test)]
mod postgres_tests {
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::time::Duration;

    use sqlx::PgPool;
    use sqlx::postgres::PgPoolOptions;

    use crate::{EnqueueOptions, JobError, JobId, JobQueue, JobState, PgJobQueue, QueueName, Task};

    const SHORT_LEASE: Duration = Duration::from_millis(200);

    async fn scratch_queue(queue: QueueName) -> (PgPool, Arc<PgJobQueue>) {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must name a scratch database");
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(&url)
            .await
            .unwrap();
        sqlx::migrate!("../../../database/migrations")
            .run(&pool)
            .await
            .unwrap();
        sqlx::query("DELETE FROM jobs WHERE queue = $1")
            .bind(queue.as_str())
            .execute(&pool)
            .await
            .unwrap();
        (pool.clone(), Arc::new(PgJobQueue::new(pool)))
    }

    async fn state_of(pool: &PgPool, id: JobId) -> i16 {
        sqlx::query_scalar("SELECT state FROM jobs WHERE job_id = $1")
            .bind(id.as_uuid())
            .fetch_one(pool)
            .await
            .unwrap()
    }

    #[tokio::test]
    #[ignore = "needs DATABASE_URL"]
    async fn test_pg_concurrent_reserve_hands_each_job_out_once() {
        let (pool, queue) = scratch_queue(QueueName::Critical).await;
        for i in 0..20u8 {
            queue
                .enqueue(
                    &Task::new("task:pg_reserve", vec![i]),
                    EnqueueOptions::new().queue(QueueName::Critical),
                )
                .await
                .unwrap();
        }

        let mut workers = tokio::task::JoinSet::new();
        for _ in 0..8 {
            let queue = queue.clone();
            workers.spawn(async move {
                let mut seen = Vec::new();
                while let Some(job) = queue
                    .reserve(QueueName::Critical, Duration::from_secs(30))
                    .await
                    .unwrap()
                {
                    queue.complete(&job.lease().unwrap()).await.unwrap();
                    seen.push(job.id);
                }
                seen
            });
        }

        let mut all = Vec::new();
        while let Some(seen) = workers.join_next().await {
            all.extend(seen.unwrap());
        }
        let unique: HashSet<_> = all.iter().copied().collect();
        assert_eq!(all.len(), 20);
        assert_eq!(unique.len(), 20);

        let completed: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM jobs WHERE queue = $1 AND state = $2")
                .bind(QueueName::Critical.as_str())
                .bind(JobState::Completed.as_i16())
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(completed, 20);
    }

    #[tokio::test]
    #[ignore = "needs DATABASE_URL"]
    async fn test_pg_lapsed_lease_redelivers_then_dead_letters() {
        let (pool, queue) = scratch_queue(QueueName::Default).await;

        // Retries left: handed out again, and the old holder can't settle
        let info = queue
            .enqueue(
                &Task::new("task:pg_lapse", vec![]),
                EnqueueOptions::new().max_retry(3),
            )
            .await
            .unwrap();
        let stale = queue
            .reserve(QueueName::Default, SHORT_LEASE)
            .await
            .unwrap()
            .unwrap();
        tokio::time::sleep(SHORT_LEASE * 2).await;

        let fresh = queue
            .reserve(QueueName::Default, Duration::from_secs(30))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fresh.id, info.id);
        assert_eq!(fresh.retried, 1);

        let err = queue
            .retry(&stale.lease().unwrap(), chrono::Utc::now(), "late")
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::LeaseLost(id) if id == info.id));
        queue.complete(&fresh.lease().unwrap()).await.unwrap();
        assert_eq!(state_of(&pool, info.id).await, JobState::Completed.as_i16());

        // Final attempt: the lapse dead-letters it instead
        let info = queue
            .enqueue(
                &Task::new("task:pg_lapse", vec![]),
                EnqueueOptions::new().max_retry(0),
            )
            .await
            .unwrap();
        let crashed = queue
            .reserve(QueueName::Default, SHORT_LEASE)
            .await
            .unwrap()
            .unwrap();
        tokio::time::sleep(SHORT_LEASE * 2).await;

        assert!(
            queue
                .reserve(QueueName::Default, Duration::from_secs(30))
                .await
                .unwrap()
                .is_none()
        );
        assert_eq!(state_of(&pool, info.id).await, JobState::Dead.as_i16());
        assert!(matches!(
            queue.complete(&crashed.lease().unwrap()).await,
            Err(JobError::LeaseLost(_))
        ));
    }
}
