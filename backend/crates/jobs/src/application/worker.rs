//! Worker Pool
//!
//! Independent polling loops per priority class. On shutdown a loop stops
//! reserving, but a job it already holds runs to completion.

use std::sync::Arc;

use platform::shutdown::ShutdownSignal;
use tokio::task::JoinSet;

use crate::application::config::WorkerConfig;
use crate::application::handler::TaskMux;
use crate::application::processor::Processor;
use crate::domain::repository::JobQueue;
use crate::domain::value_objects::QueueName;

pub struct WorkerPool<Q> {
    processor: Arc<Processor<Q>>,
}

impl<Q> WorkerPool<Q>
where
    Q: JobQueue + Send + Sync + 'static,
{
    pub fn new(queue: Arc<Q>, mux: TaskMux, config: WorkerConfig) -> Self {
        Self {
            processor: Arc::new(Processor::new(queue, Arc::new(mux), config)),
        }
    }

    /// Run every loop until `shutdown` fires and in-flight jobs finish
    pub async fn run(self, shutdown: ShutdownSignal) {
        let mut loops = JoinSet::new();

        for queue in QueueName::ALL {
            let concurrency = self.processor.config().concurrency(queue);
            for worker in 0..concurrency {
                loops.spawn(worker_loop(
                    self.processor.clone(),
                    queue,
                    worker,
                    shutdown.clone(),
                ));
            }
            tracing::info!(queue = %queue, concurrency, "Worker loops started");
        }

        while let Some(joined) = loops.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Worker loop panicked");
            }
        }

        tracing::info!("Worker pool stopped");
    }
}

async fn worker_loop<Q>(
    processor: Arc<Processor<Q>>,
    queue: QueueName,
    worker: usize,
    mut shutdown: ShutdownSignal,
) where
    Q: JobQueue + Send + Sync + 'static,
{
    let poll_interval = processor.config().poll_interval;

    while !shutdown.is_shutdown() {
        match processor.run_once(queue).await {
            // Keep pulling while there is work
            Ok(Some(_)) => continue,
            Ok(None) => {}
            Err(e) if e.is_transient() => {
                tracing::warn!(queue = %queue, worker, error = %e, "Queue unavailable, backing off");
            }
            Err(e) => {
                tracing::error!(queue = %queue, worker, "Worker poll failed");
                e.log();
            }
        }

        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(poll_interval) => {}
        }
    }

    tracing::debug!(queue = %queue, worker, "Worker loop exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::handler::TaskHandler;
    use crate::domain::entities::{Job, Task};
    use crate::domain::value_objects::{EnqueueOptions, JobState};
    use crate::error::ProcessError;
    use crate::infra::memory::MemoryJobQueue;
    use platform::shutdown::ShutdownCoordinator;
    use std::time::Duration;

    struct AlwaysOk;

    impl TaskHandler for AlwaysOk {
        async fn process(&self, _job: &Job) -> Result<(), ProcessError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_pool_processes_and_stops_on_shutdown() {
        let queue = Arc::new(MemoryJobQueue::new());
        for q in QueueName::ALL {
            queue
                .enqueue(&Task::new("task:ok", vec![]), EnqueueOptions::new().queue(q))
                .await
                .unwrap();
        }

        let mut mux = TaskMux::new();
        mux.handle("task:ok", AlwaysOk);
        let config = WorkerConfig {
            critical_concurrency: 2,
            default_concurrency: 1,
            poll_interval: Duration::from_millis(5),
            ..WorkerConfig::default()
        };

        let coordinator = ShutdownCoordinator::new();
        let pool = WorkerPool::new(queue.clone(), mux, config);
        let handle = tokio::spawn(pool.run(coordinator.subscribe()));

        // Wait until both jobs are done
        for _ in 0..200 {
            if queue
                .jobs()
                .iter()
                .all(|j| j.state == JobState::Completed)
            {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(queue.jobs().iter().all(|j| j.state == JobState::Completed));

        coordinator.shutdown();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("pool should stop")
            .unwrap();
    }
}
