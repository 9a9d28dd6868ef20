//! Background Job Queue
//!
//! Clean Architecture structure:
//! - `domain/` - Jobs, outbox messages, queue and outbox traits
//! - `application/` - Handler mux, processor, worker pool, outbox relay
//! - `infra/` - PostgreSQL and in-memory implementations
//!
//! ## Delivery Model
//! - Two priority classes, `critical` and `default`, each polled by its own loops
//! - At-least-once: a job whose lease lapses is handed out again, and the
//!   worker that lost the lease can no longer settle it
//! - Failures retry with exponential backoff until `max_retry`, then dead-letter
//! - Producers that need atomicity write to the outbox inside their own
//!   transaction; the relay moves committed rows into the queue

pub mod application;
pub mod domain;
pub mod error;
pub mod infra;

// Re-exports for convenience
pub use application::config::{RelayConfig, RetryPolicy, WorkerConfig};
pub use application::handler::{LocalTaskHandler, TaskHandler, TaskMux};
pub use application::processor::{Outcome, Processor};
pub use application::relay::{OutboxRelay, RelayReport};
pub use application::worker::WorkerPool;
pub use domain::entities::{Job, Lease, NewOutboxMessage, OutboxBatch, OutboxMessage, Task, TaskInfo};
pub use domain::repository::{JobQueue, LocalJobQueue, LocalOutboxRepository, OutboxRepository};
pub use domain::value_objects::{
    DEFAULT_MAX_RETRY, EnqueueOptions, JobId, JobState, LeaseToken, OutboxMessageId, QueueName,
};
pub use error::{JobError, JobResult, ProcessError};
pub use infra::memory::{MemoryJobQueue, MemoryOutbox};
pub use infra::postgres::{PgJobQueue, PgOutbox, insert_outbox};

#[cfg(test)]
mod tests;
