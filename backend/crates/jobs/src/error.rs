//! Job Error Types
//!
//! [`JobError`] is a queue infrastructure failure. [`ProcessError`] is what a
//! task handler reports back, and decides between retry and dead-letter.

use kernel::error::kind::ErrorKind;
use thiserror::Error;

use crate::domain::value_objects::JobId;

pub type JobResult<T> = Result<T, JobError>;

#[derive(Debug, Error)]
pub enum JobError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A job with this id was already enqueued
    #[error("Task id already used: {0}")]
    TaskIdConflict(JobId),

    #[error("Job not found: {0}")]
    NotFound(JobId),

    /// The caller's lease lapsed and the job moved on without it
    #[error("Lease lost on job {0}")]
    LeaseLost(JobId),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl JobError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            JobError::TaskIdConflict(_) => ErrorKind::Conflict,
            JobError::NotFound(_) => ErrorKind::NotFound,
            JobError::LeaseLost(_) => ErrorKind::Conflict,
            JobError::Database(
                sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_),
            ) => ErrorKind::ServiceUnavailable,
            JobError::Database(_) => ErrorKind::InternalServerError,
            JobError::Serialization(_) | JobError::Internal(_) => ErrorKind::InternalServerError,
        }
    }

    /// Worth trying the same queue call again later
    pub fn is_transient(&self) -> bool {
        self.kind().is_transient()
    }

    pub fn log(&self) {
        match self {
            JobError::Database(e) => {
                tracing::error!(error = %e, "Job queue database error");
            }
            JobError::Internal(msg) => {
                tracing::error!(message = %msg, "Job queue internal error");
            }
            JobError::LeaseLost(id) => {
                tracing::warn!(job_id = %id, "Job lease lost, result dropped");
            }
            _ => {
                tracing::debug!(error = %self, "Job queue error");
            }
        }
    }
}

/// Handler outcome classification
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProcessError {
    /// Retrying cannot help (bad payload, missing referent)
    #[error("terminal: {0}")]
    Terminal(String),

    /// Transient store or delivery failure
    #[error("retryable: {0}")]
    Retryable(String),
}

impl ProcessError {
    pub fn terminal(msg: impl std::fmt::Display) -> Self {
        ProcessError::Terminal(msg.to_string())
    }

    pub fn retryable(msg: impl std::fmt::Display) -> Self {
        ProcessError::Retryable(msg.to_string())
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ProcessError::Terminal(_))
    }

    pub fn message(&self) -> &str {
        match self {
            ProcessError::Terminal(m) | ProcessError::Retryable(m) => m,
        }
    }
}
