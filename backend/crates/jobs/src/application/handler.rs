//! Task Handlers
//!
//! A [`TaskMux`] routes a job to the handler registered for its task type.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::domain::entities::Job;
use crate::error::ProcessError;

/// Processes one task type
#[trait_variant::make(TaskHandler: Send)]
pub trait LocalTaskHandler {
    async fn process(&self, job: &Job) -> Result<(), ProcessError>;
}

type HandlerFuture<'a> = Pin<Box<dyn Future<Output = Result<(), ProcessError>> + Send + 'a>>;

/// Object-safe shim over [`TaskHandler`]
trait ErasedHandler: Send + Sync {
    fn call<'a>(&'a self, job: &'a Job) -> HandlerFuture<'a>;
}

impl<H> ErasedHandler for H
where
    H: TaskHandler + Send + Sync,
{
    fn call<'a>(&'a self, job: &'a Job) -> HandlerFuture<'a> {
        Box::pin(self.process(job))
    }
}

/// Task type -> handler
#[derive(Default, Clone)]
pub struct TaskMux {
    handlers: HashMap<String, Arc<dyn ErasedHandler>>,
}

impl TaskMux {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `task_type`, replacing any previous one
    pub fn handle<H>(&mut self, task_type: impl Into<String>, handler: H) -> &mut Self
    where
        H: TaskHandler + Send + Sync + 'static,
    {
        self.handlers.insert(task_type.into(), Arc::new(handler));
        self
    }

    pub fn has_handler(&self, task_type: &str) -> bool {
        self.handlers.contains_key(task_type)
    }

    /// Unknown task types are terminal
    pub async fn dispatch(&self, job: &Job) -> Result<(), ProcessError> {
        match self.handlers.get(&job.task_type) {
            Some(handler) => handler.call(job).await,
            None => Err(ProcessError::Terminal(format!(
                "no handler registered for task type {}",
                job.task_type
            ))),
        }
    }
}

impl std::fmt::Debug for TaskMux {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskMux")
            .field("task_types", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}
