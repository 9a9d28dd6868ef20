//! Stats Event Bus
//!
//! A broadcast channel behind a mutex-guarded optional sender. Publishing
//! with nobody listening is fine; `close` drops the sender so every
//! subscriber sees end-of-stream.

use std::sync::{Arc, Mutex};

use platform::shutdown::ShutdownSignal;
use tokio::sync::broadcast::{self, error::RecvError};

use crate::domain::entity::user_event::UserEvent;
use crate::domain::repository::StatRepository;

const DEFAULT_CAPACITY: usize = 1024;

#[derive(Clone)]
pub struct EventBus {
    sender: Arc<Mutex<Option<broadcast::Sender<UserEvent>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender: Arc::new(Mutex::new(Some(sender))),
        }
    }

    /// Number of receivers that got the event
    pub fn publish(&self, event: UserEvent) -> usize {
        let Ok(guard) = self.sender.lock() else {
            return 0;
        };
        match guard.as_ref() {
            Some(sender) => sender.send(event).unwrap_or(0),
            None => 0,
        }
    }

    /// `None` once the bus is closed
    pub fn subscribe(&self) -> Option<broadcast::Receiver<UserEvent>> {
        self.sender.lock().ok()?.as_ref().map(|s| s.subscribe())
    }

    pub fn close(&self) {
        if let Ok(mut guard) = self.sender.lock() {
            guard.take();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.sender.lock().map(|g| g.is_none()).unwrap_or(true)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Drains the bus into the `user_stat` table
pub struct StatsRecorder<S> {
    store: Arc<S>,
    receiver: broadcast::Receiver<UserEvent>,
}

impl<S> StatsRecorder<S>
where
    S: StatRepository + Send + Sync + 'static,
{
    /// `None` when the bus is already closed
    pub fn new(store: Arc<S>, bus: &EventBus) -> Option<Self> {
        Some(Self {
            store,
            receiver: bus.subscribe()?,
        })
    }

    /// Record events until the bus closes or shutdown fires
    pub async fn run(mut self, mut shutdown: ShutdownSignal) {
        tracing::info!("Stats recorder started");

        loop {
            let event = tokio::select! {
                _ = shutdown.cancelled() => break,
                received = self.receiver.recv() => received,
            };

            match event {
                Ok(event) => {
                    if let Err(e) = self.store.record(&event).await {
                        tracing::warn!(
                            user_id = %event.user_id,
                            event = %event.kind,
                            error = %e,
                            "Failed to record user event"
                        );
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Stats recorder lagged, events dropped");
                }
                Err(RecvError::Closed) => break,
            }
        }

        tracing::info!("Stats recorder stopped");
    }
}
