//! Application Configuration
//!
//! Worker, relay and retry settings.

use std::time::Duration;

use rand::Rng;

use crate::domain::value_objects::QueueName;

/// Exponential backoff between job retries
///
/// `initial_backoff * multiplier^retried`, capped at `max_backoff`, then
/// scaled by a random factor in `1 ± jitter`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
    /// 0.0 disables jitter; clamped to 0.0..=1.0
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_secs(10),
            max_backoff: Duration::from_secs(3600),
            multiplier: 2.0,
            jitter: 0.2,
        }
    }
}

impl RetryPolicy {
    /// Delay before the attempt that follows `retried` failures
    pub fn backoff(&self, retried: u32) -> Duration {
        let exponent = retried.min(64) as i32;
        let base = self.initial_backoff.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = base.min(self.max_backoff.as_secs_f64());

        let jitter = self.jitter.clamp(0.0, 1.0);
        let factor = if jitter > 0.0 {
            1.0 + rand::rng().random_range(-jitter..=jitter)
        } else {
            1.0
        };

        let secs = capped * factor;
        if secs.is_finite() && secs > 0.0 {
            Duration::from_secs_f64(secs)
        } else {
            Duration::ZERO
        }
    }

    /// No waiting between retries (tests, local development)
    pub fn immediate() -> Self {
        Self {
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            multiplier: 1.0,
            jitter: 0.0,
        }
    }
}

/// Worker pool configuration
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Loops serving the `critical` queue
    pub critical_concurrency: usize,
    /// Loops serving the `default` queue
    pub default_concurrency: usize,
    /// Sleep between empty polls
    pub poll_interval: Duration,
    /// Reservation lease; must exceed `job_timeout`
    pub lease: Duration,
    pub job_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            critical_concurrency: 10,
            default_concurrency: 5,
            poll_interval: Duration::from_millis(500),
            lease: Duration::from_secs(60),
            job_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        }
    }
}

impl WorkerConfig {
    /// Fewer loops and short backoff
    pub fn development() -> Self {
        Self {
            critical_concurrency: 2,
            default_concurrency: 1,
            retry: RetryPolicy {
                initial_backoff: Duration::from_secs(1),
                max_backoff: Duration::from_secs(30),
                ..RetryPolicy::default()
            },
            ..Self::default()
        }
    }

    pub fn concurrency(&self, queue: QueueName) -> usize {
        match queue {
            QueueName::Critical => self.critical_concurrency,
            QueueName::Default => self.default_concurrency,
        }
    }
}

/// Outbox relay configuration
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub batch_size: i64,
    pub poll_interval: Duration,
    /// How long a claimed row stays invisible to other relays
    pub claim_lease: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            poll_interval: Duration::from_secs(1),
            claim_lease: Duration::from_secs(30),
        }
    }
}

impl RelayConfig {
    pub fn development() -> Self {
        Self {
            poll_interval: Duration::from_millis(250),
            ..Self::default()
        }
    }
}
