//! Application Layer
//!
//! Handler registry, job processing, worker pool and outbox relay.

pub mod config;
pub mod handler;
pub mod processor;
pub mod relay;
pub mod worker;
