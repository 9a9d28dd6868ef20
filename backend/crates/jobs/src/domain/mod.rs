//! Domain Layer
//!
//! Jobs, their queue options and the outbox rows that become jobs.

pub mod entities;
pub mod repository;
pub mod value_objects;
