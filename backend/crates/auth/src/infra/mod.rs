//! Infrastructure Layer
//!
//! Postgres and in-memory stores, and the snapshot cache.

pub mod cache;
pub mod memory;
pub mod postgres;

pub use cache::MemoryUserCache;
pub use memory::MemoryAuthRepository;
pub use postgres::PgAuthRepository;
