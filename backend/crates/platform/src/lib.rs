//! Platform Crate - Technical Infrastructure
//!
//! Shared technical foundations with no business rules in them:
//! - Cryptographic utilities (random bytes, SHA-256, base32, random codes)
//! - Password hashing (Argon2id, NIST SP 800-63B policy)
//! - `Authorization: Bearer` parsing
//! - Outbound mail delivery
//! - Graceful shutdown coordination

pub mod bearer;
pub mod crypto;
pub mod mail;
pub mod password;
pub mod shutdown;
