//! Snapshot Cache
//!
//! Key-value cache of JSON-encoded snapshots with per-entry expiry, keyed the
//! way an external key-value store would be (`user:{id}`).

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

use crate::domain::entity::snapshot::UserSnapshot;
use crate::domain::repository::UserCache;
use crate::domain::value_object::ids::UserId;
use crate::error::{AuthError, AuthResult};

struct Entry {
    value: String,
    expires_at: Instant,
}

#[derive(Default)]
pub struct MemoryUserCache {
    entries: RwLock<HashMap<String, Entry>>,
}

impl MemoryUserCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop expired entries
    pub async fn evict_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, e| e.expires_at > now);
        before - entries.len()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl UserCache for MemoryUserCache {
    async fn put(&self, snapshot: &UserSnapshot, ttl: Duration) -> AuthResult<()> {
        let value = serde_json::to_string(snapshot)
            .map_err(|e| AuthError::Internal(format!("snapshot encoding failed: {e}")))?;

        self.entries.write().await.insert(
            UserSnapshot::cache_key(&snapshot.id),
            Entry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn get(&self, user_id: &UserId) -> AuthResult<Option<UserSnapshot>> {
        let entries = self.entries.read().await;
        let Some(entry) = entries.get(&UserSnapshot::cache_key(user_id)) else {
            return Ok(None);
        };
        if entry.expires_at <= Instant::now() {
            return Ok(None);
        }

        serde_json::from_str(&entry.value)
            .map(Some)
            .map_err(|e| AuthError::Internal(format!("snapshot decoding failed: {e}")))
    }
}
