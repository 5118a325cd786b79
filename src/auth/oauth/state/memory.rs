use super::{StateResult, StateStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;

/// In-process state store; suitable for a single instance only
#[derive(Default)]
pub struct MemoryStateStore {
    entries: RwLock<HashMap<String, DateTime<Utc>>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries currently held, expired ones included
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

fn expiry(ttl: Duration) -> DateTime<Utc> {
    // Out-of-range TTLs saturate instead of failing the issue
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| Utc::now().checked_add_signed(ttl))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn insert(&self, token: &str, ttl: Duration) -> StateResult<()> {
        let now = Utc::now();
        let mut entries = self.entries.write().await;
        entries.retain(|_, expires_at| *expires_at > now);
        entries.insert(token.to_string(), expiry(ttl));
        Ok(())
    }

    async fn take(&self, token: &str) -> StateResult<bool> {
        let mut entries = self.entries.write().await;
        Ok(entries
            .remove(token)
            .is_some_and(|expires_at| expires_at > Utc::now()))
    }

    async fn contains(&self, token: &str) -> StateResult<bool> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(token)
            .is_some_and(|expires_at| *expires_at > Utc::now()))
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
