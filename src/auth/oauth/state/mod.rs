//! Single-use CSRF state tokens for the OAuth flows
//!
//! Tokens live in a pluggable [`StateStore`]; the registry never hands out the
//! store's lock or entries, only the issue/consume/discard operations.

pub mod memory;
pub mod redis;

use crate::{
    auth::config::StateConfig,
    health::{HealthCheckResult, HealthChecker},
};
use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::URL_SAFE};
use rand::{RngCore, rngs::OsRng};
use std::{sync::Arc, time::Duration};
use thiserror::Error;

pub use memory::MemoryStateStore;
pub use redis::RedisStateStore;

/// Number of random bytes behind every state token
pub const STATE_TOKEN_BYTES: usize = 32;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("Failed to generate random state: {0}")]
    Randomness(String),
    #[error("State store error: {0}")]
    Store(String),
    #[error("Unsupported state backend: {0}")]
    UnsupportedBackend(String),
}

pub type StateResult<T> = Result<T, StateError>;

/// Backing storage for pending state tokens
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Register a pending token that expires after `ttl`.
    async fn insert(&self, token: &str, ttl: Duration) -> StateResult<()>;

    /// Atomically remove a token, reporting whether a live entry was removed.
    async fn take(&self, token: &str) -> StateResult<bool>;

    /// Non-consuming check for a live entry.
    async fn contains(&self, token: &str) -> StateResult<bool>;

    fn backend_name(&self) -> &'static str;
}

#[derive(Clone)]
pub struct StateRegistry {
    store: Arc<dyn StateStore>,
    ttl: Duration,
}

impl StateRegistry {
    pub fn new(store: Arc<dyn StateStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub fn in_memory(ttl: Duration) -> Self {
        Self::new(Arc::new(MemoryStateStore::new()), ttl)
    }

    pub fn from_config(config: &StateConfig) -> StateResult<Self> {
        let ttl = Duration::from_secs(config.ttl_seconds);
        let store: Arc<dyn StateStore> = match config.backend.as_str() {
            "memory" => Arc::new(MemoryStateStore::new()),
            "redis" => Arc::new(RedisStateStore::new(
                &config.redis_url,
                config.redis_key_prefix.clone(),
            )?),
            other => return Err(StateError::UnsupportedBackend(other.to_string())),
        };

        tracing::info!(
            backend = store.backend_name(),
            ttl_seconds = config.ttl_seconds,
            "OAuth state registry initialized"
        );
        Ok(Self::new(store, ttl))
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn backend_name(&self) -> &'static str {
        self.store.backend_name()
    }

    /// Create a health checker that probes the backing store
    pub fn health_checker(&self) -> Arc<StateHealthChecker> {
        Arc::new(StateHealthChecker {
            registry: self.clone(),
        })
    }

    /// Mint a fresh token and register it as pending
    pub async fn issue(&self) -> StateResult<String> {
        let token = generate_token()?;
        self.store.insert(&token, self.ttl).await?;
        Ok(token)
    }

    /// True exactly once per issued, unexpired token
    pub async fn verify_and_consume(&self, token: &str) -> StateResult<bool> {
        if token.is_empty() {
            return Ok(false);
        }
        self.store.take(token).await
    }

    /// Drop a token without checking it; idempotent
    pub async fn discard(&self, token: &str) -> StateResult<()> {
        if token.is_empty() {
            return Ok(());
        }
        self.store.take(token).await.map(|_| ())
    }

    pub async fn is_pending(&self, token: &str) -> StateResult<bool> {
        if token.is_empty() {
            return Ok(false);
        }
        self.store.contains(token).await
    }
}

pub struct StateHealthChecker {
    registry: StateRegistry,
}

#[async_trait]
impl HealthChecker for StateHealthChecker {
    fn name(&self) -> &str {
        "state"
    }

    async fn check(&self) -> HealthCheckResult {
        match self.registry.is_pending("health-probe").await {
            Ok(_) => HealthCheckResult::healthy_with_details(serde_json::json!({
                "backend": self.registry.backend_name(),
                "ttl_seconds": self.registry.ttl.as_secs(),
            })),
            Err(err) => HealthCheckResult::unhealthy(format!("State store unreachable: {err}")),
        }
    }
}

fn generate_token() -> StateResult<String> {
    let mut bytes = [0u8; STATE_TOKEN_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| StateError::Randomness(e.to_string()))?;
    Ok(URL_SAFE.encode(bytes))
}
