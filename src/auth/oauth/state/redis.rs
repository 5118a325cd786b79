use super::{StateError, StateResult, StateStore};
use async_trait::async_trait;
use redis::{AsyncCommands, Client, aio::MultiplexedConnection};
use std::{sync::Arc, time::Duration};
use tokio::sync::Mutex;

/// Redis-backed state store for deployments with more than one instance
#[derive(Clone)]
pub struct RedisStateStore {
    client: Client,
    connection: Arc<Mutex<Option<MultiplexedConnection>>>,
    key_prefix: String,
}

impl RedisStateStore {
    pub fn new(redis_url: &str, key_prefix: String) -> StateResult<Self> {
        let client = Client::open(redis_url)
            .map_err(|e| StateError::Store(format!("Redis client error: {}", e)))?;

        Ok(Self {
            client,
            connection: Arc::new(Mutex::new(None)),
            key_prefix,
        })
    }

    /// Reuse the multiplexed connection, opening it on first use
    async fn get_connection(&self) -> StateResult<MultiplexedConnection> {
        let mut guard = self.connection.lock().await;
        if let Some(conn) = guard.as_ref() {
            return Ok(conn.clone());
        }

        let conn = self
            .client
            .get_multiplexed_tokio_connection()
            .await
            .map_err(|e| StateError::Store(format!("Connection failed: {}", e)))?;
        *guard = Some(conn.clone());
        Ok(conn)
    }

    /// Forget a connection that returned an I/O error so the next call reconnects
    async fn reset_connection(&self) {
        *self.connection.lock().await = None;
    }

    fn prefixed_key(&self, token: &str) -> String {
        format!("{}{}", self.key_prefix, token)
    }
}

fn store_error(err: redis::RedisError) -> StateError {
    StateError::Store(err.to_string())
}

#[async_trait]
impl StateStore for RedisStateStore {
    async fn insert(&self, token: &str, ttl: Duration) -> StateResult<()> {
        let key = self.prefixed_key(token);
        let mut conn = self.get_connection().await?;

        let result: Result<(), _> = conn.set_ex(&key, 1u8, ttl.as_secs().max(1)).await;
        if let Err(e) = result {
            self.reset_connection().await;
            return Err(store_error(e));
        }
        Ok(())
    }

    async fn take(&self, token: &str) -> StateResult<bool> {
        let key = self.prefixed_key(token);
        let mut conn = self.get_connection().await?;

        // DEL is atomic; only one caller observes a removal count of 1
        match conn.del::<_, i64>(&key).await {
            Ok(removed) => Ok(removed > 0),
            Err(e) => {
                self.reset_connection().await;
                Err(store_error(e))
            }
        }
    }

    async fn contains(&self, token: &str) -> StateResult<bool> {
        let key = self.prefixed_key(token);
        let mut conn = self.get_connection().await?;

        match conn.exists::<_, bool>(&key).await {
            Ok(exists) => Ok(exists),
            Err(e) => {
                self.reset_connection().await;
                Err(store_error(e))
            }
        }
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_url_is_rejected() {
        let result = RedisStateStore::new("not a redis url", "prefix:".to_string());
        assert!(matches!(result, Err(StateError::Store(_))));
    }

    #[test]
    fn test_keys_are_prefixed() {
        let store =
            RedisStateStore::new("redis://localhost:6379", "datahub:oauth_state:".to_string())
                .unwrap();
        assert_eq!(store.prefixed_key("abc"), "datahub:oauth_state:abc");
    }
}
