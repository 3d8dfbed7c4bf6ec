use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use super::{
    brand_key, decode_summary, encode_summary, metadata_key, parse_index, summary_key,
    upsert_index, BrandIndexEntry, HealthStore, ENTRY_TTL,
};
use crate::error::{Result, VigilError};
use crate::health::HealthSummary;
use crate::retry::{RetryExecutor, RetryPolicy};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Health store backed by Redis.
///
/// One multiplexed connection is shared and re-established lazily; every
/// acquisition goes through a bounded [`RetryExecutor`].
pub struct RedisHealthStore {
    client: redis::Client,
    connection: Mutex<Option<MultiplexedConnection>>,
    retry: RetryExecutor<crate::retry::NetworkRetryClassifier>,
}

impl RedisHealthStore {
    pub fn new(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| VigilError::Config(format!("invalid redis url: {}", e)))?;
        Ok(Self {
            client,
            connection: Mutex::new(None),
            retry: RetryExecutor::new(RetryPolicy::store_connection()),
        })
    }

    /// Overrides the connection retry policy.
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = RetryExecutor::new(policy);
        self
    }

    async fn connect_once(&self) -> Result<MultiplexedConnection> {
        let conn = tokio::time::timeout(
            CONNECT_TIMEOUT,
            self.client.get_multiplexed_async_connection(),
        )
        .await
        .map_err(|_| VigilError::Timeout("redis connect".to_string()))??;
        Ok(conn)
    }

    async fn connection(&self) -> Result<MultiplexedConnection> {
        let mut cached = self.connection.lock().await;
        if let Some(conn) = cached.as_ref() {
            return Ok(conn.clone());
        }

        let conn = self.retry.execute(|| self.connect_once()).await?;
        info!("Connected to redis");
        *cached = Some(conn.clone());
        Ok(conn)
    }

    /// Drops the cached connection after a transport failure.
    async fn reset_on_drop(&self, error: &redis::RedisError) {
        if error.is_connection_dropped() || error.is_connection_refusal() || error.is_timeout() {
            warn!(error = %error, "Redis connection lost, will reconnect");
            *self.connection.lock().await = None;
        }
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.connection().await?;
        match conn.get::<_, Option<String>>(key).await {
            Ok(value) => Ok(value),
            Err(e) => {
                self.reset_on_drop(&e).await;
                Err(e.into())
            }
        }
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.connection().await?;
        match conn.set_ex::<_, _, ()>(key, value, ttl.as_secs()).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.reset_on_drop(&e).await;
                Err(e.into())
            }
        }
    }
}

#[async_trait]
impl HealthStore for RedisHealthStore {
    #[instrument(skip(self))]
    async fn ping(&self) -> Result<()> {
        let mut conn = self.connection().await?;
        let pong: String = match redis::cmd("PING").query_async(&mut conn).await {
            Ok(pong) => pong,
            Err(e) => {
                self.reset_on_drop(&e).await;
                return Err(e.into());
            }
        };
        debug!(%pong, "Redis ping");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn load_primary(&self, brand: &str) -> Result<Option<HealthSummary>> {
        let Some(index_payload) = self.get(&brand_key(brand)).await? else {
            warn!(brand, "No brand index in redis");
            return Ok(None);
        };
        let index = parse_index(brand, &index_payload);
        let Some(primary) = index.first().filter(|entry| !entry.domain.is_empty()) else {
            return Ok(None);
        };

        let Some(payload) = self.get(&summary_key(&primary.domain)).await? else {
            warn!(brand, domain = %primary.domain, "No stored summary for primary domain");
            return Ok(None);
        };
        Ok(decode_summary(brand, &primary.domain, &payload))
    }

    #[instrument(skip(self, summary), fields(domain = %summary.domain, brand = %summary.brand))]
    async fn save(&self, summary: &HealthSummary, name: &str) -> Result<()> {
        self.set_ex(
            &summary_key(&summary.domain),
            &encode_summary(summary, name)?,
            ENTRY_TTL,
        )
        .await?;

        let key = brand_key(&summary.brand);
        let mut index = self
            .get(&key)
            .await?
            .map(|payload| parse_index(&summary.brand, &payload))
            .unwrap_or_default();
        upsert_index(&mut index, BrandIndexEntry::from_summary(summary, name));
        self.set_ex(&key, &serde_json::to_string(&index)?, ENTRY_TTL)
            .await?;

        let metadata = serde_json::json!({ "last_test_time": Utc::now().timestamp() });
        let mut conn = self.connection().await?;
        conn.set::<_, _, ()>(metadata_key(), metadata.to_string())
            .await?;

        debug!(entries = index.len(), "Saved summary and brand index");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_invalid_url() {
        assert!(matches!(
            RedisHealthStore::new("not a url"),
            Err(VigilError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_server_fails_ping() {
        // Port 1 on localhost is never a redis server
        let store = RedisHealthStore::new("redis://127.0.0.1:1/0")
            .unwrap()
            .with_retry_policy(RetryPolicy::no_retry());
        assert!(store.ping().await.is_err());
    }
}
