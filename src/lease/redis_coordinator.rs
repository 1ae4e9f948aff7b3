//! Redis coordination store
//!
//! `SET key token NX PX ttl` for acquisition; compare-then-act Lua scripts for
//! renewal and release so the token check and the mutation are one atomic step.

use async_trait::async_trait;
use deadpool_redis::{Config as PoolConfig, Pool, Runtime};
use redis::AsyncCommands;
use std::time::Duration;

use super::CoordinationStore;
use crate::config::RedisConfig;
use crate::error::LeaseError;

const COMPARE_AND_PEXPIRE: &str = r"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('PEXPIRE', KEYS[1], ARGV[2])
end
return 0
";

const COMPARE_AND_DEL: &str = r"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
end
return 0
";

/// Coordination store over a deadpool-redis pool
pub struct RedisCoordinator {
    pool: Pool,
    compare_and_expire: redis::Script,
    compare_and_delete: redis::Script,
}

fn millis(ttl: Duration) -> u64 {
    // PX 0 is rejected by Redis
    (ttl.as_millis() as u64).max(1)
}

impl RedisCoordinator {
    /// Create the pool and check connectivity
    pub async fn connect(config: &RedisConfig) -> Result<Self, LeaseError> {
        let pool = PoolConfig::from_url(&config.url)
            .builder()
            .map_err(|e| LeaseError::Pool(format!("Failed to create pool builder: {e}")))?
            .max_size(config.pool_size)
            .runtime(Runtime::Tokio1)
            .build()
            .map_err(|e| LeaseError::Pool(format!("Failed to create Redis connection pool: {e}")))?;

        let coordinator = Self {
            pool,
            compare_and_expire: redis::Script::new(COMPARE_AND_PEXPIRE),
            compare_and_delete: redis::Script::new(COMPARE_AND_DEL),
        };

        let mut conn = coordinator.conn().await?;
        let _: String = redis::cmd("PING").query_async(&mut *conn).await?;

        tracing::info!(url = %config.url, "Connected to Redis");
        Ok(coordinator)
    }

    async fn conn(&self) -> Result<deadpool_redis::Connection, LeaseError> {
        self.pool
            .get()
            .await
            .map_err(|e| LeaseError::Pool(e.to_string()))
    }
}

#[async_trait]
impl CoordinationStore for RedisCoordinator {
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, LeaseError> {
        let mut conn = self.conn().await?;

        // Nil reply when the key exists, "OK" when set
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(millis(ttl))
            .query_async(&mut *conn)
            .await?;

        Ok(reply.is_some())
    }

    async fn compare_and_expire(
        &self,
        key: &str,
        expected: &str,
        ttl: Duration,
    ) -> Result<bool, LeaseError> {
        let mut conn = self.conn().await?;

        let updated: i64 = self
            .compare_and_expire
            .key(key)
            .arg(expected)
            .arg(millis(ttl))
            .invoke_async(&mut *conn)
            .await?;

        Ok(updated == 1)
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool, LeaseError> {
        let mut conn = self.conn().await?;

        let deleted: i64 = self
            .compare_and_delete
            .key(key)
            .arg(expected)
            .invoke_async(&mut *conn)
            .await?;

        Ok(deleted == 1)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, LeaseError> {
        let mut conn = self.conn().await?;
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn remaining_ttl(&self, key: &str) -> Result<Option<Duration>, LeaseError> {
        let mut conn = self.conn().await?;

        // -2: no key, -1: no expiry
        let ms: i64 = redis::cmd("PTTL").arg(key).query_async(&mut *conn).await?;
        Ok(match ms {
            -2 => None,
            ms if ms < 0 => Some(Duration::MAX),
            ms => Some(Duration::from_millis(ms as u64)),
        })
    }
}
