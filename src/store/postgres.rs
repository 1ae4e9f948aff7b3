//! PostgreSQL registry and status store
//!
//! Reads servers from the `server` table owned by the web tier and upserts the
//! latest snapshot into `server_stats` as a JSONB document.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::{Config as PoolConfig, ManagerConfig, Pool, RecyclingMethod, Runtime};
use tokio_postgres::types::Json;
use tokio_postgres::NoTls;

use super::{ServerRegistry, StatusStore, StoredStatus};
use crate::config::DatabaseConfig;
use crate::error::StoreError;
use crate::models::{ServerId, ServerRecord, StatusSnapshot};

/// `server_stats` DDL; deleting a server drops its status row with it
const SCHEMA_SQL: &str = r#"
    CREATE TABLE IF NOT EXISTS server_stats (
        id SERIAL PRIMARY KEY,
        server_id BIGINT NOT NULL REFERENCES server(id) ON DELETE CASCADE,
        timestamp TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        stat_data JSONB
    );

    CREATE UNIQUE INDEX IF NOT EXISTS idx_server_stats_server_id
        ON server_stats(server_id);
"#;

/// PostgreSQL store configuration
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// PostgreSQL connection URL
    pub database_url: String,

    /// Connection pool size
    pub pool_size: usize,
}

impl From<&DatabaseConfig> for StoreConfig {
    fn from(config: &DatabaseConfig) -> Self {
        Self {
            database_url: config.url.clone(),
            pool_size: config.pool_size,
        }
    }
}

/// Registry and status store over a deadpool-postgres pool
pub struct PostgresStore {
    pool: Pool,
}

impl PostgresStore {
    /// Create the pool and check connectivity
    pub async fn connect(config: StoreConfig) -> Result<Self, StoreError> {
        let mut cfg = PoolConfig::new();
        cfg.url = Some(config.database_url.clone());
        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });
        cfg.pool = Some(deadpool_postgres::PoolConfig::new(config.pool_size));

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| StoreError::Pool(e.to_string()))?;

        let client = pool
            .get()
            .await
            .map_err(|e| StoreError::Pool(e.to_string()))?;
        client.simple_query("SELECT 1").await?;

        tracing::info!(pool_size = config.pool_size, "Connected to PostgreSQL");
        Ok(Self { pool })
    }

    async fn client(&self) -> Result<deadpool_postgres::Object, StoreError> {
        self.pool
            .get()
            .await
            .map_err(|e| StoreError::Pool(e.to_string()))
    }

    /// Create `server_stats` and its unique index when missing
    ///
    /// The `server` table must already exist; its rows own their status rows.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        let client = self.client().await?;
        client.batch_execute(SCHEMA_SQL).await?;

        tracing::info!("Status store schema ready");
        Ok(())
    }
}

#[async_trait]
impl ServerRegistry for PostgresStore {
    async fn list_servers(&self) -> Result<Vec<ServerRecord>, StoreError> {
        let client = self.client().await?;

        let rows = client
            .query(
                "SELECT id::BIGINT, COALESCE(ip, ''), COALESCE(type, '') FROM server ORDER BY id",
                &[],
            )
            .await?;

        Ok(rows
            .iter()
            .map(|row| ServerRecord {
                id: ServerId(row.get(0)),
                address: row.get(1),
                kind: row.get(2),
            })
            .collect())
    }
}

#[async_trait]
impl StatusStore for PostgresStore {
    async fn upsert(
        &self,
        server_id: ServerId,
        snapshot: &StatusSnapshot,
        timestamp: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let client = self.client().await?;

        client
            .execute(
                r#"
                INSERT INTO server_stats (server_id, timestamp, stat_data)
                VALUES ($1::BIGINT, $2, $3)
                ON CONFLICT (server_id) DO UPDATE SET
                    timestamp = EXCLUDED.timestamp,
                    stat_data = EXCLUDED.stat_data
                "#,
                &[&server_id.0, &timestamp, &Json(snapshot)],
            )
            .await?;

        Ok(())
    }

    async fn get_latest(&self, server_id: ServerId) -> Result<Option<StoredStatus>, StoreError> {
        let client = self.client().await?;

        let row = client
            .query_opt(
                "SELECT timestamp, stat_data FROM server_stats WHERE server_id = $1::BIGINT",
                &[&server_id.0],
            )
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let timestamp: DateTime<Utc> = row.try_get(0)?;
        let data: Option<Json<StatusSnapshot>> = row.try_get(1)?;

        Ok(data.map(|Json(snapshot)| StoredStatus {
            server_id,
            snapshot,
            timestamp,
        }))
    }
}
