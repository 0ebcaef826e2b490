// src/storage/postgres.rs
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};

use crate::domain::ExemptionTable;

use super::traits::{Storage, BLOCKED_SITES_KEY, EXEMPTIONS_KEY, REQUIRED_REPS_KEY};

/// PostgreSQL implementation of the Storage trait.
///
/// Each persisted value is one row of the `gate_state` key/value table.
pub struct PostgresStorage {
    pool: PgPool,
}

impl PostgresStorage {
    /// Create a new PostgresStorage instance with a connection pool.
    pub async fn connect(
        database_url: &str,
        min_connections: u32,
        max_connections: u32,
    ) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .min_connections(min_connections)
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    /// Run database migrations.
    pub async fn run_migrations(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn get_value<T: DeserializeOwned>(&self, key: &str) -> anyhow::Result<Option<T>> {
        let row = sqlx::query(
            r#"
            SELECT value
            FROM gate_state
            WHERE key = $1
            "#,
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let value: serde_json::Value = row.get("value");
        Ok(Some(serde_json::from_value(value)?))
    }

    async fn set_value<T: Serialize + Sync>(&self, key: &str, value: &T) -> anyhow::Result<()> {
        let value = serde_json::to_value(value)?;

        sqlx::query(
            r#"
            INSERT INTO gate_state (key, value, updated_at)
            VALUES ($1, $2, now())
            ON CONFLICT (key)
            DO UPDATE SET
                value = EXCLUDED.value,
                updated_at = now()
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl Storage for PostgresStorage {
    async fn get_blocked_sites(&self) -> anyhow::Result<Option<Vec<String>>> {
        self.get_value(BLOCKED_SITES_KEY).await
    }

    async fn set_blocked_sites(&self, sites: &[String]) -> anyhow::Result<()> {
        self.set_value(BLOCKED_SITES_KEY, &sites).await
    }

    async fn get_required_reps(&self) -> anyhow::Result<Option<i64>> {
        self.get_value(REQUIRED_REPS_KEY).await
    }

    async fn set_required_reps(&self, count: i64) -> anyhow::Result<()> {
        self.set_value(REQUIRED_REPS_KEY, &count).await
    }

    async fn get_exemptions(&self) -> anyhow::Result<Option<ExemptionTable>> {
        self.get_value(EXEMPTIONS_KEY).await
    }

    async fn set_exemptions(&self, table: &ExemptionTable) -> anyhow::Result<()> {
        self.set_value(EXEMPTIONS_KEY, table).await
    }
}
