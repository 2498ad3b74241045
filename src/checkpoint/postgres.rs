//! PostgreSQL checkpoint backend

use super::{CheckpointName, CheckpointStore};
use crate::config::DatabaseConfig;
use crate::error::{FederatorError, FederatorResult};

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;
use tracing::{debug, info};

/// Checkpoints kept in a `federator_checkpoints` table
pub struct PgCheckpointStore {
    pool: PgPool,
}

impl PgCheckpointStore {
    pub async fn new(config: &DatabaseConfig) -> FederatorResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .connect(&config.url)
            .await?;

        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> FederatorResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS federator_checkpoints (
                name VARCHAR(32) PRIMARY KEY,
                value BIGINT NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        info!("Checkpoint table ready");
        Ok(())
    }
}

#[async_trait]
impl CheckpointStore for PgCheckpointStore {
    async fn load(&self, name: CheckpointName) -> FederatorResult<Option<u64>> {
        let row = sqlx::query("SELECT value FROM federator_checkpoints WHERE name = $1")
            .bind(name.key())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| {
            let value: i64 = r.get("value");
            u64::try_from(value).map_err(|_| FederatorError::Checkpoint {
                name: name.to_string(),
                message: format!("negative value {}", value),
            })
        })
        .transpose()
    }

    async fn save(&self, name: CheckpointName, value: u64) -> FederatorResult<()> {
        let value = i64::try_from(value).map_err(|_| FederatorError::Checkpoint {
            name: name.to_string(),
            message: format!("value {} does not fit in BIGINT", value),
        })?;

        sqlx::query(
            r#"
            INSERT INTO federator_checkpoints (name, value, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (name)
            DO UPDATE SET value = $2, updated_at = NOW()
            "#,
        )
        .bind(name.key())
        .bind(value)
        .execute(&self.pool)
        .await?;

        debug!("Saved checkpoint {} = {}", name, value);
        Ok(())
    }
}
