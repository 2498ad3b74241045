//! Durable relay progress
//!
//! Handles:
//! - The last processed source block
//! - The last observed multisig transaction count
//!
//! Both are plain scalars. A missing value is a valid "not yet initialized"
//! state and surfaces as `Ok(None)`; callers substitute their configured
//! default. Monotonicity is the caller's job.

mod file;
mod postgres;

pub use file::FileCheckpointStore;
pub use postgres::PgCheckpointStore;

use crate::config::{StorageBackend, StorageConfig};
use crate::error::{FederatorError, FederatorResult};

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Names of the persisted checkpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointName {
    LastBlock,
    LastTxCount,
}

impl CheckpointName {
    /// Stable key used by every backend
    pub fn key(&self) -> &'static str {
        match self {
            CheckpointName::LastBlock => "last_block",
            CheckpointName::LastTxCount => "last_tx_count",
        }
    }

    pub(crate) fn file_name(&self) -> &'static str {
        match self {
            CheckpointName::LastBlock => "lastBlock.txt",
            CheckpointName::LastTxCount => "lastTxCount.txt",
        }
    }
}

impl fmt::Display for CheckpointName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Key -> scalar persistence for relay progress.
///
/// `save` is atomic from the reader's point of view and may be repeated.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn load(&self, name: CheckpointName) -> FederatorResult<Option<u64>>;

    async fn save(&self, name: CheckpointName, value: u64) -> FederatorResult<()>;
}

/// Build the configured checkpoint backend
pub async fn open(config: &StorageConfig) -> FederatorResult<Arc<dyn CheckpointStore>> {
    match config.backend {
        StorageBackend::File => {
            let store = FileCheckpointStore::open(&config.path).await?;
            Ok(Arc::new(store))
        }
        StorageBackend::Postgres => {
            let database = config.database.as_ref().ok_or_else(|| {
                FederatorError::Config("postgres backend without database settings".to_string())
            })?;
            let store = PgCheckpointStore::new(database).await?;
            store.run_migrations().await?;
            Ok(Arc::new(store))
        }
    }
}
