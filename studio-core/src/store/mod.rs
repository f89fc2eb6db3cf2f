//! Local Store: key-value persistence for projects, style images and render jobs.
//!
//! Provides a `KvStore` trait with implementations for:
//! - **Memory**: process-local map, used by tests and throwaway sessions
//! - **File**: one JSON document per key in a directory
//! - **Postgres**: a single `studio_kv` JSONB table via sqlx
//!
//! `LocalStore` layers the typed project/image/render collections on top.

pub mod file;
pub mod local;
pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::config::StoreConfig;

pub use file::FileStore;
pub use local::LocalStore;
pub use memory::MemoryStore;
pub use postgres::PgStore;

// ============================================================================
// Error types
// ============================================================================

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid store key '{0}'")]
    InvalidKey(String),

    #[error("Project {0} does not exist")]
    UnknownProject(uuid::Uuid),

    #[error("Unknown store backend '{0}' (expected memory, file or postgres)")]
    UnknownBackend(String),

    /// A multi-key batch stopped after `applied` operations. The keys already
    /// written stay written; nothing rolls them back.
    #[error("Batch failed after {applied} of {total} operations: {source}")]
    Partial {
        applied: usize,
        total: usize,
        #[source]
        source: Box<StoreError>,
    },
}

// ============================================================================
// KvStore trait
// ============================================================================

/// One write in a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum KvOp {
    Set(String, Value),
    Delete(String),
}

/// Mapping from string keys to JSON values with atomic per-key get/set/delete.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError>;

    /// Deleting an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Apply several writes in order. The default is NOT atomic: if operation
    /// `n > 0` fails, operations `0..n` remain applied and the error is
    /// `StoreError::Partial`. Backends with transactions override this.
    async fn apply(&self, ops: Vec<KvOp>) -> Result<(), StoreError> {
        let total = ops.len();
        for (applied, op) in ops.into_iter().enumerate() {
            let result = match op {
                KvOp::Set(key, value) => self.set(&key, value).await,
                KvOp::Delete(key) => self.delete(&key).await,
            };
            if let Err(e) = result {
                if applied == 0 {
                    return Err(e);
                }
                tracing::error!(
                    backend = self.name(),
                    applied,
                    total,
                    error = %e,
                    "Store batch failed part-way; earlier writes remain"
                );
                return Err(StoreError::Partial {
                    applied,
                    total,
                    source: Box::new(e),
                });
            }
        }
        Ok(())
    }

    /// Backend name for logging.
    fn name(&self) -> &str;
}

/// Open the backend selected by `[store] backend`.
pub async fn open_store(config: &StoreConfig) -> Result<Box<dyn KvStore>, StoreError> {
    let store: Box<dyn KvStore> = match config.backend.as_str() {
        "memory" => Box::new(MemoryStore::new()),
        "file" => Box::new(FileStore::open(&config.path).await?),
        "postgres" => Box::new(PgStore::connect(&config.database_url, config.max_connections).await?),
        other => return Err(StoreError::UnknownBackend(other.to_string())),
    };
    tracing::info!(backend = store.name(), "Local store opened");
    Ok(store)
}
