//! Persistent state: price history partitions and checkpoint rows.
//!
//! Both stores are file-backed and upsert-only, keyed by natural unique keys
//! (`entity_code` + `date` for prices, `run_id` for checkpoints). Every write
//! goes through a `.tmp` + rename so concurrent readers never observe a torn
//! row and a crashed run can safely repeat the same upserts.

pub mod checkpoint;
pub mod price;

pub use checkpoint::{CheckpointStore, RunStatus, SyncRun};
pub use price::{PriceStore, StoreStats};

use thiserror::Error;

/// Structured error types for store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parquet error: {0}")]
    Parquet(String),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("no stored history for entity '{code}'")]
    NoData { code: String },

    #[error("sync run '{run_id}' not found")]
    RunNotFound { run_id: String },

    #[error("unsupported checkpoint schema version {found} (expected {expected})")]
    SchemaVersion { found: u32, expected: u32 },
}
