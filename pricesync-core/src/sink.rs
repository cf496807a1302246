//! Downstream search-index sink.
//!
//! The search index is an external collaborator: after entity processing the
//! orchestrator pushes the run's entity codes once, batched. A sink failure
//! is logged and recorded but never fails the run or reverts its completed
//! status.

use thiserror::Error;

#[derive(Debug, Error)]
#[error("search index push failed: {0}")]
pub struct SinkError(pub String);

pub trait SearchIndexSink: Send + Sync {
    fn name(&self) -> &str;

    /// Push a batch of entity codes; returns the number of records updated
    /// downstream.
    fn push_batch(&self, codes: &[String]) -> Result<u64, SinkError>;
}
