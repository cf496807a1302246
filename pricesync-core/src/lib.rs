//! PriceSync Core — resumable, checkpointed daily price-history synchronization.
//!
//! This crate contains the heart of the sync engine:
//! - Provider capability (trait + ordered fallback chain with pre-call rate limiting)
//! - Parquet-backed price store with whole-row upsert semantics
//! - File-backed checkpoint store (one JSON document per run, append-only history)
//! - Entity prioritization (priority subset first, order preserved, deduped)
//! - Gap detection (single ordered scan) and best-effort gap repair
//! - The orchestrator state machine tying it together under a cancellable budget

pub mod cancel;
pub mod gaps;
pub mod prioritize;
pub mod provider;
pub mod record;
pub mod sink;
pub mod store;
pub mod sync;
pub mod universe;

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: types that cross the orchestrator boundary are Send + Sync.
    ///
    /// The CLI installs a Ctrl+C handler on another thread that pokes the
    /// cancellation token, so anything it touches must be thread-safe.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<record::PriceRecord>();
        require_sync::<record::PriceRecord>();
        require_send::<record::Entity>();
        require_sync::<record::Entity>();

        require_send::<cancel::CancelToken>();
        require_sync::<cancel::CancelToken>();

        require_send::<store::checkpoint::SyncRun>();
        require_sync::<store::checkpoint::SyncRun>();
        require_send::<store::checkpoint::CheckpointStore>();
        require_sync::<store::checkpoint::CheckpointStore>();
        require_send::<store::price::PriceStore>();
        require_sync::<store::price::PriceStore>();

        require_send::<gaps::Gap>();
        require_sync::<gaps::Gap>();
        require_send::<sync::SyncConfig>();
        require_sync::<sync::SyncConfig>();
        require_send::<sync::RunSummary>();
        require_sync::<sync::RunSummary>();
    }
}
