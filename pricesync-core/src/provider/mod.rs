//! Provider capability — the pluggable interface to external history sources.
//!
//! The HistoryProvider trait abstracts over data sources (Yahoo Finance,
//! Stooq, mocks in tests) so the orchestrator can try them in a fixed
//! priority order. Providers know nothing about stores or checkpoints; the
//! chain layer above them owns fallback and rate-limit spacing.

pub mod chain;
pub mod circuit_breaker;
pub mod stooq;
pub mod yahoo;

pub use chain::ProviderChain;
pub use circuit_breaker::CircuitBreaker;
pub use stooq::StooqProvider;
pub use yahoo::YahooProvider;

use crate::record::PriceRecord;
use chrono::NaiveDate;
use std::time::Duration;
use thiserror::Error;

/// Structured error types for provider operations.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("rate limited by provider (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("entity not found: {code}")]
    EntityNotFound { code: String },

    #[error("hard stop: provider has blocked requests (circuit breaker tripped)")]
    CircuitBreakerTripped,

    /// `Ok` with zero records is not "no data exists" — it fails the attempt
    /// and triggers fallback to the next provider in the chain.
    #[error("provider '{provider}' returned no records for {code}")]
    EmptyResult { provider: String, code: String },

    /// Every provider in the chain failed or returned zero records.
    #[error("all providers exhausted for {code}: {reasons}")]
    Exhausted { code: String, reasons: String },

    #[error("fetch cancelled")]
    Cancelled,

    #[error("provider error: {0}")]
    Other(String),
}

/// A source of daily price history, tried in priority order by the chain.
///
/// Implementations handle the wire specifics of one external API. The chain
/// always waits `min_call_interval()` *before* invoking a provider, so the
/// delay also covers the first call and spacing stays uniform across
/// provider switches.
pub trait HistoryProvider: Send + Sync {
    /// Human-readable name, used in logs and error reasons.
    fn name(&self) -> &str;

    /// Minimum delay the caller must observe before each call.
    fn min_call_interval(&self) -> Duration;

    /// Fetch daily records for an entity over an inclusive date range.
    fn fetch_history(
        &self,
        code: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceRecord>, ProviderError>;
}
