//! Ordered provider fallback with mandatory pre-call spacing.
//!
//! A fetch "succeeds" only if a provider returns at least one record with no
//! error. Zero records with no error falls through to the next provider; if
//! every provider fails or comes back empty, the whole fetch fails for that
//! date range. No local state is mutated on failure.

use super::{HistoryProvider, ProviderError};
use crate::cancel::CancelToken;
use crate::record::PriceRecord;
use chrono::NaiveDate;
use tracing::{debug, warn};

/// A fixed, ordered list of providers tried per fetch attempt.
pub struct ProviderChain {
    providers: Vec<Box<dyn HistoryProvider>>,
}

impl ProviderChain {
    pub fn new(providers: Vec<Box<dyn HistoryProvider>>) -> Self {
        Self { providers }
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Fetch `code` over `[start, end]`, trying providers in order.
    ///
    /// Before every provider call the provider's own `min_call_interval()` is
    /// waited on the cancellation token; a cancellation during that wait
    /// surfaces as [`ProviderError::Cancelled`].
    pub fn fetch(
        &self,
        code: &str,
        start: NaiveDate,
        end: NaiveDate,
        cancel: &CancelToken,
    ) -> Result<Vec<PriceRecord>, ProviderError> {
        let mut reasons: Vec<String> = Vec::new();

        for provider in &self.providers {
            if !cancel.wait(provider.min_call_interval()) {
                return Err(ProviderError::Cancelled);
            }

            debug!(provider = provider.name(), code, %start, %end, "fetching history");
            match provider.fetch_history(code, start, end) {
                Ok(records) if !records.is_empty() => {
                    debug!(
                        provider = provider.name(),
                        code,
                        count = records.len(),
                        "fetch succeeded"
                    );
                    return Ok(records);
                }
                Ok(_) => {
                    warn!(provider = provider.name(), code, "empty result, falling back");
                    reasons.push(format!("{}: returned no records", provider.name()));
                }
                Err(e) => {
                    warn!(provider = provider.name(), code, error = %e, "fetch failed, falling back");
                    reasons.push(format!("{}: {e}", provider.name()));
                }
            }
        }

        Err(ProviderError::Exhausted {
            code: code.to_string(),
            reasons: if reasons.is_empty() {
                "no providers configured".to_string()
            } else {
                reasons.join("; ")
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    struct ScriptedProvider {
        name: &'static str,
        interval: Duration,
        outcome: Result<Vec<PriceRecord>, &'static str>,
        calls: Arc<AtomicUsize>,
    }

    impl HistoryProvider for ScriptedProvider {
        fn name(&self) -> &str {
            self.name
        }

        fn min_call_interval(&self) -> Duration {
            self.interval
        }

        fn fetch_history(
            &self,
            code: &str,
            _start: NaiveDate,
            _end: NaiveDate,
        ) -> Result<Vec<PriceRecord>, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.outcome {
                Ok(records) => Ok(records.clone()),
                Err(msg) => Err(ProviderError::Other(format!("{msg} ({code})"))),
            }
        }
    }

    fn record(day: u32) -> PriceRecord {
        PriceRecord {
            date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            open: 10.0,
            high: 11.0,
            low: 9.0,
            close: 10.5,
            adj_close: 10.5,
            volume: 1000,
        }
    }

    fn jan(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    #[test]
    fn falls_back_past_error_to_next_provider() {
        let first_calls = Arc::new(AtomicUsize::new(0));
        let second_calls = Arc::new(AtomicUsize::new(0));
        let chain = ProviderChain::new(vec![
            Box::new(ScriptedProvider {
                name: "first",
                interval: Duration::ZERO,
                outcome: Err("boom"),
                calls: first_calls.clone(),
            }),
            Box::new(ScriptedProvider {
                name: "second",
                interval: Duration::ZERO,
                outcome: Ok(vec![record(2), record(3), record(4)]),
                calls: second_calls.clone(),
            }),
        ]);

        let records = chain
            .fetch("AAA", jan(1), jan(5), &CancelToken::new())
            .unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(first_calls.load(Ordering::SeqCst), 1);
        assert_eq!(second_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn empty_result_triggers_fallback_not_success() {
        let chain = ProviderChain::new(vec![
            Box::new(ScriptedProvider {
                name: "empty",
                interval: Duration::ZERO,
                outcome: Ok(vec![]),
                calls: Arc::new(AtomicUsize::new(0)),
            }),
            Box::new(ScriptedProvider {
                name: "full",
                interval: Duration::ZERO,
                outcome: Ok(vec![record(2)]),
                calls: Arc::new(AtomicUsize::new(0)),
            }),
        ]);

        let records = chain
            .fetch("AAA", jan(1), jan(5), &CancelToken::new())
            .unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn all_exhausted_reports_every_reason() {
        let chain = ProviderChain::new(vec![
            Box::new(ScriptedProvider {
                name: "first",
                interval: Duration::ZERO,
                outcome: Err("down"),
                calls: Arc::new(AtomicUsize::new(0)),
            }),
            Box::new(ScriptedProvider {
                name: "second",
                interval: Duration::ZERO,
                outcome: Ok(vec![]),
                calls: Arc::new(AtomicUsize::new(0)),
            }),
        ]);

        let err = chain
            .fetch("AAA", jan(1), jan(5), &CancelToken::new())
            .unwrap_err();
        match err {
            ProviderError::Exhausted { code, reasons } => {
                assert_eq!(code, "AAA");
                assert!(reasons.contains("first"));
                assert!(reasons.contains("second"));
            }
            other => panic!("expected Exhausted, got {other}"),
        }
    }

    #[test]
    fn waits_min_interval_before_each_call() {
        let chain = ProviderChain::new(vec![Box::new(ScriptedProvider {
            name: "slow",
            interval: Duration::from_millis(40),
            outcome: Ok(vec![record(2)]),
            calls: Arc::new(AtomicUsize::new(0)),
        })]);

        let start = Instant::now();
        chain
            .fetch("AAA", jan(1), jan(5), &CancelToken::new())
            .unwrap();
        // The wait happens before the call, so even the first call is spaced.
        assert!(start.elapsed() >= Duration::from_millis(40));
    }

    #[test]
    fn cancellation_during_precall_wait_stops_the_chain() {
        let calls = Arc::new(AtomicUsize::new(0));
        let chain = ProviderChain::new(vec![Box::new(ScriptedProvider {
            name: "never",
            interval: Duration::from_secs(60),
            outcome: Ok(vec![record(2)]),
            calls: calls.clone(),
        })]);

        let cancel = CancelToken::new();
        cancel.cancel();
        let err = chain.fetch("AAA", jan(1), jan(5), &cancel).unwrap_err();
        assert!(matches!(err, ProviderError::Cancelled));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
