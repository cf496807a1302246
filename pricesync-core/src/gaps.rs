//! Gap detection and repair.
//!
//! A gap is derived state: a contiguous span of expected-but-missing dates in
//! an entity's stored history, computed by a single ordered scan over the
//! stored dates. Gaps have no lifecycle of their own — detection output feeds
//! straight into repair or into a read-only report.

use crate::cancel::CancelToken;
use crate::provider::{ProviderChain, ProviderError};
use crate::store::{PriceStore, StoreError, StoreStats};
use chrono::{Duration as ChronoDuration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};

/// Default calendar-day threshold: a weekend plus one holiday is expected,
/// anything longer is a gap.
pub const DEFAULT_GAP_THRESHOLD_DAYS: i64 = 4;

/// Courtesy delay between individual gap repairs, on top of the providers'
/// own per-call intervals.
pub const INTER_REPAIR_DELAY: Duration = Duration::from_millis(2500);

/// A missing date range in an entity's stored history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gap {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub missing_days: i64,
}

/// Per-entity repair tally.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairSummary {
    pub gaps_found: usize,
    pub gaps_repaired: usize,
    pub records_inserted: usize,
}

/// Read-only gap report for one entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GapReport {
    pub code: String,
    pub gaps: Vec<Gap>,
    pub stats: Option<StoreStats>,
}

/// Scan an ascending date series for calendar gaps above `threshold_days`.
///
/// For each consecutive pair, a delta above the threshold yields a gap from
/// `previous + 1` to `next - 1` with `missing_days = delta - 1`. One pass,
/// O(n) in the stored record count.
pub fn detect_gaps(dates: &[NaiveDate], threshold_days: i64) -> Vec<Gap> {
    let mut gaps = Vec::new();
    for pair in dates.windows(2) {
        let delta = (pair[1] - pair[0]).num_days();
        if delta > threshold_days {
            gaps.push(Gap {
                start: pair[0] + ChronoDuration::days(1),
                end: pair[1] - ChronoDuration::days(1),
                missing_days: delta - 1,
            });
        }
    }
    gaps
}

/// Detects and repairs gaps for entities in a [`PriceStore`].
pub struct GapRepairer<'a> {
    providers: &'a ProviderChain,
    store: &'a PriceStore,
    threshold_days: i64,
    inter_repair_delay: Duration,
}

impl<'a> GapRepairer<'a> {
    pub fn new(providers: &'a ProviderChain, store: &'a PriceStore, threshold_days: i64) -> Self {
        Self {
            providers,
            store,
            threshold_days,
            inter_repair_delay: INTER_REPAIR_DELAY,
        }
    }

    pub fn with_inter_repair_delay(mut self, delay: Duration) -> Self {
        self.inter_repair_delay = delay;
        self
    }

    /// Detect gaps in an entity's stored history. Entities with no stored
    /// history have no gaps.
    pub fn detect(&self, code: &str) -> Result<Vec<Gap>, StoreError> {
        let dates = self.store.dates(code)?;
        Ok(detect_gaps(&dates, self.threshold_days))
    }

    /// Detect and repair gaps for one entity.
    ///
    /// Each gap is fetched through the provider chain restricted to the gap's
    /// range and upserted. A failed gap is logged and skipped — one
    /// unrepairable gap never blocks the rest. Cancellation stops the loop
    /// and surfaces as an error so the caller can unwind.
    pub fn repair(&self, code: &str, cancel: &CancelToken) -> Result<RepairSummary, StoreError> {
        let gaps = self.detect(code)?;
        let mut summary = RepairSummary {
            gaps_found: gaps.len(),
            ..Default::default()
        };

        for (i, gap) in gaps.iter().enumerate() {
            if cancel.is_cancelled() {
                break;
            }
            if i > 0 && !cancel.wait(self.inter_repair_delay) {
                break;
            }

            match self.providers.fetch(code, gap.start, gap.end, cancel) {
                Ok(records) => {
                    self.store.upsert(code, &records)?;
                    summary.gaps_repaired += 1;
                    summary.records_inserted += records.len();
                    info!(
                        code,
                        start = %gap.start,
                        end = %gap.end,
                        records = records.len(),
                        "gap repaired"
                    );
                }
                Err(ProviderError::Cancelled) => break,
                Err(e) => {
                    warn!(code, start = %gap.start, end = %gap.end, error = %e, "gap repair failed");
                }
            }
        }

        Ok(summary)
    }

    /// Read-only report: detected gaps plus aggregate store stats.
    pub fn report(&self, code: &str) -> Result<GapReport, StoreError> {
        Ok(GapReport {
            code: code.to_string(),
            gaps: self.detect(code)?,
            stats: self.store.stats(code)?,
        })
    }
}
