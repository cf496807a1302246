//! Property tests for engine invariants.
//!
//! Uses proptest to verify:
//! 1. Prioritization — priority first, order preserved, output is the union
//! 2. Gap detection — gap bounds never overlap stored dates, sizes add up
//! 3. Checkpoint monotonicity — priority_completed never reverts; derived
//!    completion fires exactly at processed >= total

use chrono::NaiveDate;
use pricesync_core::gaps::detect_gaps;
use pricesync_core::prioritize::prioritize;
use pricesync_core::store::{CheckpointStore, RunStatus};
use proptest::prelude::*;
use std::collections::HashSet;
use tempfile::TempDir;

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_code() -> impl Strategy<Value = String> {
    "[A-E]{1,2}"
}

fn arb_codes(max: usize) -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(arb_code(), 0..max)
}

fn arb_sorted_dates() -> impl Strategy<Value = Vec<NaiveDate>> {
    prop::collection::btree_set(0i64..500, 0..40).prop_map(|offsets| {
        let base = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
        offsets
            .into_iter()
            .map(|o| base + chrono::Duration::days(o))
            .collect()
    })
}

// ── 1. Prioritization ────────────────────────────────────────────────

proptest! {
    /// Output length equals |universe ∪ priority| and contains no duplicates.
    #[test]
    fn prioritize_output_is_the_union(
        universe in arb_codes(12),
        priority in arb_codes(6),
    ) {
        let out = prioritize(&universe, &priority);

        let union: HashSet<&str> = universe
            .iter()
            .chain(priority.iter())
            .map(|s| s.as_str())
            .collect();
        prop_assert_eq!(out.len(), union.len());

        let mut seen = HashSet::new();
        for entity in &out {
            prop_assert!(seen.insert(entity.code.as_str()), "duplicate {}", entity.code);
        }
    }

    /// Every priority entity precedes every non-priority entity, and the
    /// relative order within each class is the input order.
    #[test]
    fn prioritize_keeps_priority_block_first(
        universe in arb_codes(12),
        priority in arb_codes(6),
    ) {
        let out = prioritize(&universe, &priority);

        let first_plain = out.iter().position(|e| !e.is_priority);
        if let Some(boundary) = first_plain {
            prop_assert!(out[boundary..].iter().all(|e| !e.is_priority));
        }

        // Priority block order matches the (deduped) priority input order.
        let expect_priority: Vec<&str> = {
            let mut seen = HashSet::new();
            priority
                .iter()
                .filter(|c| seen.insert(c.as_str()))
                .map(|c| c.as_str())
                .collect()
        };
        let got_priority: Vec<&str> = out
            .iter()
            .filter(|e| e.is_priority)
            .map(|e| e.code.as_str())
            .collect();
        prop_assert_eq!(got_priority, expect_priority);
    }
}

// ── 2. Gap detection ─────────────────────────────────────────────────

proptest! {
    /// Gaps never include a stored date, stay within the series bounds, and
    /// each spans exactly `missing_days` calendar days above the threshold.
    #[test]
    fn gaps_are_consistent_with_the_series(
        dates in arb_sorted_dates(),
        threshold in 1i64..10,
    ) {
        let gaps = detect_gaps(&dates, threshold);
        let stored: HashSet<NaiveDate> = dates.iter().copied().collect();

        for gap in &gaps {
            prop_assert!(gap.start <= gap.end);
            prop_assert_eq!((gap.end - gap.start).num_days() + 1, gap.missing_days);
            prop_assert!(gap.missing_days > threshold - 1);

            let mut day = gap.start;
            while day <= gap.end {
                prop_assert!(!stored.contains(&day), "gap covers stored date {day}");
                day += chrono::Duration::days(1);
            }
        }

        if let (Some(&first), Some(&last)) = (dates.first(), dates.last()) {
            for gap in &gaps {
                prop_assert!(gap.start > first && gap.end < last);
            }
        }
    }

    /// A fully consecutive series has no gaps at any threshold >= 1.
    #[test]
    fn consecutive_series_has_no_gaps(len in 0usize..30, threshold in 1i64..10) {
        let base = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
        let dates: Vec<NaiveDate> = (0..len as i64)
            .map(|o| base + chrono::Duration::days(o))
            .collect();
        prop_assert!(detect_gaps(&dates, threshold).is_empty());
    }
}

// ── 3. Checkpoint monotonicity ───────────────────────────────────────

proptest! {
    /// priority_completed never reverts, and derived completion fires exactly
    /// when processed reaches the total, no matter what counter sequence the
    /// caller writes.
    #[test]
    fn checkpoint_transitions_are_monotonic(
        updates in prop::collection::vec((0u64..12, 0u64..6), 1..10),
    ) {
        let tmp = TempDir::new().unwrap();
        let store = CheckpointStore::new(tmp.path());
        store.start_run("run-prop", 10, 3).unwrap();

        let mut priority_done = false;
        for (processed, priority_processed) in updates {
            let run = store
                .update_progress("run-prop", processed, processed, 0, priority_processed)
                .unwrap();

            if priority_processed >= 3 {
                priority_done = true;
            }
            prop_assert_eq!(run.priority_completed, priority_done);
            prop_assert!(run.processed <= run.total);
            prop_assert!(run.priority_processed <= run.priority_total);

            if processed >= 10 {
                prop_assert_eq!(run.status, RunStatus::Completed);
                prop_assert!(run.completed_at.is_some());
                break;
            } else {
                prop_assert_eq!(run.status, RunStatus::Running);
            }
        }
    }
}
