//! Sync orchestrator — the top-level control loop.
//!
//! States: idle -> listing -> running -> {completed, failed, interrupted}.
//! One logical worker processes entities strictly sequentially; rate limiting
//! is the binding constraint, so per-entity parallelism would add provider
//! pressure without adding throughput. All blocking goes through the
//! cancellation token, and resumption is recomputed from data state (each
//! entity's last stored date), never from a persisted cursor.

use crate::cancel::CancelToken;
use crate::gaps::{GapRepairer, RepairSummary};
use crate::prioritize::prioritize;
use crate::provider::{ProviderChain, ProviderError};
use crate::record::Entity;
use crate::sink::SearchIndexSink;
use crate::store::{CheckpointStore, PriceStore, StoreError};
use crate::universe::{EntitySource, SourceError};
use chrono::{Duration as ChronoDuration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// Aux counter name for records pushed to the search index.
pub const SEARCH_INDEX_COUNTER: &str = "search_index_records";

#[derive(Debug, Error)]
pub enum SyncError {
    /// Fatal: without a work list there is no run, and no checkpoint exists yet.
    #[error("cannot obtain entity listing: {0}")]
    Listing(#[from] SourceError),

    /// Fatal: the persistent store is unreachable at run start.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// External cancellation — distinct from failure; the checkpoint is left
    /// resumable and no error message is written.
    #[error("sync cancelled")]
    Cancelled,
}

/// Tuning knobs for one run.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// How many top-ranked entities form the priority subset.
    pub priority_limit: usize,
    /// Calendar-day threshold for gap detection.
    pub gap_threshold_days: i64,
    /// Delay after each entity, before moving to the next.
    pub inter_entity_delay: Duration,
    /// Courtesy delay between individual gap repairs.
    pub inter_repair_delay: Duration,
    /// Push a progress update every N entities (and always at the final one).
    pub checkpoint_every: usize,
    /// Backfill horizon for entities with no stored history.
    pub initial_history_days: i64,
    /// Upper bound of every incremental window. Defaults to yesterday: a
    /// partially-elapsed trading day is never requested because providers
    /// rarely have the close yet.
    pub as_of: Option<NaiveDate>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            priority_limit: 20,
            gap_threshold_days: crate::gaps::DEFAULT_GAP_THRESHOLD_DAYS,
            inter_entity_delay: Duration::from_millis(1000),
            inter_repair_delay: crate::gaps::INTER_REPAIR_DELAY,
            checkpoint_every: 10,
            initial_history_days: 3650,
            as_of: None,
        }
    }
}

/// What a finished run did, for callers that do not want to re-read the
/// checkpoint row.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub total: u64,
    pub processed: u64,
    pub successful: u64,
    pub failed: u64,
    pub priority_processed: u64,
    pub records_fetched: u64,
    pub gaps_found: u64,
    pub gaps_repaired: u64,
    pub gap_records: u64,
}

struct EntityOutcome {
    fetched: usize,
    repair: RepairSummary,
    fetch_error: bool,
}

impl EntityOutcome {
    /// A failure for progress purposes requires all three: no new records,
    /// no gap records, and an error from the fetch attempt. Up-to-date
    /// entities and empty-but-clean fetch windows count as success.
    fn is_success(&self) -> bool {
        !(self.fetch_error && self.fetched == 0 && self.repair.records_inserted == 0)
    }
}

pub struct SyncOrchestrator<'a> {
    providers: &'a ProviderChain,
    prices: &'a PriceStore,
    checkpoints: &'a CheckpointStore,
    source: &'a dyn EntitySource,
    sink: Option<&'a dyn SearchIndexSink>,
    config: SyncConfig,
    cancel: CancelToken,
}

impl<'a> SyncOrchestrator<'a> {
    pub fn new(
        providers: &'a ProviderChain,
        prices: &'a PriceStore,
        checkpoints: &'a CheckpointStore,
        source: &'a dyn EntitySource,
        config: SyncConfig,
    ) -> Self {
        Self {
            providers,
            prices,
            checkpoints,
            source,
            sink: None,
            config,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_sink(mut self, sink: &'a dyn SearchIndexSink) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Clone of the run's cancellation token, for wiring to Ctrl+C or tests.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Execute one full run under the given (externally generated) run id.
    ///
    /// Re-running an interrupted run id resumes it: `start_run` resets the
    /// counters and each entity's incremental window is recomputed from its
    /// last stored date, so already-synced entities fall through as
    /// up-to-date.
    pub fn run(&self, run_id: &str) -> Result<RunSummary, SyncError> {
        // Listing phase — fatal on failure, exits before any checkpoint exists.
        let universe = self.source.list_universe()?;
        let priority = self.source.top_ranked(self.config.priority_limit)?;
        let entities = prioritize(&universe, &priority);

        let total = entities.len() as u64;
        let priority_total = entities.iter().filter(|e| e.is_priority).count() as u64;
        info!(run_id, total, priority_total, "starting sync run");

        self.checkpoints.start_run(run_id, total, priority_total)?;

        let as_of = self
            .config
            .as_of
            .unwrap_or_else(|| chrono::Local::now().date_naive() - ChronoDuration::days(1));
        let repairer = GapRepairer::new(self.providers, self.prices, self.config.gap_threshold_days)
            .with_inter_repair_delay(self.config.inter_repair_delay);

        let mut summary = RunSummary {
            run_id: run_id.to_string(),
            total,
            ..Default::default()
        };

        let checkpoint_every = self.config.checkpoint_every.max(1);
        for (i, entity) in entities.iter().enumerate() {
            if self.cancel.is_cancelled() {
                info!(run_id, processed = summary.processed, "run interrupted");
                return Err(SyncError::Cancelled);
            }

            let outcome = self.sync_entity(entity, as_of, &repairer)?;

            // A cancellation landing inside the entity (its gap-repair pass
            // breaks out without erroring) must not let the run finalize.
            if self.cancel.is_cancelled() {
                info!(run_id, processed = summary.processed, "run interrupted");
                return Err(SyncError::Cancelled);
            }

            summary.processed += 1;
            if entity.is_priority {
                summary.priority_processed += 1;
            }
            if outcome.is_success() {
                summary.successful += 1;
            } else {
                summary.failed += 1;
            }
            summary.records_fetched += outcome.fetched as u64;
            summary.gaps_found += outcome.repair.gaps_found as u64;
            summary.gaps_repaired += outcome.repair.gaps_repaired as u64;
            summary.gap_records += outcome.repair.records_inserted as u64;

            let is_last = i + 1 == entities.len();
            if (i + 1) % checkpoint_every == 0 || is_last {
                self.push_progress(&summary);
            }

            if !is_last && !self.cancel.wait(self.config.inter_entity_delay) {
                info!(run_id, processed = summary.processed, "run interrupted");
                return Err(SyncError::Cancelled);
            }
        }

        // The terminal write is as best-effort as the periodic ones; a failed
        // write must not turn a finished sync into an error.
        if let Err(e) = self.checkpoints.complete_run(run_id) {
            warn!(run_id, error = %e, "checkpoint completion write failed");
        }
        info!(
            run_id,
            successful = summary.successful,
            failed = summary.failed,
            records = summary.records_fetched + summary.gap_records,
            "sync run completed"
        );

        self.push_to_search_index(run_id, &entities);

        Ok(summary)
    }

    /// Process one entity: incremental fetch, upsert, then gap repair.
    ///
    /// Gap repair runs regardless of the fetch outcome — gaps are independent
    /// of the latest-date frontier, and an up-to-date entity can still carry
    /// an internal hole. Only cancellation propagates out.
    fn sync_entity(
        &self,
        entity: &Entity,
        as_of: NaiveDate,
        repairer: &GapRepairer,
    ) -> Result<EntityOutcome, SyncError> {
        let code = entity.code.as_str();

        let mut fetched = 0usize;
        let mut fetch_error = false;

        match self.incremental_window(code, as_of) {
            Ok(Some((start, end))) => {
                match self.providers.fetch(code, start, end, &self.cancel) {
                    Ok(records) => match self.prices.upsert(code, &records) {
                        Ok(()) => fetched = records.len(),
                        Err(e) => {
                            warn!(code, error = %e, "upsert failed");
                            fetch_error = true;
                        }
                    },
                    Err(ProviderError::Cancelled) => return Err(SyncError::Cancelled),
                    Err(e) => {
                        warn!(code, error = %e, "fetch failed");
                        fetch_error = true;
                    }
                }
            }
            Ok(None) => {
                info!(code, "up to date, skipping fetch");
            }
            Err(e) => {
                warn!(code, error = %e, "cannot compute incremental window");
                fetch_error = true;
            }
        }

        let repair = match repairer.repair(code, &self.cancel) {
            Ok(summary) => summary,
            Err(e) => {
                warn!(code, error = %e, "gap repair pass failed");
                RepairSummary::default()
            }
        };

        Ok(EntityOutcome {
            fetched,
            repair,
            fetch_error,
        })
    }

    /// The date range still missing at the frontier: from the day after the
    /// last stored date (or the backfill horizon for new entities) through
    /// `as_of`. `None` means the entity is already up to date.
    fn incremental_window(
        &self,
        code: &str,
        as_of: NaiveDate,
    ) -> Result<Option<(NaiveDate, NaiveDate)>, StoreError> {
        let start = match self.prices.last_date(code)? {
            Some(last) => last + ChronoDuration::days(1),
            None => as_of - ChronoDuration::days(self.config.initial_history_days),
        };
        Ok(if start > as_of {
            None
        } else {
            Some((start, as_of))
        })
    }

    /// Checkpoint writes are best-effort observability: a failed write is
    /// logged and the run continues.
    fn push_progress(&self, summary: &RunSummary) {
        if let Err(e) = self.checkpoints.update_progress(
            &summary.run_id,
            summary.processed,
            summary.successful,
            summary.failed,
            summary.priority_processed,
        ) {
            warn!(run_id = %summary.run_id, error = %e, "checkpoint progress update failed");
        }
    }

    /// One batched push after entity processing. Failure is logged, never
    /// reverts the run's completed status.
    fn push_to_search_index(&self, run_id: &str, entities: &[Entity]) {
        let Some(sink) = self.sink else { return };

        let codes: Vec<String> = entities.iter().map(|e| e.code.clone()).collect();
        match sink.push_batch(&codes) {
            Ok(pushed) => {
                info!(run_id, sink = sink.name(), pushed, "search index updated");
                if let Err(e) =
                    self.checkpoints
                        .update_aux_counter(run_id, SEARCH_INDEX_COUNTER, pushed)
                {
                    warn!(run_id, error = %e, "aux counter update failed");
                }
            }
            Err(e) => {
                warn!(run_id, sink = sink.name(), error = %e, "search index push failed");
            }
        }
    }
}
