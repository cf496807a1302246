//! Checkpoint store — durable progress records for sync runs.
//!
//! One JSON document per run at `{dir}/{run_id}.json`, written atomically.
//! Runs are never deleted, so the directory doubles as the append-only run
//! history that `get_incomplete_run` queries. The schema carries an explicit
//! version field; readers reject a mismatched version instead of probing for
//! optional fields at runtime.

use super::StoreError;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Bumped whenever the persisted [`SyncRun`] layout changes shape.
pub const SCHEMA_VERSION: u32 = 1;

/// Status of a sync run. `Running` and `Partial` are resumable; `Completed`
/// and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
    Partial,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }
}

/// The persisted progress record for one sync run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncRun {
    pub run_id: String,
    pub schema_version: u32,
    pub status: RunStatus,
    pub total: u64,
    pub processed: u64,
    pub successful: u64,
    pub failed: u64,
    pub priority_total: u64,
    pub priority_processed: u64,
    pub priority_completed: bool,
    /// Named per-downstream counters, e.g. records pushed to the search index.
    pub aux_counters: BTreeMap<String, u64>,
    pub started_at: NaiveDateTime,
    pub completed_at: Option<NaiveDateTime>,
    pub error: Option<String>,
}

pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn run_path(&self, run_id: &str) -> PathBuf {
        self.dir.join(format!("{run_id}.json"))
    }

    /// Upsert a run row keyed by `run_id`: created if absent, else progress
    /// counters are reset and status returns to running. `started_at` is
    /// re-stamped so the most recent attempt wins the incomplete-run query.
    pub fn start_run(
        &self,
        run_id: &str,
        total: u64,
        priority_total: u64,
    ) -> Result<SyncRun, StoreError> {
        fs::create_dir_all(&self.dir)?;

        let run = SyncRun {
            run_id: run_id.to_string(),
            schema_version: SCHEMA_VERSION,
            status: RunStatus::Running,
            total,
            processed: 0,
            successful: 0,
            failed: 0,
            priority_total,
            priority_processed: 0,
            priority_completed: priority_total == 0,
            aux_counters: BTreeMap::new(),
            started_at: now(),
            completed_at: None,
            error: None,
        };
        self.write(&run)?;
        Ok(run)
    }

    /// Set progress counters.
    ///
    /// Counters are clamped to their totals, so `processed <= total` and
    /// `priority_processed <= priority_total` hold on every persisted row.
    /// Completion is a derived transition: once `processed >= total` the
    /// status flips to completed and the completion timestamp is stamped,
    /// without the caller asking for it. `priority_completed` flips to true
    /// once `priority_processed >= priority_total` and never reverts.
    pub fn update_progress(
        &self,
        run_id: &str,
        processed: u64,
        successful: u64,
        failed: u64,
        priority_processed: u64,
    ) -> Result<SyncRun, StoreError> {
        let mut run = self.get_run(run_id)?;
        run.processed = processed.min(run.total);
        run.successful = successful;
        run.failed = failed;
        run.priority_processed = priority_processed.min(run.priority_total);
        if run.priority_processed >= run.priority_total {
            run.priority_completed = true;
        }
        if run.processed >= run.total && !run.status.is_terminal() {
            run.status = RunStatus::Completed;
            run.completed_at = Some(now());
        }
        self.write(&run)?;
        Ok(run)
    }

    /// Set a named downstream counter.
    pub fn update_aux_counter(
        &self,
        run_id: &str,
        name: &str,
        value: u64,
    ) -> Result<SyncRun, StoreError> {
        let mut run = self.get_run(run_id)?;
        run.aux_counters.insert(name.to_string(), value);
        self.write(&run)?;
        Ok(run)
    }

    /// Mark the run failed with an operator-visible message.
    pub fn fail_run(&self, run_id: &str, message: &str) -> Result<SyncRun, StoreError> {
        let mut run = self.get_run(run_id)?;
        run.status = RunStatus::Failed;
        run.error = Some(message.to_string());
        run.completed_at = Some(now());
        self.write(&run)?;
        Ok(run)
    }

    /// Force the terminal completed status. Idempotent: re-completing a
    /// completed run keeps the original completion timestamp.
    pub fn complete_run(&self, run_id: &str) -> Result<SyncRun, StoreError> {
        let mut run = self.get_run(run_id)?;
        run.status = RunStatus::Completed;
        if run.completed_at.is_none() {
            run.completed_at = Some(now());
        }
        self.write(&run)?;
        Ok(run)
    }

    pub fn get_run(&self, run_id: &str) -> Result<SyncRun, StoreError> {
        let path = self.run_path(run_id);
        if !path.exists() {
            return Err(StoreError::RunNotFound {
                run_id: run_id.to_string(),
            });
        }
        read_run(&path)
    }

    /// The most recently started run still in a non-terminal status, for
    /// operator-triggered resume tooling. `None` when every run is terminal.
    pub fn get_incomplete_run(&self) -> Result<Option<SyncRun>, StoreError> {
        Ok(self
            .list_runs()?
            .into_iter()
            .filter(|r| !r.status.is_terminal())
            .max_by_key(|r| r.started_at))
    }

    /// Every persisted run, unordered. Unreadable files are skipped; the run
    /// history must stay queryable even if one row is corrupt.
    pub fn list_runs(&self) -> Result<Vec<SyncRun>, StoreError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut runs = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match read_run(&path) {
                Ok(run) => runs.push(run),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable run row");
                }
            }
        }
        Ok(runs)
    }

    fn write(&self, run: &SyncRun) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.run_path(&run.run_id);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string_pretty(run)?)?;
        fs::rename(&tmp, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            StoreError::Io(e)
        })?;
        Ok(())
    }
}

fn read_run(path: &Path) -> Result<SyncRun, StoreError> {
    let content = fs::read_to_string(path)?;
    let run: SyncRun = serde_json::from_str(&content)?;
    if run.schema_version != SCHEMA_VERSION {
        return Err(StoreError::SchemaVersion {
            found: run.schema_version,
            expected: SCHEMA_VERSION,
        });
    }
    Ok(run)
}

fn now() -> NaiveDateTime {
    chrono::Local::now().naive_local()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn start_creates_running_row() {
        let tmp = TempDir::new().unwrap();
        let store = CheckpointStore::new(tmp.path());

        let run = store.start_run("run-1", 10, 3).unwrap();
        assert_eq!(run.status, RunStatus::Running);
        assert_eq!(run.total, 10);
        assert_eq!(run.priority_total, 3);
        assert!(!run.priority_completed);
        assert_eq!(run.schema_version, SCHEMA_VERSION);

        let read = store.get_run("run-1").unwrap();
        assert_eq!(read.total, 10);
    }

    #[test]
    fn start_run_is_idempotent_and_resets_progress() {
        let tmp = TempDir::new().unwrap();
        let store = CheckpointStore::new(tmp.path());

        store.start_run("run-1", 10, 3).unwrap();
        store.update_progress("run-1", 5, 4, 1, 2).unwrap();
        let restarted = store.start_run("run-1", 10, 3).unwrap();

        assert_eq!(restarted.processed, 0);
        assert_eq!(restarted.status, RunStatus::Running);
    }

    #[test]
    fn progress_derives_completion() {
        let tmp = TempDir::new().unwrap();
        let store = CheckpointStore::new(tmp.path());

        store.start_run("run-1", 3, 0).unwrap();
        let mid = store.update_progress("run-1", 2, 2, 0, 0).unwrap();
        assert_eq!(mid.status, RunStatus::Running);
        assert!(mid.completed_at.is_none());

        let done = store.update_progress("run-1", 3, 3, 0, 0).unwrap();
        assert_eq!(done.status, RunStatus::Completed);
        assert!(done.completed_at.is_some());
    }

    #[test]
    fn priority_completed_is_monotonic() {
        let tmp = TempDir::new().unwrap();
        let store = CheckpointStore::new(tmp.path());

        store.start_run("run-1", 10, 2).unwrap();
        let run = store.update_progress("run-1", 2, 2, 0, 2).unwrap();
        assert!(run.priority_completed);

        // A later update with a lower priority count must not revert the flag.
        let run = store.update_progress("run-1", 3, 3, 0, 1).unwrap();
        assert!(run.priority_completed);
    }

    #[test]
    fn progress_counters_clamp_to_totals() {
        let tmp = TempDir::new().unwrap();
        let store = CheckpointStore::new(tmp.path());

        store.start_run("run-1", 10, 3).unwrap();
        let run = store.update_progress("run-1", 15, 12, 3, 5).unwrap();
        assert_eq!(run.processed, 10);
        assert_eq!(run.priority_processed, 3);
        assert!(run.priority_completed);
        assert_eq!(run.status, RunStatus::Completed);
    }

    #[test]
    fn zero_priority_total_starts_completed() {
        let tmp = TempDir::new().unwrap();
        let store = CheckpointStore::new(tmp.path());
        let run = store.start_run("run-1", 5, 0).unwrap();
        assert!(run.priority_completed);
    }

    #[test]
    fn fail_records_message_and_timestamp() {
        let tmp = TempDir::new().unwrap();
        let store = CheckpointStore::new(tmp.path());

        store.start_run("run-1", 5, 0).unwrap();
        let run = store.fail_run("run-1", "store unreachable").unwrap();
        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.error.as_deref(), Some("store unreachable"));
        assert!(run.completed_at.is_some());
    }

    #[test]
    fn complete_run_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let store = CheckpointStore::new(tmp.path());

        store.start_run("run-1", 5, 0).unwrap();
        let first = store.complete_run("run-1").unwrap();
        let second = store.complete_run("run-1").unwrap();
        assert_eq!(first.completed_at, second.completed_at);
        assert_eq!(second.status, RunStatus::Completed);
    }

    #[test]
    fn aux_counters_are_named_and_overwritable() {
        let tmp = TempDir::new().unwrap();
        let store = CheckpointStore::new(tmp.path());

        store.start_run("run-1", 5, 0).unwrap();
        store
            .update_aux_counter("run-1", "search_index_records", 40)
            .unwrap();
        let run = store
            .update_aux_counter("run-1", "search_index_records", 42)
            .unwrap();
        assert_eq!(run.aux_counters["search_index_records"], 42);
    }

    #[test]
    fn incomplete_run_prefers_most_recent_start() {
        let tmp = TempDir::new().unwrap();
        let store = CheckpointStore::new(tmp.path());

        store.start_run("old", 5, 0).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        store.start_run("new", 5, 0).unwrap();

        let incomplete = store.get_incomplete_run().unwrap().unwrap();
        assert_eq!(incomplete.run_id, "new");
    }

    #[test]
    fn incomplete_run_skips_terminal_statuses() {
        let tmp = TempDir::new().unwrap();
        let store = CheckpointStore::new(tmp.path());

        store.start_run("a", 5, 0).unwrap();
        store.complete_run("a").unwrap();
        store.start_run("b", 5, 0).unwrap();
        store.fail_run("b", "boom").unwrap();

        assert!(store.get_incomplete_run().unwrap().is_none());
    }

    #[test]
    fn get_missing_run_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let store = CheckpointStore::new(tmp.path());
        assert!(matches!(
            store.get_run("nope"),
            Err(StoreError::RunNotFound { .. })
        ));
    }
}
