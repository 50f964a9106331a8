//! Durable per-month progress ledger.
//!
//! One JSON document per month, overwritten wholesale on every mutation so a
//! crash loses at most the in-flight day. The ledger tracks which days were
//! already reconciled into the sink, not the row contents; the sheet itself
//! is the store of record.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::dates::Month;
use crate::errors::PipelineError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonthState {
    pub month: Month,
    pub done_dates: BTreeSet<NaiveDate>,
    pub failed_dates: BTreeSet<NaiveDate>,
    #[serde(default)]
    pub last_export_name: Option<String>,
    #[serde(default)]
    pub report_sent: bool,
}

impl MonthState {
    pub fn fresh(month: Month) -> Self {
        Self {
            month,
            done_dates: BTreeSet::new(),
            failed_dates: BTreeSet::new(),
            last_export_name: None,
            report_sent: false,
        }
    }

    pub fn is_done(&self, date: NaiveDate) -> bool {
        self.done_dates.contains(&date)
    }
}

/// Every date of `all_dates` not yet done, preserving input order.
///
/// Previously failed dates stay pending and are retried on the next run.
pub fn pending_dates(all_dates: &[NaiveDate], state: &MonthState) -> Vec<NaiveDate> {
    all_dates
        .iter()
        .copied()
        .filter(|d| !state.done_dates.contains(d))
        .collect()
}

pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, month: Month) -> PathBuf {
        self.dir.join(format!("checkpoint_{month}.json"))
    }

    /// Load the persisted state, or a fresh one when the file is absent or
    /// unreadable. Corruption means "start over", not an error.
    pub fn load(&self, month: Month) -> MonthState {
        let path = self.path_for(month);
        match fs::read_to_string(&path) {
            Ok(text) => match serde_json::from_str::<MonthState>(&text) {
                Ok(state) => {
                    info!(
                        "checkpoint loaded: {} ({} days done)",
                        path.display(),
                        state.done_dates.len()
                    );
                    state
                }
                Err(e) => {
                    warn!("checkpoint unparsable, starting over: {e}");
                    MonthState::fresh(month)
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => MonthState::fresh(month),
            Err(e) => {
                warn!("checkpoint unreadable, starting over: {e}");
                MonthState::fresh(month)
            }
        }
    }

    /// Persist the full state, replacing the previous version.
    ///
    /// Write failures propagate: losing checkpoint progress silently would
    /// risk duplicate downstream work.
    pub fn save(&self, state: &MonthState) -> Result<(), PipelineError> {
        fs::create_dir_all(&self.dir).map_err(PipelineError::Checkpoint)?;
        let path = self.path_for(state.month);
        let body = serde_json::to_string_pretty(state)?;
        fs::write(&path, body).map_err(PipelineError::Checkpoint)?;
        debug!("checkpoint saved: {}", path.display());
        Ok(())
    }

    /// Record a date as done and persist. Idempotent; clears any earlier
    /// failure for the same date.
    pub fn mark_done(&self, state: &mut MonthState, date: NaiveDate) -> Result<(), PipelineError> {
        state.done_dates.insert(date);
        state.failed_dates.remove(&date);
        self.save(state)
    }

    /// Record a date as failed and persist. Idempotent. Never removes the
    /// date from the done set: once done, a date stays satisfied even if a
    /// stale caller re-marks it failed.
    pub fn mark_failed(
        &self,
        state: &mut MonthState,
        date: NaiveDate,
    ) -> Result<(), PipelineError> {
        state.failed_dates.insert(date);
        self.save(state)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn month() -> Month {
        "2026-02".parse().unwrap()
    }

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 2, day).unwrap()
    }

    fn store() -> (tempfile::TempDir, CheckpointStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        (dir, store)
    }

    #[test]
    fn load_missing_file_yields_fresh_state() {
        let (_dir, store) = store();
        let state = store.load(month());
        assert!(state.done_dates.is_empty());
        assert!(state.failed_dates.is_empty());
        assert!(!state.report_sent);
    }

    #[test]
    fn corrupt_checkpoint_is_start_over_not_fatal() {
        let (_dir, store) = store();
        fs::create_dir_all(store.dir()).unwrap();
        fs::write(store.path_for(month()), "{not json").unwrap();
        let state = store.load(month());
        assert!(state.done_dates.is_empty());
    }

    #[test]
    fn state_roundtrips_through_save_and_load() {
        let (_dir, store) = store();
        let mut state = MonthState::fresh(month());
        store.mark_done(&mut state, d(1)).unwrap();
        store.mark_failed(&mut state, d(2)).unwrap();
        state.last_export_name = Some("call_stats_2026-02.csv".into());
        state.report_sent = true;
        store.save(&state).unwrap();

        let loaded = store.load(month());
        assert_eq!(loaded.done_dates, state.done_dates);
        assert_eq!(loaded.failed_dates, state.failed_dates);
        assert_eq!(loaded.last_export_name, state.last_export_name);
        assert!(loaded.report_sent);
    }

    #[test]
    fn mark_done_is_idempotent_and_clears_failure() {
        let (_dir, store) = store();
        let mut state = MonthState::fresh(month());

        store.mark_failed(&mut state, d(3)).unwrap();
        assert!(state.failed_dates.contains(&d(3)));

        store.mark_done(&mut state, d(3)).unwrap();
        store.mark_done(&mut state, d(3)).unwrap();
        assert_eq!(state.done_dates.len(), 1);
        assert!(!state.failed_dates.contains(&d(3)));
    }

    #[test]
    fn mark_failed_never_unmarks_done() {
        let (_dir, store) = store();
        let mut state = MonthState::fresh(month());

        store.mark_done(&mut state, d(4)).unwrap();
        store.mark_failed(&mut state, d(4)).unwrap();

        // The ratchet: done wins for pending-date purposes
        assert!(state.is_done(d(4)));
        let all = [d(4), d(5)];
        assert_eq!(pending_dates(&all, &state), vec![d(5)]);
    }

    #[test]
    fn pending_preserves_input_order_and_retries_failures() {
        let (_dir, store) = store();
        let mut state = MonthState::fresh(month());
        store.mark_done(&mut state, d(2)).unwrap();
        store.mark_failed(&mut state, d(3)).unwrap();

        let all = [d(1), d(2), d(3), d(4)];
        assert_eq!(pending_dates(&all, &state), vec![d(1), d(3), d(4)]);
    }

    #[test]
    fn done_dates_never_appear_pending() {
        let (_dir, store) = store();
        let mut state = MonthState::fresh(month());
        for day in [1, 5, 9] {
            store.mark_done(&mut state, d(day)).unwrap();
        }
        let all: Vec<NaiveDate> = (1..=10).map(d).collect();
        let pending = pending_dates(&all, &state);
        for done in &state.done_dates {
            assert!(!pending.contains(done));
        }
        assert_eq!(pending.len(), 7);
    }

    #[test]
    fn save_into_unwritable_dir_propagates() {
        let file = tempfile::NamedTempFile::new().unwrap();
        // A file path used as a directory cannot be created
        let store = CheckpointStore::new(file.path().join("sub"));
        let state = MonthState::fresh(month());
        assert!(matches!(
            store.save(&state),
            Err(PipelineError::Checkpoint(_))
        ));
    }
}
