// src/store.rs
use std::collections::HashMap;

use chrono::NaiveDate;
use parking_lot::Mutex;
use serde::Serialize;

/// Statistics committed alongside a processed (plot, date) key.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessingStats {
    pub satellite_date: NaiveDate,
    pub indices: Vec<String>,
    pub cloud_coverage_pct: f64,
    pub data_coverage_pct: f64,
    pub elapsed_secs: f64,
    pub output_path: Option<String>,
}

/// Authoritative dedup gate for (plot id, processing date) keys.
///
/// `try_reserve` must be an atomic check-and-claim: two workers racing on
/// the same key see exactly one success. A reservation is either committed
/// (the key is processed forever after) or released (the date becomes
/// retryable again, e.g. after a quality rejection).
pub trait ProcessingRecordStore: Send + Sync {
    /// True when the key has been fully processed and committed.
    fn exists(&self, plot_id: &str, date: NaiveDate) -> bool;

    /// Atomically claim the key. False means another worker holds it or it
    /// is already committed.
    fn try_reserve(&self, plot_id: &str, date: NaiveDate) -> bool;

    /// Abandon an uncommitted reservation.
    fn release(&self, plot_id: &str, date: NaiveDate);

    /// Mark the key processed and record its statistics.
    fn commit(&self, plot_id: &str, date: NaiveDate, stats: ProcessingStats);
}

#[derive(Debug)]
enum RecordState {
    Reserved,
    Committed(ProcessingStats),
}

/// Mutex-backed store for single-process runs and tests. A relational
/// store with a conditional insert slots in behind the same trait.
#[derive(Default)]
pub struct InMemoryRecordStore {
    records: Mutex<HashMap<(String, NaiveDate), RecordState>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn committed_count(&self) -> usize {
        self.records
            .lock()
            .values()
            .filter(|state| matches!(state, RecordState::Committed(_)))
            .count()
    }

    pub fn stats_for(&self, plot_id: &str, date: NaiveDate) -> Option<ProcessingStats> {
        match self.records.lock().get(&(plot_id.to_string(), date)) {
            Some(RecordState::Committed(stats)) => Some(stats.clone()),
            _ => None,
        }
    }
}

impl ProcessingRecordStore for InMemoryRecordStore {
    fn exists(&self, plot_id: &str, date: NaiveDate) -> bool {
        matches!(
            self.records.lock().get(&(plot_id.to_string(), date)),
            Some(RecordState::Committed(_))
        )
    }

    fn try_reserve(&self, plot_id: &str, date: NaiveDate) -> bool {
        let mut records = self.records.lock();
        match records.entry((plot_id.to_string(), date)) {
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(RecordState::Reserved);
                true
            }
            std::collections::hash_map::Entry::Occupied(_) => false,
        }
    }

    fn release(&self, plot_id: &str, date: NaiveDate) {
        let mut records = self.records.lock();
        if let Some(RecordState::Reserved) = records.get(&(plot_id.to_string(), date)) {
            records.remove(&(plot_id.to_string(), date));
        }
    }

    fn commit(&self, plot_id: &str, date: NaiveDate, stats: ProcessingStats) {
        self.records
            .lock()
            .insert((plot_id.to_string(), date), RecordState::Committed(stats));
    }
}
