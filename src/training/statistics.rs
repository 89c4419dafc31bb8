// src/training/statistics.rs
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-thread training statistics, merged into a JSON report on
//! `finalize`. Each worker owns an append-only collection; the main
//! thread merges under a lock rather than locking per record.

use std::sync::Mutex;

use serde::Serialize;

use crate::types::{LabelId, Real};

#[derive(Debug, Clone, Serialize)]
pub struct LabelStat {
    pub label: usize,
    pub num_positives: usize,
    pub iterations: usize,
    pub initial_loss: Real,
    pub final_loss: Real,
    pub converged: bool,
    pub error: Option<String>,
}

/// Owned by one worker thread; appended to without synchronization since
/// each worker owns its own slot in `StatsGatherer::per_thread`.
#[derive(Default)]
pub struct ThreadStats {
    records: Vec<LabelStat>,
}

impl ThreadStats {
    pub fn record(&mut self, stat: LabelStat) {
        self.records.push(stat);
    }
}

/// Collects one `ThreadStats` per worker and merges them into a report on
/// `finalize()`, run from the main thread once all workers have joined.
pub struct StatsGatherer {
    per_thread: Vec<Mutex<ThreadStats>>,
    merged: Vec<LabelStat>,
}

#[derive(Debug, Serialize)]
pub struct TrainingReport {
    pub num_labels_trained: usize,
    pub num_failed: usize,
    pub failed_labels: Vec<usize>,
    pub labels: Vec<LabelStat>,
}

impl StatsGatherer {
    pub fn new(num_threads: usize) -> Self {
        StatsGatherer {
            per_thread: (0..num_threads).map(|_| Mutex::new(ThreadStats::default())).collect(),
            merged: Vec::new(),
        }
    }

    pub fn record(
        &self,
        thread: crate::types::ThreadId,
        label: LabelId,
        num_positives: usize,
        iterations: usize,
        initial_loss: Real,
        final_loss: Real,
        converged: bool,
        error: Option<String>,
    ) {
        let mut guard = self.per_thread[thread.to_index()].lock().unwrap();
        guard.record(LabelStat {
            label: label.to_index(),
            num_positives,
            iterations,
            initial_loss,
            final_loss,
            converged,
            error,
        });
    }

    /// Merge all per-thread collections. Must run after every worker has
    /// joined (no further `record` calls may race this).
    pub fn finalize(&mut self) {
        self.merged.clear();
        for thread in &self.per_thread {
            let guard = thread.lock().unwrap();
            self.merged.extend(guard.records.iter().cloned());
        }
        self.merged.sort_by_key(|s| s.label);
    }

    pub fn report(&self) -> TrainingReport {
        let failed_labels: Vec<usize> = self.merged.iter().filter(|s| s.error.is_some()).map(|s| s.label).collect();
        TrainingReport {
            num_labels_trained: self.merged.len(),
            num_failed: failed_labels.len(),
            failed_labels,
            labels: self.merged.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ThreadId;

    #[test]
    fn merges_across_threads_and_reports_failures() {
        let gatherer = StatsGatherer::new(2);
        gatherer.record(ThreadId::new(0), LabelId::new(0), 5, 3, 1.0, 0.1, true, None);
        gatherer.record(ThreadId::new(1), LabelId::new(1), 2, 1, 2.0, 2.0, false, Some("diverged".into()));

        let mut gatherer = gatherer;
        gatherer.finalize();
        let report = gatherer.report();

        assert_eq!(report.num_labels_trained, 2);
        assert_eq!(report.num_failed, 1);
        assert_eq!(report.failed_labels, vec![1]);
    }
}
