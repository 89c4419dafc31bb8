// src/parallel/task.rs
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The `TaskGenerator` contract executed by `ParallelRunner`.

use crate::types::ThreadId;

/// Any computation parallelized by `ParallelRunner` implements this trait.
///
/// `run_tasks` must be reentrant when called with disjoint, non-overlapping
/// `[begin, end)` intervals from different worker threads.
pub trait TaskGenerator {
    /// Total number of tasks this generator provides.
    fn num_tasks(&self) -> i64;

    /// Execute tasks `[begin, end)` on the calling worker thread.
    fn run_tasks(&self, begin: i64, end: i64, thread_id: ThreadId);

    /// Called on the main thread before work starts, to size per-thread
    /// scratch from `(num_threads, chunk_size)`.
    fn prepare(&mut self, _num_threads: i64, _chunk_size: i64) {}

    /// Called once a worker thread has spun up, before its first task.
    /// Allocations made here benefit from first-touch NUMA placement.
    fn init_thread(&self, _thread_id: ThreadId) {}

    /// Called on the main thread after all workers have finished, to
    /// perform single-threaded reductions.
    fn finalize(&mut self) {}
}
