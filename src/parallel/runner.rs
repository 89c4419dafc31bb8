// src/parallel/runner.rs
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Chunked parallel task runner: dynamic work distribution over an atomic
//! chunk counter, with optional CPU pinning and a wall-clock deadline.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::error::{DismecError, Result};
use crate::numa::{NumaTopology, ThreadDistributor};
use crate::parallel::task::TaskGenerator;
use crate::types::ThreadId;

/// Minimum acceptable average time spent per chunk before a performance
/// hint is logged, in milliseconds.
const MIN_TIME_PER_CHUNK_MS: u64 = 5;

/// Outcome of a `ParallelRunner::run` invocation.
#[derive(Debug, Clone, Copy)]
pub struct RunResult {
    /// True iff every chunk in `[start, num_tasks)` was claimed.
    pub finished: bool,
    /// `start + claimed_chunks * chunk_size`; may exceed `num_tasks`.
    pub next_task: i64,
    pub wall_time: Duration,
}

pub struct ParallelRunner {
    num_threads: i64,
    chunk_size: i64,
    time_limit: Option<Duration>,
    bind_threads: bool,
}

impl ParallelRunner {
    /// `num_threads <= 0` means "use hardware concurrency".
    pub fn new(num_threads: i64, chunk_size: i64) -> Self {
        ParallelRunner {
            num_threads,
            chunk_size: chunk_size.max(1),
            time_limit: None,
            bind_threads: true,
        }
    }

    pub fn set_chunk_size(&mut self, chunk_size: i64) {
        self.chunk_size = chunk_size.max(1);
    }

    pub fn set_time_limit(&mut self, time_limit: Option<Duration>) {
        self.time_limit = time_limit.filter(|d| !d.is_zero());
    }

    pub fn set_bind_threads(&mut self, bind: bool) {
        self.bind_threads = bind;
    }

    /// Run `tasks` over `[start, tasks.num_tasks())`.
    pub fn run<T>(&self, tasks: &mut T, start: i64) -> Result<RunResult>
    where
        T: TaskGenerator + Sync,
    {
        let hw = num_cpus::get().max(1) as i64;

        let mut num_threads = if self.num_threads <= 0 {
            hw
        } else {
            self.num_threads
        };
        if num_threads > 2 * hw + 1 {
            tracing::warn!(
                "you have specified many more threads ({}) than your hardware appears to \
                 support ({}); number of threads has been capped at hardware concurrency",
                num_threads,
                hw
            );
            num_threads = hw;
        }

        let num_tasks = tasks.num_tasks() - start;
        if num_tasks <= 0 {
            tasks.finalize();
            return Ok(RunResult {
                finished: true,
                next_task: start,
                wall_time: Duration::ZERO,
            });
        }

        let mut num_chunks = num_tasks / self.chunk_size;
        if num_tasks % self.chunk_size != 0 {
            num_chunks += 1;
        }
        num_threads = num_threads.min(num_chunks).max(1);

        let topology = NumaTopology::detect().unwrap_or_else(|e| {
            tracing::warn!("NUMA topology detection failed, assuming single node: {e}");
            NumaTopology {
                num_nodes: 1,
                physical_cores: hw as usize,
                logical_cpus: hw as usize,
                nodes: vec![],
                is_uma: true,
            }
        });
        let distributor = if self.bind_threads {
            Some(ThreadDistributor::new(num_threads as usize, &topology))
        } else {
            None
        };

        let cpu_time_ms = AtomicU64::new(0);
        let sub_counter = AtomicI64::new(0);

        tracing::info!("spawning {} threads to run {} tasks", num_threads, num_tasks);
        tasks.prepare(num_threads, self.chunk_size);

        let start_time = Instant::now();
        let time_limit = self.time_limit;
        let chunk_size = self.chunk_size;

        std::thread::scope(|scope| -> Result<()> {
            let mut handles = Vec::with_capacity(num_threads as usize);
            for thread in 0..num_threads {
                let thread_id = ThreadId::new(thread as usize);
                let tasks_ref = &*tasks;
                let sub_counter = &sub_counter;
                let cpu_time_ms = &cpu_time_ms;
                let distributor = distributor.as_ref();

                handles.push(scope.spawn(move || -> Result<()> {
                    if let Some(d) = distributor {
                        d.pin_this_thread(thread as usize)?;
                    }
                    tasks_ref.init_thread(thread_id);

                    loop {
                        if let Some(limit) = time_limit {
                            if start_time.elapsed() >= limit {
                                break;
                            }
                        }

                        let search_pos = sub_counter.fetch_add(1, Ordering::SeqCst);
                        if search_pos >= num_chunks {
                            break;
                        }

                        let task_start = Instant::now();
                        let begin_task = search_pos * chunk_size + start;
                        let end_task = ((search_pos + 1) * chunk_size).min(num_tasks) + start;

                        tracing::trace!("starting tasks {}-{}", begin_task, end_task - 1);
                        tasks_ref.run_tasks(begin_task, end_task, thread_id);
                        tracing::trace!("finished tasks {}-{}", begin_task, end_task - 1);

                        cpu_time_ms.fetch_add(task_start.elapsed().as_millis() as u64, Ordering::Relaxed);
                    }
                    Ok(())
                }));
            }

            for handle in handles {
                handle
                    .join()
                    .map_err(|_| DismecError::resource("worker thread panicked"))??;
            }
            Ok(())
        })?;

        tasks.finalize();

        let wall_time = start_time.elapsed();
        let claimed = sub_counter.load(Ordering::SeqCst).min(num_chunks);
        let finished = sub_counter.load(Ordering::SeqCst) >= num_chunks;

        if finished {
            tracing::info!("threads finished after {:.2}s", wall_time.as_secs_f64());
        } else {
            tracing::info!(
                "computation timeout reached after {} of {} chunks ({:.2}s)",
                claimed,
                num_chunks,
                wall_time.as_secs_f64()
            );
        }

        let cpu_time = cpu_time_ms.load(Ordering::Relaxed);
        if (cpu_time * chunk_size as u64) / (num_tasks as u64) < MIN_TIME_PER_CHUNK_MS {
            tracing::warn!(
                "the average time per chunk of work is low, consider increasing chunk size \
                 (currently {}) to reduce parallelization overhead",
                chunk_size
            );
        }

        Ok(RunResult {
            finished,
            next_task: claimed * chunk_size + start,
            wall_time,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct DummyTask {
        check: Vec<Mutex<usize>>,
        do_work: bool,
    }

    impl DummyTask {
        fn new(n: usize, do_work: bool) -> Self {
            DummyTask {
                check: (0..n).map(|_| Mutex::new(0)).collect(),
                do_work,
            }
        }
    }

    impl TaskGenerator for DummyTask {
        fn num_tasks(&self) -> i64 {
            self.check.len() as i64
        }

        fn run_tasks(&self, begin: i64, end: i64, _thread_id: ThreadId) {
            for t in begin..end {
                *self.check[t as usize].lock().unwrap() += 1;
                if self.do_work {
                    std::thread::sleep(Duration::from_millis(10));
                }
            }
        }
    }

    #[test]
    fn run_parallel_touches_every_task_exactly_once() {
        let runner = ParallelRunner::new(-1, 1);
        let mut task = DummyTask::new(10_000, false);
        let res = runner.run(&mut task, 0).unwrap();
        assert!(res.finished);
        for v in &task.check {
            assert_eq!(*v.lock().unwrap(), 1);
        }
    }

    #[test]
    fn run_chunked_parallel_with_start_pos() {
        let runner = ParallelRunner::new(-1, 32);
        let mut task = DummyTask::new(10_000, false);
        let res = runner.run(&mut task, 5).unwrap();
        assert!(res.finished);
        for s in 0..5 {
            assert_eq!(*task.check[s].lock().unwrap(), 0);
        }
        for s in 5..task.check.len() {
            assert_eq!(*task.check[s].lock().unwrap(), 1);
        }
    }

    #[test]
    fn run_parallel_with_timeout() {
        let mut runner = ParallelRunner::new(-1, 16);
        runner.set_time_limit(Some(Duration::from_millis(50)));
        let mut task = DummyTask::new(10_000, true);
        let res = runner.run(&mut task, 5).unwrap();
        assert!(!res.finished);

        for s in 5..res.next_task as usize {
            assert_eq!(*task.check[s].lock().unwrap(), 1);
        }
        for s in res.next_task as usize..task.check.len() {
            assert_eq!(*task.check[s].lock().unwrap(), 0);
        }
    }

    #[test]
    fn zero_tasks_is_a_noop() {
        let runner = ParallelRunner::new(2, 4);
        let mut task = DummyTask::new(0, false);
        let res = runner.run(&mut task, 0).unwrap();
        assert!(res.finished);
        assert_eq!(res.next_task, 0);
    }
}
