//! Work Scheduling
//!
//! The collector runs its parallel phases through the [`WorkScheduler`]
//! trait. Each call is a complete phase: it returns only after every task has
//! finished, which is the barrier between collector phases.
//!
//! Tasks receive a **thread index** in `0..thread_count()`. Index `0` is the
//! invoking thread, which takes part in the work; pool worker `i` reports
//! `i + 1`. Per-thread buffers ([`ThreadedVector`]) are addressed with that
//! index, so no two concurrently running tasks touch the same slot.
//!
//! # Provided Schedulers
//!
//! - [`InlineScheduler`]: runs everything on the calling thread.
//! - [`RayonScheduler`]: dedicated rayon pool.
//!
//! Schedulers must not be re-entered from inside one of their own tasks.

use std::ops::Range;

use log::debug;
use parking_lot::{Mutex, RwLock};

use crate::errors::Result;

/// A boxed task receiving its thread index.
pub type Task<'a> = Box<dyn FnOnce(usize) + Send + 'a>;

/// Parallel task execution with thread-indexed callbacks.
pub trait WorkScheduler: Send + Sync {
    /// Number of pool workers, not counting the invoking thread.
    fn worker_count(&self) -> usize;

    /// Number of distinct thread indices tasks may observe.
    fn thread_count(&self) -> usize {
        self.worker_count() + 1
    }

    /// Splits `0..len` into contiguous chunks of at least `min_batch_size`
    /// items and runs `task(thread_index, chunk)` for each. Returns when all
    /// chunks are done.
    fn parallel_range(
        &self,
        len: usize,
        min_batch_size: usize,
        task: &(dyn Fn(usize, Range<usize>) + Sync),
    );

    /// Runs every task and returns when all of them are done.
    fn run_tasks<'a>(&self, tasks: Vec<Task<'a>>);
}

/// Chunk boundaries for `len` items over `thread_count` threads.
fn chunk_size(len: usize, min_batch_size: usize, thread_count: usize) -> usize {
    len.div_ceil(thread_count.max(1)).max(min_batch_size.max(1))
}

/// Calls `f(thread_index, index, item)` for every item in parallel.
pub fn parallel_for_each<T, F>(
    scheduler: &dyn WorkScheduler,
    items: &[T],
    min_batch_size: usize,
    f: F,
) where
    T: Sync,
    F: Fn(usize, usize, &T) + Sync,
{
    scheduler.parallel_range(items.len(), min_batch_size, &|thread_index, range| {
        for index in range {
            f(thread_index, index, &items[index]);
        }
    });
}

// ============================================================================
// InlineScheduler
// ============================================================================

/// Single-threaded scheduler; every task runs on thread index `0`.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineScheduler;

impl WorkScheduler for InlineScheduler {
    fn worker_count(&self) -> usize {
        0
    }

    fn parallel_range(
        &self,
        len: usize,
        _min_batch_size: usize,
        task: &(dyn Fn(usize, Range<usize>) + Sync),
    ) {
        if len > 0 {
            task(0, 0..len);
        }
    }

    fn run_tasks<'a>(&self, tasks: Vec<Task<'a>>) {
        for task in tasks {
            task(0);
        }
    }
}

// ============================================================================
// RayonScheduler
// ============================================================================

/// Scheduler backed by a dedicated rayon thread pool.
pub struct RayonScheduler {
    pool: rayon::ThreadPool,
    worker_count: usize,
}

impl RayonScheduler {
    /// Creates a pool with `worker_count` workers (at least one).
    pub fn new(worker_count: usize) -> Result<Self> {
        let worker_count = worker_count.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(worker_count)
            .thread_name(|i| format!("myth-batch-worker-{i}"))
            .build()?;
        debug!("Created batch worker pool with {worker_count} threads");
        Ok(Self { pool, worker_count })
    }

    /// One worker per available core, minus the invoking thread.
    pub fn with_available_parallelism() -> Result<Self> {
        let cores = std::thread::available_parallelism().map_or(1, std::num::NonZero::get);
        Self::new(cores.saturating_sub(1))
    }

    fn current_thread_index() -> usize {
        rayon::current_thread_index().map_or(0, |i| i + 1)
    }
}

impl WorkScheduler for RayonScheduler {
    fn worker_count(&self) -> usize {
        self.worker_count
    }

    fn parallel_range(
        &self,
        len: usize,
        min_batch_size: usize,
        task: &(dyn Fn(usize, Range<usize>) + Sync),
    ) {
        if len == 0 {
            return;
        }
        let chunk = chunk_size(len, min_batch_size, self.thread_count());
        if chunk >= len {
            task(0, 0..len);
            return;
        }

        self.pool.in_place_scope(|scope| {
            let mut start = chunk;
            while start < len {
                let range = start..(start + chunk).min(len);
                scope.spawn(move |_| task(Self::current_thread_index(), range));
                start += chunk;
            }
            task(0, 0..chunk);
        });
    }

    fn run_tasks<'a>(&self, tasks: Vec<Task<'a>>) {
        let mut tasks = tasks.into_iter();
        let Some(first) = tasks.next() else {
            return;
        };

        self.pool.in_place_scope(|scope| {
            for task in tasks {
                scope.spawn(move |_| task(Self::current_thread_index()));
            }
            first(0);
        });
    }
}

// ============================================================================
// ThreadedVector
// ============================================================================

/// Append-only collection with one slot per thread index.
///
/// Pushes from different thread indices never contend. The slots are merged
/// after the phase barrier with [`ThreadedVector::take_all`] or
/// [`ThreadedVector::to_vec`]; concatenation order is by thread index.
pub struct ThreadedVector<T> {
    slots: RwLock<Vec<Mutex<Vec<T>>>>,
}

impl<T> Default for ThreadedVector<T> {
    fn default() -> Self {
        Self {
            slots: RwLock::new(Vec::new()),
        }
    }
}

impl<T> ThreadedVector<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Empties every slot and resizes to `thread_count` slots.
    pub fn clear(&self, thread_count: usize) {
        let mut slots = self.slots.write();
        for slot in slots.iter() {
            slot.lock().clear();
        }
        slots.resize_with(thread_count.max(1), || Mutex::new(Vec::new()));
    }

    /// Appends to the slot of `thread_index`.
    ///
    /// An unknown thread index falls back to slot `0`.
    pub fn push(&self, thread_index: usize, value: T) {
        let slots = self.slots.read();
        if let Some(slot) = slots.get(thread_index).or_else(|| slots.first()) {
            slot.lock().push(value);
            return;
        }
        drop(slots);

        let mut slots = self.slots.write();
        if slots.is_empty() {
            slots.push(Mutex::new(Vec::new()));
        }
        slots[0].get_mut().push(value);
    }

    pub fn len(&self) -> usize {
        self.slots.read().iter().map(|slot| slot.lock().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Moves all elements out, leaving the slots empty.
    pub fn take_all(&self) -> Vec<T> {
        let slots = self.slots.read();
        let mut out = Vec::with_capacity(slots.iter().map(|slot| slot.lock().len()).sum());
        for slot in slots.iter() {
            out.append(&mut slot.lock());
        }
        out
    }
}

impl<T: Clone> ThreadedVector<T> {
    pub fn to_vec(&self) -> Vec<T> {
        let slots = self.slots.read();
        let mut out = Vec::new();
        for slot in slots.iter() {
            out.extend_from_slice(&slot.lock());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn chunking_respects_min_batch() {
        assert_eq!(chunk_size(100, 1, 4), 25);
        assert_eq!(chunk_size(100, 40, 4), 40);
        assert_eq!(chunk_size(3, 1, 8), 1);
    }

    #[test]
    fn inline_runs_everything_on_thread_zero() {
        let sum = AtomicUsize::new(0);
        InlineScheduler.parallel_range(10, 1, &|thread, range| {
            assert_eq!(thread, 0);
            sum.fetch_add(range.len(), Ordering::Relaxed);
        });
        assert_eq!(sum.load(Ordering::Relaxed), 10);
    }

    #[test]
    fn rayon_covers_every_item_once() {
        let scheduler = RayonScheduler::new(3).unwrap();
        let items: Vec<usize> = (0..1000).collect();
        let out = ThreadedVector::new();
        out.clear(scheduler.thread_count());

        parallel_for_each(&scheduler, &items, 16, |thread, _, item| {
            assert!(thread < scheduler.thread_count());
            out.push(thread, *item);
        });

        let mut all = out.take_all();
        all.sort_unstable();
        assert_eq!(all, items);
        assert!(out.is_empty());
    }

    #[test]
    fn rayon_run_tasks_is_a_barrier() {
        let scheduler = RayonScheduler::new(2).unwrap();
        let counter = AtomicUsize::new(0);
        let tasks: Vec<Task<'_>> = (0..8)
            .map(|_| {
                Box::new(|_thread: usize| {
                    counter.fetch_add(1, Ordering::Relaxed);
                }) as Task<'_>
            })
            .collect();
        scheduler.run_tasks(tasks);
        assert_eq!(counter.load(Ordering::Relaxed), 8);
    }

    #[test]
    fn threaded_vector_clear_resets() {
        let v = ThreadedVector::new();
        v.clear(2);
        v.push(0, 1);
        v.push(1, 2);
        v.push(7, 3);
        assert_eq!(v.to_vec(), vec![1, 3, 2]);
        v.clear(2);
        assert!(v.is_empty());
    }
}
