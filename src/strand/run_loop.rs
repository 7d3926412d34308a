//! The queued strand: a priority-ordered timed run loop.
//!
//! `defer_at` is non-blocking; entries go into a mutex-protected binary
//! heap ordered by `(time, insertion ordinal)` and a single drainer thread
//! pops due tasks in [`RunLoop::run`]. The ordinal gives the mandatory
//! FIFO tie-break at equal times.
//!
//! The mutex is released before a task fires, so tasks are free to enqueue
//! more work or stop lifetimes without deadlocking the loop. When the
//! owning lifetime stops the loop wakes, abandons the remaining queue and
//! exits.

use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Instant;

use super::{Resume, Strand, TaskObserver};
use crate::clock;
use crate::observer::Observer;
use crate::subscription::Subscription;

struct Entry {
    at: Instant,
    ordinal: u64,
    task: TaskObserver,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.ordinal == other.ordinal
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        // BinaryHeap is a max-heap; reverse so the earliest (time, ordinal)
        // pops first.
        other
            .at
            .cmp(&self.at)
            .then_with(|| other.ordinal.cmp(&self.ordinal))
    }
}

struct Queue {
    heap: Mutex<BinaryHeap<Entry>>,
    ready: Condvar,
    ordinal: AtomicU64,
}

/// The queued, single-drainer strand.
///
/// Enqueue from any thread with `defer_at`; exactly one thread drains via
/// [`RunLoop::run`].
#[derive(Clone)]
pub struct RunLoop {
    lifetime: Subscription,
    queue: Arc<Queue>,
}

impl RunLoop {
    /// Creates a run loop owned by `lifetime`.
    ///
    /// Stopping the lifetime wakes [`run`](Self::run) and makes it return.
    #[must_use]
    pub fn new(lifetime: Subscription) -> Self {
        let queue = Arc::new(Queue {
            heap: Mutex::new(BinaryHeap::new()),
            ready: Condvar::new(),
            ordinal: AtomicU64::new(0),
        });
        let waker = queue.clone();
        lifetime.on_stop(move || waker.ready.notify_all());
        Self { lifetime, queue }
    }

    fn push(&self, at: Instant, task: TaskObserver) {
        let ordinal = self.queue.ordinal.fetch_add(1, Ordering::Relaxed);
        self.queue
            .heap
            .lock()
            .expect("run loop lock poisoned")
            .push(Entry { at, ordinal, task });
        self.queue.ready.notify_all();
    }

    /// Pops the next due entry, waiting until one is due or the lifetime
    /// stops.
    fn pop_due(&self) -> Option<Entry> {
        let mut heap = self.queue.heap.lock().expect("run loop lock poisoned");
        loop {
            if self.lifetime.is_stopped() {
                return None;
            }
            let wait = match heap.peek() {
                Some(entry) => {
                    let now = clock::now();
                    if entry.at <= now {
                        return heap.pop();
                    }
                    Some(entry.at - now)
                }
                None => None,
            };
            heap = match wait {
                Some(timeout) => {
                    self.queue
                        .ready
                        .wait_timeout(heap, timeout)
                        .expect("run loop lock poisoned")
                        .0
                }
                None => self
                    .queue
                    .ready
                    .wait(heap)
                    .expect("run loop lock poisoned"),
            };
        }
    }

    /// Drains the queue until the owning lifetime stops.
    ///
    /// Due tasks fire with the queue unlocked; a task that reschedules is
    /// pushed back with its new time and a fresh ordinal, otherwise it is
    /// completed. Entries still queued at shutdown are dropped.
    pub fn run(&self) {
        tracing::debug!(target: "riffle::strand", "run loop entered");
        while let Some(entry) = self.pop_due() {
            let resume = Resume::new();
            entry.task.next(resume.clone());
            match resume.take() {
                Some(at) => self.push(at, entry.task),
                None => entry.task.complete(),
            }
        }
        tracing::debug!(target: "riffle::strand", "run loop exited");
    }

    /// Number of queued entries (tests and diagnostics).
    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue.heap.lock().expect("run loop lock poisoned").len()
    }
}

impl Strand for RunLoop {
    fn lifetime(&self) -> &Subscription {
        &self.lifetime
    }

    fn now(&self) -> Instant {
        clock::now()
    }

    fn defer_at_task(&self, at: Instant, task: TaskObserver) {
        if self.lifetime.is_stopped() {
            return;
        }
        self.push(at, task);
    }
}

impl std::fmt::Debug for RunLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunLoop")
            .field("lifetime", &self.lifetime)
            .field("pending", &self.pending())
            .finish()
    }
}
