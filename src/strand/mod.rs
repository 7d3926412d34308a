//! Strands: where and when deferred observers fire.
//!
//! A strand pairs a lifetime with a monotonic `now` and a `defer_at` that
//! schedules a *task observer* to fire at (or after) a given instant. When
//! a task activates, exactly one of `next(resume)` / `error(e)` /
//! `complete()` fires. Inside `next` the task may call the received
//! [`Resume`] handle to request a re-fire at a new instant; otherwise the
//! strand completes the task.
//!
//! Every strand fires tasks in nondecreasing time order, FIFO at equal
//! times. Three flavors ship:
//!
//! - [`Immediate`](immediate::Immediate): blocks the calling thread
//! - [`RunLoop`](run_loop::RunLoop): a queued strand drained by one thread
//! - worker-thread strand ([`make_new_thread`]): a run loop plus its own
//!   dedicated thread
//!
//! [`make_shared`] multiplexes every strand it produces onto one
//! underlying strand, giving combinators a single serialization point.

pub mod immediate;
pub mod run_loop;
pub mod shared;
pub mod thread;

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::observer::{chained, AnyObserver, Observer, Tail};
use crate::subscription::Subscription;

pub use immediate::{make_immediate, Immediate};
pub use run_loop::RunLoop;
pub use shared::make_shared;
pub use thread::make_new_thread;

/// The reschedule handle handed to a task observer's `next`.
///
/// Calling [`Resume::at`] asks the strand to fire the task again at the
/// given instant; not calling it lets the task complete.
#[derive(Clone, Debug)]
pub struct Resume {
    slot: Arc<Mutex<Option<Instant>>>,
}

impl Resume {
    pub(crate) fn new() -> Self {
        Self {
            slot: Arc::new(Mutex::new(None)),
        }
    }

    /// Requests a re-fire at `at`.
    pub fn at(&self, at: Instant) {
        *self.slot.lock().expect("resume lock poisoned") = Some(at);
    }

    pub(crate) fn take(&self) -> Option<Instant> {
        self.slot.lock().expect("resume lock poisoned").take()
    }
}

/// The erased observer type strands queue and fire.
pub type TaskObserver = AnyObserver<Resume>;

/// An execution medium with a clock and a timed defer.
pub trait Strand: Clone + Send + Sync + 'static {
    /// The lifetime that owns work scheduled on this strand.
    fn lifetime(&self) -> &Subscription;

    /// The current instant on the strand's clock.
    fn now(&self) -> Instant;

    /// Schedules `task` to fire at or after `at`.
    fn defer_at_task(&self, at: Instant, task: TaskObserver);

    /// Type-erases this strand.
    fn erased(self) -> AnyStrand
    where
        Self: Sized,
    {
        AnyStrand::new(self)
    }
}

trait DynStrand: Send + Sync {
    fn lifetime(&self) -> &Subscription;
    fn now(&self) -> Instant;
    fn defer_at_task(&self, at: Instant, task: TaskObserver);
}

impl<S: Strand> DynStrand for S {
    fn lifetime(&self) -> &Subscription {
        Strand::lifetime(self)
    }

    fn now(&self) -> Instant {
        Strand::now(self)
    }

    fn defer_at_task(&self, at: Instant, task: TaskObserver) {
        Strand::defer_at_task(self, at, task);
    }
}

/// A type-erased strand handle.
pub struct AnyStrand {
    inner: Arc<dyn DynStrand>,
}

impl Clone for AnyStrand {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl AnyStrand {
    /// Wraps a concrete strand.
    pub fn new(strand: impl Strand) -> Self {
        Self {
            inner: Arc::new(strand),
        }
    }
}

impl Strand for AnyStrand {
    fn lifetime(&self) -> &Subscription {
        self.inner.lifetime()
    }

    fn now(&self) -> Instant {
        self.inner.now()
    }

    fn defer_at_task(&self, at: Instant, task: TaskObserver) {
        self.inner.defer_at_task(at, task);
    }

    fn erased(self) -> AnyStrand {
        self
    }
}

impl std::fmt::Debug for AnyStrand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnyStrand")
            .field("lifetime", self.inner.lifetime())
            .finish()
    }
}

/// A policy for minting strands of one kind, each bound to a caller-chosen
/// lifetime.
pub type MakeStrand = Arc<dyn Fn(Subscription) -> AnyStrand + Send + Sync>;

// ============================================================================
// Defer helpers
// ============================================================================

/// Schedules `task` to fire as soon as possible.
pub fn defer<S: Strand>(strand: &S, task: impl Observer<Item = Resume>) {
    strand.defer_at_task(strand.now(), task.erased());
}

/// Schedules `task` to fire at `at`.
pub fn defer_at<S: Strand>(strand: &S, at: Instant, task: impl Observer<Item = Resume>) {
    strand.defer_at_task(at, task.erased());
}

/// Schedules `task` to fire after `delay`.
pub fn defer_after<S: Strand>(strand: &S, delay: Duration, task: impl Observer<Item = Resume>) {
    strand.defer_at_task(strand.now() + delay, task.erased());
}

/// Fires `out` at `initial`, `initial + period`, `initial + 2·period`, …,
/// delivering a monotonically increasing counter.
///
/// The task tracks its own target instant, so callback latency does not
/// drift the schedule. It ends when `out`'s lifetime stops or `out`
/// terminates.
pub fn defer_periodic<S, O>(strand: &S, initial: Instant, period: Duration, out: O)
where
    S: Strand,
    O: Observer<Item = u64>,
{
    let schedule = Arc::new(Mutex::new((0_u64, initial)));
    let lifetime = out.lifetime().clone();
    let task = chained(out, lifetime)
        .on_next(move |out: &O, resume: Resume| {
            if out.lifetime().is_stopped() {
                return;
            }
            let (count, target) = {
                let mut slot = schedule.lock().expect("periodic lock poisoned");
                let count = slot.0;
                slot.0 += 1;
                slot.1 += period;
                (count, slot.1)
            };
            out.next(count);
            resume.at(target);
        })
        .complete_tail(Tail::Skip);
    strand.defer_at_task(initial, task.erased());
}
