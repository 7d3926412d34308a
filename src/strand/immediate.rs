//! The inline strand: `defer_at` blocks the calling thread.
//!
//! Scheduling sleeps until the target instant, fires the task, and loops
//! while the task keeps rescheduling itself. The strand serves in-thread,
//! single-reader pipelines and benchmarks; nothing ever queues.

use std::time::Instant;

use super::{MakeStrand, Resume, Strand, TaskObserver};
use crate::clock;
use crate::observer::Observer;
use crate::subscription::Subscription;
use std::sync::Arc;

/// The immediate (inline, blocking) strand.
#[derive(Clone, Debug)]
pub struct Immediate {
    lifetime: Subscription,
}

impl Immediate {
    /// Creates an immediate strand owned by `lifetime`.
    #[must_use]
    pub fn new(lifetime: Subscription) -> Self {
        Self { lifetime }
    }
}

impl Strand for Immediate {
    fn lifetime(&self) -> &Subscription {
        &self.lifetime
    }

    fn now(&self) -> Instant {
        clock::now()
    }

    fn defer_at_task(&self, at: Instant, task: TaskObserver) {
        let mut next_at = at;
        while !self.lifetime.is_stopped() && !task.lifetime().is_stopped() {
            clock::sleep_until(next_at);
            let resume = Resume::new();
            task.next(resume.clone());
            match resume.take() {
                Some(again) => next_at = again,
                None => break,
            }
        }
        task.complete();
    }
}

/// A [`MakeStrand`] minting immediate strands.
#[must_use]
pub fn make_immediate() -> MakeStrand {
    Arc::new(|lifetime| Immediate::new(lifetime).erased())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::emitter;
    use crate::strand::{defer_after, defer_at};
    use crate::test_utils::init_test_logging;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[test]
    fn fires_synchronously_at_deadline() {
        init_test_logging();
        let strand = Immediate::new(Subscription::new());
        let fired_at = Arc::new(Mutex::new(None));
        let f = fired_at.clone();
        let deadline = clock::now() + Duration::from_millis(10);
        let task = emitter::<Resume>(Subscription::new()).on_next(move |_| {
            *f.lock().unwrap() = Some(clock::now());
        });
        defer_at(&strand, deadline, task);
        let fired = fired_at.lock().unwrap().expect("task fired");
        assert!(fired >= deadline);
    }

    #[test]
    fn reschedule_loops_until_done() {
        init_test_logging();
        let strand = Immediate::new(Subscription::new());
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let task = emitter::<Resume>(Subscription::new()).on_next(move |resume: Resume| {
            let n = h.fetch_add(1, Ordering::SeqCst) + 1;
            if n < 3 {
                resume.at(clock::now());
            }
        });
        defer_after(&strand, Duration::from_millis(1), task);
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn stopped_strand_skips_work_but_completes_task() {
        init_test_logging();
        let lifetime = Subscription::new();
        lifetime.stop();
        let strand = Immediate::new(lifetime);
        let hits = Arc::new(AtomicUsize::new(0));
        let done = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let d = done.clone();
        let task = emitter::<Resume>(Subscription::new())
            .on_next(move |_| {
                h.fetch_add(1, Ordering::SeqCst);
            })
            .on_complete(move || {
                d.fetch_add(1, Ordering::SeqCst);
            });
        defer_at(&strand, clock::now(), task);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(done.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn stopped_task_lifetime_is_discarded() {
        init_test_logging();
        let strand = Immediate::new(Subscription::new());
        let task_lifetime = Subscription::new();
        task_lifetime.stop();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let task = emitter::<Resume>(task_lifetime).on_next(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });
        defer_at(&strand, clock::now(), task);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }
}
