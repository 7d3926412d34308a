//! The worker-thread strand: a run loop with its own dedicated thread.
//!
//! [`make_new_thread`] mints strands that each spawn one named thread
//! whose body is [`RunLoop::run`]. The strand's lifetime owns a
//! [`ThreadGuard`] in scoped state: stopping the lifetime wakes the loop,
//! and dropping the guard (when the lifetime's node is destroyed) joins
//! the thread.

use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use super::{MakeStrand, RunLoop, Strand};
use crate::subscription::Subscription;

/// RAII guard joining a drainer thread when its run-loop lifetime's node
/// is destroyed.
///
/// The drainer itself keeps the lifetime alive while it runs, so by the
/// time the guard drops the loop has already observed the stop and
/// returned. Holding no `Subscription` here is what lets the node drop at
/// all. If the guard drop lands on the drainer thread (it released the
/// last handle), the join is skipped.
struct ThreadGuard {
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for ThreadGuard {
    fn drop(&mut self) {
        let handle = self
            .handle
            .lock()
            .expect("thread guard lock poisoned")
            .take();
        if let Some(handle) = handle {
            if handle.thread().id() != std::thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}

/// Spawns a drainer thread for a fresh run loop bound to `lifetime`.
///
/// The returned strand is the run loop itself; enqueueing is non-blocking.
#[must_use]
pub fn spawn_run_loop(lifetime: Subscription) -> RunLoop {
    let run_loop = RunLoop::new(lifetime.clone());
    let body = run_loop.clone();
    let handle = std::thread::Builder::new()
        .name("riffle-strand".into())
        .spawn(move || body.run())
        .expect("failed to spawn strand thread");
    let guard = ThreadGuard {
        handle: Mutex::new(Some(handle)),
    };
    // The guard lives as scoped state so the thread is joined when the
    // lifetime's node is destroyed, after the stop drain.
    drop(lifetime.scoped(Arc::new(guard)));
    run_loop
}

/// A [`MakeStrand`] minting one dedicated worker thread per strand.
#[must_use]
pub fn make_new_thread() -> MakeStrand {
    Arc::new(|lifetime| spawn_run_loop(lifetime).erased())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock;
    use crate::observer::emitter;
    use crate::strand::{defer, defer_at, Resume};
    use crate::test_utils::init_test_logging;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn tasks_fire_on_worker_thread() {
        init_test_logging();
        let lifetime = Subscription::new();
        let strand = spawn_run_loop(lifetime.clone());
        let caller = std::thread::current().id();
        let observed = Arc::new(Mutex::new(None));
        let o = observed.clone();
        let task = emitter::<Resume>(Subscription::new()).on_next(move |_| {
            *o.lock().unwrap() = Some(std::thread::current().id());
        });
        defer(&strand, task);
        std::thread::sleep(Duration::from_millis(40));
        lifetime.stop();
        lifetime.join();
        let fired_on = observed.lock().unwrap().expect("task fired");
        assert_ne!(fired_on, caller);
    }

    #[test]
    fn stop_drains_and_thread_exits() {
        init_test_logging();
        let lifetime = Subscription::new();
        let strand = spawn_run_loop(lifetime.clone());
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        defer_at(
            &strand,
            clock::now(),
            emitter::<Resume>(Subscription::new()).on_next(move |_| {
                h.fetch_add(1, Ordering::SeqCst);
            }),
        );
        std::thread::sleep(Duration::from_millis(40));
        lifetime.stop();
        lifetime.join();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn maker_mints_independent_strands() {
        init_test_logging();
        let make = make_new_thread();
        let a_lifetime = Subscription::new();
        let b_lifetime = Subscription::new();
        let a = make(a_lifetime.clone());
        let b = make(b_lifetime.clone());
        let ids = Arc::new(Mutex::new(Vec::new()));
        for strand in [&a, &b] {
            let ids = ids.clone();
            defer(
                strand,
                emitter::<Resume>(Subscription::new()).on_next(move |_| {
                    ids.lock().unwrap().push(std::thread::current().id());
                }),
            );
        }
        std::thread::sleep(Duration::from_millis(40));
        a_lifetime.stop();
        b_lifetime.stop();
        let ids = ids.lock().unwrap();
        assert_eq!(ids.len(), 2);
        assert_ne!(ids[0], ids[1]);
    }
}
