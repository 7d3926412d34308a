//! Execution contexts: a strand, an optional payload, and a make-strand.
//!
//! A [`Context`] is what a pipeline activation runs against. It owns a
//! lifetime, a strand minted from its make-strand policy, an optional
//! user payload held as scoped state, and the policy itself for minting
//! sibling strands of the same kind.
//!
//! Construction inserts the strand's lifetime under the context lifetime
//! and binds the lifetime's stop drain onto the strand, so cancellation
//! work observes the same thread affinity as data callbacks. On the
//! immediate strand that binding is effectively synchronous; on a queued
//! strand `stop` becomes non-blocking and
//! [`Subscription::join`] is the quiescence point.

use std::any::Any;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::observer::emitter;
use crate::strand::{defer, make_immediate, AnyStrand, MakeStrand, Resume, Strand, TaskObserver};
use crate::subscription::{State, Subscription};

/// A strand plus an optional payload plus a make-strand.
#[derive(Clone)]
pub struct Context {
    lifetime: Subscription,
    strand: AnyStrand,
    make: MakeStrand,
    payload: Option<Arc<dyn Any + Send + Sync>>,
}

impl Context {
    /// Creates a context with a fresh root lifetime and the immediate
    /// make-strand.
    #[must_use]
    pub fn root() -> Self {
        Self::new(Subscription::new(), make_immediate())
    }

    /// Creates an immediate-strand context over `lifetime`.
    #[must_use]
    pub fn immediate(lifetime: Subscription) -> Self {
        Self::new(lifetime, make_immediate())
    }

    /// Creates a context over `lifetime` with strands minted by `make`.
    #[must_use]
    pub fn new(lifetime: Subscription, make: MakeStrand) -> Self {
        let strand = make(Subscription::new());
        lifetime.insert(strand.lifetime());
        bind_stop_to_strand(&lifetime, &strand);
        Self {
            lifetime,
            strand,
            make,
            payload: None,
        }
    }

    /// Attaches a payload, stored as scoped state on the context lifetime.
    ///
    /// Returns the context unchanged if the lifetime is already stopped.
    #[must_use]
    pub fn with_payload<P: Send + Sync + 'static>(mut self, payload: P) -> Self {
        let state = self.lifetime.scoped(payload);
        self.payload = Some(Arc::new(state));
        self
    }

    /// Fetches the payload handle, if one of type `P` is attached.
    #[must_use]
    pub fn payload<P: Send + Sync + 'static>(&self) -> Option<State<P>> {
        self.payload
            .as_ref()?
            .downcast_ref::<State<P>>()
            .cloned()
    }

    /// The lifetime of this context (and of the activation started on it).
    #[must_use]
    pub fn lifetime(&self) -> &Subscription {
        &self.lifetime
    }

    /// Mints a sibling strand of the same kind, bound to `lifetime`.
    #[must_use]
    pub fn make_strand(&self, lifetime: Subscription) -> AnyStrand {
        (self.make)(lifetime)
    }

    /// The make-strand policy of this context.
    #[must_use]
    pub fn maker(&self) -> MakeStrand {
        self.make.clone()
    }

    /// Rebinds this context to `lifetime`: fresh strand from the same
    /// policy, payload handle carried over.
    #[must_use]
    pub fn copy_to(&self, lifetime: Subscription) -> Self {
        let strand = (self.make)(Subscription::new());
        lifetime.insert(strand.lifetime());
        Self {
            lifetime,
            strand,
            make: self.make.clone(),
            payload: self.payload.clone(),
        }
    }

    /// Rebinds to `lifetime` with a different make-strand policy.
    ///
    /// Used by the context-switching operators. The payload does not
    /// follow the context across a strand-policy switch.
    #[must_use]
    pub fn with_new_maker(&self, lifetime: Subscription, make: MakeStrand) -> Self {
        Self::new(lifetime, make)
    }
}

impl Strand for Context {
    fn lifetime(&self) -> &Subscription {
        &self.lifetime
    }

    fn now(&self) -> Instant {
        self.strand.now()
    }

    fn defer_at_task(&self, at: Instant, task: TaskObserver) {
        self.strand.defer_at_task(at, task);
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("lifetime", &self.lifetime)
            .field("payload", &self.payload.is_some())
            .finish()
    }
}

/// Routes the lifetime's stop drain onto `strand`.
///
/// If the strand's own lifetime is already stopped (its loop has exited),
/// the drain runs inline instead so a stop can never be stranded.
fn bind_stop_to_strand(lifetime: &Subscription, strand: &AnyStrand) {
    let strand = strand.clone();
    lifetime.bind_defer(move |work| {
        if strand.lifetime().is_stopped() {
            work();
            return;
        }
        let slot = Arc::new(Mutex::new(Some(work)));
        let task = emitter::<Resume>(Subscription::new()).on_next(move |_resume| {
            if let Some(work) = slot.lock().expect("defer slot poisoned").take() {
                work();
            }
        });
        defer(&strand, task);
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock;
    use crate::strand::{defer_after, defer_periodic, make_new_thread};
    use crate::test_utils::init_test_logging;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn root_context_defers_inline() {
        init_test_logging();
        let ctx = Context::root();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        defer(
            &ctx,
            emitter::<Resume>(Subscription::new()).on_next(move |_| {
                h.fetch_add(1, Ordering::SeqCst);
            }),
        );
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn defer_after_waits() {
        init_test_logging();
        let ctx = Context::root();
        let before = clock::now();
        let fired = Arc::new(Mutex::new(None));
        let f = fired.clone();
        defer_after(
            &ctx,
            Duration::from_millis(15),
            emitter::<Resume>(Subscription::new()).on_next(move |_| {
                *f.lock().unwrap() = Some(clock::now());
            }),
        );
        let fired = fired.lock().unwrap().expect("fired");
        assert!(fired - before >= Duration::from_millis(15));
    }

    #[test]
    fn copy_to_keeps_maker_and_payload() {
        init_test_logging();
        let ctx = Context::root().with_payload(41_i32);
        let copied = ctx.copy_to(Subscription::new());
        let payload = copied.payload::<i32>().expect("payload");
        assert_eq!(payload.get(), Some(41));
        assert_ne!(copied.lifetime(), ctx.lifetime());
    }

    #[test]
    fn new_maker_drops_payload() {
        init_test_logging();
        let ctx = Context::root().with_payload(1_u8);
        let swapped = ctx.with_new_maker(Subscription::new(), make_immediate());
        assert!(swapped.payload::<u8>().is_none());
    }

    #[test]
    fn stop_propagates_to_strand_lifetime() {
        init_test_logging();
        let lifetime = Subscription::new();
        let ctx = Context::new(lifetime.clone(), make_new_thread());
        let strand_lifetime = ctx.strand.lifetime().clone();
        lifetime.stop();
        lifetime.join();
        assert!(strand_lifetime.is_stopped());
    }

    #[test]
    fn stop_drain_runs_on_context_strand() {
        init_test_logging();
        let lifetime = Subscription::new();
        let ctx = Context::new(lifetime.clone(), make_new_thread());
        let stop_thread = Arc::new(Mutex::new(None));
        let s = stop_thread.clone();
        ctx.lifetime().on_stop(move || {
            *s.lock().unwrap() = Some(std::thread::current().id());
        });
        lifetime.stop();
        lifetime.join();
        let stopped_on = stop_thread.lock().unwrap().expect("stopper ran");
        assert_ne!(stopped_on, std::thread::current().id());
    }

    #[test]
    fn periodic_over_context() {
        init_test_logging();
        let ctx = Context::root();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let out_lifetime = Subscription::new();
        let out = {
            let seen = seen.clone();
            let lt = out_lifetime.clone();
            emitter::<u64>(out_lifetime.clone()).on_next(move |n| {
                seen.lock().unwrap().push(n);
                if n >= 1 {
                    lt.stop();
                }
            })
        };
        defer_periodic(&ctx, clock::now(), Duration::from_millis(2), out);
        assert_eq!(*seen.lock().unwrap(), vec![0, 1]);
    }
}
