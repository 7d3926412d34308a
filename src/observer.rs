//! Value sinks bound to a lifetime.
//!
//! An [`Observer`] receives `next` zero or more times while its lifetime is
//! live, then at most one of `error` or `complete`, which also stops the
//! lifetime. After termination every further call is discarded.
//!
//! Two concrete flavors exist:
//!
//! - [`Emitter`]: three callables plus a lifetime (the leaf sink)
//! - [`Chained`]: the delegating flavor; the downstream observer is passed
//!   as the first argument to each callable so stateless stages can chain
//!   without capturing
//!
//! `next` is protected: a panic in the user callback is captured and routed
//! through the observer's error path. `error` and `complete` are not
//! protected; a panic there is a contract violation and aborts the process.
//!
//! The [`Tail`] enum fixes the default behavior of unset `error`/`complete`
//! slots on the delegating flavor.

use std::marker::PhantomData;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crate::error::Error;
use crate::subscription::Subscription;

/// A value sink bound to a lifetime.
pub trait Observer: Clone + Send + Sync + 'static {
    /// The value type accepted by `next`.
    type Item: Send + 'static;

    /// The lifetime guarding this observer.
    fn lifetime(&self) -> &Subscription;

    /// Delivers a value. Ignored after termination; panics in the handler
    /// are routed to `error`.
    fn next(&self, value: Self::Item);

    /// Terminates the stream with an error. At most one termination wins.
    fn error(&self, error: Error);

    /// Terminates the stream normally. At most one termination wins.
    fn complete(&self);

    /// Type-erases this observer for storage in homogeneous collections.
    fn erased(self) -> AnyObserver<Self::Item>
    where
        Self: Sized,
    {
        AnyObserver::new(self)
    }
}

/// Default behavior of an unset `error` or `complete` slot on [`Chained`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tail {
    /// Forward the event to the delegate.
    Pass,
    /// Swallow the event.
    Skip,
    /// Abort the process; the event had to be handled.
    Fail,
}

/// Runs a termination handler; a panic there aborts the process.
fn must_not_fail(f: impl FnOnce()) {
    if catch_unwind(AssertUnwindSafe(f)).is_err() {
        tracing::error!(target: "riffle::observer", "panic in error/complete path, aborting");
        std::process::abort();
    }
}

// ============================================================================
// Emitter: the leaf observer
// ============================================================================

/// The non-delegating observer: a lifetime plus up to three callables.
///
/// Unset slots fall back to: `next` ignores the value, `error` aborts the
/// process (errors must be handled explicitly at the end of a pipeline),
/// `complete` does nothing.
pub struct Emitter<V, N, E, C> {
    lifetime: Subscription,
    next_fn: Option<N>,
    error_fn: Option<E>,
    complete_fn: Option<C>,
    _marker: PhantomData<fn(V)>,
}

/// Creates an [`Emitter`] with every slot at its default.
#[must_use]
pub fn emitter<V>(lifetime: Subscription) -> Emitter<V, fn(V), fn(Error), fn()> {
    Emitter {
        lifetime,
        next_fn: None,
        error_fn: None,
        complete_fn: None,
        _marker: PhantomData,
    }
}

impl<V, N, E, C> Emitter<V, N, E, C> {
    /// Sets the `next` handler, possibly changing the accepted value type.
    pub fn on_next<V2, N2>(self, next: N2) -> Emitter<V2, N2, E, C>
    where
        N2: Fn(V2),
    {
        Emitter {
            lifetime: self.lifetime,
            next_fn: Some(next),
            error_fn: self.error_fn,
            complete_fn: self.complete_fn,
            _marker: PhantomData,
        }
    }

    /// Sets the `error` handler.
    pub fn on_error<E2>(self, error: E2) -> Emitter<V, N, E2, C>
    where
        E2: Fn(Error),
    {
        Emitter {
            lifetime: self.lifetime,
            next_fn: self.next_fn,
            error_fn: Some(error),
            complete_fn: self.complete_fn,
            _marker: PhantomData,
        }
    }

    /// Sets the `complete` handler.
    pub fn on_complete<C2>(self, complete: C2) -> Emitter<V, N, E, C2>
    where
        C2: Fn(),
    {
        Emitter {
            lifetime: self.lifetime,
            next_fn: self.next_fn,
            error_fn: self.error_fn,
            complete_fn: Some(complete),
            _marker: PhantomData,
        }
    }
}

impl<V, N: Clone, E: Clone, C: Clone> Clone for Emitter<V, N, E, C> {
    fn clone(&self) -> Self {
        Self {
            lifetime: self.lifetime.clone(),
            next_fn: self.next_fn.clone(),
            error_fn: self.error_fn.clone(),
            complete_fn: self.complete_fn.clone(),
            _marker: PhantomData,
        }
    }
}

impl<V, N, E, C> Observer for Emitter<V, N, E, C>
where
    V: Send + 'static,
    N: Fn(V) + Clone + Send + Sync + 'static,
    E: Fn(Error) + Clone + Send + Sync + 'static,
    C: Fn() + Clone + Send + Sync + 'static,
{
    type Item = V;

    fn lifetime(&self) -> &Subscription {
        &self.lifetime
    }

    fn next(&self, value: V) {
        if self.lifetime.is_stopped() {
            return;
        }
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            if let Some(n) = &self.next_fn {
                n(value);
            }
        }));
        if let Err(payload) = outcome {
            Observer::error(self, Error::from_panic(payload));
        }
    }

    fn error(&self, error: Error) {
        if self.lifetime.is_stopped() {
            return;
        }
        must_not_fail(|| match &self.error_fn {
            Some(e) => e(error),
            None => {
                tracing::error!(target: "riffle::observer", %error, "unhandled stream error, aborting");
                std::process::abort();
            }
        });
        self.lifetime.stop();
    }

    fn complete(&self) {
        if self.lifetime.is_stopped() {
            return;
        }
        must_not_fail(|| {
            if let Some(c) = &self.complete_fn {
                c();
            }
        });
        self.lifetime.stop();
    }
}

// ============================================================================
// Chained: the delegating observer
// ============================================================================

/// The delegating observer: callables receive the downstream observer as
/// their first argument.
///
/// The default `next` forwards the value downstream; unset `error` and
/// `complete` slots follow their [`Tail`] (both default to [`Tail::Pass`]).
pub struct Chained<V, D, N, E, C> {
    delegate: D,
    lifetime: Subscription,
    next_fn: N,
    error_fn: Option<E>,
    error_tail: Tail,
    complete_fn: Option<C>,
    complete_tail: Tail,
    _marker: PhantomData<fn(V)>,
}

fn forward_next<D: Observer>(delegate: &D, value: D::Item) {
    delegate.next(value);
}

/// Creates a [`Chained`] observer that forwards everything downstream.
#[must_use]
pub fn chained<D: Observer>(
    delegate: D,
    lifetime: Subscription,
) -> Chained<D::Item, D, fn(&D, D::Item), fn(&D, Error), fn(&D)> {
    Chained {
        delegate,
        lifetime,
        next_fn: forward_next::<D>,
        error_fn: None,
        error_tail: Tail::Pass,
        complete_fn: None,
        complete_tail: Tail::Pass,
        _marker: PhantomData,
    }
}

impl<V, D, N, E, C> Chained<V, D, N, E, C> {
    /// Sets the `next` handler, possibly changing the accepted value type.
    pub fn on_next<V2, N2>(self, next: N2) -> Chained<V2, D, N2, E, C>
    where
        N2: Fn(&D, V2),
    {
        Chained {
            delegate: self.delegate,
            lifetime: self.lifetime,
            next_fn: next,
            error_fn: self.error_fn,
            error_tail: self.error_tail,
            complete_fn: self.complete_fn,
            complete_tail: self.complete_tail,
            _marker: PhantomData,
        }
    }

    /// Sets the `error` handler.
    pub fn on_error<E2>(self, error: E2) -> Chained<V, D, N, E2, C>
    where
        E2: Fn(&D, Error),
    {
        Chained {
            delegate: self.delegate,
            lifetime: self.lifetime,
            next_fn: self.next_fn,
            error_fn: Some(error),
            error_tail: self.error_tail,
            complete_fn: self.complete_fn,
            complete_tail: self.complete_tail,
            _marker: PhantomData,
        }
    }

    /// Sets the `complete` handler.
    pub fn on_complete<C2>(self, complete: C2) -> Chained<V, D, N, E, C2>
    where
        C2: Fn(&D),
    {
        Chained {
            delegate: self.delegate,
            lifetime: self.lifetime,
            next_fn: self.next_fn,
            error_fn: self.error_fn,
            error_tail: self.error_tail,
            complete_fn: Some(complete),
            complete_tail: self.complete_tail,
            _marker: PhantomData,
        }
    }

    /// Sets the default behavior of an unset `error` slot.
    #[must_use]
    pub fn error_tail(mut self, tail: Tail) -> Self {
        self.error_tail = tail;
        self
    }

    /// Sets the default behavior of an unset `complete` slot.
    #[must_use]
    pub fn complete_tail(mut self, tail: Tail) -> Self {
        self.complete_tail = tail;
        self
    }
}

impl<V, D: Clone, N: Clone, E: Clone, C: Clone> Clone for Chained<V, D, N, E, C> {
    fn clone(&self) -> Self {
        Self {
            delegate: self.delegate.clone(),
            lifetime: self.lifetime.clone(),
            next_fn: self.next_fn.clone(),
            error_fn: self.error_fn.clone(),
            error_tail: self.error_tail,
            complete_fn: self.complete_fn.clone(),
            complete_tail: self.complete_tail,
            _marker: PhantomData,
        }
    }
}

impl<V, D, N, E, C> Observer for Chained<V, D, N, E, C>
where
    V: Send + 'static,
    D: Observer,
    N: Fn(&D, V) + Clone + Send + Sync + 'static,
    E: Fn(&D, Error) + Clone + Send + Sync + 'static,
    C: Fn(&D) + Clone + Send + Sync + 'static,
{
    type Item = V;

    fn lifetime(&self) -> &Subscription {
        &self.lifetime
    }

    fn next(&self, value: V) {
        if self.lifetime.is_stopped() {
            return;
        }
        let outcome = catch_unwind(AssertUnwindSafe(|| (self.next_fn)(&self.delegate, value)));
        if let Err(payload) = outcome {
            Observer::error(self, Error::from_panic(payload));
        }
    }

    fn error(&self, error: Error) {
        if self.lifetime.is_stopped() {
            return;
        }
        must_not_fail(|| match &self.error_fn {
            Some(e) => e(&self.delegate, error),
            None => match self.error_tail {
                Tail::Pass => self.delegate.error(error),
                Tail::Skip => {}
                Tail::Fail => {
                    tracing::error!(target: "riffle::observer", %error, "unhandled stream error, aborting");
                    std::process::abort();
                }
            },
        });
        self.lifetime.stop();
    }

    fn complete(&self) {
        if self.lifetime.is_stopped() {
            return;
        }
        must_not_fail(|| match &self.complete_fn {
            Some(c) => c(&self.delegate),
            None => match self.complete_tail {
                Tail::Pass => self.delegate.complete(),
                Tail::Skip => {}
                Tail::Fail => {
                    tracing::error!(target: "riffle::observer", "unhandled complete, aborting");
                    std::process::abort();
                }
            },
        });
        self.lifetime.stop();
    }
}

// ============================================================================
// AnyObserver: the type-erased observer
// ============================================================================

trait DynObserver<V>: Send + Sync {
    fn lifetime(&self) -> &Subscription;
    fn next(&self, value: V);
    fn error(&self, error: Error);
    fn complete(&self);
}

impl<O: Observer> DynObserver<O::Item> for O {
    fn lifetime(&self) -> &Subscription {
        Observer::lifetime(self)
    }

    fn next(&self, value: O::Item) {
        Observer::next(self, value);
    }

    fn error(&self, error: Error) {
        Observer::error(self, error);
    }

    fn complete(&self) {
        Observer::complete(self);
    }
}

/// A type-erased observer handle.
///
/// The contract mechanics live in the wrapped observer; this is a thin
/// shared pointer used at dynamic composition boundaries and inside strand
/// queues.
pub struct AnyObserver<V> {
    inner: Arc<dyn DynObserver<V>>,
}

impl<V> Clone for AnyObserver<V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<V: Send + 'static> AnyObserver<V> {
    /// Wraps a concrete observer.
    pub fn new(observer: impl Observer<Item = V>) -> Self {
        Self {
            inner: Arc::new(observer),
        }
    }
}

impl<V: Send + 'static> Observer for AnyObserver<V> {
    type Item = V;

    fn lifetime(&self) -> &Subscription {
        self.inner.lifetime()
    }

    fn next(&self, value: V) {
        self.inner.next(value);
    }

    fn error(&self, error: Error) {
        self.inner.error(error);
    }

    fn complete(&self) {
        self.inner.complete();
    }

    fn erased(self) -> AnyObserver<V> {
        self
    }
}

impl<V> std::fmt::Debug for AnyObserver<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnyObserver")
            .field("lifetime", self.inner.lifetime())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::init_test_logging;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn recording() -> (Arc<Mutex<Vec<String>>>, impl Observer<Item = i64>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let lifetime = Subscription::new();
        let observer = {
            let next_log = log.clone();
            let err_log = log.clone();
            let done_log = log.clone();
            emitter::<i64>(lifetime)
                .on_next(move |v| next_log.lock().unwrap().push(format!("next {v}")))
                .on_error(move |e| err_log.lock().unwrap().push(format!("error {e}")))
                .on_complete(move || done_log.lock().unwrap().push("complete".into()))
        };
        (log, observer)
    }

    #[test]
    fn values_then_complete() {
        init_test_logging();
        let (log, obs) = recording();
        Observer::next(&obs, 1);
        Observer::next(&obs, 2);
        Observer::complete(&obs);
        Observer::next(&obs, 3);
        Observer::complete(&obs);
        assert_eq!(
            *log.lock().unwrap(),
            vec!["next 1", "next 2", "complete"],
        );
        assert!(Observer::lifetime(&obs).is_stopped());
    }

    #[test]
    fn error_terminates_once() {
        init_test_logging();
        let (log, obs) = recording();
        Observer::error(&obs, Error::msg("first"));
        Observer::error(&obs, Error::msg("second"));
        Observer::next(&obs, 9);
        assert_eq!(*log.lock().unwrap(), vec!["error first"]);
    }

    #[test]
    fn panic_in_next_routes_to_error() {
        init_test_logging();
        let log = Arc::new(Mutex::new(Vec::new()));
        let lifetime = Subscription::new();
        let err_log = log.clone();
        let obs = emitter::<i64>(lifetime)
            .on_next(|_v| panic!("callback exploded"))
            .on_error(move |e| err_log.lock().unwrap().push(e.to_string()));
        Observer::next(&obs, 1);
        assert_eq!(*log.lock().unwrap(), vec!["callback exploded"]);
        assert!(Observer::lifetime(&obs).is_stopped());
    }

    #[test]
    fn stopped_lifetime_discards_everything() {
        init_test_logging();
        let (log, obs) = recording();
        Observer::lifetime(&obs).stop();
        Observer::next(&obs, 1);
        Observer::error(&obs, Error::msg("late"));
        Observer::complete(&obs);
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn chained_forwards_by_default() {
        init_test_logging();
        let (log, downstream) = recording();
        let link = chained(downstream, Subscription::new());
        Observer::next(&link, 4);
        Observer::complete(&link);
        assert_eq!(*log.lock().unwrap(), vec!["next 4", "complete"]);
        assert!(Observer::lifetime(&link).is_stopped());
    }

    #[test]
    fn chained_skip_tail_swallows_complete() {
        init_test_logging();
        let (log, downstream) = recording();
        let link = chained(downstream, Subscription::new()).complete_tail(Tail::Skip);
        Observer::next(&link, 1);
        Observer::complete(&link);
        assert_eq!(*log.lock().unwrap(), vec!["next 1"]);
        // The link itself still terminated.
        assert!(Observer::lifetime(&link).is_stopped());
    }

    #[test]
    fn chained_custom_next_transforms() {
        init_test_logging();
        let (log, downstream) = recording();
        let link = chained(downstream, Subscription::new())
            .on_next(|d: &_, v: i64| Observer::next(d, v * 10));
        Observer::next(&link, 3);
        Observer::complete(&link);
        assert_eq!(*log.lock().unwrap(), vec!["next 30", "complete"]);
    }

    #[test]
    fn chained_panic_routes_through_error_tail() {
        init_test_logging();
        let (log, downstream) = recording();
        let link = chained(downstream, Subscription::new())
            .on_next(|_d: &_, _v: i64| panic!("inner"));
        Observer::next(&link, 1);
        assert_eq!(*log.lock().unwrap(), vec!["error inner"]);
    }

    #[test]
    fn erased_observer_preserves_contract() {
        init_test_logging();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let obs = emitter::<u32>(Subscription::new())
            .on_next(move |_| {
                c.fetch_add(1, Ordering::SeqCst);
            })
            .on_error(|_| {})
            .erased();
        Observer::next(&obs, 1);
        Observer::next(&obs, 2);
        Observer::complete(&obs);
        Observer::next(&obs, 3);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}
