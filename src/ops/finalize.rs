//! Finalizer-attaching transform.

use crate::context::Context;
use crate::observer::{chained, Observer};
use crate::pipeline::{Sink, Transform, TransformStage};

/// Attaches a callback as a stop finalizer on the downstream subscription.
///
/// Values, errors and completion pass through untouched; the callback runs
/// once when the activation's lifetime stops, whatever the reason.
pub struct Finalize<V, F> {
    f: F,
    _marker: std::marker::PhantomData<fn(V)>,
}

impl<V, F: Clone> Clone for Finalize<V, F> {
    fn clone(&self) -> Self {
        Self {
            f: self.f.clone(),
            _marker: std::marker::PhantomData,
        }
    }
}

/// The `finalize(f)` transform.
#[must_use]
pub fn finalize<V, F>(f: F) -> TransformStage<Finalize<V, F>>
where
    V: Send + 'static,
    F: FnOnce() + Clone + Send + Sync + 'static,
{
    TransformStage::new(Finalize {
        f,
        _marker: std::marker::PhantomData,
    })
}

impl<V, F> Transform for Finalize<V, F>
where
    V: Send + 'static,
    F: FnOnce() + Clone + Send + Sync + 'static,
{
    type In = V;
    type Out = V;

    fn lift<K>(&self, sink: K) -> impl Sink<Item = V>
    where
        K: Sink<Item = V>,
    {
        FinalizeSink {
            f: self.f.clone(),
            sink,
            _marker: std::marker::PhantomData,
        }
    }
}

struct FinalizeSink<V, F, K> {
    f: F,
    sink: K,
    _marker: std::marker::PhantomData<fn(V)>,
}

impl<V, F: Clone, K: Clone> Clone for FinalizeSink<V, F, K> {
    fn clone(&self) -> Self {
        Self {
            f: self.f.clone(),
            sink: self.sink.clone(),
            _marker: std::marker::PhantomData,
        }
    }
}

impl<V, F, K> Sink for FinalizeSink<V, F, K>
where
    V: Send + 'static,
    F: FnOnce() + Clone + Send + Sync + 'static,
    K: Sink<Item = V>,
{
    type Item = V;

    fn attach(&self, ctx: &Context) -> impl Observer<Item = V> {
        ctx.lifetime().on_stop(self.f.clone());
        chained(self.sink.attach(ctx).erased(), ctx.lifetime().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::{collect_into, ints, take};
    use crate::test_utils::init_test_logging;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[test]
    fn runs_on_natural_completion() {
        init_test_logging();
        let fired = Arc::new(AtomicUsize::new(0));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let f = fired.clone();
        let _ = ints(1, 3)
            | finalize(move || {
                f.fetch_add(1, Ordering::SeqCst);
            })
            | collect_into(seen.clone())
            | Context::root();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn runs_once_on_early_cancel() {
        init_test_logging();
        let fired = Arc::new(AtomicUsize::new(0));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let f = fired.clone();
        let sub = ints(1, 1000)
            | take(2)
            | finalize(move || {
                f.fetch_add(1, Ordering::SeqCst);
            })
            | collect_into(seen.clone())
            | Context::root();
        sub.stop();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
    }
}
