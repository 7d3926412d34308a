//! Event-delaying transform.

use std::marker::PhantomData;
use std::time::Duration;

use super::observe_on::defer_call;
use crate::context::Context;
use crate::error::Error;
use crate::observer::{chained, AnyObserver, Observer};
use crate::pipeline::{Sink, Transform, TransformStage};
use crate::strand::MakeStrand;
use crate::subscription::Subscription;

/// Like `observe_on`, but every event is re-delivered `wait` after it
/// arrived, preserving the relative spacing of events scheduled from a
/// single thread.
pub struct Delay<V> {
    make: MakeStrand,
    wait: Duration,
    _marker: PhantomData<fn(V)>,
}

/// The `delay(make, wait)` transform.
#[must_use]
pub fn delay<V: Send + 'static>(make: MakeStrand, wait: Duration) -> TransformStage<Delay<V>> {
    TransformStage::new(Delay {
        make,
        wait,
        _marker: PhantomData,
    })
}

impl<V> Clone for Delay<V> {
    fn clone(&self) -> Self {
        Self {
            make: self.make.clone(),
            wait: self.wait,
            _marker: PhantomData,
        }
    }
}

impl<V: Send + 'static> Transform for Delay<V> {
    type In = V;
    type Out = V;

    fn lift<K>(&self, sink: K) -> impl Sink<Item = V>
    where
        K: Sink<Item = V>,
    {
        DelaySink {
            make: self.make.clone(),
            wait: self.wait,
            sink,
            _marker: PhantomData,
        }
    }
}

struct DelaySink<V, K> {
    make: MakeStrand,
    wait: Duration,
    sink: K,
    _marker: PhantomData<fn(V)>,
}

impl<V, K: Clone> Clone for DelaySink<V, K> {
    fn clone(&self) -> Self {
        Self {
            make: self.make.clone(),
            wait: self.wait,
            sink: self.sink.clone(),
            _marker: PhantomData,
        }
    }
}

impl<V, K> Sink for DelaySink<V, K>
where
    V: Send + 'static,
    K: Sink<Item = V>,
{
    type Item = V;

    fn attach(&self, ctx: &Context) -> impl Observer<Item = V> {
        let lifetime = Subscription::new();
        lifetime.insert(ctx.lifetime());
        let outctx = ctx.with_new_maker(lifetime, self.make.clone());
        let downstream: AnyObserver<V> = self.sink.attach(&outctx).erased();
        let wait = self.wait;
        let next_ctx = outctx.clone();
        let err_ctx = outctx.clone();
        let done_ctx = outctx;
        chained(downstream, ctx.lifetime().clone())
            .on_next(move |d: &AnyObserver<V>, v: V| {
                defer_call(&next_ctx, wait, d, move |d| d.next(v));
            })
            .on_error(move |d: &AnyObserver<V>, e: Error| {
                defer_call(&err_ctx, wait, d, move |d| d.error(e));
            })
            .on_complete(move |d: &AnyObserver<V>| {
                defer_call(&done_ctx, wait, d, AnyObserver::complete);
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock;
    use crate::ops::{collect_into, ints};
    use crate::strand::{make_immediate, make_new_thread};
    use crate::test_utils::init_test_logging;
    use std::sync::{Arc, Mutex};

    #[test]
    fn immediate_delay_shifts_delivery() {
        init_test_logging();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let before = clock::now();
        let _ = ints(1, 1)
            | delay(make_immediate(), Duration::from_millis(20))
            | collect_into(seen.clone())
            | Context::root();
        // Inline strand: the delay has elapsed by the time start returns.
        assert!(clock::now() - before >= Duration::from_millis(20));
        assert_eq!(*seen.lock().unwrap(), vec![1]);
    }

    #[test]
    fn queued_delay_preserves_order() {
        init_test_logging();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sub = ints(1, 4)
            | delay(make_new_thread(), Duration::from_millis(15))
            | collect_into(seen.clone())
            | Context::root();
        assert!(seen.lock().unwrap().is_empty());
        std::thread::sleep(Duration::from_millis(80));
        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3, 4]);
        sub.stop();
        sub.join();
    }
}
