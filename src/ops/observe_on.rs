//! Strand-switching transform.

use std::marker::PhantomData;
use std::sync::{Arc, Mutex};

use crate::context::Context;
use crate::error::Error;
use crate::observer::{chained, AnyObserver, Observer, Tail};
use crate::pipeline::{Sink, Transform, TransformStage};
use crate::strand::{defer_after, MakeStrand, Resume};
use crate::subscription::Subscription;
use std::time::Duration;

/// Re-delivers every downstream call on a strand minted from `make`.
///
/// The downstream sink is attached under a nested context whose strand
/// comes from the given policy; each upstream `next`/`error`/`complete`
/// is deferred there. Intra-event ordering is preserved by the strand's
/// FIFO guarantee at equal times.
pub struct ObserveOn<V> {
    make: MakeStrand,
    _marker: PhantomData<fn(V)>,
}

/// The `observe_on(make)` transform.
#[must_use]
pub fn observe_on<V: Send + 'static>(make: MakeStrand) -> TransformStage<ObserveOn<V>> {
    TransformStage::new(raw(make))
}

/// The unwrapped transform, for combinators that compose it directly.
pub(crate) fn raw<V: Send + 'static>(make: MakeStrand) -> ObserveOn<V> {
    ObserveOn {
        make,
        _marker: PhantomData,
    }
}

impl<V> Clone for ObserveOn<V> {
    fn clone(&self) -> Self {
        Self {
            make: self.make.clone(),
            _marker: PhantomData,
        }
    }
}

impl<V: Send + 'static> Transform for ObserveOn<V> {
    type In = V;
    type Out = V;

    fn lift<K>(&self, sink: K) -> impl Sink<Item = V>
    where
        K: Sink<Item = V>,
    {
        ObserveOnSink {
            make: self.make.clone(),
            sink,
            _marker: PhantomData,
        }
    }
}

struct ObserveOnSink<V, K> {
    make: MakeStrand,
    sink: K,
    _marker: PhantomData<fn(V)>,
}

impl<V, K: Clone> Clone for ObserveOnSink<V, K> {
    fn clone(&self) -> Self {
        Self {
            make: self.make.clone(),
            sink: self.sink.clone(),
            _marker: PhantomData,
        }
    }
}

/// Defers a single already-captured call onto `strand` after `wait`,
/// forwarding task errors downstream and swallowing the task's own
/// completion.
pub(crate) fn defer_call<D>(
    strand: &Context,
    wait: Duration,
    downstream: &D,
    call: impl FnOnce(&D) + Send + 'static,
) where
    D: Observer,
{
    let slot = Arc::new(Mutex::new(Some(call)));
    let task = chained(downstream.clone(), Subscription::new())
        .on_next(move |d: &D, _resume: Resume| {
            if let Some(call) = slot.lock().expect("defer slot poisoned").take() {
                call(d);
            }
        })
        .complete_tail(Tail::Skip);
    defer_after(strand, wait, task);
}

impl<V, K> Sink for ObserveOnSink<V, K>
where
    V: Send + 'static,
    K: Sink<Item = V>,
{
    type Item = V;

    fn attach(&self, ctx: &Context) -> impl Observer<Item = V> {
        // The hand-off lifetime adopts the upstream one so downstream
        // termination tears the whole activation down.
        let lifetime = Subscription::new();
        lifetime.insert(ctx.lifetime());
        let outctx = ctx.with_new_maker(lifetime, self.make.clone());
        let downstream: AnyObserver<V> = self.sink.attach(&outctx).erased();
        let next_ctx = outctx.clone();
        let err_ctx = outctx.clone();
        let done_ctx = outctx;
        chained(downstream, ctx.lifetime().clone())
            .on_next(move |d: &AnyObserver<V>, v: V| {
                defer_call(&next_ctx, Duration::ZERO, d, move |d| d.next(v));
            })
            .on_error(move |d: &AnyObserver<V>, e: Error| {
                defer_call(&err_ctx, Duration::ZERO, d, move |d| d.error(e));
            })
            .on_complete(move |d: &AnyObserver<V>| {
                defer_call(&done_ctx, Duration::ZERO, d, AnyObserver::complete);
            })
    }
}
