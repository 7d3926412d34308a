//! Predicate filter transform.

use std::marker::PhantomData;

use crate::context::Context;
use crate::observer::{chained, Observer};
use crate::pipeline::{Sink, Transform, TransformStage};

/// Forwards a value downstream iff the predicate holds.
pub struct Filter<V, P> {
    pred: P,
    _marker: PhantomData<fn(V)>,
}

/// The `filter(pred)` transform.
#[must_use]
pub fn filter<V, P>(pred: P) -> TransformStage<Filter<V, P>>
where
    V: Send + 'static,
    P: Fn(&V) -> bool + Clone + Send + Sync + 'static,
{
    TransformStage::new(Filter {
        pred,
        _marker: PhantomData,
    })
}

impl<V, P: Clone> Clone for Filter<V, P> {
    fn clone(&self) -> Self {
        Self {
            pred: self.pred.clone(),
            _marker: PhantomData,
        }
    }
}

impl<V, P> Transform for Filter<V, P>
where
    V: Send + 'static,
    P: Fn(&V) -> bool + Clone + Send + Sync + 'static,
{
    type In = V;
    type Out = V;

    fn lift<K>(&self, sink: K) -> impl Sink<Item = V>
    where
        K: Sink<Item = V>,
    {
        FilterSink {
            pred: self.pred.clone(),
            sink,
        }
    }
}

#[derive(Clone)]
struct FilterSink<P, K> {
    pred: P,
    sink: K,
}

impl<V, P, K> Sink for FilterSink<P, K>
where
    V: Send + 'static,
    P: Fn(&V) -> bool + Clone + Send + Sync + 'static,
    K: Sink<Item = V>,
{
    type Item = V;

    fn attach(&self, ctx: &Context) -> impl Observer<Item = V> {
        let downstream = self.sink.attach(ctx).erased();
        let pred = self.pred.clone();
        chained(downstream, ctx.lifetime().clone()).on_next(move |d, v: V| {
            if pred(&v) {
                d.next(v);
            }
        })
    }
}
