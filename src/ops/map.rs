//! Value-mapping transform.

use std::marker::PhantomData;

use crate::context::Context;
use crate::observer::{chained, Observer};
use crate::pipeline::{Sink, Transform, TransformStage};

/// Forwards `f(v)` downstream for each upstream `v`.
pub struct Map<A, B, F> {
    f: F,
    _marker: PhantomData<fn(A) -> B>,
}

/// The `map(f)` transform.
#[must_use]
pub fn map<A, B, F>(f: F) -> TransformStage<Map<A, B, F>>
where
    A: Send + 'static,
    B: Send + 'static,
    F: Fn(A) -> B + Clone + Send + Sync + 'static,
{
    TransformStage::new(Map {
        f,
        _marker: PhantomData,
    })
}

impl<A, B, F: Clone> Clone for Map<A, B, F> {
    fn clone(&self) -> Self {
        Self {
            f: self.f.clone(),
            _marker: PhantomData,
        }
    }
}

impl<A, B, F> Transform for Map<A, B, F>
where
    A: Send + 'static,
    B: Send + 'static,
    F: Fn(A) -> B + Clone + Send + Sync + 'static,
{
    type In = A;
    type Out = B;

    fn lift<K>(&self, sink: K) -> impl Sink<Item = A>
    where
        K: Sink<Item = B>,
    {
        MapSink {
            f: self.f.clone(),
            sink,
            _marker: PhantomData,
        }
    }
}

struct MapSink<A, F, K> {
    f: F,
    sink: K,
    _marker: PhantomData<fn(A)>,
}

impl<A, F: Clone, K: Clone> Clone for MapSink<A, F, K> {
    fn clone(&self) -> Self {
        Self {
            f: self.f.clone(),
            sink: self.sink.clone(),
            _marker: PhantomData,
        }
    }
}

impl<A, F, K> Sink for MapSink<A, F, K>
where
    A: Send + 'static,
    F: Fn(A) -> K::Item + Clone + Send + Sync + 'static,
    K: Sink,
{
    type Item = A;

    fn attach(&self, ctx: &Context) -> impl Observer<Item = A> {
        let downstream = self.sink.attach(ctx).erased();
        let f = self.f.clone();
        chained(downstream, ctx.lifetime().clone()).on_next(move |d, v: A| d.next(f(v)))
    }
}
