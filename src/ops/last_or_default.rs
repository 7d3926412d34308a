//! Last-value-or-default transform.

use crate::context::Context;
use crate::observer::{chained, Observer};
use crate::pipeline::{Sink, Transform, TransformStage};

/// Remembers the latest upstream value in scoped state; on upstream
/// completion emits it (or the default if nothing arrived), then completes.
#[derive(Clone, Debug)]
pub struct LastOrDefault<V> {
    default: V,
}

/// The `last_or_default(def)` transform.
#[must_use]
pub fn last_or_default<V>(default: V) -> TransformStage<LastOrDefault<V>>
where
    V: Clone + Send + Sync + 'static,
{
    TransformStage::new(LastOrDefault { default })
}

impl<V> Transform for LastOrDefault<V>
where
    V: Clone + Send + Sync + 'static,
{
    type In = V;
    type Out = V;

    fn lift<K>(&self, sink: K) -> impl Sink<Item = V>
    where
        K: Sink<Item = V>,
    {
        LastSink {
            default: self.default.clone(),
            sink,
        }
    }
}

#[derive(Clone)]
struct LastSink<V, K> {
    default: V,
    sink: K,
}

impl<V, K> Sink for LastSink<V, K>
where
    V: Clone + Send + Sync + 'static,
    K: Sink<Item = V>,
{
    type Item = V;

    fn attach(&self, ctx: &Context) -> impl Observer<Item = V> {
        let downstream = self.sink.attach(ctx).erased();
        let last = ctx.lifetime().scoped(self.default.clone());
        let stored = last.clone();
        chained(downstream, ctx.lifetime().clone())
            .on_next(move |_d, v: V| {
                stored.set(v);
            })
            .on_complete(move |d| {
                if let Some(v) = last.get() {
                    d.next(v);
                }
                d.complete();
            })
    }
}
