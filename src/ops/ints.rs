//! Finite integer sequence source.

use crate::context::Context;
use crate::observer::Observer;
use crate::pipeline::{Runnable, Sink, Source, SourceStage};
use crate::subscription::Subscription;

/// Emits the integers `first..=last` in order, then completes.
///
/// Checks the activation lifetime between emissions, so a concurrent stop
/// cuts the sequence short. An empty range completes without emitting.
#[derive(Clone, Debug)]
pub struct Ints {
    first: i64,
    last: i64,
}

/// The `first..=last` integer source.
#[must_use]
pub fn ints(first: i64, last: i64) -> SourceStage<Ints> {
    SourceStage::new(Ints { first, last })
}

impl Source for Ints {
    type Item = i64;

    fn bind<K>(&self, sink: K) -> impl Runnable
    where
        K: Sink<Item = i64>,
    {
        IntsRun {
            first: self.first,
            last: self.last,
            sink,
        }
    }
}

#[derive(Clone)]
struct IntsRun<K> {
    first: i64,
    last: i64,
    sink: K,
}

impl<K> Runnable for IntsRun<K>
where
    K: Sink<Item = i64>,
{
    fn start(&self, ctx: &Context) -> Subscription {
        let out = self.sink.attach(ctx);
        tracing::trace!(target: "riffle::ops", first = self.first, last = self.last, "ints started");
        for i in self.first..=self.last {
            if ctx.lifetime().is_stopped() {
                break;
            }
            out.next(i);
        }
        out.complete();
        ctx.lifetime().clone()
    }
}
