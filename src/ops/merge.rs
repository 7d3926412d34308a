//! Flat-merge of a dynamic set of inner sources.

use std::collections::HashSet;
use std::marker::PhantomData;
use std::time::Duration;

use super::observe_on::defer_call;
use crate::context::Context;
use crate::observer::{chained, AnyObserver, Observer, Tail};
use crate::pipeline::{
    AdaptStage, Piped, Runnable, Sink, Source, SourceTransform, TransformStage,
};
use crate::strand::{make_shared, MakeStrand};
use crate::subscription::{State, Subscription};

use super::map::{map, Map};

/// Subscribes to each inner source as the outer emits it and forwards all
/// inner values to the single downstream sink.
///
/// All strands (outer hand-off and one per inner source) come from one
/// shared policy built over `make`, so downstream delivery is serialized
/// on a single underlying strand. The downstream completes when the outer
/// and every inner source have finished; the first error from any of them
/// terminates the whole pipeline.
pub struct Merge<S> {
    make: MakeStrand,
    _marker: PhantomData<fn(S)>,
}

/// The `merge(make)` source transform over a stream of sources.
#[must_use]
pub fn merge<S: Source>(make: MakeStrand) -> AdaptStage<Merge<S>> {
    AdaptStage::new(Merge {
        make,
        _marker: PhantomData,
    })
}

/// The `merge_map(make, f)` fusion: map each value to a source, then
/// flat-merge the results.
#[must_use]
pub fn merge_map<A, S, F>(
    make: MakeStrand,
    f: F,
) -> AdaptStage<impl SourceTransform<In = A, Out = S::Item>>
where
    A: Send + 'static,
    S: Source,
    F: Fn(A) -> S + Clone + Send + Sync + 'static,
{
    let mapped: TransformStage<Map<A, S, F>> = map(f);
    mapped | merge::<S>(make)
}

impl<S> Clone for Merge<S> {
    fn clone(&self) -> Self {
        Self {
            make: self.make.clone(),
            _marker: PhantomData,
        }
    }
}

impl<S: Source> SourceTransform for Merge<S> {
    type In = S;
    type Out = S::Item;

    fn adapt<O>(&self, source: O) -> impl Source<Item = S::Item>
    where
        O: Source<Item = S>,
    {
        MergeSource {
            make: self.make.clone(),
            source,
            _marker: PhantomData,
        }
    }
}

struct MergeSource<S, O> {
    make: MakeStrand,
    source: O,
    _marker: PhantomData<fn(S)>,
}

impl<S, O: Clone> Clone for MergeSource<S, O> {
    fn clone(&self) -> Self {
        Self {
            make: self.make.clone(),
            source: self.source.clone(),
            _marker: PhantomData,
        }
    }
}

impl<S, O> Source for MergeSource<S, O>
where
    S: Source,
    O: Source<Item = S>,
{
    type Item = S::Item;

    fn bind<K>(&self, sink: K) -> impl Runnable
    where
        K: Sink<Item = S::Item>,
    {
        MergeRun {
            make: self.make.clone(),
            source: self.source.clone(),
            sink,
            _marker: PhantomData,
        }
    }
}

struct MergeRun<S, O, K> {
    make: MakeStrand,
    source: O,
    sink: K,
    _marker: PhantomData<fn(S)>,
}

impl<S, O: Clone, K: Clone> Clone for MergeRun<S, O, K> {
    fn clone(&self) -> Self {
        Self {
            make: self.make.clone(),
            source: self.source.clone(),
            sink: self.sink.clone(),
            _marker: PhantomData,
        }
    }
}

impl<S, O, K> Runnable for MergeRun<S, O, K>
where
    S: Source,
    O: Source<Item = S>,
    K: Sink<Item = S::Item>,
{
    fn start(&self, ctx: &Context) -> Subscription {
        // One shared policy per activation: the outer hand-off and every
        // inner subscription serialize on the same underlying strand.
        let shared = make_shared(&self.make);
        let outer = Piped {
            source: self.source.clone(),
            transform: super::observe_on::raw::<S>(shared.clone()),
        };
        outer
            .bind(MergeOuterSink {
                make: shared,
                sink: self.sink.clone(),
                _marker: PhantomData,
            })
            .start(ctx)
    }
}

struct MergeOuterSink<S, K> {
    make: MakeStrand,
    sink: K,
    _marker: PhantomData<fn(S)>,
}

impl<S, K: Clone> Clone for MergeOuterSink<S, K> {
    fn clone(&self) -> Self {
        Self {
            make: self.make.clone(),
            sink: self.sink.clone(),
            _marker: PhantomData,
        }
    }
}

/// Removes `entry` from the pending set; completes `downstream` when the
/// set drains empty.
fn retire<V: Send + 'static>(
    pending: &State<HashSet<Subscription>>,
    entry: &Subscription,
    downstream: &AnyObserver<V>,
) {
    let empty = pending
        .with(|set| {
            set.remove(entry);
            set.is_empty()
        })
        .unwrap_or(false);
    if empty {
        tracing::trace!(target: "riffle::ops", "merge drained, completing downstream");
        downstream.complete();
    }
}

impl<S, K> Sink for MergeOuterSink<S, K>
where
    S: Source,
    K: Sink<Item = S::Item>,
{
    type Item = S;

    fn attach(&self, ctx: &Context) -> impl Observer<Item = S> {
        // Downstream lives on its own lifetime so inner streams can keep
        // feeding it after the outer source is done.
        let dest_lifetime = Subscription::new();
        let pending = dest_lifetime.scoped(HashSet::<Subscription>::new());
        pending.with(|set| {
            set.insert(ctx.lifetime().clone());
        });

        // Downstream cancellation tears down the outer and every inner.
        // Stop without join: this stopper may run on the shared strand,
        // where the stopped lifetimes' drains are queued behind it.
        {
            let pending = pending.clone();
            dest_lifetime.on_stop(move || {
                tracing::trace!(target: "riffle::ops", "merge output stopping inputs");
                loop {
                    let next = pending.with(|set| {
                        let found = set.iter().next().cloned();
                        if let Some(sub) = &found {
                            set.remove(sub);
                        }
                        found
                    });
                    match next.flatten() {
                        Some(sub) => sub.stop(),
                        None => break,
                    }
                }
            });
        }

        let destctx = ctx.with_new_maker(dest_lifetime.clone(), self.make.clone());
        let downstream: AnyObserver<S::Item> = self.sink.attach(&destctx).erased();

        // Outer completion (or cancellation) retires the outer's entry on
        // the shared strand.
        {
            let pending = pending.clone();
            let outer_entry = ctx.lifetime().clone();
            let retire_ctx = destctx.clone();
            let r = downstream.clone();
            ctx.lifetime().on_stop(move || {
                let pending = pending.clone();
                let outer_entry = outer_entry.clone();
                defer_call(&retire_ctx, Duration::ZERO, &r, move |d| {
                    retire(&pending, &outer_entry, d);
                });
            });
        }

        let make = self.make.clone();
        chained(downstream, ctx.lifetime().clone())
            .on_next(move |d: &AnyObserver<S::Item>, inner: S| {
                tracing::trace!(target: "riffle::ops", "merge inner subscribing");
                let nested = Subscription::new();
                pending.with(|set| {
                    set.insert(nested.clone());
                });
                {
                    let pending = pending.clone();
                    let entry = nested.clone();
                    let retire_ctx = destctx.clone();
                    let r = d.clone();
                    nested.on_stop(move || {
                        let pending = pending.clone();
                        let entry = entry.clone();
                        defer_call(&retire_ctx, Duration::ZERO, &r, move |d| {
                            retire(&pending, &entry, d);
                        });
                    });
                }
                let innerctx = destctx.copy_to(nested);
                let piped = Piped {
                    source: inner,
                    transform: super::observe_on::raw::<S::Item>(make.clone()),
                };
                piped
                    .bind(MergeInnerSink { r: d.clone() })
                    .start(&innerctx);
            })
            .complete_tail(Tail::Skip)
    }
}

/// The per-inner-source sink: forward values and errors, hold completion
/// until every pending entry retires.
struct MergeInnerSink<V> {
    r: AnyObserver<V>,
}

impl<V> Clone for MergeInnerSink<V> {
    fn clone(&self) -> Self {
        Self { r: self.r.clone() }
    }
}

impl<V: Send + 'static> Sink for MergeInnerSink<V> {
    type Item = V;

    fn attach(&self, ctx: &Context) -> impl Observer<Item = V> {
        chained(self.r.clone(), ctx.lifetime().clone()).complete_tail(Tail::Skip)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::{collect_into, ints, last_or_default, map};
    use crate::strand::{make_immediate, make_new_thread};
    use crate::test_utils::init_test_logging;
    use std::sync::{Arc, Mutex};

    #[test]
    fn immediate_merge_is_depth_first() {
        init_test_logging();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sub = ints(1, 3)
            | merge_map(make_immediate(), |i: i64| ints(1, i))
            | collect_into(seen.clone())
            | Context::root();
        assert_eq!(*seen.lock().unwrap(), vec![1, 1, 2, 1, 2, 3]);
        sub.join();
    }

    #[test]
    fn merge_completes_downstream_exactly_once() {
        init_test_logging();
        let buf = Arc::new(Mutex::new(Vec::new()));
        let out = buf.clone();
        ints(1, 3)
            | merge_map(make_immediate(), |i: i64| ints(1, i))
            | crate::ops::printto_shared(out)
            | Context::root()
            | crate::pipeline::join();
        let bytes = buf.lock().unwrap().clone();
        let text = String::from_utf8(bytes).unwrap();
        let summaries = text
            .lines()
            .filter(|l| l.ends_with("values received - done!"))
            .count();
        assert_eq!(summaries, 1);
        assert!(text.contains("6 values received - done!"));
    }

    #[test]
    fn nested_aggregation_per_inner_source() {
        init_test_logging();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sub = ints(0, 2)
            | merge_map(make_immediate(), |_: i64| {
                ints(1, 10)
                    | crate::ops::filter(|v: &i64| v % 2 == 0)
                    | last_or_default(42)
            })
            | collect_into(seen.clone())
            | Context::root();
        assert_eq!(*seen.lock().unwrap(), vec![10, 10, 10]);
        sub.join();
    }

    #[test]
    fn merge_preserves_multiset_on_one_runloop() {
        init_test_logging();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sub = ints(1, 3)
            | merge_map(make_new_thread(), |i: i64| ints(i * 10, i * 10 + 1))
            | collect_into(seen.clone())
            | Context::root();
        let deadline = std::time::Instant::now() + Duration::from_millis(1000);
        while seen.lock().unwrap().len() < 6 && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        let mut got = seen.lock().unwrap().clone();
        got.sort_unstable();
        assert_eq!(got, vec![10, 11, 20, 21, 30, 31]);
        sub.stop();
        sub.join();
    }

    #[test]
    fn inner_error_terminates_the_whole_merge() {
        init_test_logging();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let errors = Arc::new(Mutex::new(Vec::new()));
        let sub = ints(1, 3)
            | merge_map(make_immediate(), |i: i64| {
                ints(1, 2) | map(move |v: i64| {
                    assert!(i != 2, "inner stream failed");
                    v
                })
            })
            | crate::ops::collect::collect_with_errors(seen.clone(), errors.clone())
            | Context::root();
        assert_eq!(errors.lock().unwrap().len(), 1);
        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
        sub.join();
    }
}
