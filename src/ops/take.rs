//! Take-N source transform.

use std::marker::PhantomData;

use crate::context::Context;
use crate::observer::{chained, Observer};
use crate::pipeline::{AdaptStage, Runnable, Sink, Source, SourceTransform};

/// Forwards the first `n` values, then completes (cancelling upstream).
///
/// `take(0)` completes as soon as the pipeline is subscribed, before any
/// upstream value is requested.
pub struct Take<V> {
    n: usize,
    _marker: PhantomData<fn(V)>,
}

/// The `take(n)` source transform.
#[must_use]
pub fn take<V: Send + 'static>(n: usize) -> AdaptStage<Take<V>> {
    AdaptStage::new(Take {
        n,
        _marker: PhantomData,
    })
}

impl<V> Clone for Take<V> {
    fn clone(&self) -> Self {
        Self {
            n: self.n,
            _marker: PhantomData,
        }
    }
}

impl<V: Send + 'static> SourceTransform for Take<V> {
    type In = V;
    type Out = V;

    fn adapt<S>(&self, source: S) -> impl Source<Item = V>
    where
        S: Source<Item = V>,
    {
        TakeSource { n: self.n, source }
    }
}

#[derive(Clone)]
struct TakeSource<S> {
    n: usize,
    source: S,
}

impl<S: Source> Source for TakeSource<S> {
    type Item = S::Item;

    fn bind<K>(&self, sink: K) -> impl Runnable
    where
        K: Sink<Item = S::Item>,
    {
        self.source.bind(TakeSink { n: self.n, sink })
    }
}

#[derive(Clone)]
struct TakeSink<K> {
    n: usize,
    sink: K,
}

impl<K: Sink> Sink for TakeSink<K> {
    type Item = K::Item;

    fn attach(&self, ctx: &Context) -> impl Observer<Item = K::Item> {
        let downstream = self.sink.attach(ctx).erased();
        let remaining = ctx.lifetime().scoped(self.n);
        let observer = chained(downstream, ctx.lifetime().clone()).on_next(
            move |d, v: K::Item| {
                let step = remaining.with(|left| {
                    if *left == 0 {
                        return Step::Spill;
                    }
                    *left -= 1;
                    if *left == 0 {
                        Step::Last
                    } else {
                        Step::More
                    }
                });
                match step {
                    Some(Step::More) => d.next(v),
                    Some(Step::Last) => {
                        d.next(v);
                        d.complete();
                    }
                    Some(Step::Spill) | None => d.complete(),
                }
            },
        );
        if self.n == 0 {
            observer.complete();
        }
        observer
    }
}

enum Step {
    More,
    Last,
    Spill,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::{collect_into, filter, ints};
    use crate::test_utils::init_test_logging;
    use std::sync::{Arc, Mutex};

    #[test]
    fn forwards_exactly_n_then_completes() {
        init_test_logging();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sub = ints(1, 100) | take(4) | collect_into(seen.clone()) | Context::root();
        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3, 4]);
        assert!(sub.is_stopped());
    }

    #[test]
    fn short_source_completes_naturally() {
        init_test_logging();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let _ = ints(1, 2) | take(10) | collect_into(seen.clone()) | Context::root();
        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn take_zero_completes_on_subscription() {
        init_test_logging();
        let seen: Arc<Mutex<Vec<i64>>> = Arc::new(Mutex::new(Vec::new()));
        let sub = ints(1, 5) | take(0) | collect_into(seen.clone()) | Context::root();
        assert!(seen.lock().unwrap().is_empty());
        assert!(sub.is_stopped());
    }

    #[test]
    fn take_cancels_an_unbounded_source() {
        init_test_logging();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let _ = ints(0, i64::MAX) | take(3) | collect_into(seen.clone()) | Context::root();
        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn composes_after_filter() {
        init_test_logging();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let _ = ints(1, 10) | filter(|v: &i64| v % 2 == 0) | take(2)
            | collect_into(seen.clone())
            | Context::root();
        assert_eq!(*seen.lock().unwrap(), vec![2, 4]);
    }
}
