//! Collecting and discarding sinks.

use std::marker::PhantomData;
use std::sync::{Arc, Mutex};

use crate::context::Context;
use crate::error::Error;
use crate::observer::{emitter, Observer};
use crate::pipeline::{Sink, SinkStage};

/// Appends every received value to a shared vector.
///
/// Errors terminate the collection silently; completion leaves the buffer
/// as the final result. Mostly useful in tests and examples.
pub struct CollectInto<V> {
    buf: Arc<Mutex<Vec<V>>>,
}

impl<V> Clone for CollectInto<V> {
    fn clone(&self) -> Self {
        Self {
            buf: self.buf.clone(),
        }
    }
}

/// The `collect_into(buf)` sink.
#[must_use]
pub fn collect_into<V: Send + 'static>(buf: Arc<Mutex<Vec<V>>>) -> SinkStage<CollectInto<V>> {
    SinkStage::new(CollectInto { buf })
}

impl<V: Send + 'static> Sink for CollectInto<V> {
    type Item = V;

    fn attach(&self, ctx: &Context) -> impl Observer<Item = V> {
        let buf = self.buf.clone();
        emitter::<V>(ctx.lifetime().clone())
            .on_next(move |v| buf.lock().expect("collect buffer poisoned").push(v))
            .on_error(|_| {})
    }
}

/// Collects values and errors into separate shared buffers (tests).
pub(crate) fn collect_with_errors<V: Send + 'static>(
    values: Arc<Mutex<Vec<V>>>,
    errors: Arc<Mutex<Vec<Error>>>,
) -> SinkStage<CollectErrors<V>> {
    SinkStage::new(CollectErrors { values, errors })
}

pub(crate) struct CollectErrors<V> {
    values: Arc<Mutex<Vec<V>>>,
    errors: Arc<Mutex<Vec<Error>>>,
}

impl<V> Clone for CollectErrors<V> {
    fn clone(&self) -> Self {
        Self {
            values: self.values.clone(),
            errors: self.errors.clone(),
        }
    }
}

impl<V: Send + 'static> Sink for CollectErrors<V> {
    type Item = V;

    fn attach(&self, ctx: &Context) -> impl Observer<Item = V> {
        let values = self.values.clone();
        let errors = self.errors.clone();
        emitter::<V>(ctx.lifetime().clone())
            .on_next(move |v| values.lock().expect("collect buffer poisoned").push(v))
            .on_error(move |e| errors.lock().expect("error buffer poisoned").push(e))
    }
}

/// Ignores values; an unhandled error aborts the process.
///
/// The default sink for benchmark pipelines that only care about the work
/// upstream.
pub struct Consume<V> {
    _marker: PhantomData<fn(V)>,
}

impl<V> Clone for Consume<V> {
    fn clone(&self) -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

/// The `consume()` sink: discard values, abort on unhandled errors.
#[must_use]
pub fn consume<V: Send + 'static>() -> SinkStage<Consume<V>> {
    SinkStage::new(Consume {
        _marker: PhantomData,
    })
}

impl<V: Send + 'static> Sink for Consume<V> {
    type Item = V;

    fn attach(&self, ctx: &Context) -> impl Observer<Item = V> {
        emitter::<V>(ctx.lifetime().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::ints;
    use crate::test_utils::init_test_logging;

    #[test]
    fn collects_in_order() {
        init_test_logging();
        let buf = Arc::new(Mutex::new(Vec::new()));
        let _ = ints(3, 6) | collect_into(buf.clone()) | Context::root();
        assert_eq!(*buf.lock().unwrap(), vec![3, 4, 5, 6]);
    }

    #[test]
    fn consume_discards_and_completes() {
        init_test_logging();
        let sub = ints(1, 100) | consume() | Context::root();
        assert!(sub.is_stopped());
    }
}
