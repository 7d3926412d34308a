//! Line-printing sink.

use std::fmt::Display;
use std::io::Write;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex};

use crate::context::Context;
use crate::observer::{emitter, Observer};
use crate::pipeline::{Sink, SinkStage};
use crate::strand::{defer, Resume};
use crate::subscription::Subscription;

/// Writes one line per value, counting values in scoped state; on
/// completion writes a `"N values received - done!"` summary line.
///
/// Value writes are deferred onto the sink's context strand so printing
/// inherits the context's serialization. A stream error writes the error
/// message and terminates the sink.
pub struct PrintTo<V, W> {
    out: Arc<Mutex<W>>,
    _marker: PhantomData<fn(V)>,
}

impl<V, W> Clone for PrintTo<V, W> {
    fn clone(&self) -> Self {
        Self {
            out: self.out.clone(),
            _marker: PhantomData,
        }
    }
}

/// The `printto(out)` sink, taking ownership of the writer.
#[must_use]
pub fn printto<V, W>(out: W) -> SinkStage<PrintTo<V, W>>
where
    V: Display + Send + 'static,
    W: Write + Send + 'static,
{
    printto_shared(Arc::new(Mutex::new(out)))
}

/// The `printto` sink over a writer shared with the caller.
#[must_use]
pub fn printto_shared<V, W>(out: Arc<Mutex<W>>) -> SinkStage<PrintTo<V, W>>
where
    V: Display + Send + 'static,
    W: Write + Send + 'static,
{
    SinkStage::new(PrintTo {
        out,
        _marker: PhantomData,
    })
}

impl<V, W> Sink for PrintTo<V, W>
where
    V: Display + Send + 'static,
    W: Write + Send + 'static,
{
    type Item = V;

    fn attach(&self, ctx: &Context) -> impl Observer<Item = V> {
        let count = ctx.lifetime().scoped(0_usize);
        let total = count.clone();
        let out = self.out.clone();
        let out_err = self.out.clone();
        let out_done = self.out.clone();
        let strand = ctx.clone();
        emitter::<V>(ctx.lifetime().clone())
            .on_next(move |v| {
                count.with(|c| *c += 1);
                let out = out.clone();
                let slot = Arc::new(Mutex::new(Some(v)));
                let task = emitter::<Resume>(Subscription::new()).on_next(move |_resume| {
                    if let Some(v) = slot.lock().expect("print slot poisoned").take() {
                        let mut w = out.lock().expect("print writer poisoned");
                        let _ = writeln!(w, "{v}");
                    }
                });
                defer(&strand, task);
            })
            .on_error(move |e| {
                let mut w = out_err.lock().expect("print writer poisoned");
                let _ = writeln!(w, "{e}");
            })
            .on_complete(move || {
                let n = total.get().unwrap_or(0);
                let mut w = out_done.lock().expect("print writer poisoned");
                let _ = writeln!(w, "{n} values received - done!");
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::{filter, ints, last_or_default, map, take};
    use crate::pipeline::join;
    use crate::test_utils::init_test_logging;

    fn lines(buf: &Arc<Mutex<Vec<u8>>>) -> Vec<String> {
        let bytes = buf.lock().unwrap().clone();
        String::from_utf8(bytes)
            .unwrap()
            .lines()
            .map(str::to_owned)
            .collect()
    }

    #[test]
    fn prints_values_and_summary() {
        init_test_logging();
        let buf = Arc::new(Mutex::new(Vec::new()));
        ints(1, 5) | printto_shared(buf.clone()) | Context::root() | join();
        assert_eq!(
            lines(&buf),
            vec!["1", "2", "3", "4", "5", "5 values received - done!"]
        );
    }

    #[test]
    fn filtered_take_chain_prints_single_value() {
        init_test_logging();
        let buf = Arc::new(Mutex::new(Vec::new()));
        ints(1, 10)
            | filter(|v: &i64| v % 2 == 0)
            | take(2)
            | last_or_default(42)
            | printto_shared(buf.clone())
            | Context::root()
            | join();
        assert_eq!(lines(&buf), vec!["4", "1 values received - done!"]);
    }

    #[test]
    fn empty_source_prints_default() {
        init_test_logging();
        let buf = Arc::new(Mutex::new(Vec::new()));
        ints(1, 0) | last_or_default(42) | printto_shared(buf.clone()) | Context::root() | join();
        assert_eq!(lines(&buf), vec!["42", "1 values received - done!"]);
    }

    #[test]
    fn concurrent_stop_never_duplicates_the_summary() {
        init_test_logging();
        let buf = Arc::new(Mutex::new(Vec::new()));
        let ctx = Context::root();
        let lifetime = ctx.lifetime().clone();
        let stopper = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(2));
            lifetime.stop();
        });
        ints(1, i64::MAX) | take(1_000_000) | printto_shared(buf.clone()) | ctx | join();
        stopper.join().unwrap();
        let text = String::from_utf8(buf.lock().unwrap().clone()).unwrap();
        let summaries = text
            .lines()
            .filter(|l| l.ends_with("values received - done!"))
            .count();
        assert!(summaries <= 1);
        let values = text
            .lines()
            .filter(|l| l.chars().all(|c| c.is_ascii_digit()))
            .count();
        assert!(values <= 1_000_000);
    }

    #[test]
    fn stream_error_prints_message() {
        init_test_logging();
        let buf = Arc::new(Mutex::new(Vec::new()));
        ints(1, 5)
            | map(|v: i64| {
                assert!(v != 3, "third value is cursed");
                v
            })
            | printto_shared(buf.clone())
            | Context::root()
            | join();
        assert_eq!(lines(&buf), vec!["1", "2", "third value is cursed"]);
    }
}
