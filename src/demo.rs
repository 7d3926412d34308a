//! Demonstration pipelines.
//!
//! [`run`] exercises the library end to end on standard output: the nested
//! merge pipeline, a per-subscription timing loop and a merge timing loop,
//! each reporting its throughput.

use std::io::{stdout, Write};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::context::Context;
use crate::ops::{consume, filter, ints, last_or_default, map, merge_map, printto_shared, take};
use crate::pipeline::join;
use crate::strand::make_immediate;

/// Runs the demonstration pipelines over the `[first, last]` bounds,
/// writing to standard output.
pub fn run(first: i32, last: i32) {
    let out = Arc::new(Mutex::new(stdout()));
    run_with(first, last, &out);
}

/// Like [`run`], against a caller-supplied writer (tests use a buffer).
pub fn run_with<W: Write + Send + 'static>(first: i32, last: i32, out: &Arc<Mutex<W>>) {
    let first = i64::from(first);
    let last = i64::from(last);

    emit(out, "merged last-of-even");
    {
        let lastofeven = filter(|v: &i64| v % 2 == 0) | take(50_000) | last_or_default(42);
        let lifetime = ints(0, 2)
            | merge_map(make_immediate(), move |_: i64| {
                ints(first, last * 100) | lastofeven.clone()
            })
            | printto_shared(out.clone())
            | Context::root();
        let marker = out.clone();
        lifetime.on_stop(move || {
            let mut w = marker.lock().expect("demo writer poisoned");
            let _ = writeln!(w, "caller stopped");
        });
        lifetime | join();
    }

    emit(out, "subscription churn");
    {
        let t0 = Instant::now();
        for _ in first..last {
            let _ = ints(0, 0)
                | map(|i: i64| i.to_string())
                | map(|s: String| s.len() as i64)
                | consume()
                | Context::root();
        }
        report(out, t0, last - first);
    }

    emit(out, "merge churn");
    {
        let t0 = Instant::now();
        let lifetime = ints(first, last)
            | merge_map(make_immediate(), |_: i64| {
                ints(0, 0) | map(|i: i64| i.to_string()) | map(|s: String| s.len() as i64)
            })
            | consume()
            | Context::root();
        lifetime | join();
        report(out, t0, last - first);
    }
}

fn emit<W: Write + Send + 'static>(out: &Arc<Mutex<W>>, line: &str) {
    let mut w = out.lock().expect("demo writer poisoned");
    let _ = writeln!(w, "{line}");
}

fn report<W: Write + Send + 'static>(out: &Arc<Mutex<W>>, t0: Instant, count: i64) {
    let elapsed = t0.elapsed();
    let ms = elapsed.as_secs_f64() * 1000.0;
    let per = if count > 0 { ms / count as f64 } else { ms };
    let rate = if ms > 0.0 {
        count as f64 / (ms / 1000.0)
    } else {
        0.0
    };
    let mut w = out.lock().expect("demo writer poisoned");
    let _ = writeln!(w, "{per:.6} ms per subscription");
    let _ = writeln!(w, "{rate:.0} subscriptions per second");
}
