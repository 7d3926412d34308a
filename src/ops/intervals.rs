//! Periodic counter source.

use std::time::{Duration, Instant};

use crate::context::Context;
use crate::pipeline::{Runnable, Sink, Source, SourceStage};
use crate::strand::{defer_periodic, MakeStrand};
use crate::subscription::Subscription;

/// Emits `0, 1, 2, …` at `initial`, `initial + period`, `initial +
/// 2·period`, … on a fresh strand minted from the given policy, nested in
/// the subscriber's context.
///
/// Runs until the activation is stopped or a downstream stage terminates
/// the stream.
#[derive(Clone)]
pub struct Intervals {
    make: MakeStrand,
    initial: Instant,
    period: Duration,
}

/// The `intervals(make, initial, period)` source.
#[must_use]
pub fn intervals(make: MakeStrand, initial: Instant, period: Duration) -> SourceStage<Intervals> {
    SourceStage::new(Intervals {
        make,
        initial,
        period,
    })
}

impl Source for Intervals {
    type Item = u64;

    fn bind<K>(&self, sink: K) -> impl Runnable
    where
        K: Sink<Item = u64>,
    {
        IntervalsRun {
            make: self.make.clone(),
            initial: self.initial,
            period: self.period,
            sink,
        }
    }
}

#[derive(Clone)]
struct IntervalsRun<K> {
    make: MakeStrand,
    initial: Instant,
    period: Duration,
    sink: K,
}

impl<K> Runnable for IntervalsRun<K>
where
    K: Sink<Item = u64>,
{
    fn start(&self, ctx: &Context) -> Subscription {
        let child = Subscription::new();
        ctx.lifetime().insert(&child);
        let tickctx = ctx.with_new_maker(child, self.make.clone());
        let out = self.sink.attach(&tickctx);
        tracing::trace!(target: "riffle::ops", period_ms = self.period.as_millis() as u64, "intervals started");
        defer_periodic(&tickctx, self.initial, self.period, out);
        ctx.lifetime().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock;
    use crate::ops::{collect_into, map, take};
    use crate::strand::make_new_thread;
    use crate::test_utils::init_test_logging;
    use std::sync::{Arc, Mutex};

    #[test]
    fn emits_squared_counters_on_schedule() {
        init_test_logging();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let period = Duration::from_millis(25);
        let t0 = clock::now() + Duration::from_millis(5);
        let started = clock::now();
        let sub = intervals(make_new_thread(), t0, period)
            | take(3)
            | map(|n: u64| n * n)
            | collect_into(seen.clone())
            | Context::root();
        // Three firings land at t0, t0+p, t0+2p.
        let deadline = clock::now() + Duration::from_millis(800);
        while seen.lock().unwrap().len() < 3 && clock::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 4]);
        let elapsed = clock::now() - started;
        assert!(elapsed >= Duration::from_millis(50), "fired too early: {elapsed:?}");
        sub.stop();
        sub.join();
    }

    #[test]
    fn stopping_the_activation_ends_the_ticks() {
        init_test_logging();
        let seen: Arc<Mutex<Vec<u64>>> = Arc::new(Mutex::new(Vec::new()));
        let sub = intervals(make_new_thread(), clock::now(), Duration::from_millis(10))
            | collect_into(seen.clone())
            | Context::root();
        std::thread::sleep(Duration::from_millis(35));
        sub.stop();
        sub.join();
        let count_at_stop = seen.lock().unwrap().len();
        assert!(count_at_stop >= 1);
        std::thread::sleep(Duration::from_millis(40));
        assert_eq!(seen.lock().unwrap().len(), count_at_stop);
    }
}
