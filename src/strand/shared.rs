//! The shared-strand maker: many strands, one serialization point.
//!
//! [`make_shared`] wraps any [`MakeStrand`] policy. Its sole state is one
//! underlying strand created up front; every strand it mints forwards
//! `defer_at` to that underlying strand while binding its own lifetime to
//! the caller's, so stopping a minted strand only unregisters its tasks.
//! The underlying strand stops when the policy's last handle drops.

use std::sync::Arc;
use std::time::Instant;

use super::{AnyStrand, MakeStrand, Strand, TaskObserver};
use crate::observer::Observer;
use crate::subscription::Subscription;

/// Keeps the underlying strand alive for as long as any minted strand or
/// the maker itself is held; stops it when the last handle drops.
struct SharedCore {
    strand: AnyStrand,
}

impl Drop for SharedCore {
    fn drop(&mut self) {
        tracing::trace!(target: "riffle::strand", "shared strand retiring");
        self.strand.lifetime().stop();
    }
}

/// A strand that forwards scheduling to a shared underlying strand but
/// carries its own lifetime.
#[derive(Clone)]
struct SharedProxy {
    lifetime: Subscription,
    core: Arc<SharedCore>,
}

impl Strand for SharedProxy {
    fn lifetime(&self) -> &Subscription {
        &self.lifetime
    }

    fn now(&self) -> Instant {
        self.core.strand.now()
    }

    fn defer_at_task(&self, at: Instant, task: TaskObserver) {
        // Tasks nest under the proxy lifetime so stopping the proxy stops
        // them without touching the underlying strand.
        self.lifetime.insert(task.lifetime());
        self.core.strand.defer_at_task(at, task);
    }
}

/// Wraps `make` so every minted strand shares one underlying strand.
///
/// Combinators that need a single serialization point (`merge`,
/// `observe_on` across inner streams) mint all their strands through the
/// returned policy.
#[must_use]
pub fn make_shared(make: &MakeStrand) -> MakeStrand {
    let core = Arc::new(SharedCore {
        strand: make(Subscription::new()),
    });
    Arc::new(move |lifetime: Subscription| {
        let underlying = core.strand.lifetime();
        underlying.insert(&lifetime);
        AnyStrand::new(SharedProxy {
            lifetime,
            core: core.clone(),
        })
    })
}
