//! Cancellation scopes and subscription-owned state.
//!
//! A [`Subscription`] is a shared handle to a node in the cancellation
//! tree. The node owns nested child subscriptions, an ordered list of stop
//! callbacks, and an ordered list of destructor callbacks that run when the
//! last handle drops. Stopping a node stops its children (waiting for each
//! to quiesce), then runs the stop callbacks newest-first, then wakes
//! anything blocked in [`Subscription::join`].
//!
//! # Guarantees
//!
//! - `stop` is idempotent; the second call is a no-op
//! - a child inserted after `stop` is stopped immediately, and a stop
//!   callback inserted after `stop` runs immediately
//! - stop callbacks are invoked with no node lock held, so re-entrant
//!   `stop` from inside a callback cannot deadlock
//! - state created with [`Subscription::make_state`] is dropped exactly
//!   once, when the node is destroyed
//!
//! Inserting a subscription into itself is a programming error and aborts
//! the process.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, Weak};

use crate::error::{Error, Result};

type Callback = Box<dyn FnOnce() + Send>;

/// Marshals stop work onto another execution context.
///
/// Installed with [`Subscription::bind_defer`]; the default is to run the
/// work synchronously on the stopping thread.
pub type DeferFn = Arc<dyn Fn(Callback) + Send + Sync>;

struct Inner {
    children: Vec<Subscription>,
    stoppers: Vec<Callback>,
    destructors: Vec<Callback>,
    defer: Option<DeferFn>,
    /// Set once the stop drain has fully completed.
    done: bool,
}

struct Node {
    stopped: AtomicBool,
    inner: Mutex<Inner>,
    drained: Condvar,
}

impl Drop for Node {
    fn drop(&mut self) {
        // Last handle is gone, nothing else can observe the node: drain the
        // destructors without touching the lock.
        let inner = self.inner.get_mut().expect("subscription lock poisoned");
        let destructors = std::mem::take(&mut inner.destructors);
        for d in destructors.into_iter().rev() {
            d();
        }
    }
}

/// A shared handle to a cancellation scope.
///
/// Clones refer to the same node; two handles are equal iff they do.
#[derive(Clone)]
pub struct Subscription {
    node: Arc<Node>,
}

impl Default for Subscription {
    fn default() -> Self {
        Self::new()
    }
}

impl Subscription {
    /// Creates a new root subscription.
    #[must_use]
    pub fn new() -> Self {
        tracing::trace!(target: "riffle::subscription", "new lifetime");
        Self {
            node: Arc::new(Node {
                stopped: AtomicBool::new(false),
                inner: Mutex::new(Inner {
                    children: Vec::new(),
                    stoppers: Vec::new(),
                    destructors: Vec::new(),
                    defer: None,
                    done: false,
                }),
                drained: Condvar::new(),
            }),
        }
    }

    /// Lock-free snapshot of the stopped flag.
    ///
    /// Once true, state handles scoped to this subscription must be treated
    /// as dead.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.node.stopped.load(Ordering::Acquire)
    }

    /// Adopts `child` as a nested lifetime.
    ///
    /// If this subscription is already stopped the child is stopped
    /// immediately. A back-edge is registered so the child detaches itself
    /// from this node when it stops on its own.
    ///
    /// # Aborts
    ///
    /// Inserting a subscription into itself aborts the process.
    pub fn insert(&self, child: &Subscription) {
        if Arc::ptr_eq(&self.node, &child.node) {
            tracing::error!(target: "riffle::subscription", "subscription inserted into itself");
            std::process::abort();
        }
        {
            let mut inner = self.lock();
            if !self.is_stopped() {
                inner.children.push(child.clone());
                drop(inner);
                // Unnest when the child stops first.
                let parent = Arc::downgrade(&self.node);
                let child_ref = Arc::downgrade(&child.node);
                child.on_stop(move || {
                    if let (Some(p), Some(c)) = (parent.upgrade(), child_ref.upgrade()) {
                        Subscription { node: p }.erase(&Subscription { node: c });
                    }
                });
                return;
            }
        }
        child.stop();
    }

    /// Removes `child` without stopping it.
    pub fn erase(&self, child: &Subscription) {
        let mut inner = self.lock();
        inner
            .children
            .retain(|c| !Arc::ptr_eq(&c.node, &child.node));
    }

    /// Registers a stop callback.
    ///
    /// Callbacks run newest-first when the subscription stops. If the
    /// subscription is already stopped the callback runs immediately on the
    /// calling thread.
    pub fn on_stop(&self, stopper: impl FnOnce() + Send + 'static) {
        {
            let mut inner = self.lock();
            if !self.is_stopped() {
                inner.stoppers.push(Box::new(stopper));
                return;
            }
        }
        stopper();
    }

    /// Installs a function that marshals stop work onto a strand.
    ///
    /// The next `stop` hands its drain work to `defer` instead of running
    /// it inline; `join` then becomes the way to wait for quiescence. The
    /// binding resets to synchronous after the drain completes.
    pub fn bind_defer(&self, defer: impl Fn(Callback) + Send + Sync + 'static) {
        let mut inner = self.lock();
        inner.defer = Some(Arc::new(defer));
    }

    /// Stops this subscription and everything nested in it.
    ///
    /// Idempotent. With the default synchronous binding all children are
    /// stopped and joined, and all stop callbacks have run, before this
    /// returns. With a deferred binding the drain happens on the bound
    /// strand and `join` is the synchronization point.
    pub fn stop(&self) {
        if self.node.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        tracing::trace!(target: "riffle::subscription", "lifetime stopping");
        let defer = self.lock().defer.clone();
        let this = self.clone();
        let work: Callback = Box::new(move || this.drain());
        match defer {
            Some(d) => d(work),
            None => work(),
        }
    }

    /// Blocks the calling thread until `stop` has fully completed.
    ///
    /// If the subscription has not stopped yet this waits for a future
    /// `stop` to finish draining. Must not be called from inside the strand
    /// a deferred drain is bound to.
    pub fn join(&self) {
        let mut inner = self.lock();
        while !inner.done {
            inner = self
                .node
                .drained
                .wait(inner)
                .expect("subscription lock poisoned");
        }
    }

    /// Allocates `value` owned by this subscription.
    ///
    /// The value is dropped exactly once, when the node is destroyed. The
    /// returned handle stays valid on every callback path that starts
    /// before `stop` returns; afterwards access yields `None`.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::Stopped`](crate::ErrorKind::Stopped) if the
    /// subscription is already stopped.
    pub fn make_state<P: Send + 'static>(&self, value: P) -> Result<State<P>> {
        let mut inner = self.lock();
        if self.is_stopped() {
            return Err(Error::stopped());
        }
        let cell = Arc::new(Mutex::new(value));
        let handle = State {
            lifetime: self.clone(),
            cell: Arc::downgrade(&cell),
        };
        inner.destructors.push(Box::new(move || drop(cell)));
        Ok(handle)
    }

    /// Like [`make_state`](Self::make_state), but yields an inert handle
    /// instead of failing when the subscription is stopped.
    pub(crate) fn scoped<P: Send + 'static>(&self, value: P) -> State<P> {
        self.make_state(value).unwrap_or_else(|_| State {
            lifetime: self.clone(),
            cell: Weak::new(),
        })
    }

    /// Runs the stop drain: children first (stop + join each), then the
    /// stop callbacks newest-first, then release the defer binding and wake
    /// joiners.
    fn drain(&self) {
        let (children, stoppers) = {
            let mut inner = self.lock();
            (
                std::mem::take(&mut inner.children),
                std::mem::take(&mut inner.stoppers),
            )
        };
        for child in &children {
            child.stop();
            child.join();
        }
        for stopper in stoppers.into_iter().rev() {
            stopper();
        }
        {
            let mut inner = self.lock();
            inner.defer = None;
            inner.done = true;
        }
        self.node.drained.notify_all();
        tracing::trace!(target: "riffle::subscription", "lifetime stopped");
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.node.inner.lock().expect("subscription lock poisoned")
    }

    pub(crate) fn addr(&self) -> usize {
        Arc::as_ptr(&self.node) as usize
    }
}

impl PartialEq for Subscription {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.node, &other.node)
    }
}

impl Eq for Subscription {}

impl Hash for Subscription {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr().hash(state);
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut h = DefaultHasher::new();
        self.addr().hash(&mut h);
        f.debug_struct("Subscription")
            .field("id", &format_args!("{:04x}", h.finish() & 0xffff))
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

/// A stable handle to a value owned by a subscription.
///
/// Cloning a `State` clones only the handle. The value lives until the
/// owning node is destroyed; afterwards every accessor reports `None`.
pub struct State<P> {
    lifetime: Subscription,
    cell: Weak<Mutex<P>>,
}

impl<P> Clone for State<P> {
    fn clone(&self) -> Self {
        Self {
            lifetime: self.lifetime.clone(),
            cell: self.cell.clone(),
        }
    }
}

impl<P> State<P> {
    /// The subscription that owns the value.
    #[must_use]
    pub fn lifetime(&self) -> &Subscription {
        &self.lifetime
    }

    /// Runs `f` with exclusive access to the value.
    ///
    /// Returns `None` if the value has already been destroyed.
    pub fn with<R>(&self, f: impl FnOnce(&mut P) -> R) -> Option<R> {
        let cell = self.cell.upgrade()?;
        let mut guard = cell.lock().expect("state lock poisoned");
        Some(f(&mut guard))
    }

    /// Replaces the value. Returns false if it was already destroyed.
    pub fn set(&self, value: P) -> bool {
        self.with(|p| *p = value).is_some()
    }
}

impl<P: Clone> State<P> {
    /// Returns a clone of the current value, if still alive.
    #[must_use]
    pub fn get(&self) -> Option<P> {
        self.with(|p| p.clone())
    }
}

impl<P> std::fmt::Debug for State<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("State")
            .field("alive", &(self.cell.strong_count() > 0))
            .field("lifetime", &self.lifetime)
            .finish()
    }
}
