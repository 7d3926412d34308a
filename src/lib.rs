//! Riffle: cancel-correct reactive dataflow pipelines over explicit
//! strands.
//!
//! # Overview
//!
//! Riffle composes asynchronous, time-aware streams of values as pipelines
//! of small, uniformly typed stages. A pipeline declares a source, zero or
//! more transformations and a sink; the runtime binds the stages together,
//! attaches them to an execution context, starts the flow and guarantees
//! orderly teardown when the producer completes, the consumer unsubscribes
//! or an error propagates.
//!
//! # Core Guarantees
//!
//! - **Scoped cancellation**: every activation is owned by a
//!   [`Subscription`] tree; stopping a parent stops all descendants and
//!   runs finalizers exactly once
//! - **The observer contract**: values only while live, at most one
//!   termination, panics in `next` routed to the error path
//! - **Ordered scheduling**: strands fire deferred work in nondecreasing
//!   time order, FIFO at equal times
//! - **Pure composition**: building a pipeline has no side effects;
//!   starting it twice yields independent activations
//!
//! # Module Structure
//!
//! - [`subscription`]: lifetime/cancellation tree and subscription-owned
//!   state
//! - [`observer`]: value sinks bound to a lifetime
//! - [`strand`]: execution media (immediate, run loop, worker thread,
//!   shared policy) and the defer helpers
//! - [`context`]: strand + payload + make-strand bundles
//! - [`pipeline`]: the five stage kinds and the `|` composition operator
//! - [`ops`]: the reference operator set
//! - [`demo`]: end-to-end demonstration pipelines
//! - [`error`]: error types
//! - [`clock`]: the monotonic clock boundary
//!
//! # Quick Start
//!
//! ```
//! use riffle::ops::{filter, ints, last_or_default, printto, take};
//! use riffle::{join, Context};
//!
//! ints(1, 10)
//!     | filter(|v: &i64| v % 2 == 0)
//!     | take(2)
//!     | last_or_default(42)
//!     | printto(std::io::stdout())
//!     | Context::root()
//!     | join();
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_panics_doc)]

pub mod clock;
pub mod context;
pub mod demo;
pub mod error;
pub mod observer;
pub mod ops;
pub mod pipeline;
pub mod strand;
pub mod subscription;

#[cfg(test)]
pub mod test_utils;

pub use context::Context;
pub use error::{Error, ErrorKind, Result};
pub use observer::{chained, emitter, AnyObserver, Observer, Tail};
pub use pipeline::{
    join, AnyRunnable, AnySink, AnySource, AnyTransform, Join, Runnable, Sink, Source,
    SourceTransform, SinkTransform, Transform,
};
pub use strand::{
    defer, defer_after, defer_at, defer_periodic, make_immediate, make_new_thread, make_shared,
    AnyStrand, Immediate, MakeStrand, Resume, RunLoop, Strand,
};
pub use subscription::{State, Subscription};
