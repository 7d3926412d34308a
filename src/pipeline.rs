//! The pipeline algebra: stage kinds and the `|` composition operator.
//!
//! Five stage kinds compose into runnable pipelines:
//!
//! - [`Source`]: given a sink, produces a [`Runnable`]
//! - [`Sink`]: given a context, produces an observer
//! - [`Transform`]: lifts a downstream sink to a different upstream type
//! - [`SourceTransform`]: wraps a source (may switch strands or combine
//!   sub-sources)
//! - [`SinkTransform`]: a source-side wrap fused with a sink; applied to a
//!   source it yields a runnable
//!
//! Composition is performed bottom-up from the sink, so binding a full
//! pipeline produces a runnable: a thunk parameterized by a [`Context`].
//! Starting the runnable builds the observer chain top-down from the
//! source, then the source begins emitting.
//!
//! Stages are values: cheap to clone, reusable, and side-effect free until
//! started. The wrapper types ([`SourceStage`] and friends) carry the
//! stage kind in the type so `|` can dispatch on it:
//!
//! | left | right | result |
//! |---|---|---|
//! | source | transform | source |
//! | source | source-transform | source |
//! | source | sink-transform | runnable |
//! | source | sink | runnable |
//! | transform | transform | transform |
//! | transform | source-transform | source-transform |
//! | transform | sink | sink |
//! | source-transform | source-transform | source-transform |
//! | source-transform | transform | source-transform |
//! | source-transform | sink | sink-transform |
//! | runnable | context | subscription |
//! | subscription | [`Join`] | () |
//!
//! Every stage also has a type-erased counterpart ([`AnySource`] etc.,
//! via `.erased()`) for composition across dynamically typed boundaries;
//! the concrete forms monomorphize and are preferred in inner loops.

use std::ops::BitOr;
use std::sync::Arc;

use crate::context::Context;
use crate::observer::{AnyObserver, Observer};
use crate::subscription::Subscription;

// ============================================================================
// Stage traits
// ============================================================================

/// A stage that, given a sink, produces a runnable pipeline.
pub trait Source: Clone + Send + Sync + 'static {
    /// The emitted value type.
    type Item: Send + 'static;

    /// Binds `sink` under this source.
    fn bind<K>(&self, sink: K) -> impl Runnable
    where
        K: Sink<Item = Self::Item>;
}

/// A stage that, given a context, produces the pipeline's observer.
pub trait Sink: Clone + Send + Sync + 'static {
    /// The accepted value type.
    type Item: Send + 'static;

    /// Builds the observer for one activation.
    fn attach(&self, ctx: &Context) -> impl Observer<Item = Self::Item>;
}

/// A sink-to-sink stage presenting a different value type upstream.
pub trait Transform: Clone + Send + Sync + 'static {
    /// The upstream value type.
    type In: Send + 'static;
    /// The downstream value type.
    type Out: Send + 'static;

    /// Lifts a downstream sink into an upstream-facing sink.
    fn lift<K>(&self, sink: K) -> impl Sink<Item = Self::In>
    where
        K: Sink<Item = Self::Out>;
}

/// A source-to-source stage; may switch strands or combine sub-sources.
pub trait SourceTransform: Clone + Send + Sync + 'static {
    /// The upstream value type.
    type In: Send + 'static;
    /// The downstream value type.
    type Out: Send + 'static;

    /// Wraps `source`.
    fn adapt<S>(&self, source: S) -> impl Source<Item = Self::Out>
    where
        S: Source<Item = Self::In>;
}

/// A source-side wrap fused with a sink.
pub trait SinkTransform: Clone + Send + Sync + 'static {
    /// The upstream value type.
    type In: Send + 'static;

    /// Terminates `source` into a runnable.
    fn terminate<S>(&self, source: S) -> impl Runnable
    where
        S: Source<Item = Self::In>;
}

/// A prepared pipeline awaiting a context.
pub trait Runnable: Clone + Send + Sync + 'static {
    /// Starts the pipeline; the returned subscription is the activation's
    /// lifetime (the context's).
    fn start(&self, ctx: &Context) -> Subscription;
}

// ============================================================================
// Composition combinators
// ============================================================================

/// `source | transform`.
#[derive(Clone)]
pub struct Piped<S, T> {
    pub(crate) source: S,
    pub(crate) transform: T,
}

impl<S, T> Source for Piped<S, T>
where
    S: Source,
    T: Transform<In = S::Item>,
{
    type Item = T::Out;

    fn bind<K>(&self, sink: K) -> impl Runnable
    where
        K: Sink<Item = T::Out>,
    {
        self.source.bind(self.transform.lift(sink))
    }
}

/// `transform | transform`.
#[derive(Clone)]
pub struct Fused<L, R> {
    left: L,
    right: R,
}

impl<L, R> Transform for Fused<L, R>
where
    L: Transform,
    R: Transform<In = L::Out>,
{
    type In = L::In;
    type Out = R::Out;

    fn lift<K>(&self, sink: K) -> impl Sink<Item = L::In>
    where
        K: Sink<Item = R::Out>,
    {
        self.left.lift(self.right.lift(sink))
    }
}

/// `transform | sink`.
#[derive(Clone)]
pub struct LiftedSink<T, K> {
    transform: T,
    sink: K,
}

impl<T, K> Sink for LiftedSink<T, K>
where
    T: Transform,
    K: Sink<Item = T::Out>,
{
    type Item = T::In;

    fn attach(&self, ctx: &Context) -> impl Observer<Item = T::In> {
        self.transform.lift(self.sink.clone()).attach(ctx).erased()
    }
}

/// `source | source-transform`.
#[derive(Clone)]
pub struct Adapted<S, A> {
    source: S,
    adaptor: A,
}

impl<S, A> Source for Adapted<S, A>
where
    S: Source,
    A: SourceTransform<In = S::Item>,
{
    type Item = A::Out;

    fn bind<K>(&self, sink: K) -> impl Runnable
    where
        K: Sink<Item = A::Out>,
    {
        let adapted = self.adaptor.adapt(self.source.clone());
        DynSource::bind_erased(&adapted, AnySink::new(sink))
    }
}

/// `source-transform | source-transform`.
#[derive(Clone)]
pub struct ComposedAdapt<L, R> {
    left: L,
    right: R,
}

impl<L, R> SourceTransform for ComposedAdapt<L, R>
where
    L: SourceTransform,
    R: SourceTransform<In = L::Out>,
{
    type In = L::In;
    type Out = R::Out;

    fn adapt<S>(&self, source: S) -> impl Source<Item = R::Out>
    where
        S: Source<Item = L::In>,
    {
        self.right.adapt(self.left.adapt(source)).erased_source()
    }
}

/// `source-transform | transform`.
#[derive(Clone)]
pub struct AdaptThenLift<A, T> {
    adaptor: A,
    transform: T,
}

impl<A, T> SourceTransform for AdaptThenLift<A, T>
where
    A: SourceTransform,
    T: Transform<In = A::Out>,
{
    type In = A::In;
    type Out = T::Out;

    fn adapt<S>(&self, source: S) -> impl Source<Item = T::Out>
    where
        S: Source<Item = A::In>,
    {
        Piped {
            source: self.adaptor.adapt(source).erased_source(),
            transform: self.transform.clone(),
        }
    }
}

/// `transform | source-transform`.
#[derive(Clone)]
pub struct LiftThenAdapt<T, A> {
    transform: T,
    adaptor: A,
}

impl<T, A> SourceTransform for LiftThenAdapt<T, A>
where
    T: Transform,
    A: SourceTransform<In = T::Out>,
{
    type In = T::In;
    type Out = A::Out;

    fn adapt<S>(&self, source: S) -> impl Source<Item = A::Out>
    where
        S: Source<Item = T::In>,
    {
        self.adaptor
            .adapt(Piped {
                source,
                transform: self.transform.clone(),
            })
            .erased_source()
    }
}

/// `source-transform | sink`.
#[derive(Clone)]
pub struct Terminated<A, K> {
    adaptor: A,
    sink: K,
}

impl<A, K> SinkTransform for Terminated<A, K>
where
    A: SourceTransform,
    K: Sink<Item = A::Out>,
{
    type In = A::In;

    fn terminate<S>(&self, source: S) -> impl Runnable
    where
        S: Source<Item = A::In>,
    {
        Bound {
            source: self.adaptor.adapt(source).erased_source(),
            sink: self.sink.clone(),
        }
    }
}

/// `source | sink`: the runnable form of a fully composed pipeline.
#[derive(Clone)]
pub struct Bound<S, K> {
    pub(crate) source: S,
    pub(crate) sink: K,
}

impl<S, K> Runnable for Bound<S, K>
where
    S: Source,
    K: Sink<Item = S::Item>,
{
    fn start(&self, ctx: &Context) -> Subscription {
        self.source.bind(self.sink.clone()).start(ctx)
    }
}

/// `source | sink-transform`.
#[derive(Clone)]
pub struct TerminatedRun<S, U> {
    source: S,
    terminal: U,
}

impl<S, U> Runnable for TerminatedRun<S, U>
where
    S: Source,
    U: SinkTransform<In = S::Item>,
{
    fn start(&self, ctx: &Context) -> Subscription {
        self.terminal.terminate(self.source.clone()).start(ctx)
    }
}

// ============================================================================
// Type-erased stages
// ============================================================================

trait DynSource<V>: Send + Sync {
    fn bind_erased(&self, sink: AnySink<V>) -> AnyRunnable;
}

trait DynSink<V>: Send + Sync {
    fn attach_erased(&self, ctx: &Context) -> AnyObserver<V>;
}

trait DynTransform<VIn, VOut>: Send + Sync {
    fn lift_erased(&self, sink: AnySink<VOut>) -> AnySink<VIn>;
}

trait DynSourceTransform<VIn, VOut>: Send + Sync {
    fn adapt_erased(&self, source: AnySource<VIn>) -> AnySource<VOut>;
}

trait DynSinkTransform<V>: Send + Sync {
    fn terminate_erased(&self, source: AnySource<V>) -> AnyRunnable;
}

trait DynRunnable: Send + Sync {
    fn start_erased(&self, ctx: &Context) -> Subscription;
}

impl<S: Source> DynSource<S::Item> for S {
    fn bind_erased(&self, sink: AnySink<S::Item>) -> AnyRunnable {
        AnyRunnable::new(self.bind(sink))
    }
}

impl<K: Sink> DynSink<K::Item> for K {
    fn attach_erased(&self, ctx: &Context) -> AnyObserver<K::Item> {
        self.attach(ctx).erased()
    }
}

impl<T: Transform> DynTransform<T::In, T::Out> for T {
    fn lift_erased(&self, sink: AnySink<T::Out>) -> AnySink<T::In> {
        AnySink::new(self.lift(sink))
    }
}

impl<A: SourceTransform> DynSourceTransform<A::In, A::Out> for A {
    fn adapt_erased(&self, source: AnySource<A::In>) -> AnySource<A::Out> {
        AnySource::new(self.adapt(source))
    }
}

impl<U: SinkTransform> DynSinkTransform<U::In> for U {
    fn terminate_erased(&self, source: AnySource<U::In>) -> AnyRunnable {
        AnyRunnable::new(self.terminate(source))
    }
}

impl<R: Runnable> DynRunnable for R {
    fn start_erased(&self, ctx: &Context) -> Subscription {
        self.start(ctx)
    }
}

/// A type-erased source of `V`.
pub struct AnySource<V> {
    inner: Arc<dyn DynSource<V>>,
}

/// A type-erased sink of `V`.
pub struct AnySink<V> {
    inner: Arc<dyn DynSink<V>>,
}

/// A type-erased transform from `VIn` to `VOut`.
pub struct AnyTransform<VIn, VOut> {
    inner: Arc<dyn DynTransform<VIn, VOut>>,
}

/// A type-erased source transform from `VIn` to `VOut`.
pub struct AnySourceTransform<VIn, VOut> {
    inner: Arc<dyn DynSourceTransform<VIn, VOut>>,
}

/// A type-erased sink transform over `V`.
pub struct AnySinkTransform<V> {
    inner: Arc<dyn DynSinkTransform<V>>,
}

/// A type-erased runnable.
pub struct AnyRunnable {
    inner: Arc<dyn DynRunnable>,
}

impl<V> Clone for AnySource<V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<V> Clone for AnySink<V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<VIn, VOut> Clone for AnyTransform<VIn, VOut> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<VIn, VOut> Clone for AnySourceTransform<VIn, VOut> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<V> Clone for AnySinkTransform<V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl Clone for AnyRunnable {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<V: Send + 'static> AnySource<V> {
    /// Erases a concrete source.
    pub fn new(source: impl Source<Item = V>) -> Self {
        Self {
            inner: Arc::new(source),
        }
    }
}

impl<V: Send + 'static> AnySink<V> {
    /// Erases a concrete sink.
    pub fn new(sink: impl Sink<Item = V>) -> Self {
        Self {
            inner: Arc::new(sink),
        }
    }
}

impl<VIn: Send + 'static, VOut: Send + 'static> AnyTransform<VIn, VOut> {
    /// Erases a concrete transform.
    pub fn new(transform: impl Transform<In = VIn, Out = VOut>) -> Self {
        Self {
            inner: Arc::new(transform),
        }
    }
}

impl<VIn: Send + 'static, VOut: Send + 'static> AnySourceTransform<VIn, VOut> {
    /// Erases a concrete source transform.
    pub fn new(adaptor: impl SourceTransform<In = VIn, Out = VOut>) -> Self {
        Self {
            inner: Arc::new(adaptor),
        }
    }
}

impl<V: Send + 'static> AnySinkTransform<V> {
    /// Erases a concrete sink transform.
    pub fn new(terminal: impl SinkTransform<In = V>) -> Self {
        Self {
            inner: Arc::new(terminal),
        }
    }
}

impl AnyRunnable {
    /// Erases a concrete runnable.
    pub fn new(runnable: impl Runnable) -> Self {
        Self {
            inner: Arc::new(runnable),
        }
    }
}

impl<V: Send + 'static> Source for AnySource<V> {
    type Item = V;

    fn bind<K>(&self, sink: K) -> impl Runnable
    where
        K: Sink<Item = V>,
    {
        self.inner.bind_erased(AnySink::new(sink))
    }
}

impl<V: Send + 'static> Sink for AnySink<V> {
    type Item = V;

    fn attach(&self, ctx: &Context) -> impl Observer<Item = V> {
        self.inner.attach_erased(ctx)
    }
}

impl<VIn: Send + 'static, VOut: Send + 'static> Transform for AnyTransform<VIn, VOut> {
    type In = VIn;
    type Out = VOut;

    fn lift<K>(&self, sink: K) -> impl Sink<Item = VIn>
    where
        K: Sink<Item = VOut>,
    {
        self.inner.lift_erased(AnySink::new(sink))
    }
}

impl<VIn: Send + 'static, VOut: Send + 'static> SourceTransform
    for AnySourceTransform<VIn, VOut>
{
    type In = VIn;
    type Out = VOut;

    fn adapt<S>(&self, source: S) -> impl Source<Item = VOut>
    where
        S: Source<Item = VIn>,
    {
        self.inner.adapt_erased(AnySource::new(source))
    }
}

impl<V: Send + 'static> SinkTransform for AnySinkTransform<V> {
    type In = V;

    fn terminate<S>(&self, source: S) -> impl Runnable
    where
        S: Source<Item = V>,
    {
        self.inner.terminate_erased(AnySource::new(source))
    }
}

impl Runnable for AnyRunnable {
    fn start(&self, ctx: &Context) -> Subscription {
        self.inner.start_erased(ctx)
    }
}

/// Crate-internal helper: erase an `impl Source` so combinators can name
/// their return types.
trait ErasedSourceExt: Source + Sized {
    fn erased_source(self) -> AnySource<Self::Item> {
        AnySource::new(self)
    }
}

impl<S: Source> ErasedSourceExt for S {}

// ============================================================================
// Stage wrappers and the | operator
// ============================================================================

/// A source stage; composes on the left of `|`.
#[derive(Clone)]
pub struct SourceStage<S>(pub(crate) S);

/// A sink stage; terminates a chain of `|`.
#[derive(Clone)]
pub struct SinkStage<K>(pub(crate) K);

/// A transform stage.
#[derive(Clone)]
pub struct TransformStage<T>(pub(crate) T);

/// A source-transform stage.
#[derive(Clone)]
pub struct AdaptStage<A>(pub(crate) A);

/// A sink-transform stage.
#[derive(Clone)]
pub struct TerminalStage<U>(pub(crate) U);

/// A runnable pipeline stage.
#[derive(Clone)]
pub struct RunnableStage<R>(pub(crate) R);

/// Marker for `subscription | join()`.
#[derive(Clone, Copy, Debug)]
pub struct Join;

/// The join marker: `pipeline | ctx | join()` blocks until the activation
/// has fully stopped.
#[must_use]
pub const fn join() -> Join {
    Join
}

// Stage wrappers double as stages themselves where values of that kind
// flow through pipelines; in particular `merge` consumes streams whose
// items are (wrapped) sources.
impl<S: Source> Source for SourceStage<S> {
    type Item = S::Item;

    fn bind<K>(&self, sink: K) -> impl Runnable
    where
        K: Sink<Item = S::Item>,
    {
        self.0.bind(sink)
    }
}

impl<S: Source> SourceStage<S> {
    /// Wraps a concrete source.
    pub const fn new(source: S) -> Self {
        Self(source)
    }

    /// The wrapped source.
    pub fn into_inner(self) -> S {
        self.0
    }

    /// Type-erases the wrapped source.
    #[must_use]
    pub fn erased(self) -> SourceStage<AnySource<S::Item>> {
        SourceStage(AnySource::new(self.0))
    }
}

impl<K: Sink> SinkStage<K> {
    /// Wraps a concrete sink.
    pub const fn new(sink: K) -> Self {
        Self(sink)
    }

    /// Type-erases the wrapped sink.
    #[must_use]
    pub fn erased(self) -> SinkStage<AnySink<K::Item>> {
        SinkStage(AnySink::new(self.0))
    }
}

impl<T: Transform> TransformStage<T> {
    /// Wraps a concrete transform.
    pub const fn new(transform: T) -> Self {
        Self(transform)
    }

    /// Type-erases the wrapped transform.
    #[must_use]
    pub fn erased(self) -> TransformStage<AnyTransform<T::In, T::Out>> {
        TransformStage(AnyTransform::new(self.0))
    }
}

impl<A: SourceTransform> AdaptStage<A> {
    /// Wraps a concrete source transform.
    pub const fn new(adaptor: A) -> Self {
        Self(adaptor)
    }

    /// Type-erases the wrapped source transform.
    #[must_use]
    pub fn erased(self) -> AdaptStage<AnySourceTransform<A::In, A::Out>> {
        AdaptStage(AnySourceTransform::new(self.0))
    }
}

impl<U: SinkTransform> TerminalStage<U> {
    /// Type-erases the wrapped sink transform.
    #[must_use]
    pub fn erased(self) -> TerminalStage<AnySinkTransform<U::In>> {
        TerminalStage(AnySinkTransform::new(self.0))
    }
}

impl<R: Runnable> RunnableStage<R> {
    /// Starts the pipeline on `ctx`.
    pub fn start(&self, ctx: &Context) -> Subscription {
        self.0.start(ctx)
    }

    /// Type-erases the wrapped runnable.
    #[must_use]
    pub fn erased(self) -> RunnableStage<AnyRunnable> {
        RunnableStage(AnyRunnable::new(self.0))
    }
}

// source | transform → source
impl<S, T> BitOr<TransformStage<T>> for SourceStage<S>
where
    S: Source,
    T: Transform<In = S::Item>,
{
    type Output = SourceStage<Piped<S, T>>;

    fn bitor(self, rhs: TransformStage<T>) -> Self::Output {
        SourceStage(Piped {
            source: self.0,
            transform: rhs.0,
        })
    }
}

// source | source-transform → source
impl<S, A> BitOr<AdaptStage<A>> for SourceStage<S>
where
    S: Source,
    A: SourceTransform<In = S::Item>,
{
    type Output = SourceStage<Adapted<S, A>>;

    fn bitor(self, rhs: AdaptStage<A>) -> Self::Output {
        SourceStage(Adapted {
            source: self.0,
            adaptor: rhs.0,
        })
    }
}

// source | sink → runnable
impl<S, K> BitOr<SinkStage<K>> for SourceStage<S>
where
    S: Source,
    K: Sink<Item = S::Item>,
{
    type Output = RunnableStage<Bound<S, K>>;

    fn bitor(self, rhs: SinkStage<K>) -> Self::Output {
        RunnableStage(Bound {
            source: self.0,
            sink: rhs.0,
        })
    }
}

// source | sink-transform → runnable
impl<S, U> BitOr<TerminalStage<U>> for SourceStage<S>
where
    S: Source,
    U: SinkTransform<In = S::Item>,
{
    type Output = RunnableStage<TerminatedRun<S, U>>;

    fn bitor(self, rhs: TerminalStage<U>) -> Self::Output {
        RunnableStage(TerminatedRun {
            source: self.0,
            terminal: rhs.0,
        })
    }
}

// transform | transform → transform
impl<L, R> BitOr<TransformStage<R>> for TransformStage<L>
where
    L: Transform,
    R: Transform<In = L::Out>,
{
    type Output = TransformStage<Fused<L, R>>;

    fn bitor(self, rhs: TransformStage<R>) -> Self::Output {
        TransformStage(Fused {
            left: self.0,
            right: rhs.0,
        })
    }
}

// transform | sink → sink
impl<T, K> BitOr<SinkStage<K>> for TransformStage<T>
where
    T: Transform,
    K: Sink<Item = T::Out>,
{
    type Output = SinkStage<LiftedSink<T, K>>;

    fn bitor(self, rhs: SinkStage<K>) -> Self::Output {
        SinkStage(LiftedSink {
            transform: self.0,
            sink: rhs.0,
        })
    }
}

// transform | source-transform → source-transform
impl<T, A> BitOr<AdaptStage<A>> for TransformStage<T>
where
    T: Transform,
    A: SourceTransform<In = T::Out>,
{
    type Output = AdaptStage<LiftThenAdapt<T, A>>;

    fn bitor(self, rhs: AdaptStage<A>) -> Self::Output {
        AdaptStage(LiftThenAdapt {
            transform: self.0,
            adaptor: rhs.0,
        })
    }
}

// source-transform | source-transform → source-transform
impl<L, R> BitOr<AdaptStage<R>> for AdaptStage<L>
where
    L: SourceTransform,
    R: SourceTransform<In = L::Out>,
{
    type Output = AdaptStage<ComposedAdapt<L, R>>;

    fn bitor(self, rhs: AdaptStage<R>) -> Self::Output {
        AdaptStage(ComposedAdapt {
            left: self.0,
            right: rhs.0,
        })
    }
}

// source-transform | transform → source-transform
impl<A, T> BitOr<TransformStage<T>> for AdaptStage<A>
where
    A: SourceTransform,
    T: Transform<In = A::Out>,
{
    type Output = AdaptStage<AdaptThenLift<A, T>>;

    fn bitor(self, rhs: TransformStage<T>) -> Self::Output {
        AdaptStage(AdaptThenLift {
            adaptor: self.0,
            transform: rhs.0,
        })
    }
}

// source-transform | sink → sink-transform
impl<A, K> BitOr<SinkStage<K>> for AdaptStage<A>
where
    A: SourceTransform,
    K: Sink<Item = A::Out>,
{
    type Output = TerminalStage<Terminated<A, K>>;

    fn bitor(self, rhs: SinkStage<K>) -> Self::Output {
        TerminalStage(Terminated {
            adaptor: self.0,
            sink: rhs.0,
        })
    }
}

// runnable | context → subscription
impl<R: Runnable> BitOr<Context> for RunnableStage<R> {
    type Output = Subscription;

    fn bitor(self, ctx: Context) -> Subscription {
        self.0.start(&ctx)
    }
}

impl<R: Runnable> BitOr<&Context> for RunnableStage<R> {
    type Output = Subscription;

    fn bitor(self, ctx: &Context) -> Subscription {
        self.0.start(ctx)
    }
}

// subscription | join → ()
impl BitOr<Join> for Subscription {
    type Output = ();

    fn bitor(self, _join: Join) {
        self.join();
    }
}
