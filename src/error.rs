//! Error types and error handling strategy.
//!
//! Error handling follows these principles:
//!
//! - Errors are explicit and typed (no stringly-typed errors)
//! - One cloneable error value can fan out to several observers, so the
//!   underlying source is reference-counted
//! - Panics raised inside `next` callbacks are captured and converted into
//!   ordinary stream errors; panics in `error`/`complete` paths abort

use core::fmt;
use std::any::Any;
use std::sync::Arc;

/// The kind of error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The subscription is already stopped.
    Stopped,
    /// A user callback panicked inside `next`.
    Panic,
    /// User-provided error carried through the stream.
    User,
    /// Internal runtime error (bug).
    Internal,
}

impl ErrorKind {
    /// Returns a short static name for the kind.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Panic => "panic",
            Self::User => "user",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The error type carried on the stream error channel.
#[derive(Clone)]
pub struct Error {
    kind: ErrorKind,
    context: Option<Arc<str>>,
    source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    /// Creates a new error with the given kind.
    #[must_use]
    pub const fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            context: None,
            source: None,
        }
    }

    /// Creates an error for an operation on a stopped subscription.
    #[must_use]
    pub fn stopped() -> Self {
        Self::new(ErrorKind::Stopped).with_context("subscription is stopped")
    }

    /// Creates a user error from a message.
    #[must_use]
    pub fn msg(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::User).with_context(message.into())
    }

    /// Creates a user error wrapping an error value.
    #[must_use]
    pub fn user(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self {
            kind: ErrorKind::User,
            context: None,
            source: Some(Arc::new(source)),
        }
    }

    /// Creates an error from a captured panic payload.
    #[must_use]
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        Self::new(ErrorKind::Panic).with_context(panic_message(payload.as_ref()))
    }

    /// Attaches a human-readable context message.
    #[must_use]
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(Arc::from(context.into().into_boxed_str()));
        self
    }

    /// Returns the error kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the context message, if any.
    #[must_use]
    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }

    /// Returns true if this error came from a stopped-lifetime check.
    #[must_use]
    pub const fn is_stopped(&self) -> bool {
        matches!(self.kind, ErrorKind::Stopped)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.context, &self.source) {
            (Some(ctx), _) => write!(f, "{ctx}"),
            (None, Some(src)) => write!(f, "{src}"),
            (None, None) => write!(f, "{} error", self.kind),
        }
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Error")
            .field("kind", &self.kind)
            .field("context", &self.context)
            .field("source", &self.source.as_ref().map(|s| s.to_string()))
            .finish()
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|s| s.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Extracts a printable message from a panic payload.
///
/// Panic payloads are `&str` or `String` in practice; anything else gets a
/// placeholder.
#[must_use]
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic with non-string payload".to_owned()
    }
}
