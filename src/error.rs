//! Unified error type.

use std::any::Any;

use thiserror::Error;

/// A boxed error returned from inside a handler.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The error type returned by glue's fallible operations.
///
/// Application-level outcomes (404, 422, etc.) are written through the
/// [`ResponseWriter`](crate::ResponseWriter), not raised as `Error`s. This type
/// covers the failures that abort a request's dispatch (dependency resolution,
/// handler errors, panics) plus the infrastructure failures of binding and
/// configuring the server.
#[derive(Debug, Error)]
pub enum Error {
    /// Nothing is registered under the requested type key.
    #[error("no value registered for `{0}`")]
    MissingDependency(&'static str),

    /// A handler parameter could not be produced from the registry.
    #[error("cannot resolve handler parameter `{parameter}`: {source}")]
    UnresolvableParameter {
        parameter: &'static str,
        #[source]
        source: Box<Error>,
    },

    /// The handler ran and returned an error.
    #[error("handler failed: {0}")]
    Invocation(#[source] BoxError),

    /// The handler panicked while running.
    #[error("handler panicked: {0}")]
    Panicked(String),

    /// A handler returned a status code outside `100..=999`.
    #[error("invalid status code {0}")]
    InvalidStatus(u16),

    /// A configuration value could not be parsed.
    #[error("invalid {name}: {reason}")]
    Config { name: &'static str, reason: String },

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Wraps an error returned by a handler.
    ///
    /// A `glue::Error` that a handler propagated with `?` is surfaced as
    /// itself, so a failed `ctx.resolve()` inside a handler still reads as a
    /// missing dependency.
    pub(crate) fn from_handler(err: BoxError) -> Self {
        match err.downcast::<Error>() {
            Ok(err) => *err,
            Err(err) => Self::Invocation(err),
        }
    }

    pub(crate) fn unresolvable<T: ?Sized>(source: Error) -> Self {
        Self::UnresolvableParameter {
            parameter: std::any::type_name::<T>(),
            source: Box::new(source),
        }
    }

    pub(crate) fn panicked(payload: Box<dyn Any + Send>) -> Self {
        let message = match payload.downcast::<String>() {
            Ok(message) => *message,
            Err(payload) => match payload.downcast::<&'static str>() {
                Ok(message) => (*message).to_owned(),
                Err(_) => "non-string panic payload".to_owned(),
            },
        };
        Self::Panicked(message)
    }

    /// Returns `true` for dependency-resolution failures, as opposed to
    /// failures raised by a handler that actually ran.
    pub fn is_resolution_failure(&self) -> bool {
        matches!(self, Self::MissingDependency(_) | Self::UnresolvableParameter { .. })
    }
}
