//! What a handler hands back to the dispatcher.
//!
//! Every handler's return value is converted into an [`Outcome`] through
//! [`IntoOutcome`]. Chain handlers normally return `()` or an
//! [`AfterHandler`]; route endpoints return a body, optionally with a status.
//!
//! | handler returns | outcome |
//! |---|---|
//! | `()` | `Empty` |
//! | `String`, `&'static str` | `Body(Text)` |
//! | `Bytes`, `Vec<u8>`, `&'static [u8]` | `Body(Bytes)` |
//! | `(StatusCode, B)`, `(u16, B)` | `StatusAndBody` |
//! | `StatusCode` | `StatusAndBody` with an empty body |
//! | `AfterHandler` | `Deferred` |
//! | `Option<R>` | `None` → `Empty` |
//! | `Result<R, E>` | `Err` aborts the request |

use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;

use bytes::Bytes;
use futures::FutureExt;
use futures::future::BoxFuture;
use http::StatusCode;
use tracing::error;

use crate::context::Context;
use crate::error::{BoxError, Error};

// ── Body ──────────────────────────────────────────────────────────────────────

/// A response body as produced by a handler.
///
/// Byte bodies are written verbatim; text bodies are written as UTF-8 and let
/// the response policy pick a text content-type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Body {
    Bytes(Bytes),
    Text(String),
}

impl Body {
    /// Renders any displayable value as a text body.
    pub fn display(value: impl fmt::Display) -> Self {
        Self::Text(value.to_string())
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Bytes(bytes) => bytes,
            Self::Text(text) => text.as_bytes(),
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, Self::Text(_))
    }
}

/// Conversion into a [`Body`].
pub trait IntoBody {
    fn into_body(self) -> Body;
}

impl IntoBody for Body {
    fn into_body(self) -> Body { self }
}

impl IntoBody for String {
    fn into_body(self) -> Body { Body::Text(self) }
}

impl IntoBody for &'static str {
    fn into_body(self) -> Body { Body::Text(self.to_owned()) }
}

impl IntoBody for Bytes {
    fn into_body(self) -> Body { Body::Bytes(self) }
}

impl IntoBody for Vec<u8> {
    fn into_body(self) -> Body { Body::Bytes(Bytes::from(self)) }
}

impl IntoBody for &'static [u8] {
    fn into_body(self) -> Body { Body::Bytes(Bytes::from_static(self)) }
}

// ── AfterHandler ──────────────────────────────────────────────────────────────

/// Post-response work, deferred until the request unwinds.
///
/// Return one from a chain handler to schedule it. Scheduled after-handlers run
/// exactly once each, most recently scheduled first, after the chain stops for
/// any reason (including a fatal failure), and see the final response state.
///
/// ```rust
/// use glue::{AfterHandler, Context, ResponseWriter};
///
/// async fn txn(writer: ResponseWriter) -> AfterHandler {
///     // BEGIN
///     AfterHandler::new(move |_ctx: Context| async move {
///         if writer.status().is_some_and(|s| s.is_server_error()) {
///             // ROLLBACK
///         } else {
///             // COMMIT
///         }
///     })
/// }
/// ```
pub struct AfterHandler(Box<dyn FnOnce(Context) -> BoxFuture<'static, ()> + Send>);

impl AfterHandler {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: FnOnce(Context) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self(Box::new(move |ctx| Box::pin(f(ctx))))
    }

    /// Runs the deferred work. A panic is logged and contained so the
    /// remaining after-handlers still run.
    pub(crate) async fn run(self, ctx: Context) {
        let fut = (self.0)(ctx);
        if let Err(payload) = AssertUnwindSafe(fut).catch_unwind().await {
            error!(error = %Error::panicked(payload), "after-handler panicked");
        }
    }
}

impl fmt::Debug for AfterHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AfterHandler(..)")
    }
}

// ── Outcome ───────────────────────────────────────────────────────────────────

/// The interpreted result of one handler call.
#[derive(Debug)]
pub enum Outcome {
    Empty,
    Body(Body),
    StatusAndBody(StatusCode, Body),
    Deferred(AfterHandler),
}

/// Conversion of a handler's return value into an [`Outcome`].
///
/// Implement it on your own types to return them directly from handlers.
pub trait IntoOutcome: Send + 'static {
    fn into_outcome(self) -> Result<Outcome, Error>;
}

impl IntoOutcome for Outcome {
    fn into_outcome(self) -> Result<Outcome, Error> { Ok(self) }
}

impl IntoOutcome for () {
    fn into_outcome(self) -> Result<Outcome, Error> { Ok(Outcome::Empty) }
}

impl IntoOutcome for AfterHandler {
    fn into_outcome(self) -> Result<Outcome, Error> { Ok(Outcome::Deferred(self)) }
}

impl IntoOutcome for StatusCode {
    fn into_outcome(self) -> Result<Outcome, Error> {
        Ok(Outcome::StatusAndBody(self, Body::Bytes(Bytes::new())))
    }
}

macro_rules! body_outcome {
    ($($ty:ty),*) => {$(
        impl IntoOutcome for $ty {
            fn into_outcome(self) -> Result<Outcome, Error> {
                Ok(Outcome::Body(self.into_body()))
            }
        }
    )*};
}

body_outcome!(Body, String, &'static str, Bytes, Vec<u8>, &'static [u8]);

impl<B: IntoBody + Send + 'static> IntoOutcome for (StatusCode, B) {
    fn into_outcome(self) -> Result<Outcome, Error> {
        Ok(Outcome::StatusAndBody(self.0, self.1.into_body()))
    }
}

impl<B: IntoBody + Send + 'static> IntoOutcome for (u16, B) {
    fn into_outcome(self) -> Result<Outcome, Error> {
        let status = StatusCode::from_u16(self.0).map_err(|_| Error::InvalidStatus(self.0))?;
        Ok(Outcome::StatusAndBody(status, self.1.into_body()))
    }
}

impl<R: IntoOutcome> IntoOutcome for Option<R> {
    fn into_outcome(self) -> Result<Outcome, Error> {
        self.map_or(Ok(Outcome::Empty), IntoOutcome::into_outcome)
    }
}

impl<R, E> IntoOutcome for Result<R, E>
where
    R: IntoOutcome,
    E: Into<BoxError> + Send + 'static,
{
    fn into_outcome(self) -> Result<Outcome, Error> {
        self.map_err(|err| Error::from_handler(err.into()))?.into_outcome()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_tuple_keeps_status_and_body() {
        let outcome = (418u16, "that is purple!").into_outcome().unwrap();
        match outcome {
            Outcome::StatusAndBody(status, body) => {
                assert_eq!(status, StatusCode::IM_A_TEAPOT);
                assert_eq!(body, Body::Text("that is purple!".to_owned()));
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn out_of_range_status_is_fatal() {
        let err = (1000u16, "x").into_outcome().unwrap_err();
        assert!(matches!(err, Error::InvalidStatus(1000)));
    }

    #[test]
    fn bytes_stay_bytes() {
        let outcome = vec![0xdeu8, 0xad, 0xbe, 0xef].into_outcome().unwrap();
        assert!(matches!(
            outcome,
            Outcome::Body(Body::Bytes(ref b)) if b[..] == [0xde, 0xad, 0xbe, 0xef]
        ));
    }

    #[test]
    fn none_is_empty() {
        let outcome = Option::<String>::None.into_outcome().unwrap();
        assert!(matches!(outcome, Outcome::Empty));
    }

    #[test]
    fn err_aborts() {
        let result: Result<String, std::fmt::Error> = Err(std::fmt::Error);
        assert!(matches!(result.into_outcome(), Err(Error::Invocation(_))));
    }

    #[test]
    fn display_renders_text() {
        assert_eq!(Body::display(0.5).as_bytes(), b"0.5");
        assert!(Body::display(1).is_text());
    }
}
