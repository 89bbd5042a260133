//! The response policy: how an endpoint's [`Outcome`] becomes bytes on the wire.
//!
//! The policy is not hard-wired. The route adapter resolves
//! `dyn ResponseHandler` from the registry on every call, so a process can swap
//! in its own encoding by registering a replacement:
//!
//! ```rust
//! use std::sync::Arc;
//! use glue::{Glue, Outcome, ResponseHandler, WriteResponse};
//!
//! struct Silent;
//!
//! impl ResponseHandler for Silent {
//!     fn respond(&self, _writer: &dyn WriteResponse, _outcome: Outcome) {}
//! }
//!
//! let glue = Glue::new().register_as::<dyn ResponseHandler>(Arc::new(Silent));
//! ```

use http::HeaderValue;
use http::header::CONTENT_TYPE;
use tracing::warn;

use crate::outcome::{Body, Outcome};
use crate::writer::WriteResponse;

/// Converts an endpoint's result into status and body writes.
pub trait ResponseHandler: Send + Sync {
    fn respond(&self, writer: &dyn WriteResponse, outcome: Outcome);
}

/// The policy every [`Glue`](crate::Glue) starts with.
///
/// | outcome | writes |
/// |---|---|
/// | `Empty` | nothing |
/// | `Body(b)` | `b` (implicit `200 OK`) |
/// | `StatusAndBody(s, b)` | status `s`, then `b` |
///
/// Byte bodies go out verbatim. Text bodies get `text/plain; charset=utf-8`
/// unless a content-type was already set.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultResponseHandler;

impl DefaultResponseHandler {
    // Content-type has to be in place before the status goes out.
    fn prepare(writer: &dyn WriteResponse, body: &Body) {
        if body.is_text() && !writer.wrote_header() && !writer.header_is_set(&CONTENT_TYPE) {
            let text = HeaderValue::from_static("text/plain; charset=utf-8");
            writer.insert_header(CONTENT_TYPE, text);
        }
    }
}

impl ResponseHandler for DefaultResponseHandler {
    fn respond(&self, writer: &dyn WriteResponse, outcome: Outcome) {
        match outcome {
            Outcome::Empty => {}
            Outcome::Body(body) => {
                Self::prepare(writer, &body);
                writer.write(body.as_bytes());
            }
            Outcome::StatusAndBody(status, body) => {
                Self::prepare(writer, &body);
                writer.write_header(status);
                writer.write(body.as_bytes());
            }
            Outcome::Deferred(_) => {
                warn!("response policy received an after-handler; nothing written")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use http::StatusCode;

    use super::*;
    use crate::writer::{BufferedSink, ResponseWriter};

    fn respond(outcome: Outcome) -> http::Response<http_body_util::Full<Bytes>> {
        let writer = ResponseWriter::new(BufferedSink::default());
        DefaultResponseHandler.respond(&writer, outcome);
        writer.finish()
    }

    async fn body_of(response: http::Response<http_body_util::Full<Bytes>>) -> Bytes {
        use http_body_util::BodyExt;
        response.into_body().collect().await.unwrap().to_bytes()
    }

    #[tokio::test]
    async fn status_and_text_body() {
        let response = respond(Outcome::StatusAndBody(
            StatusCode::IM_A_TEAPOT,
            Body::Text("that is purple!".to_owned()),
        ));
        assert_eq!(response.status(), StatusCode::IM_A_TEAPOT);
        assert_eq!(response.headers()[CONTENT_TYPE], "text/plain; charset=utf-8");
        assert_eq!(body_of(response).await, "that is purple!");
    }

    #[tokio::test]
    async fn bytes_are_written_verbatim() {
        let raw = Bytes::from_static(b"{\"Teapot\":{\"IsReady\":false}}\xff");
        let response = respond(Outcome::Body(Body::Bytes(raw.clone())));
        assert_eq!(response.status(), StatusCode::OK);
        assert!(!response.headers().contains_key(CONTENT_TYPE));
        assert_eq!(body_of(response).await, raw);
    }

    #[tokio::test]
    async fn empty_writes_nothing() {
        let writer = ResponseWriter::new(BufferedSink::default());
        DefaultResponseHandler.respond(&writer, Outcome::Empty);
        assert!(!writer.wrote_header());
        assert_eq!(writer.size(), 0);
    }

    #[tokio::test]
    async fn existing_content_type_is_kept() {
        let writer = ResponseWriter::new(BufferedSink::default());
        writer.insert_header(CONTENT_TYPE, HeaderValue::from_static("text/html"));
        DefaultResponseHandler.respond(&writer, Outcome::Body(Body::Text("<p/>".to_owned())));
        assert_eq!(writer.finish().headers()[CONTENT_TYPE], "text/html");
    }
}
