//! Response writing.
//!
//! [`ResponseWriter`] decorates the transport's [`ResponseSink`] and records
//! what was sent: the status (if any) and the number of body bytes. The chain
//! executor consults [`ResponseWriter::wrote_header`] after every handler to
//! decide whether dispatch is over.
//!
//! Handlers may depend on either the concrete writer or the abstraction:
//!
//! ```rust
//! use std::sync::Arc;
//! use glue::{ResponseWriter, WriteResponse};
//!
//! async fn concrete(w: ResponseWriter) { w.write(b"hi"); }
//! async fn abstracted(w: Arc<dyn WriteResponse>) { w.write(b"hi"); }
//! ```

use std::fmt;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use http::header::{HeaderMap, HeaderName, HeaderValue};
use http::{Response, StatusCode};
use http_body_util::Full;
use parking_lot::Mutex;
use tracing::debug;

use crate::error::Error;
use crate::registry::{FromRegistry, Lookup};

// ── ResponseSink ──────────────────────────────────────────────────────────────

/// The transport's response sink.
///
/// Only the first `write_header` is meaningful to the transport; later calls
/// are ignored by well-behaved sinks.
pub trait ResponseSink: Send {
    fn write_header(&mut self, status: StatusCode);
    fn write(&mut self, buf: &[u8]);
    fn headers_mut(&mut self) -> &mut HeaderMap;
    /// Drains everything written so far into a transport response.
    fn finish(&mut self) -> Response<Full<Bytes>>;
}

/// Buffers the whole response in memory for hyper.
#[derive(Debug, Default)]
pub struct BufferedSink {
    status: Option<StatusCode>,
    headers: HeaderMap,
    body: BytesMut,
}

impl ResponseSink for BufferedSink {
    fn write_header(&mut self, status: StatusCode) {
        match self.status {
            None => self.status = Some(status),
            Some(first) => debug!(%first, ignored = %status, "superfluous write_header call"),
        }
    }

    fn write(&mut self, buf: &[u8]) {
        self.body.extend_from_slice(buf);
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn finish(&mut self) -> Response<Full<Bytes>> {
        let mut response = Response::new(Full::new(std::mem::take(&mut self.body).freeze()));
        *response.status_mut() = self.status.unwrap_or(StatusCode::OK);
        *response.headers_mut() = std::mem::take(&mut self.headers);
        response
    }
}

// ── WriteResponse ─────────────────────────────────────────────────────────────

/// The abstract response-writer interface.
///
/// Every request scope registers its [`ResponseWriter`] under this trait as
/// well as under its concrete type, so code written against the abstraction
/// (response policies, reusable middleware) resolves the live writer.
pub trait WriteResponse: Send + Sync {
    fn write_header(&self, status: StatusCode);
    fn write(&self, buf: &[u8]) -> usize;
    fn insert_header(&self, name: HeaderName, value: HeaderValue);
    fn header_is_set(&self, name: &HeaderName) -> bool;
    fn wrote_header(&self) -> bool;
}

// ── ResponseWriter ────────────────────────────────────────────────────────────

struct State {
    sink: Box<dyn ResponseSink>,
    status: Option<StatusCode>,
    size: usize,
}

/// A cheap, cloneable handle on one request's response.
///
/// All clones share the same state. Requests run their handlers one at a time,
/// so the internal lock is never contended in practice.
#[derive(Clone)]
pub struct ResponseWriter {
    state: Arc<Mutex<State>>,
}

impl ResponseWriter {
    pub fn new(sink: impl ResponseSink + 'static) -> Self {
        let state = State { sink: Box::new(sink), status: None, size: 0 };
        Self { state: Arc::new(Mutex::new(state)) }
    }

    /// Sends the status line. `status()` reports the most recent call.
    pub fn write_header(&self, status: StatusCode) {
        let mut state = self.state.lock();
        state.sink.write_header(status);
        state.status = Some(status);
    }

    /// Writes body bytes, sending `200 OK` first if no status was sent yet.
    pub fn write(&self, buf: &[u8]) -> usize {
        let mut state = self.state.lock();
        if state.status.is_none() {
            state.sink.write_header(StatusCode::OK);
            state.status = Some(StatusCode::OK);
        }
        state.sink.write(buf);
        state.size += buf.len();
        buf.len()
    }

    /// Sets a response header. Ignored once the status has been written.
    pub fn insert_header(&self, name: HeaderName, value: HeaderValue) {
        let mut state = self.state.lock();
        if state.status.is_some() {
            debug!(header = %name, "header set after write_header ignored");
            return;
        }
        state.sink.headers_mut().insert(name, value);
    }

    pub fn header_is_set(&self, name: &HeaderName) -> bool {
        self.state.lock().sink.headers_mut().contains_key(name)
    }

    /// `true` once a status has been sent, explicitly or implicitly.
    pub fn wrote_header(&self) -> bool {
        self.state.lock().status.is_some()
    }

    pub fn status(&self) -> Option<StatusCode> {
        self.state.lock().status
    }

    /// Total body bytes written.
    pub fn size(&self) -> usize {
        self.state.lock().size
    }

    pub(crate) fn finish(&self) -> Response<Full<Bytes>> {
        self.state.lock().sink.finish()
    }
}

impl WriteResponse for ResponseWriter {
    fn write_header(&self, status: StatusCode) {
        ResponseWriter::write_header(self, status);
    }

    fn write(&self, buf: &[u8]) -> usize {
        ResponseWriter::write(self, buf)
    }

    fn insert_header(&self, name: HeaderName, value: HeaderValue) {
        ResponseWriter::insert_header(self, name, value);
    }

    fn header_is_set(&self, name: &HeaderName) -> bool {
        ResponseWriter::header_is_set(self, name)
    }

    fn wrote_header(&self) -> bool {
        ResponseWriter::wrote_header(self)
    }
}

impl FromRegistry for ResponseWriter {
    fn from_registry(lookup: &Lookup<'_>) -> Result<Self, Error> {
        Ok(lookup.resolve::<ResponseWriter>()?.as_ref().clone())
    }
}

impl fmt::Debug for ResponseWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ResponseWriter")
            .field("status", &state.status)
            .field("size", &state.size)
            .finish_non_exhaustive()
    }
}
