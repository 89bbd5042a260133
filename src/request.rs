//! Incoming request data as seen by handlers.

use std::net::SocketAddr;

use bytes::Bytes;
use http::{HeaderMap, Method, Uri, Version};

use crate::error::Error;
use crate::registry::{FromRegistry, Lookup};

/// An incoming HTTP request with its body fully read.
///
/// Registered in every request scope; declare a `Request` parameter to get
/// it. Cloning is cheap apart from the header map.
#[derive(Clone, Debug)]
pub struct Request {
    method: Method,
    uri: Uri,
    version: Version,
    headers: HeaderMap,
    body: Bytes,
    remote_addr: Option<SocketAddr>,
}

impl Request {
    pub(crate) fn from_http(req: http::Request<Bytes>, remote_addr: Option<SocketAddr>) -> Self {
        let (parts, body) = req.into_parts();
        Self {
            method: parts.method,
            uri: parts.uri,
            version: parts.version,
            headers: parts.headers,
            body,
            remote_addr,
        }
    }

    pub fn method(&self) -> &Method { &self.method }
    pub fn uri(&self) -> &Uri { &self.uri }
    pub fn version(&self) -> Version { self.version }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn body(&self) -> &Bytes { &self.body }
    pub fn remote_addr(&self) -> Option<SocketAddr> { self.remote_addr }

    pub fn path(&self) -> &str {
        self.uri.path()
    }

    /// The raw query string, without the leading `?`.
    pub fn query(&self) -> Option<&str> {
        self.uri.query()
    }

    /// Returns the first decoded value of query parameter `key`.
    pub fn query_param(&self, key: &str) -> Option<String> {
        let query = self.uri.query()?;
        url::form_urlencoded::parse(query.as_bytes())
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }

    /// Case-insensitive header lookup. Non-UTF-8 values read as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Path plus query, as it appeared on the request line.
    pub fn request_uri(&self) -> &str {
        self.uri.path_and_query().map_or("/", |pq| pq.as_str())
    }
}

impl FromRegistry for Request {
    fn from_registry(lookup: &Lookup<'_>) -> Result<Self, Error> {
        Ok(lookup.resolve::<Request>()?.as_ref().clone())
    }
}

// ── Params ────────────────────────────────────────────────────────────────────

/// Named segments captured by the matched route pattern.
///
/// Registered in the route scope only, so it resolves for endpoints (and the
/// not-found handler, where it is empty) but not for chain handlers.
///
/// ```rust
/// use glue::Params;
///
/// async fn teapot(params: Params) -> (u16, String) {
///     (418, format!("that is {}!", params.get("type").unwrap_or("plain")))
/// }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Params(Vec<(String, String)>);

impl Params {
    pub(crate) fn new(pairs: Vec<(String, String)>) -> Self {
        Self(pairs)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromRegistry for Params {
    fn from_registry(lookup: &Lookup<'_>) -> Result<Self, Error> {
        Ok(lookup.resolve::<Params>()?.as_ref().clone())
    }
}
