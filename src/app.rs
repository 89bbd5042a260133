//! The process-wide configuration and the serve entry point.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http::{Method, StatusCode};
use http_body_util::Full;
use tracing::{Instrument, error, info_span};

use crate::config::Config;
use crate::context::Context;
use crate::error::Error;
use crate::handler::{self, BoxedHandler, Handler};
use crate::registry::Registry;
use crate::request::Request;
use crate::response::{DefaultResponseHandler, ResponseHandler};
use crate::router::{self, Router};
use crate::server::Server;
use crate::writer::{BufferedSink, ResponseWriter};

/// A glue application: process-wide singletons, the handler chain and the
/// routes.
///
/// Built once with by-value builder calls, then frozen in an `Arc` to serve.
/// Nothing can be added once serving starts.
///
/// ```rust,no_run
/// use glue::{Glue, Params, middleware};
///
/// #[tokio::main]
/// async fn main() {
///     Glue::new()
///         .add(middleware::access_log)
///         .get("/{type}_teapot", teapot)
///         .listen()
///         .await
///         .unwrap();
/// }
///
/// async fn teapot(params: Params) -> (u16, String) {
///     (418, format!("that is {}!", params.get("type").unwrap_or("plain")))
/// }
/// ```
pub struct Glue {
    registry: Registry,
    handlers: Vec<BoxedHandler>,
    router: Router,
    // The router's entry point, run after every explicit handler.
    dispatch: BoxedHandler,
}

impl Glue {
    /// An application with no handlers, no routes and the
    /// [`DefaultResponseHandler`] registered.
    pub fn new() -> Self {
        let mut registry = Registry::new();
        registry.register_as::<dyn ResponseHandler>(Arc::new(DefaultResponseHandler));
        Self {
            registry,
            handlers: Vec::new(),
            router: Router::new(),
            dispatch: handler::boxed(router::dispatch),
        }
    }

    /// Registers a process-wide singleton under its own type.
    pub fn register<T: Send + Sync + 'static>(mut self, value: T) -> Self {
        self.registry.register(value);
        self
    }

    /// Registers a process-wide singleton under the type `T`, typically a
    /// trait object.
    pub fn register_as<T: ?Sized + Send + Sync + 'static>(mut self, value: Arc<T>) -> Self {
        self.registry.register_as::<T>(value);
        self
    }

    /// Appends a handler to the chain every request runs before routing.
    /// Order is significant.
    pub fn add<H, Args>(mut self, handler: H) -> Self
    where
        H: Handler<Args>,
        Args: 'static,
    {
        self.handlers.push(handler::boxed(handler));
        self
    }

    /// Registers a route for `method` + `pattern`. See [`Router`] for the
    /// pattern syntax.
    ///
    /// # Panics
    ///
    /// Panics if `pattern` is malformed or overlaps a route already
    /// registered for `method`.
    pub fn route<H, Args>(mut self, method: Method, pattern: &str, handler: H) -> Self
    where
        H: Handler<Args>,
        Args: 'static,
    {
        self.router.add(method, pattern, handler);
        self
    }

    pub fn get<H: Handler<Args>, Args: 'static>(self, pattern: &str, handler: H) -> Self {
        self.route(Method::GET, pattern, handler)
    }

    pub fn post<H: Handler<Args>, Args: 'static>(self, pattern: &str, handler: H) -> Self {
        self.route(Method::POST, pattern, handler)
    }

    pub fn put<H: Handler<Args>, Args: 'static>(self, pattern: &str, handler: H) -> Self {
        self.route(Method::PUT, pattern, handler)
    }

    pub fn delete<H: Handler<Args>, Args: 'static>(self, pattern: &str, handler: H) -> Self {
        self.route(Method::DELETE, pattern, handler)
    }

    /// Replaces the built-in `404 page not found` response.
    pub fn not_found<H: Handler<Args>, Args: 'static>(mut self, handler: H) -> Self {
        self.router.set_not_found(handler);
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// The explicit handlers followed by the router's entry point.
    pub(crate) fn chain(&self) -> impl Iterator<Item = &BoxedHandler> {
        self.handlers.iter().chain(std::iter::once(&self.dispatch))
    }

    /// Answers one request: builds its [`Context`], runs the chain, unwinds.
    ///
    /// A failure nobody recovered is logged with the final status; if nothing
    /// was sent yet the client gets an empty `500`. That fallback is written
    /// after the after-handlers, so they observe no status for it.
    pub async fn serve_http(
        self: &Arc<Self>,
        req: http::Request<Bytes>,
        remote_addr: Option<SocketAddr>,
    ) -> http::Response<Full<Bytes>> {
        let span = info_span!("request", method = %req.method(), path = %req.uri().path());
        let writer = ResponseWriter::new(BufferedSink::default());
        let req = Request::from_http(req, remote_addr);
        let ctx = Context::new(Arc::clone(self), req, writer.clone());

        if let Err(err) = ctx.handle().instrument(span.clone()).await {
            // After-handlers have already run, so an access log saw no status.
            if !writer.wrote_header() {
                writer.write_header(StatusCode::INTERNAL_SERVER_ERROR);
            }
            let status = writer.status().map(|s| s.as_u16());
            span.in_scope(|| error!(error = %err, status, "request aborted"));
        }
        writer.finish()
    }

    /// Serves on the address from `HOST` / `PORT` (default port 5000) until
    /// a shutdown signal arrives.
    pub async fn listen(self) -> Result<(), Error> {
        let config = Config::from_env()?;
        Server::bind(config.addr()).serve(self).await
    }
}

impl Default for Glue {
    fn default() -> Self { Self::new() }
}

impl std::fmt::Debug for Glue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Glue")
            .field("registry", &self.registry)
            .field("handlers", &self.handlers.len())
            .field("router", &self.router)
            .finish()
    }
}
