//! # glue
//!
//! Per-request dependency injection and handler chaining for hyper services.
//!
//! Handlers are plain async functions. They declare what they need as
//! parameters and glue supplies it, looking each parameter up by type in the
//! request's scope and then in the process-wide one. What a handler returns
//! decides what happens next:
//!
//! - a status and/or body is written to the client,
//! - an [`AfterHandler`] is scheduled to run once the response is settled,
//! - an error aborts the request.
//!
//! ## Request lifecycle
//!
//! ```text
//! Context::new           request scope: Request, ResponseWriter, Context
//!      ↓
//! chain handlers         in `add` order; stop as soon as a status is written
//!      ↓
//! router                 canonical path? route for method + path → endpoint
//!      ↓
//! ResponseHandler        endpoint result → status + body
//!      ↓
//! after-handlers         most recent first, always, even after a failure
//! ```
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use glue::{AfterHandler, Glue, Params, ResponseWriter, middleware};
//!
//! struct Db;
//!
//! #[tokio::main]
//! async fn main() {
//!     Glue::new()
//!         .register(Db)
//!         .add(middleware::access_log)
//!         .add(middleware::recover)
//!         .add(transaction)
//!         .get("/{type}_teapot", teapot)
//!         .listen()
//!         .await
//!         .unwrap();
//! }
//!
//! async fn transaction(_db: Arc<Db>, writer: ResponseWriter) -> AfterHandler {
//!     // BEGIN
//!     AfterHandler::new(move |_| async move {
//!         if writer.status().is_some_and(|s| s.is_server_error()) {
//!             // ROLLBACK
//!         }
//!     })
//! }
//!
//! async fn teapot(params: Params) -> (u16, String) {
//!     (418, format!("that is {}!", params.get("type").unwrap_or("plain")))
//! }
//! ```

mod app;
mod config;
mod context;
mod error;
mod handler;
mod outcome;
mod registry;
mod request;
mod response;
mod router;
mod server;
mod writer;

pub mod middleware;

pub use app::Glue;
pub use config::{Config, DEFAULT_PORT};
pub use context::Context;
pub use error::{BoxError, Error};
pub use handler::{BoxedHandler, Handler, Invocation, boxed};
pub use outcome::{AfterHandler, Body, IntoBody, IntoOutcome, Outcome};
pub use registry::{FromRegistry, Lookup, Registry};
pub use request::{Params, Request};
pub use response::{DefaultResponseHandler, ResponseHandler};
pub use router::Router;
pub use server::Server;
pub use writer::{BufferedSink, ResponseSink, ResponseWriter, WriteResponse};

pub use http::{Method, StatusCode};
