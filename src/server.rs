//! HTTP server and graceful shutdown.
//!
//! # Graceful shutdown
//!
//! On SIGTERM or Ctrl-C the server:
//! 1. Immediately stops `listener.accept()`, so no new connections are made.
//! 2. Lets every in-flight connection task run to completion.
//! 3. Returns from [`Server::serve`], which lets `main` exit cleanly.
//!
//! Tests and embedders that need their own trigger use
//! [`Server::serve_with_shutdown`].

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

use crate::app::Glue;
use crate::error::Error;

enum Listen {
    Addr(String),
    Listener(TcpListener),
}

/// The HTTP server.
pub struct Server {
    listen: Listen,
}

impl Server {
    /// Configures the server to bind to `addr` when [`serve`](Server::serve)
    /// is called. Host names are resolved at that point; a bad address
    /// surfaces as [`Error::Io`].
    ///
    /// ```rust,no_run
    /// use glue::Server;
    /// let server = Server::bind("0.0.0.0:5000");
    /// ```
    pub fn bind(addr: impl Into<String>) -> Self {
        Self { listen: Listen::Addr(addr.into()) }
    }

    /// Serves on an already-bound listener, e.g. one bound to port 0.
    pub fn from_listener(listener: TcpListener) -> Self {
        Self { listen: Listen::Listener(listener) }
    }

    /// Serves `glue` until SIGTERM or Ctrl-C, then drains in-flight
    /// connections.
    pub async fn serve(self, glue: Glue) -> Result<(), Error> {
        self.serve_with_shutdown(glue, shutdown_signal()).await
    }

    /// Serves `glue` until `shutdown` resolves, then drains in-flight
    /// connections.
    pub async fn serve_with_shutdown<S>(self, glue: Glue, shutdown: S) -> Result<(), Error>
    where
        S: Future<Output = ()>,
    {
        let listener = match self.listen {
            Listen::Addr(addr) => TcpListener::bind(addr).await?,
            Listen::Listener(listener) => listener,
        };

        // Frozen from here on; every connection task shares it.
        let glue = Arc::new(glue);

        info!(addr = %listener.local_addr()?, "glue listening");

        let mut tasks = tokio::task::JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                // Check shutdown first so a signal stops accepting at once,
                // even if more connections are queued.
                biased;

                () = &mut shutdown => {
                    let in_flight = tasks.len();
                    info!(in_flight, "shutdown signal received, draining connections");
                    break;
                }

                res = listener.accept() => {
                    let (stream, remote_addr) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };

                    let glue = Arc::clone(&glue);
                    let io = TokioIo::new(stream);

                    tasks.spawn(async move {
                        // Called once per request on the connection.
                        let svc = service_fn(move |req| {
                            let glue = Arc::clone(&glue);
                            async move { dispatch(glue, req, remote_addr).await }
                        });

                        // HTTP/1.1 or HTTP/2, whatever the client negotiates.
                        if let Err(e) = ConnBuilder::new(TokioExecutor::new())
                            .serve_connection(io, svc)
                            .await
                        {
                            error!(peer = %remote_addr, "connection error: {e}");
                        }
                    });
                }

                // Reap finished tasks so the set does not grow without bound.
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        while tasks.join_next().await.is_some() {}

        info!("glue stopped");
        Ok(())
    }
}

// ── Request dispatch ──────────────────────────────────────────────────────────

/// Reads the body, then hands the request to the application.
///
/// Infallible: every failure becomes a response, hyper never sees an error.
async fn dispatch(
    glue: Arc<Glue>,
    req: hyper::Request<Incoming>,
    remote_addr: SocketAddr,
) -> Result<http::Response<Full<Bytes>>, std::convert::Infallible> {
    let (parts, body) = req.into_parts();
    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            debug!(peer = %remote_addr, "failed to read request body: {e}");
            let mut response = http::Response::new(Full::new(Bytes::new()));
            *response.status_mut() = http::StatusCode::BAD_REQUEST;
            return Ok(response);
        }
    };

    let req = http::Request::from_parts(parts, body);
    Ok(glue.serve_http(req, Some(remote_addr)).await)
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on the first SIGTERM or SIGINT (Ctrl-C only, on Windows).
///
/// If a handler cannot be installed that signal source is ignored rather
/// than taking the server down.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to install Ctrl-C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c   => {}
        () = sigterm  => {}
    }
}
