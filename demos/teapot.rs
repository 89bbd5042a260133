//! Dependency injection, deferred cleanup and failure recovery in one process.
//!
//! Run with:
//!   cargo run --example teapot
//!
//! Try:
//!   curl -i http://localhost:5000/purple_teapot     # 418 that is purple!
//!   curl -i http://localhost:5000/teapot            # raw JSON bytes
//!   curl -i http://localhost:5000/div/4             # 0.25, COMMIT
//!   curl -i http://localhost:5000/div/0             # 500, ROLLBACK
//!   curl -i http://localhost:5000/a/../purple_teapot  # 301 to /purple_teapot

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use glue::{AfterHandler, Glue, Params, ResponseWriter, middleware};
use tracing::info;

/// Stands in for a connection pool.
#[derive(Default)]
struct Db {
    txn: AtomicU64,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    Glue::new()
        .register(Db::default())
        .add(middleware::access_log)
        .add(transaction)
        .add(middleware::recover)
        .get("/{type}_teapot", teapot)
        .get("/teapot", teapot_json)
        .get("/div/{n}", divide)
        .listen()
        .await
        .expect("server error");
}

// Sees the final status because its after-handler runs after `recover`'s.
async fn transaction(db: Arc<Db>, writer: ResponseWriter) -> AfterHandler {
    let id = db.txn.fetch_add(1, Ordering::Relaxed);
    info!(txn = id, "(pretend) BEGIN");

    AfterHandler::new(move |_| async move {
        if writer.status().is_some_and(|s| s.is_server_error()) {
            info!(txn = id, "(pretend) ROLLBACK");
        } else {
            info!(txn = id, "(pretend) COMMIT");
        }
    })
}

async fn teapot(params: Params) -> (u16, String) {
    (418, format!("that is {}!", params.get("type").unwrap_or("plain")))
}

async fn teapot_json() -> (u16, &'static [u8]) {
    (418, br#"{"Teapot":{"IsReady":false}}"#)
}

async fn divide(params: Params) -> Result<String, String> {
    let n: i64 = params
        .get("n")
        .unwrap_or_default()
        .parse()
        .map_err(|e| format!("not a number: {e}"))?;
    if n == 0 {
        panic!("attempt to divide by zero");
    }
    Ok(format!("{}\n", 1.0 / n as f64))
}
