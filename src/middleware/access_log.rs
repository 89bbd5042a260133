use std::time::Instant;

use chrono::{DateTime, Local};
use tracing::info;

use crate::outcome::AfterHandler;
use crate::request::Request;
use crate::writer::ResponseWriter;

/// Logs one Apache combined-format line per request, with the request
/// latency in microseconds appended.
///
/// ```text
/// 127.0.0.1 - - [19/Oct/2026:10:02:11 +0000] "GET /purple_teapot HTTP/1.1" 418 15 "-" "curl/8.5.0" 184
/// ```
///
/// Lines go to the `glue::access` tracing target at `info` level.
///
/// The status is whatever was written when the after-handlers ran. A failure
/// nobody recovered gets its fallback `500` later, in `Glue::serve_http`, so
/// such a line shows `-`; `serve_http` logs that status with the error. Add
/// [`recover`](crate::middleware::recover) after `access_log` to have the
/// `500` written, and logged, here.
pub async fn access_log(writer: ResponseWriter, req: Request) -> AfterHandler {
    let started_at = Local::now();
    let start = Instant::now();

    AfterHandler::new(move |_| async move {
        let line = Line {
            req: &req,
            status: writer.status().map(|s| s.as_u16()),
            size: writer.size(),
            started_at,
            micros: start.elapsed().as_micros(),
        };
        info!(target: "glue::access", "{}", line.render());
    })
}

struct Line<'a> {
    req: &'a Request,
    status: Option<u16>,
    size: usize,
    started_at: DateTime<Local>,
    micros: u128,
}

impl Line<'_> {
    fn render(&self) -> String {
        let host = self
            .req
            .remote_addr()
            .map_or_else(|| "-".to_owned(), |addr| addr.ip().to_string());
        let status = self.status.map_or_else(|| "-".to_owned(), |s| s.to_string());
        format!(
            "{host} - - [{}] \"{} {} {:?}\" {status} {} \"{}\" \"{}\" {}",
            self.started_at.format("%d/%b/%Y:%H:%M:%S %z"),
            self.req.method(),
            self.req.request_uri(),
            self.req.version(),
            self.size,
            self.req.header("referer").unwrap_or("-"),
            self.req.header("user-agent").unwrap_or("-"),
            self.micros,
        )
    }
}
