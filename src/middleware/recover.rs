use http::header::CONTENT_TYPE;
use http::{HeaderValue, StatusCode};
use tracing::error;

use crate::context::Context;
use crate::outcome::AfterHandler;

/// Turns a failure that aborted the chain into a `500` carrying the error
/// text.
///
/// Only failures raised after this handler ran are seen, so add it before
/// anything that may fail. If a status was already written the failure is
/// still taken and logged, but the response is left alone.
pub async fn recover() -> AfterHandler {
    AfterHandler::new(|ctx: Context| async move {
        let Some(err) = ctx.recover() else {
            return;
        };
        error!(error = %err, "recovered from failed request");

        let writer = ctx.writer();
        if writer.wrote_header() {
            return;
        }
        writer.insert_header(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
        writer.write_header(StatusCode::INTERNAL_SERVER_ERROR);
        writer.write(format!("{err}\n").as_bytes());
    })
}
