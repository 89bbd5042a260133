//! Request routing.
//!
//! A [`matchit`] tree per method. The router runs as the last link of every
//! request's chain, after the explicit handlers, so it only sees requests
//! nobody answered yet.
//!
//! Before matching, the path is canonicalized. A request for `/a/../b` is
//! answered with `301 Moved Permanently` and `Location: /b`.

mod clean;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use http::header::{CONTENT_TYPE, LOCATION};
use http::{HeaderValue, Method, StatusCode};
use matchit::Router as MatchitRouter;
use percent_encoding::percent_decode_str;
use tracing::debug;

use crate::context::Context;
use crate::error::Error;
use crate::handler::{self, BoxedHandler, Handler};
use crate::outcome::Outcome;
use crate::registry::Registry;
use crate::request::{Params, Request};
use crate::response::ResponseHandler;
use crate::writer::{ResponseWriter, WriteResponse};

use clean::clean_path;

struct Route {
    pattern: String,
    handler: RouteHandler,
}

/// The route table of a [`Glue`](crate::Glue).
///
/// One radix tree per HTTP method. Patterns use `{name}` for a capture,
/// which may share a segment with literal text (`/{type}_teapot`), and a
/// trailing `{*name}` for the rest of the path. Static segments win over
/// captures. Routes are added through the builder methods on `Glue`; the
/// table is frozen once serving starts.
pub struct Router {
    routes: HashMap<Method, MatchitRouter<Route>>,
    not_found: RouteHandler,
}

impl Router {
    pub(crate) fn new() -> Self {
        Self {
            routes: HashMap::new(),
            not_found: RouteHandler::new(handler::boxed(default_not_found)),
        }
    }

    /// # Panics
    ///
    /// Panics if `pattern` is malformed or conflicts with a route already
    /// registered for `method`.
    pub(crate) fn add<H, Args>(&mut self, method: Method, pattern: &str, handler: H)
    where
        H: Handler<Args>,
        Args: 'static,
    {
        let route = Route {
            pattern: pattern.to_owned(),
            handler: RouteHandler::new(handler::boxed(handler)),
        };
        self.routes
            .entry(method)
            .or_default()
            .insert(pattern, route)
            .unwrap_or_else(|e| panic!("invalid route `{pattern}`: {e}"));
    }

    pub(crate) fn set_not_found<H, Args>(&mut self, handler: H)
    where
        H: Handler<Args>,
        Args: 'static,
    {
        self.not_found = RouteHandler::new(handler::boxed(handler));
    }

    /// Looks up `method` + `path`, returning the route and its decoded
    /// captures.
    fn lookup(&self, method: &Method, path: &str) -> Option<(&Route, Params)> {
        let matched = self.routes.get(method)?.at(path).ok()?;
        let params = matched
            .params
            .iter()
            .map(|(k, v)| (k.to_owned(), decode(v)))
            .collect();
        Some((matched.value, Params::new(params)))
    }

    pub(crate) async fn dispatch(&self, ctx: &Context) -> Result<Outcome, Error> {
        let req = ctx.resolve::<Request>()?;
        let path = req.path();

        let canonical = clean_path(path);
        if canonical != path {
            let location = match req.query() {
                Some(query) => format!("{canonical}?{query}"),
                None => canonical,
            };
            debug!(from = path, to = %location, "redirecting to canonical path");
            let writer = ctx.writer();
            match HeaderValue::try_from(location) {
                Ok(value) => writer.insert_header(LOCATION, value),
                Err(err) => debug!(error = %err, "canonical location is not a valid header"),
            }
            writer.write_header(StatusCode::MOVED_PERMANENTLY);
            return Ok(Outcome::Empty);
        }

        match self.lookup(req.method(), path) {
            Some((route, params)) => {
                debug!(route = route.pattern.as_str(), "route matched");
                route.handler.call(ctx, params).await
            }
            None => self.not_found.call(ctx, Params::default()).await,
        }
    }
}

// Captures are matched against the raw path; handlers see them decoded.
// Invalid UTF-8 after decoding keeps the raw text.
fn decode(raw: &str) -> String {
    match percent_decode_str(raw).decode_utf8() {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => raw.to_owned(),
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("methods", &self.routes.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

/// The router's link in the request chain.
pub(crate) async fn dispatch(ctx: Context) -> Result<Outcome, Error> {
    let glue = Arc::clone(ctx.glue());
    glue.router().dispatch(&ctx).await
}

async fn default_not_found(writer: ResponseWriter) {
    writer.insert_header(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
    writer.write_header(StatusCode::NOT_FOUND);
    writer.write(b"404 page not found\n");
}

/// Runs an endpoint against the live request scope and encodes its result.
///
/// The endpoint sees a route scope holding the captured [`Params`] in front
/// of the request and process scopes. Bodies go through whatever
/// `dyn ResponseHandler` is registered; an [`AfterHandler`](crate::AfterHandler)
/// is handed back to the chain executor to be scheduled.
struct RouteHandler {
    handler: BoxedHandler,
}

impl RouteHandler {
    fn new(handler: BoxedHandler) -> Self {
        Self { handler }
    }

    async fn call(&self, ctx: &Context, params: Params) -> Result<Outcome, Error> {
        let mut scope = Registry::new();
        scope.register(params);

        match ctx.invoke(&self.handler, Some(&scope)).await? {
            outcome @ (Outcome::Empty | Outcome::Deferred(_)) => Ok(outcome),
            outcome => {
                let policy = ctx.resolve::<dyn ResponseHandler>()?;
                let writer = ctx.resolve::<dyn WriteResponse>()?;
                policy.respond(writer.as_ref(), outcome);
                Ok(Outcome::Empty)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn router(patterns: &[&str]) -> Router {
        let mut router = Router::new();
        for pattern in patterns {
            router.add(Method::GET, pattern, || async {});
        }
        router
    }

    fn matched(router: &Router, path: &str) -> Option<(String, Vec<(String, String)>)> {
        let (route, params) = router.lookup(&Method::GET, path)?;
        let params = params.iter().map(|(k, v)| (k.to_owned(), v.to_owned())).collect();
        Some((route.pattern.clone(), params))
    }

    #[test]
    fn capture_can_share_a_segment() {
        let router = router(&["/{type}_teapot", "/images/img{id}.png"]);

        let (pattern, params) = matched(&router, "/purple_teapot").unwrap();
        assert_eq!(pattern, "/{type}_teapot");
        assert_eq!(params, vec![("type".to_owned(), "purple".to_owned())]);

        let (_, params) = matched(&router, "/images/img42.png").unwrap();
        assert_eq!(params, vec![("id".to_owned(), "42".to_owned())]);

        assert!(matched(&router, "/purple_kettle").is_none());
    }

    #[test]
    fn static_beats_capture_regardless_of_order() {
        let router = router(&["/users/{id}", "/users/me"]);
        assert_eq!(matched(&router, "/users/me").unwrap().0, "/users/me");
        assert_eq!(matched(&router, "/users/7").unwrap().0, "/users/{id}");
    }

    #[test]
    fn catch_all_takes_the_rest() {
        let router = router(&["/static/{*file}"]);
        let (_, params) = matched(&router, "/static/css/site%20main.css").unwrap();
        assert_eq!(params, vec![("file".to_owned(), "css/site main.css".to_owned())]);
        assert!(matched(&router, "/static/").is_none());
    }

    #[test]
    fn methods_have_separate_tables() {
        let mut router = router(&["/teapot"]);
        router.add(Method::POST, "/teapot", || async {});
        assert!(router.lookup(&Method::POST, "/teapot").is_some());
        assert!(router.lookup(&Method::DELETE, "/teapot").is_none());
    }

    #[test]
    #[should_panic(expected = "invalid route `/users/{name}`")]
    fn conflicting_route_panics() {
        router(&["/users/{id}", "/users/{name}"]);
    }

    #[test]
    #[should_panic(expected = "invalid route `/{a}{b}`")]
    fn two_captures_in_one_segment_panic() {
        router(&["/{a}{b}"]);
    }

    #[test]
    #[should_panic(expected = "invalid route `/{*rest}/tail`")]
    fn catch_all_must_be_last() {
        router(&["/{*rest}/tail"]);
    }

    #[test]
    fn undecodable_capture_stays_raw() {
        assert_eq!(decode("purple%20haze"), "purple haze");
        assert_eq!(decode("%FF"), "%FF");
    }
}
