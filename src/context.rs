//! Per-request dependency scope and the handler-chain executor.
//!
//! # What one request goes through
//!
//! ```text
//! Context::new            ← registry seeded with Request, ResponseWriter,
//!                           dyn WriteResponse and the Context itself
//! handle()
//!   for h in chain ++ [router dispatch]:
//!       call h            ← parameters from request scope, then process scope
//!       Err(e)            → park e, stop
//!       Deferred(after)   → push onto the cleanup stack
//!       wrote_header()    → stop
//!   pop cleanup stack     ← LIFO, always, whatever stopped the loop
//!   parked failure        → Err unless an after-handler recovered it
//! ```

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};

use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::app::Glue;
use crate::error::Error;
use crate::handler::{self, BoxedHandler, Handler};
use crate::outcome::{AfterHandler, Outcome};
use crate::registry::{FromRegistry, Lookup, Registry};
use crate::request::Request;
use crate::writer::{ResponseWriter, WriteResponse};

struct Inner {
    registry: RwLock<Registry>,
    glue: Arc<Glue>,
    writer: ResponseWriter,
    failure: Mutex<Option<Error>>,
}

// The self-entry in a request registry. Weak, so the scope never owns itself.
struct SelfRef(Weak<Inner>);

/// One request's dependency scope.
///
/// A cheap handle: clones share the same scope. Declare a `Context` parameter
/// to get it, for instance to run another handler with full injection from
/// inside an [`AfterHandler`].
#[derive(Clone)]
pub struct Context {
    inner: Arc<Inner>,
}

impl Context {
    pub(crate) fn new(glue: Arc<Glue>, request: Request, writer: ResponseWriter) -> Self {
        let inner = Arc::new_cyclic(|weak| {
            let mut registry = Registry::new();
            registry.register(request);
            registry.register(writer.clone());
            // Also under the abstraction, for code that only needs to write.
            registry.register_as::<dyn WriteResponse>(Arc::new(writer.clone()));
            registry.register(SelfRef(Weak::clone(weak)));
            Inner {
                registry: RwLock::new(registry),
                glue,
                writer,
                failure: Mutex::new(None),
            }
        });
        Self { inner }
    }

    pub(crate) fn glue(&self) -> &Arc<Glue> {
        &self.inner.glue
    }

    pub fn writer(&self) -> &ResponseWriter {
        &self.inner.writer
    }

    /// Adds a request-scoped value, visible to every handler that runs after
    /// this call. Shadows a process-wide value of the same type.
    pub fn register<T: Send + Sync + 'static>(&self, value: T) {
        self.inner.registry.write().register(value);
    }

    pub fn register_as<T: ?Sized + Send + Sync + 'static>(&self, value: Arc<T>) {
        self.inner.registry.write().register_as::<T>(value);
    }

    /// Resolves `T` from the request scope, then the process scope.
    pub fn resolve<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<T>, Error> {
        let registry = self.inner.registry.read();
        let chain = [&*registry, self.inner.glue.registry()];
        Lookup::new(&chain).resolve::<T>()
    }

    /// Invokes `handler` with its parameters injected from this scope.
    pub async fn call<H, Args>(&self, handler: H) -> Result<Outcome, Error>
    where
        H: Handler<Args>,
        Args: 'static,
    {
        self.invoke(&handler::boxed(handler), None).await
    }

    /// Takes the failure that aborted this request's chain, if any.
    ///
    /// Meant for after-handlers: once taken, the request no longer counts as
    /// failed and whatever the caller writes is the response.
    pub fn recover(&self) -> Option<Error> {
        self.inner.failure.lock().take()
    }

    /// Runs `handler` against `[scope?, request scope, process scope]`.
    ///
    /// The registry lock is released before the handler body runs, so
    /// handlers may register request-scoped values themselves.
    pub(crate) async fn invoke(
        &self,
        handler: &BoxedHandler,
        scope: Option<&Registry>,
    ) -> Result<Outcome, Error> {
        // Extractors and the handler's synchronous prologue run here, outside
        // the future, so they need their own unwind guard.
        let invocation = panic::catch_unwind(AssertUnwindSafe(|| {
            let registry = self.inner.registry.read();
            let process = self.inner.glue.registry();
            match scope {
                Some(scope) => scope.call(handler, &[&*registry, process]),
                None => registry.call(handler, &[process]),
            }
        }))
        .unwrap_or_else(|payload| Err(Error::panicked(payload)))?;
        AssertUnwindSafe(invocation)
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| Err(Error::panicked(payload)))
    }

    /// Runs the global chain followed by the router, then the after-handlers.
    ///
    /// Returns the failure that aborted the chain unless an after-handler
    /// recovered it.
    pub(crate) async fn handle(&self) -> Result<(), Error> {
        let mut deferred = Vec::new();
        if let Err(err) = self.run_chain(&mut deferred).await {
            debug!(error = %err, pending = deferred.len(), "chain aborted, unwinding");
            *self.inner.failure.lock() = Some(err);
        }
        while let Some(after) = deferred.pop() {
            after.run(self.clone()).await;
        }
        match self.recover() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn run_chain(&self, deferred: &mut Vec<AfterHandler>) -> Result<(), Error> {
        let glue = Arc::clone(&self.inner.glue);
        for handler in glue.chain() {
            match self.invoke(handler, None).await? {
                Outcome::Empty => {}
                Outcome::Deferred(after) => deferred.push(after),
                other => warn!(
                    outcome = ?other,
                    "chain handler returned a response instead of an AfterHandler; ignored"
                ),
            }
            if self.inner.writer.wrote_header() {
                break;
            }
        }
        Ok(())
    }
}

impl FromRegistry for Context {
    fn from_registry(lookup: &Lookup<'_>) -> Result<Self, Error> {
        lookup
            .resolve::<SelfRef>()?
            .0
            .upgrade()
            .map(|inner| Context { inner })
            .ok_or(Error::MissingDependency(std::any::type_name::<Context>()))
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("registry", &*self.inner.registry.read())
            .field("writer", &self.inner.writer)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use bytes::Bytes;
    use http::StatusCode;

    use super::*;
    use crate::writer::BufferedSink;

    type Log = Arc<Mutex<Vec<&'static str>>>;

    fn context(glue: Glue) -> Context {
        let req = http::Request::builder().uri("/").body(Bytes::new()).unwrap();
        Context::new(
            Arc::new(glue),
            Request::from_http(req, None),
            ResponseWriter::new(BufferedSink::default()),
        )
    }

    fn step(
        log: &Log,
        name: &'static str,
    ) -> impl Fn() -> futures::future::Ready<()> + Send + Sync + 'static {
        let log = Arc::clone(log);
        move || {
            log.lock().push(name);
            futures::future::ready(())
        }
    }

    fn deferring(
        log: &Log,
        name: &'static str,
    ) -> impl Fn() -> futures::future::Ready<AfterHandler> + Send + Sync + 'static {
        let log = Arc::clone(log);
        move || {
            let log = Arc::clone(&log);
            futures::future::ready(AfterHandler::new(move |_| async move {
                log.lock().push(name);
            }))
        }
    }

    #[tokio::test]
    async fn chain_runs_in_registration_order_then_router() {
        let log = Log::default();
        let glue = Glue::new().add(step(&log, "first")).add(step(&log, "second"));
        let ctx = context(glue);

        ctx.handle().await.unwrap();

        assert_eq!(*log.lock(), vec!["first", "second"]);
        // The router answered with its default not-found.
        assert_eq!(ctx.writer().status(), Some(StatusCode::NOT_FOUND));
    }

    #[tokio::test]
    async fn writing_a_status_stops_the_chain() {
        let log = Log::default();
        let routed = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&routed);
        let glue = Glue::new()
            .add(|w: ResponseWriter| async move { w.write_header(StatusCode::UNAUTHORIZED) })
            .add(step(&log, "never"))
            .get("/", move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async {}
            });
        let ctx = context(glue);

        ctx.handle().await.unwrap();

        assert!(log.lock().is_empty());
        assert_eq!(routed.load(Ordering::SeqCst), 0);
        assert_eq!(ctx.writer().status(), Some(StatusCode::UNAUTHORIZED));
    }

    #[tokio::test]
    async fn after_handlers_unwind_in_reverse() {
        let log = Log::default();
        let glue = Glue::new()
            .add(deferring(&log, "a"))
            .add(deferring(&log, "b"))
            .add(deferring(&log, "c"));
        context(glue).handle().await.unwrap();

        assert_eq!(*log.lock(), vec!["c", "b", "a"]);
    }

    #[tokio::test]
    async fn after_handlers_run_when_the_chain_aborts() {
        struct Unregistered;

        let log = Log::default();
        let glue = Glue::new()
            .add(deferring(&log, "a"))
            .add(deferring(&log, "b"))
            .add(|_: Arc<Unregistered>| async {})
            .add(deferring(&log, "unreached"));
        let err = context(glue).handle().await.unwrap_err();

        assert!(err.is_resolution_failure());
        assert_eq!(*log.lock(), vec!["b", "a"]);
    }

    async fn explode() {
        panic!("handler exploded")
    }

    async fn explode_later(_: Context) {
        panic!("cleanup exploded")
    }

    #[tokio::test]
    async fn panics_abort_like_errors() {
        let log = Log::default();
        let glue = Glue::new().add(deferring(&log, "cleanup")).add(explode);
        let err = context(glue).handle().await.unwrap_err();

        assert!(matches!(err, Error::Panicked(ref m) if m == "handler exploded"));
        assert_eq!(*log.lock(), vec!["cleanup"]);
    }

    #[tokio::test]
    async fn panics_before_the_future_exists_still_unwind() {
        let log = Log::default();
        let glue = Glue::new()
            .add(deferring(&log, "cleanup"))
            .add(|| -> futures::future::Ready<()> { panic!("sync part exploded") });
        let err = context(glue).handle().await.unwrap_err();

        assert!(matches!(err, Error::Panicked(ref m) if m == "sync part exploded"));
        assert_eq!(*log.lock(), vec!["cleanup"]);
    }

    #[tokio::test]
    async fn panicking_extractor_is_contained() {
        struct Flaky;

        impl FromRegistry for Flaky {
            fn from_registry(_: &Lookup<'_>) -> Result<Self, Error> {
                panic!("extractor exploded")
            }
        }

        let log = Log::default();
        let glue = Glue::new()
            .add(deferring(&log, "cleanup"))
            .add(|_: Flaky| async {});
        let ctx = context(glue);
        let err = ctx.handle().await.unwrap_err();

        assert!(matches!(err, Error::Panicked(ref m) if m == "extractor exploded"));
        assert_eq!(*log.lock(), vec!["cleanup"]);
        // The registry lock was released during the unwind.
        ctx.register(1u8);
    }

    #[tokio::test]
    async fn panicking_after_handler_does_not_stop_the_others() {
        let log = Log::default();
        let glue = Glue::new()
            .add(deferring(&log, "outer"))
            .add(|| async { AfterHandler::new(explode_later) });
        context(glue).handle().await.unwrap();

        assert_eq!(*log.lock(), vec!["outer"]);
    }

    #[tokio::test]
    async fn after_handler_can_recover_the_failure() {
        let glue = Glue::new()
            .add(|| async {
                AfterHandler::new(|ctx: Context| async move {
                    if ctx.recover().is_some() {
                        ctx.writer().write_header(StatusCode::SERVICE_UNAVAILABLE);
                    }
                })
            })
            .add(|| async { Err::<(), _>(std::io::Error::other("db down")) });
        let ctx = context(glue);

        ctx.handle().await.unwrap();
        assert_eq!(ctx.writer().status(), Some(StatusCode::SERVICE_UNAVAILABLE));
    }

    #[tokio::test]
    async fn status_writer_still_gets_its_after_handler() {
        let log = Log::default();
        let after_log = Arc::clone(&log);
        let glue = Glue::new().add(move |w: ResponseWriter| {
            let log = Arc::clone(&after_log);
            async move {
                w.write_header(StatusCode::FORBIDDEN);
                AfterHandler::new(move |_| async move { log.lock().push("after") })
            }
        });
        context(glue).handle().await.unwrap();

        assert_eq!(*log.lock(), vec!["after"]);
    }

    #[tokio::test]
    async fn response_bodies_from_chain_handlers_are_ignored() {
        let glue = Glue::new().add(|| async { "not a cleanup" }).get("/", || async { "routed" });
        let ctx = context(glue);

        ctx.handle().await.unwrap();
        assert_eq!(ctx.writer().status(), Some(StatusCode::OK));
        assert_eq!(ctx.writer().size(), "routed".len());
    }

    #[tokio::test]
    async fn request_scoped_values_reach_later_handlers() {
        struct User(&'static str);

        let glue = Glue::new()
            .add(|ctx: Context| async move { ctx.register(User("alice")) })
            .get("/", |user: Arc<User>| async move { user.0 });
        let ctx = context(glue);

        ctx.handle().await.unwrap();
        assert_eq!(ctx.writer().size(), "alice".len());
    }

    #[tokio::test]
    async fn context_resolves_itself_and_both_writer_keys() {
        let ctx = context(Glue::new());
        let outcome = ctx
            .call(|c: Context, w: ResponseWriter, abstracted: Arc<dyn WriteResponse>| async move {
                abstracted.write(b"x");
                assert!(w.wrote_header());
                assert_eq!(c.writer().size(), 1);
            })
            .await
            .unwrap();
        assert!(matches!(outcome, Outcome::Empty));
    }
}
