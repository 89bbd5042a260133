//! Handler trait and type erasure.
//!
//! # How handlers of different shapes are stored
//!
//! The chain and the router hold handlers with *different* parameter lists in
//! one `Vec`. Each one is erased behind [`ErasedHandler`] once, at setup time:
//!
//! ```text
//! async fn teapot(params: Params) -> (u16, String) { … }  ← user writes this
//!        ↓ glue.get("/{type}_teapot", teapot)
//! boxed(teapot)                                           ← Handler<(Params,)> impl
//!        ↓
//! Arc::new(FnHandler { f: teapot, .. })                   ← stored as BoxedHandler
//!        ↓ at request time
//! handler.call(&lookup)                                   ← resolve Params, start the future
//!        ↓
//! Box::pin(async { teapot(params).await.into_outcome() }) ← Invocation
//! ```
//!
//! Resolution is synchronous and happens before the future is created, so a
//! missing dependency is reported before any handler code runs.

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::error::Error;
use crate::outcome::{IntoOutcome, Outcome};
use crate::registry::{FromRegistry, Lookup};

/// A started handler call: parameters already resolved, body not yet polled.
pub type Invocation = BoxFuture<'static, Result<Outcome, Error>>;

/// Internal dispatch interface.
///
/// `#[doc(hidden)] pub` rather than `pub(crate)` because it appears in the
/// public [`BoxedHandler`] alias used by [`Registry::call`](crate::Registry::call).
#[doc(hidden)]
pub trait ErasedHandler {
    fn call(&self, lookup: &Lookup<'_>) -> Result<Invocation, Error>;
}

/// A type-erased handler shared read-only by every request.
pub type BoxedHandler = Arc<dyn ErasedHandler + Send + Sync + 'static>;

// ── Public Handler trait ──────────────────────────────────────────────────────

/// Implemented for every valid handler.
///
/// You never implement this yourself. It is satisfied by any function or
/// closure returning a future, taking up to twelve parameters that implement
/// [`FromRegistry`], whose output implements [`IntoOutcome`]:
///
/// ```text
/// async fn name(a: A, b: B, …) -> impl IntoOutcome
/// ```
///
/// `Args` is the parameter tuple; it only exists so the per-arity impls do not
/// overlap, and is always inferred.
///
/// The trait is **sealed**: only the blanket impls below can satisfy it.
pub trait Handler<Args>: private::Sealed<Args> + Send + Sync + 'static {
    #[doc(hidden)]
    fn invoke(&self, lookup: &Lookup<'_>) -> Result<Invocation, Error>;
}

mod private {
    pub trait Sealed<Args> {}
}

/// Erases `handler` into the form the chain and router store.
pub fn boxed<H, Args>(handler: H) -> BoxedHandler
where
    H: Handler<Args>,
    Args: 'static,
{
    Arc::new(FnHandler { handler, _args: PhantomData })
}

struct FnHandler<H, Args> {
    handler: H,
    // `fn() -> Args` keeps the wrapper `Send + Sync` whatever `Args` is.
    _args: PhantomData<fn() -> Args>,
}

impl<H, Args> ErasedHandler for FnHandler<H, Args>
where
    H: Handler<Args>,
{
    fn call(&self, lookup: &Lookup<'_>) -> Result<Invocation, Error> {
        self.handler.invoke(lookup)
    }
}

// ── Blanket implementations ───────────────────────────────────────────────────

macro_rules! impl_handler {
    ($($ty:ident),*) => {
        impl<F, Fut, R, $($ty,)*> private::Sealed<($($ty,)*)> for F
        where
            F: Fn($($ty,)*) -> Fut + Send + Sync + 'static,
            Fut: Future<Output = R> + Send + 'static,
            R: IntoOutcome,
            $( $ty: FromRegistry, )*
        {
        }

        #[allow(non_snake_case, unused_variables)]
        impl<F, Fut, R, $($ty,)*> Handler<($($ty,)*)> for F
        where
            F: Fn($($ty,)*) -> Fut + Send + Sync + 'static,
            Fut: Future<Output = R> + Send + 'static,
            R: IntoOutcome,
            $( $ty: FromRegistry, )*
        {
            fn invoke(&self, lookup: &Lookup<'_>) -> Result<Invocation, Error> {
                $(
                    let $ty = <$ty as FromRegistry>::from_registry(lookup)
                        .map_err(Error::unresolvable::<$ty>)?;
                )*
                let fut = (self)($($ty,)*);
                Ok(Box::pin(async move { fut.await.into_outcome() }))
            }
        }
    };
}

impl_handler!();
impl_handler!(T1);
impl_handler!(T1, T2);
impl_handler!(T1, T2, T3);
impl_handler!(T1, T2, T3, T4);
impl_handler!(T1, T2, T3, T4, T5);
impl_handler!(T1, T2, T3, T4, T5, T6);
impl_handler!(T1, T2, T3, T4, T5, T6, T7);
impl_handler!(T1, T2, T3, T4, T5, T6, T7, T8);
impl_handler!(T1, T2, T3, T4, T5, T6, T7, T8, T9);
impl_handler!(T1, T2, T3, T4, T5, T6, T7, T8, T9, T10);
impl_handler!(T1, T2, T3, T4, T5, T6, T7, T8, T9, T10, T11);
impl_handler!(T1, T2, T3, T4, T5, T6, T7, T8, T9, T10, T11, T12);
