//! Handler trait and type erasure.
//!
//! The dispatcher holds handlers of *different* concrete types in one
//! `endpoint → handler` map, so handlers are stored as trait objects behind
//! a common erased interface. The chain from user code to vtable call:
//!
//! ```text
//! async fn show(req: Request, args: PathArgs) -> Response { … }
//!        ↓ dispatcher.handler("show", show)
//! show.into_boxed_handler()                        ← Handler blanket impl
//!        ↓
//! Arc::new(FnHandler(show))                        ← heap-allocated wrapper
//!        ↓  stored as BoxedHandler = Arc<dyn ErasedHandler>
//! handler.call(req, args)  at request time         ← one vtable dispatch
//! ```
//!
//! The only runtime cost per request is one `Arc` clone plus one virtual
//! call.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::dispatch::HttpError;
use crate::request::Request;
use crate::response::{IntoResponse, Response};
use crate::routes::PathArgs;

/// A heap-allocated, type-erased future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// What a handler invocation produces: a response, or an HTTP-level
/// short-circuit (not-found, redirect) converted to a response at the
/// application boundary.
pub type HandlerResult = Result<Response, HttpError>;

// ── Internal types ────────────────────────────────────────────────────────────

/// Internal dispatch interface.
///
/// `#[doc(hidden)] pub` rather than `pub(crate)` because it appears in the
/// return type of the public `Handler` trait's `into_boxed_handler` method.
#[doc(hidden)]
pub trait ErasedHandler {
    fn call(&self, req: Request, args: PathArgs) -> BoxFuture<'static, HandlerResult>;
}

/// A heap-allocated, type-erased handler shared across concurrent requests.
#[doc(hidden)]
pub type BoxedHandler = Arc<dyn ErasedHandler + Send + Sync + 'static>;

// ── Public Handler trait ──────────────────────────────────────────────────────

/// Implemented for every valid route handler.
///
/// You never implement this yourself. It is automatically satisfied for any
/// `async fn` with the signature:
///
/// ```text
/// async fn name(req: Request, args: PathArgs) -> impl IntoHandlerResult
/// ```
///
/// The trait is sealed: only the blanket impl below can satisfy it.
pub trait Handler: private::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self) -> BoxedHandler;
}

mod private {
    pub trait Sealed {}
}

// ── Handler output conversions ────────────────────────────────────────────────

/// Conversion of a handler's return value into a [`HandlerResult`].
///
/// Infallible handlers return a [`Response`] (or anything [`IntoResponse`]);
/// fallible ones return `Result<Response, HttpError>` and use `?` on
/// not-found or redirect conditions.
pub trait IntoHandlerResult {
    fn into_handler_result(self) -> HandlerResult;
}

impl IntoHandlerResult for Response {
    fn into_handler_result(self) -> HandlerResult {
        Ok(self)
    }
}

impl IntoHandlerResult for HandlerResult {
    fn into_handler_result(self) -> HandlerResult {
        self
    }
}

impl IntoHandlerResult for &'static str {
    fn into_handler_result(self) -> HandlerResult {
        Ok(self.into_response())
    }
}

impl IntoHandlerResult for String {
    fn into_handler_result(self) -> HandlerResult {
        Ok(self.into_response())
    }
}

// ── Blanket implementations ───────────────────────────────────────────────────

impl<F, Fut, R> private::Sealed for F
where
    F: Fn(Request, PathArgs) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoHandlerResult + Send + 'static,
{
}

impl<F, Fut, R> Handler for F
where
    F: Fn(Request, PathArgs) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoHandlerResult + Send + 'static,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(FnHandler(self))
    }
}

// ── Concrete wrapper ──────────────────────────────────────────────────────────

/// Newtype holding a concrete handler `F`, bridging the typed world to the
/// trait-object world.
struct FnHandler<F>(F);

impl<F, Fut, R> ErasedHandler for FnHandler<F>
where
    F: Fn(Request, PathArgs) -> Fut + Send + Sync,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoHandlerResult + Send + 'static,
{
    fn call(&self, req: Request, args: PathArgs) -> BoxFuture<'static, HandlerResult> {
        let fut = (self.0)(req, args);
        Box::pin(async move { fut.await.into_handler_result() })
    }
}
