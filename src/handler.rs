//! Callback traits and type erasure.
//!
//! # How async callbacks are stored
//!
//! The router holds three kinds of callbacks — route handlers, middleware,
//! and error handlers — of *different* concrete types in plain `Vec`s. Rust
//! collections can only hold one concrete type, so each kind gets the same
//! treatment: a sealed public trait, a blanket impl over `async fn`s with
//! the right signature, and an `Arc<dyn …>` trait object the chain stores
//! and clones per dispatch.
//!
//! The chain from user code to vtable call, shown for handlers:
//!
//! ```text
//! async fn hello(req: Request, res: Response) -> Result<()>   ← user writes this
//!        ↓ router.get("/", hello)
//! hello.into_boxed()                                          ← Handler blanket impl
//!        ↓
//! Arc::new(FnHandler(hello))                                  ← heap-allocated wrapper
//!        ↓  stored as BoxedHandler = Arc<dyn ErasedHandler>
//! handler.call(req, res)  at request time                     ← one vtable dispatch
//! ```
//!
//! The only runtime cost per chain hop is **one Arc clone** (atomic inc) +
//! **one virtual call** — negligible compared to network I/O.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::chain::Next;
use crate::error::Error;
use crate::request::Request;
use crate::response::Response;

// ── Internal types ────────────────────────────────────────────────────────────

/// A heap-allocated, type-erased future.
///
/// `Pin<Box<…>>` is required because the async runtime must be able to poll
/// the future in-place — it cannot move it in memory after the first poll.
/// `Send + 'static` let tokio move the future across threads safely.
pub(crate) type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// Internal dispatch interface for route handlers.
///
/// `#[doc(hidden)] pub` rather than `pub(crate)` because it appears in the
/// public `BoxedHandler` alias. External crates cannot usefully interact
/// with this trait.
#[doc(hidden)]
pub trait ErasedHandler {
    fn call(&self, req: Request, res: Response) -> BoxFuture<Result<(), Error>>;
}

#[doc(hidden)]
pub trait ErasedMiddleware {
    fn call(&self, req: Request, res: Response, next: Next) -> BoxFuture<Result<(), Error>>;
}

#[doc(hidden)]
pub trait ErasedErrorHandler {
    fn call(&self, req: Request, res: Response, error: Error) -> BoxFuture<Result<(), Error>>;
}

/// A heap-allocated, type-erased handler shared across concurrent requests.
///
/// `Arc` gives cheap, thread-safe shared ownership (one atomic reference
/// count increment per request) without copying the handler.
#[doc(hidden)]
pub type BoxedHandler = Arc<dyn ErasedHandler + Send + Sync + 'static>;

/// A type-erased middleware ready for registration.
///
/// This is the one erased alias that shows up in a public signature:
/// [`Router::route`](crate::Router::route) takes its route-scoped middleware
/// as `Vec<BoxedMiddleware>`, built by calling [`Middleware::boxed`] on each
/// `async fn`.
pub type BoxedMiddleware = Arc<dyn ErasedMiddleware + Send + Sync + 'static>;

#[doc(hidden)]
pub type BoxedErrorHandler = Arc<dyn ErasedErrorHandler + Send + Sync + 'static>;

// ── Public callback traits ────────────────────────────────────────────────────

/// Implemented for every valid route handler.
///
/// You never implement this yourself. It is automatically satisfied for any
/// `async fn` with the signature:
///
/// ```text
/// async fn name(req: Request, res: Response) -> riva::Result<()>
/// ```
///
/// The trait is **sealed** (via a private supertrait): only the blanket impl
/// below can satisfy it. This prevents accidental misuse and keeps the API
/// surface stable across versions.
pub trait Handler: private::SealedHandler + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed(self) -> BoxedHandler;
}

/// Implemented for every valid middleware.
///
/// Automatically satisfied for any `async fn` with the signature:
///
/// ```text
/// async fn name(req: Request, res: Response, next: Next) -> riva::Result<()>
/// ```
///
/// Sealed, like [`Handler`].
pub trait Middleware: private::SealedMiddleware + Send + Sync + 'static {
    /// Erases the concrete type for registration with
    /// [`Router::route`](crate::Router::route).
    fn boxed(self) -> BoxedMiddleware;
}

/// Implemented for every valid error handler.
///
/// Automatically satisfied for any `async fn` with the signature:
///
/// ```text
/// async fn name(req: Request, res: Response, error: Error) -> riva::Result<()>
/// ```
///
/// Sealed, like [`Handler`].
pub trait ErrorHandler: private::SealedErrorHandler + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed(self) -> BoxedErrorHandler;
}

/// The sealing module. Because these supertraits are private, external
/// crates cannot name them and therefore cannot implement the callback
/// traits on their own types. One sealing trait per callback kind: a shared
/// one would make the blanket impls overlap.
mod private {
    pub trait SealedHandler {}
    pub trait SealedMiddleware {}
    pub trait SealedErrorHandler {}
}

// ── Blanket implementations ───────────────────────────────────────────────────

impl<F, Fut> private::SealedHandler for F
where
    F: Fn(Request, Response) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), Error>> + Send + 'static,
{
}

impl<F, Fut> Handler for F
where
    F: Fn(Request, Response) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), Error>> + Send + 'static,
{
    fn into_boxed(self) -> BoxedHandler {
        Arc::new(FnHandler(self))
    }
}

impl<F, Fut> private::SealedMiddleware for F
where
    F: Fn(Request, Response, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), Error>> + Send + 'static,
{
}

impl<F, Fut> Middleware for F
where
    F: Fn(Request, Response, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), Error>> + Send + 'static,
{
    fn boxed(self) -> BoxedMiddleware {
        Arc::new(FnMiddleware(self))
    }
}

impl<F, Fut> private::SealedErrorHandler for F
where
    F: Fn(Request, Response, Error) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), Error>> + Send + 'static,
{
}

impl<F, Fut> ErrorHandler for F
where
    F: Fn(Request, Response, Error) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), Error>> + Send + 'static,
{
    fn into_boxed(self) -> BoxedErrorHandler {
        Arc::new(FnErrorHandler(self))
    }
}

// ── Concrete wrappers ─────────────────────────────────────────────────────────

/// Newtype wrappers that hold a concrete callback `F` and implement the
/// erased traits, bridging the typed world to the trait-object world.
struct FnHandler<F>(F);

impl<F, Fut> ErasedHandler for FnHandler<F>
where
    F: Fn(Request, Response) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), Error>> + Send + 'static,
{
    fn call(&self, req: Request, res: Response) -> BoxFuture<Result<(), Error>> {
        Box::pin((self.0)(req, res))
    }
}

struct FnMiddleware<F>(F);

impl<F, Fut> ErasedMiddleware for FnMiddleware<F>
where
    F: Fn(Request, Response, Next) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), Error>> + Send + 'static,
{
    fn call(&self, req: Request, res: Response, next: Next) -> BoxFuture<Result<(), Error>> {
        Box::pin((self.0)(req, res, next))
    }
}

struct FnErrorHandler<F>(F);

impl<F, Fut> ErasedErrorHandler for FnErrorHandler<F>
where
    F: Fn(Request, Response, Error) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), Error>> + Send + 'static,
{
    fn call(&self, req: Request, res: Response, error: Error) -> BoxFuture<Result<(), Error>> {
        Box::pin((self.0)(req, res, error))
    }
}
