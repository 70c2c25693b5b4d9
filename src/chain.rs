//! Chain entries and the middleware continuation.

use std::sync::Arc;

use crate::error::Error;
use crate::handler::{BoxFuture, BoxedHandler, BoxedMiddleware};
use crate::method::Method;
use crate::pattern::Pattern;
use crate::request::Request;
use crate::response::Response;
use crate::router::Router;

/// One registered unit in a router's dispatch chain.
///
/// Registration order is the whole story: dispatch scans entries
/// first-registered-first and the first one that applies decides what
/// happens next.
pub(crate) enum ChainEntry {
    /// A terminal handler bound to one method, preceded by its route-scoped
    /// middleware.
    Route {
        pattern: Arc<Pattern>,
        method: Method,
        middlewares: Arc<[BoxedMiddleware]>,
        handler: BoxedHandler,
    },
    /// Middleware applied to every request whose path the pattern covers.
    Middleware {
        pattern: Arc<Pattern>,
        middleware: BoxedMiddleware,
    },
    /// A nested router mounted under a path prefix.
    Mount {
        pattern: Arc<Pattern>,
        router: Arc<Router>,
    },
}

/// The continuation a middleware invokes to hand the request to the rest of
/// the chain.
///
/// [`run`](Self::run) consumes the token, so a continuation cannot fire
/// twice — the borrow checker rejects the second call. Dropping it without
/// calling `run` short-circuits the chain instead: nothing downstream runs,
/// and the middleware's own writes to the response stand.
pub struct Next {
    resume: Box<dyn FnOnce() -> BoxFuture<Result<(), Error>> + Send + 'static>,
}

impl Next {
    pub(crate) fn new(
        resume: impl FnOnce() -> BoxFuture<Result<(), Error>> + Send + 'static,
    ) -> Self {
        Self { resume: Box::new(resume) }
    }

    /// Resumes dispatch with the remaining chain and returns once everything
    /// downstream has finished. A downstream error surfaces here, where the
    /// middleware may inspect it or pass it on with `?`.
    pub async fn run(self) -> Result<(), Error> {
        (self.resume)().await
    }
}

/// Walks a route's private middleware list and finally its handler. Each
/// middleware receives a continuation covering the positions after its own.
pub(crate) fn run_route(
    middlewares: Arc<[BoxedMiddleware]>,
    handler: BoxedHandler,
    index: usize,
    req: Request,
    res: Response,
) -> BoxFuture<Result<(), Error>> {
    Box::pin(async move {
        match middlewares.get(index).cloned() {
            Some(middleware) => {
                let next = {
                    let middlewares = Arc::clone(&middlewares);
                    let handler = Arc::clone(&handler);
                    let req = req.clone();
                    let res = res.clone();
                    Next::new(move || run_route(middlewares, handler, index + 1, req, res))
                };
                middleware.call(req, res, next).await
            }
            None => handler.call(req, res).await,
        }
    })
}
