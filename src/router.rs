//! Ordered-chain request router.
//!
//! A [`Router`] is a list of chain entries — method-bound handlers,
//! path-scoped middleware, mounted sub-routers — in registration order,
//! plus its own list of error handlers. There is no route tree and no
//! precedence scoring: dispatch scans the chain top to bottom and the first
//! entry that applies decides the outcome. Two handlers for the same route
//! never race; the one registered first wins, every time.
//!
//! Handlers need their pattern to match the path *exactly*. Middleware and
//! mounts apply on a prefix match, which is how `with("/admin", auth)`
//! covers `/admin/users/42` and how a router mounted at `/api` sees
//! `/api/ping`. A mounted router stays ignorant of its mount point: the
//! prefix patterns accumulate during descent and are prepended at match
//! time.
//!
//! Errors stay local. Each router owns its error handlers; a failure raised
//! while scanning a router's chain runs through that router's handlers
//! first, and only propagates to the mounting router when the chain is
//! exhausted.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::chain::{ChainEntry, Next, run_route};
use crate::error::Error;
use crate::handler::{
    BoxFuture, BoxedErrorHandler, BoxedMiddleware, ErrorHandler, Handler, Middleware,
};
use crate::method::Method;
use crate::pattern::Pattern;
use crate::request::Request;
use crate::response::Response;

/// An ordered chain of handlers, middleware, and mounted sub-routers.
///
/// Registration methods consume and return `self`, so routers are built as
/// one chained expression:
///
/// ```rust
/// use riva::{Request, Response, Router};
///
/// async fn list(_req: Request, res: Response) -> riva::Result<()> {
///     res.json(r#"["a","b"]"#)
/// }
///
/// async fn show(req: Request, res: Response) -> riva::Result<()> {
///     let id = req.param("id").unwrap_or_default();
///     res.text(format!("user {id}"))
/// }
///
/// let router = Router::new()
///     .get("/users", list)
///     .get("/users/:id", show);
/// ```
#[derive(Default)]
pub struct Router {
    chain: Vec<ChainEntry>,
    error_handlers: Vec<BoxedErrorHandler>,
}

impl Router {
    pub fn new() -> Self {
        Self { chain: Vec::new(), error_handlers: Vec::new() }
    }

    /// Registers a handler for a method and path.
    ///
    /// # Panics
    ///
    /// Panics if `path` is not a valid route pattern. A malformed route is a
    /// startup bug; it never surfaces at request time.
    pub fn on(self, method: Method, path: &str, handler: impl Handler) -> Self {
        self.route(method, path, Vec::new(), handler)
    }

    /// Registers a handler with route-scoped middleware run before it, in
    /// order. Route-scoped middleware only runs once this entry has been
    /// selected, so it cannot leak onto other routes.
    ///
    /// ```rust
    /// use riva::{Method, Middleware, Next, Request, Response, Router};
    ///
    /// async fn require_token(req: Request, res: Response, next: Next) -> riva::Result<()> {
    ///     match req.header("authorization") {
    ///         Some(_) => next.run().await,
    ///         None => {
    ///             res.status(riva::StatusCode::UNAUTHORIZED)?;
    ///             res.text("missing token")
    ///         }
    ///     }
    /// }
    ///
    /// async fn destroy(_req: Request, res: Response) -> riva::Result<()> {
    ///     res.send()
    /// }
    ///
    /// let router = Router::new()
    ///     .route(Method::Delete, "/users/:id", vec![require_token.boxed()], destroy);
    /// ```
    pub fn route(
        mut self,
        method: Method,
        path: &str,
        middlewares: Vec<BoxedMiddleware>,
        handler: impl Handler,
    ) -> Self {
        self.chain.push(ChainEntry::Route {
            pattern: parse(path),
            method,
            middlewares: middlewares.into(),
            handler: handler.into_boxed(),
        });
        self
    }

    pub fn get(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::Get, path, handler)
    }

    pub fn post(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::Post, path, handler)
    }

    pub fn put(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::Put, path, handler)
    }

    pub fn delete(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::Delete, path, handler)
    }

    pub fn patch(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::Patch, path, handler)
    }

    pub fn head(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::Head, path, handler)
    }

    pub fn options(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::Options, path, handler)
    }

    pub fn trace(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::Trace, path, handler)
    }

    pub fn connect(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::Connect, path, handler)
    }

    /// Registers middleware for every request this router sees.
    pub fn with(self, middleware: impl Middleware) -> Self {
        self.with_at("", middleware)
    }

    /// Registers middleware scoped to paths under `path` (prefix match).
    ///
    /// # Panics
    ///
    /// Panics if `path` is not a valid route pattern.
    pub fn with_at(mut self, path: &str, middleware: impl Middleware) -> Self {
        self.chain.push(ChainEntry::Middleware {
            pattern: parse(path),
            middleware: middleware.boxed(),
        });
        self
    }

    /// Mounts a router under a path prefix.
    ///
    /// Takes anything that converts into `Arc<Router>`, so a router already
    /// behind an `Arc` can be mounted at several prefixes.
    ///
    /// # Panics
    ///
    /// Panics if `path` is not a valid route pattern.
    pub fn mount(mut self, path: &str, router: impl Into<Arc<Router>>) -> Self {
        self.chain.push(ChainEntry::Mount {
            pattern: parse(path),
            router: router.into(),
        });
        self
    }

    /// Appends an error handler to this router's error chain.
    ///
    /// A failure raised anywhere in this router's dispatch runs the error
    /// handlers in registration order. A handler that returns `Ok` ends the
    /// story; one that returns `Err` passes the *new* error to the next
    /// handler; when the chain runs out, the error propagates to the router
    /// this one is mounted on.
    pub fn catch(mut self, handler: impl ErrorHandler) -> Self {
        self.error_handlers.push(handler.into_boxed());
        self
    }

    /// Collects the methods of every handler whose pattern exact-matches
    /// `path`, in registration order without duplicates. Descends into
    /// mounts whose prefix covers the path. Pure lookup: nothing runs and
    /// the request is not consulted at all.
    pub(crate) fn find(&self, prefix: &[Arc<Pattern>], path: &str) -> Vec<Method> {
        let mut methods = Vec::new();
        self.collect_methods(prefix, path, &mut methods);
        methods
    }

    fn collect_methods(&self, prefix: &[Arc<Pattern>], path: &str, methods: &mut Vec<Method>) {
        for entry in &self.chain {
            match entry {
                ChainEntry::Route { pattern, method, .. } => {
                    if pattern.match_path(prefix, path).exact && !methods.contains(method) {
                        methods.push(*method);
                    }
                }
                ChainEntry::Mount { pattern, router } => {
                    if pattern.match_path(prefix, path).matched {
                        let mut deeper = prefix.to_vec();
                        deeper.push(Arc::clone(pattern));
                        router.collect_methods(&deeper, path, methods);
                    }
                }
                ChainEntry::Middleware { .. } => {}
            }
        }
    }

    /// Scans the chain from `ascent` under the given mount prefix.
    ///
    /// Returns `Ok(true)` once a handler ran or a mount took over, `Ok(false)`
    /// when the chain ends without either. A middleware entry re-enters this
    /// function through its continuation with `ascent` pointing one past
    /// itself, which is what makes "everything after me" cheap to express.
    ///
    /// Any error raised during the scan is fed to this router's error chain;
    /// only an error that survives the whole chain escapes as `Err`.
    pub(crate) fn execute(
        self: Arc<Self>,
        ascent: usize,
        prefix: Vec<Arc<Pattern>>,
        req: Request,
        res: Response,
    ) -> BoxFuture<Result<bool, Error>> {
        Box::pin(async move {
            let scanned = Arc::clone(&self).scan(ascent, &prefix, &req, &res).await;
            match scanned {
                Ok(handled) => Ok(handled),
                Err(error) => {
                    self.handle_error(0, req, res, error).await?;
                    Ok(true)
                }
            }
        })
    }

    async fn scan(
        self: Arc<Self>,
        ascent: usize,
        prefix: &[Arc<Pattern>],
        req: &Request,
        res: &Response,
    ) -> Result<bool, Error> {
        for (i, entry) in self.chain.iter().enumerate().skip(ascent) {
            match entry {
                ChainEntry::Route { pattern, method, middlewares, handler } => {
                    if *method != req.method() {
                        continue;
                    }
                    let outcome = pattern.match_path(prefix, req.path());
                    if !outcome.exact {
                        continue;
                    }
                    req.merge_params(outcome.params);
                    req.append_wildcards(outcome.captures);
                    run_route(
                        Arc::clone(middlewares),
                        Arc::clone(handler),
                        0,
                        req.clone(),
                        res.clone(),
                    )
                    .await?;
                    return Ok(true);
                }
                ChainEntry::Middleware { pattern, middleware } => {
                    if !pattern.match_path(prefix, req.path()).matched {
                        continue;
                    }
                    // The continuation resumes the scan one entry past this
                    // one; whether anything downstream handled the request
                    // comes back through the shared flag.
                    let handled = Arc::new(AtomicBool::new(false));
                    let next = {
                        let router = Arc::clone(&self);
                        let prefix = prefix.to_vec();
                        let req = req.clone();
                        let res = res.clone();
                        let handled = Arc::clone(&handled);
                        Next::new(move || {
                            Box::pin(async move {
                                let downstream = router.execute(i + 1, prefix, req, res).await?;
                                handled.store(downstream, Ordering::Release);
                                Ok(())
                            })
                        })
                    };
                    middleware.call(req.clone(), res.clone(), next).await?;
                    return Ok(handled.load(Ordering::Acquire));
                }
                ChainEntry::Mount { pattern, router } => {
                    if !pattern.match_path(prefix, req.path()).matched {
                        continue;
                    }
                    let mut deeper = prefix.to_vec();
                    deeper.push(Arc::clone(pattern));
                    // The sub-router's verdict is final: entries after this
                    // mount are never consulted for a path the mount covers.
                    return Arc::clone(router)
                        .execute(0, deeper, req.clone(), res.clone())
                        .await;
                }
            }
        }
        Ok(false)
    }

    /// Walks this router's error handlers from `index`. A handler that
    /// itself fails replaces the error and passes it along; an exhausted
    /// chain returns the last error to the caller.
    fn handle_error(
        self: Arc<Self>,
        index: usize,
        req: Request,
        res: Response,
        error: Error,
    ) -> BoxFuture<Result<(), Error>> {
        Box::pin(async move {
            let Some(handler) = self.error_handlers.get(index).cloned() else {
                return Err(error);
            };
            match handler.call(req.clone(), res.clone(), error).await {
                Ok(()) => Ok(()),
                Err(raised) => self.handle_error(index + 1, req, res, raised).await,
            }
        })
    }
}

fn parse(path: &str) -> Arc<Pattern> {
    match Pattern::parse(path) {
        Ok(pattern) => Arc::new(pattern),
        Err(e) => panic!("invalid route `{path}`: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;

    async fn run(router: Router, method: Method, target: &str) -> (Response, Result<bool, Error>) {
        let req = Request::builder(method, target).build();
        let res = Response::new();
        let result = Arc::new(router).execute(0, Vec::new(), req, res.clone()).await;
        (res, result)
    }

    async fn pong(_req: Request, res: Response) -> Result<(), Error> {
        res.text("pong")
    }

    async fn ignore(_req: Request, _res: Response) -> Result<(), Error> {
        Ok(())
    }

    async fn fail(_req: Request, _res: Response) -> Result<(), Error> {
        Err(Error::handler("boom"))
    }

    async fn pass(_req: Request, _res: Response, next: Next) -> Result<(), Error> {
        next.run().await
    }

    #[tokio::test]
    async fn first_registered_handler_wins() {
        async fn one(_req: Request, res: Response) -> Result<(), Error> {
            res.text("one")
        }
        async fn two(_req: Request, res: Response) -> Result<(), Error> {
            res.text("two")
        }
        let router = Router::new().get("/dup", one).get("/dup", two);
        let (res, result) = run(router, Method::Get, "/dup").await;
        assert!(result.unwrap());
        assert_eq!(res.body_bytes(), "one");
    }

    #[tokio::test]
    async fn method_must_match() {
        let router = Router::new().get("/ping", pong);
        let (res, result) = run(router, Method::Post, "/ping").await;
        assert!(!result.unwrap());
        assert!(!res.sent());
    }

    #[tokio::test]
    async fn handler_requires_an_exact_path_match() {
        let router = Router::new().get("/users", pong);
        let (_, result) = run(router, Method::Get, "/users/42").await;
        assert!(!result.unwrap());
    }

    #[tokio::test]
    async fn params_and_wildcards_reach_the_handler() {
        async fn show(req: Request, res: Response) -> Result<(), Error> {
            let id = req.param("id").unwrap_or_default();
            let stem = req.wildcards().join(",");
            res.text(format!("{id}/{stem}"))
        }
        let router = Router::new().get("/users/:id/files/*.txt", show);
        let (res, result) = run(router, Method::Get, "/users/42/files/report.txt").await;
        assert!(result.unwrap());
        assert_eq!(res.body_bytes(), "42/report");
    }

    #[tokio::test]
    async fn handled_without_sending_still_counts_as_handled() {
        let router = Router::new().get("/quiet", ignore);
        let (res, result) = run(router, Method::Get, "/quiet").await;
        assert!(result.unwrap());
        assert!(!res.sent());
    }

    #[tokio::test]
    async fn middleware_that_drops_next_ends_the_scan() {
        async fn wall(_req: Request, res: Response, _next: Next) -> Result<(), Error> {
            res.status(StatusCode::FORBIDDEN)?;
            res.text("nope")
        }
        let router = Router::new().with(wall).get("/ping", pong);
        let (res, result) = run(router, Method::Get, "/ping").await;
        assert!(!result.unwrap());
        assert_eq!(res.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(res.body_bytes(), "nope");
    }

    #[tokio::test]
    async fn middleware_continuation_reports_downstream_handling() {
        let handled = Router::new().with(pass).get("/ping", pong);
        let (res, result) = run(handled, Method::Get, "/ping").await;
        assert!(result.unwrap());
        assert_eq!(res.body_bytes(), "pong");

        let unhandled = Router::new().with(pass);
        let (_, result) = run(unhandled, Method::Get, "/ping").await;
        assert!(!result.unwrap());
    }

    #[tokio::test]
    async fn scoped_middleware_skips_other_paths() {
        async fn tag(req: Request, _res: Response, next: Next) -> Result<(), Error> {
            req.set_meta("tagged", true);
            next.run().await
        }
        async fn echo_tag(req: Request, res: Response) -> Result<(), Error> {
            res.text(if req.meta("tagged").is_some() { "tagged" } else { "clean" })
        }
        let router = Router::new()
            .with_at("/admin", tag)
            .get("/admin/panel", echo_tag)
            .get("/public", echo_tag);

        let (res, _) = run(router, Method::Get, "/public").await;
        assert_eq!(res.body_bytes(), "clean");

        let router = Router::new().with_at("/admin", tag).get("/admin/panel", echo_tag);
        let (res, _) = run(router, Method::Get, "/admin/panel").await;
        assert_eq!(res.body_bytes(), "tagged");
    }

    #[tokio::test]
    async fn route_scoped_middleware_runs_only_for_its_route() {
        async fn gate(req: Request, res: Response, next: Next) -> Result<(), Error> {
            if req.query("token").is_some() {
                next.run().await
            } else {
                res.status(StatusCode::UNAUTHORIZED)?;
                res.text("denied")
            }
        }
        let build = || {
            Router::new()
                .route(Method::Get, "/admin", vec![gate.boxed()], pong)
                .get("/open", pong)
        };

        let (res, result) = run(build(), Method::Get, "/admin?token=t").await;
        assert!(result.unwrap());
        assert_eq!(res.body_bytes(), "pong");

        let (res, result) = run(build(), Method::Get, "/admin").await;
        assert!(result.unwrap());
        assert_eq!(res.status_code(), StatusCode::UNAUTHORIZED);

        let (res, _) = run(build(), Method::Get, "/open").await;
        assert_eq!(res.body_bytes(), "pong");
    }

    #[tokio::test]
    async fn mounted_router_matches_under_its_prefix_only() {
        let api = Router::new().get("/ping", pong);
        let router = Router::new().mount("/api", api);

        let (res, result) = run(router, Method::Get, "/api/ping").await;
        assert!(result.unwrap());
        assert_eq!(res.body_bytes(), "pong");

        let api = Router::new().get("/ping", pong);
        let router = Router::new().mount("/api", api);
        let (_, result) = run(router, Method::Get, "/ping").await;
        assert!(!result.unwrap());
    }

    #[tokio::test]
    async fn mount_verdict_is_final_even_when_nothing_matched() {
        // The sibling registered after the mount never gets a chance.
        let api = Router::new().get("/other", pong);
        let router = Router::new().mount("/api", api).get("/api/late", pong);
        let (res, result) = run(router, Method::Get, "/api/late").await;
        assert!(!result.unwrap());
        assert!(!res.sent());
    }

    #[tokio::test]
    async fn shared_router_can_be_mounted_at_two_prefixes() {
        let shared = Arc::new(Router::new().get("/ping", pong));
        let router = Router::new()
            .mount("/v1", Arc::clone(&shared))
            .mount("/v2", shared);

        let (res, result) = run(router, Method::Get, "/v2/ping").await;
        assert!(result.unwrap());
        assert_eq!(res.body_bytes(), "pong");
    }

    #[tokio::test]
    async fn error_handler_recovers_a_failed_handler() {
        async fn rescue(_req: Request, res: Response, error: Error) -> Result<(), Error> {
            res.status(StatusCode::BAD_GATEWAY)?;
            res.text(format!("rescued: {error}"))
        }
        let router = Router::new().get("/boom", fail).catch(rescue);
        let (res, result) = run(router, Method::Get, "/boom").await;
        assert!(result.unwrap());
        assert_eq!(res.status_code(), StatusCode::BAD_GATEWAY);
        assert_eq!(res.body_bytes(), "rescued: boom");
    }

    #[tokio::test]
    async fn failing_error_handler_passes_its_new_error_on() {
        async fn reraise(_req: Request, _res: Response, error: Error) -> Result<(), Error> {
            Err(Error::handler(format!("wrapped: {error}")))
        }
        async fn rescue(_req: Request, res: Response, error: Error) -> Result<(), Error> {
            res.text(format!("{error}"))
        }
        let router = Router::new().get("/boom", fail).catch(reraise).catch(rescue);
        let (res, result) = run(router, Method::Get, "/boom").await;
        assert!(result.unwrap());
        assert_eq!(res.body_bytes(), "wrapped: boom");
    }

    #[tokio::test]
    async fn exhausted_error_chain_escapes() {
        async fn reraise(_req: Request, _res: Response, error: Error) -> Result<(), Error> {
            Err(error)
        }
        let router = Router::new().get("/boom", fail).catch(reraise);
        let (_, result) = run(router, Method::Get, "/boom").await;
        assert!(matches!(result, Err(Error::Handler(m)) if m == "boom"));
    }

    #[tokio::test]
    async fn sub_router_error_falls_back_to_the_mounting_router() {
        async fn rescue(_req: Request, res: Response, error: Error) -> Result<(), Error> {
            res.text(format!("parent caught: {error}"))
        }
        let api = Router::new().get("/boom", fail);
        let router = Router::new().mount("/api", api).catch(rescue);
        let (res, result) = run(router, Method::Get, "/api/boom").await;
        assert!(result.unwrap());
        assert_eq!(res.body_bytes(), "parent caught: boom");
    }

    #[tokio::test]
    async fn middleware_error_reaches_the_error_chain() {
        async fn trip(_req: Request, _res: Response, _next: Next) -> Result<(), Error> {
            Err(Error::handler("tripped"))
        }
        async fn rescue(_req: Request, res: Response, error: Error) -> Result<(), Error> {
            res.text(format!("{error}"))
        }
        let router = Router::new().with(trip).get("/ping", pong).catch(rescue);
        let (res, result) = run(router, Method::Get, "/ping").await;
        assert!(result.unwrap());
        assert_eq!(res.body_bytes(), "tripped");
    }

    #[test]
    fn find_unions_methods_across_mounts_in_order() {
        let api = Router::new().put("/ping", pong).get("/ping", pong);
        let router = Router::new()
            .get("/ping", pong)
            .post("/ping", pong)
            .mount("/api", Router::new().delete("/ping", pong))
            .mount("", api);

        assert_eq!(
            router.find(&[], "/ping"),
            vec![Method::Get, Method::Post, Method::Put]
        );
        assert_eq!(router.find(&[], "/api/ping"), vec![Method::Delete]);
        assert_eq!(router.find(&[], "/nope"), Vec::<Method>::new());
    }

    #[test]
    #[should_panic(expected = "invalid route `/a:b:c`")]
    fn malformed_route_panics_at_registration() {
        let _ = Router::new().get("/a:b:c", pong);
    }
}
