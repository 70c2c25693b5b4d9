//! Application: a router plus configuration, and the dispatch boundary.

use std::sync::Arc;

use http::StatusCode;
use tracing::error;

use crate::error::Error;
use crate::method::Method;
use crate::request::Request;
use crate::response::Response;
use crate::router::Router;

/// Application-level settings, consumed at the dispatch boundary.
#[derive(Clone, Debug)]
pub struct Config {
    /// Take the client IP from `proxy_header` instead of the socket peer.
    /// Leave off unless a proxy you control sits in front of the server;
    /// the header is client-supplied otherwise.
    pub trust_proxy: bool,
    /// Header consulted when `trust_proxy` is on. The first comma-separated
    /// entry wins.
    pub proxy_header: String,
    /// Answer `OPTIONS` requests from the routing table without invoking
    /// any handler. Turn off to route `OPTIONS` like any other method.
    pub handle_preflight: bool,
    /// Suppress the `x-powered-by` response header.
    pub hide_branding: bool,
    /// Parse malformed JSON bodies as `null` instead of failing.
    pub silent_json: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            trust_proxy: false,
            proxy_header: "X-Forwarded-For".to_owned(),
            handle_preflight: true,
            hide_branding: false,
            silent_json: false,
        }
    }
}

/// A configured application: the single entry point the transport calls.
///
/// `App` owns the root [`Router`] behind an `Arc` and dispatches one request
/// per [`handle`](Self::handle) call. It is transport-agnostic — the bundled
/// [`Server`](crate::Server) drives it from hyper, and tests drive it
/// directly with built [`Request`]s.
pub struct App {
    router: Arc<Router>,
    config: Config,
}

impl App {
    pub fn new(router: impl Into<Arc<Router>>) -> Self {
        Self::with_config(router, Config::default())
    }

    pub fn with_config(router: impl Into<Arc<Router>>, config: Config) -> Self {
        Self { router: router.into(), config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Dispatches one request against the routing chain.
    ///
    /// Guarantees a terminal outcome: when the chain finishes without
    /// sending, a plain-text `404` goes out; when an error survives every
    /// error-handler chain, a plain-text `500` goes out (unless a response
    /// was already sent, which cannot be unsent). An `Err` from this method
    /// means the response itself failed, not the application logic.
    pub async fn handle(&self, req: Request, res: Response) -> Result<(), Error> {
        if !self.config.hide_branding {
            res.header("x-powered-by", concat!("riva v", env!("CARGO_PKG_VERSION")))?;
        }

        if self.config.handle_preflight && req.method() == Method::Options {
            return self.preflight(&req, &res);
        }

        if let Err(e) = Arc::clone(&self.router)
            .execute(0, Vec::new(), req.clone(), res.clone())
            .await
        {
            error!(method = %req.method(), path = req.path(), "unrecovered dispatch error: {e}");
            if !res.sent() {
                res.status(StatusCode::INTERNAL_SERVER_ERROR)?;
                res.text(format!("500 Internal Error\n{} {}", req.method(), req.path()))?;
            }
            return Ok(());
        }

        if !res.sent() {
            res.status(StatusCode::NOT_FOUND)?;
            res.text(format!("404 Not Found\n{} {}", req.method(), req.path()))?;
        }
        Ok(())
    }

    /// Answers an `OPTIONS` preflight from the routing table: a `200` with
    /// permissive CORS headers listing the methods registered for the path,
    /// or a bare `404` when no route matches. Both answers have empty
    /// bodies.
    fn preflight(&self, req: &Request, res: &Response) -> Result<(), Error> {
        let methods = self.router.find(&[], req.path());
        if methods.is_empty() {
            res.status(StatusCode::NOT_FOUND)?;
        } else {
            let allowed: Vec<&str> = methods.iter().map(|m| m.as_str()).collect();
            res.header("Access-Control-Allow-Methods", &allowed.join(", "))?;
            res.header("Access-Control-Allow-Origin", "*")?;
            res.header("Access-Control-Allow-Headers", "*")?;
            res.header("Access-Control-Allow-Credentials", "true")?;
            res.header("Access-Control-Max-Age", "3600")?;
        }
        res.send()
    }
}
