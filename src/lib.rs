//! # riva
//!
//! A middleware-first HTTP micro-framework built on one idea: routing is an
//! **ordered chain**, not a lookup table.
//!
//! ## The model
//!
//! A [`Router`] is a list of entries in registration order — method-bound
//! handlers, path-scoped middleware, mounted sub-routers. Dispatch walks
//! the list top to bottom and the first entry that applies decides what
//! happens. No precedence scoring, no route-tree surprises: what you
//! registered first is what runs first.
//!
//! Middleware receives a single-use [`Next`] continuation. Calling
//! `next.run().await` hands the request to the rest of the chain and
//! returns when everything downstream is done, so code after the call runs
//! on the way back out. Dropping `next` without calling it short-circuits
//! the chain.
//!
//! Handlers write to a shared [`Response`] that allows exactly one send.
//! Errors travel through each router's own [`catch`](Router::catch) chain
//! before escalating to the mounting router; anything that survives every
//! chain becomes a plain-text `500` at the boundary.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use riva::{App, Next, Request, Response, Router, Server, StatusCode};
//!
//! async fn trace(req: Request, _res: Response, next: Next) -> riva::Result<()> {
//!     println!("{} {}", req.method(), req.path());
//!     next.run().await
//! }
//!
//! async fn get_user(req: Request, res: Response) -> riva::Result<()> {
//!     let id = req.param("id").unwrap_or_default();
//!     res.json(format!(r#"{{"id":"{id}"}}"#))
//! }
//!
//! async fn ping(_req: Request, res: Response) -> riva::Result<()> {
//!     res.text("pong")
//! }
//!
//! async fn recover(_req: Request, res: Response, err: riva::Error) -> riva::Result<()> {
//!     res.status(StatusCode::BAD_GATEWAY)?;
//!     res.text(format!("recovered: {err}"))
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let api = Router::new().get("/ping", ping);
//!
//!     let router = Router::new()
//!         .with(trace)
//!         .get("/users/:id", get_user)
//!         .mount("/api", api)
//!         .catch(recover);
//!
//!     Server::bind("0.0.0.0:3000").serve(App::new(router)).await.unwrap();
//! }
//! ```
//!
//! ## What riva is not
//!
//! There are no extractors and no derive macros. A handler gets the
//! [`Request`] and the [`Response`] and returns [`Result<()>`](Result);
//! everything else (auth, request tracing, body validation) is ordinary
//! middleware you can read in one sitting.

mod app;
mod chain;
mod error;
mod handler;
mod headers;
mod method;
mod pattern;
mod request;
mod response;
mod router;
mod server;

pub use app::{App, Config};
pub use chain::Next;
pub use error::{Error, PathError, Result};
pub use handler::{BoxedMiddleware, ErrorHandler, Handler, Middleware};
pub use headers::HeaderMap;
pub use method::Method;
pub use request::{Request, RequestBuilder};
pub use response::Response;
pub use router::Router;
pub use server::Server;

// Handlers set statuses on every response; re-exported so downstream crates
// do not need a direct `http` dependency for that.
pub use http::StatusCode;
