//! TCP accept loop, request normalization, and graceful shutdown.
//!
//! The server is deliberately thin: accept a connection, hand it to hyper,
//! normalize each wire request into a [`Request`], and let the [`App`]
//! decide everything else. On `SIGTERM`/`ctrl-c` the loop stops accepting
//! and drains in-flight connections before returning, so rolling restarts
//! drop no requests.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::Full;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::app::{App, Config};
use crate::error::Error;
use crate::headers::HeaderMap;
use crate::method::Method;
use crate::request::Request;
use crate::response::Response;

/// The HTTP server. Binds an address, then serves an [`App`] until shutdown.
///
/// ```rust,no_run
/// use riva::{App, Request, Response, Router, Server};
///
/// async fn hello(_req: Request, res: Response) -> riva::Result<()> {
///     res.text("hello")
/// }
///
/// #[tokio::main]
/// async fn main() {
///     let app = App::new(Router::new().get("/", hello));
///     Server::bind("0.0.0.0:3000").serve(app).await.unwrap();
/// }
/// ```
pub struct Server {
    addr: SocketAddr,
}

impl Server {
    /// Creates a server bound to `addr`.
    ///
    /// # Panics
    ///
    /// Panics if `addr` is not a valid socket address (e.g. `"0.0.0.0:3000"`).
    /// A malformed listen address is a deployment bug; failing loudly at
    /// startup beats limping along.
    pub fn bind(addr: &str) -> Self {
        Self {
            addr: addr.parse().expect("invalid listen address"),
        }
    }

    /// Runs the accept loop until a shutdown signal arrives, then drains
    /// in-flight connections.
    pub async fn serve(self, app: App) -> Result<(), Error> {
        let listener = TcpListener::bind(self.addr).await?;
        let app = Arc::new(app);
        info!(addr = %self.addr, "riva listening");

        let mut tasks = tokio::task::JoinSet::new();
        let shutdown = shutdown_signal();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;

                () = &mut shutdown => {
                    info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                    break;
                }

                accepted = listener.accept() => {
                    let (stream, remote_addr) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };
                    let app = Arc::clone(&app);
                    let io = TokioIo::new(stream);
                    tasks.spawn(async move {
                        let service = service_fn(move |req| {
                            let app = Arc::clone(&app);
                            async move { dispatch(app, req, remote_addr).await }
                        });
                        if let Err(e) = ConnBuilder::new(TokioExecutor::new())
                            .serve_connection(io, service)
                            .await
                        {
                            error!(peer = %remote_addr, "connection error: {e}");
                        }
                    });
                }

                // Reap finished connection tasks so the set stays small.
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        while tasks.join_next().await.is_some() {}
        info!("riva stopped");
        Ok(())
    }
}

/// Normalizes one wire request, runs it through the app, and converts the
/// staged response back into hyper's types.
///
/// The error type is `Infallible`: every failure has already become an HTTP
/// status by the time hyper sees the result.
async fn dispatch(
    app: Arc<App>,
    req: hyper::Request<hyper::body::Incoming>,
    remote_addr: SocketAddr,
) -> Result<http::Response<Full<Bytes>>, Infallible> {
    let Ok(method) = Method::try_from(req.method()) else {
        // Methods outside the registration surface never reach a handler.
        let mut denied = http::Response::new(Full::new(Bytes::new()));
        *denied.status_mut() = http::StatusCode::METHOD_NOT_ALLOWED;
        return Ok(denied);
    };

    let request = normalize(app.config(), method, req, remote_addr);
    let response = Response::new();
    if let Err(e) = app.handle(request, response.clone()).await {
        error!("dispatch failed: {e}");
    }
    Ok(response.to_http())
}

/// Builds the request snapshot from the wire request.
///
/// Repeated headers keep their first value. The body stays an unread stream
/// until a handler asks for it.
fn normalize(
    config: &Config,
    method: Method,
    req: hyper::Request<hyper::body::Incoming>,
    remote_addr: SocketAddr,
) -> Request {
    let mut headers = HeaderMap::new();
    for (name, value) in req.headers() {
        if let Ok(text) = value.to_str() {
            if !headers.contains(name.as_str()) {
                headers.insert(name.as_str(), text);
            }
        }
    }

    let url = req
        .uri()
        .path_and_query()
        .map(|target| target.as_str().to_owned())
        .unwrap_or_else(|| req.uri().path().to_owned());

    let host = req
        .uri()
        .host()
        .map(str::to_owned)
        .or_else(|| headers.get("host").map(str::to_owned))
        .unwrap_or_default();

    let ip = client_ip(config, &headers, remote_addr);

    Request::builder(method, &url)
        .headers(headers)
        .host(&host)
        .ip(&ip)
        .silent_json(config.silent_json)
        .streaming_body(req.into_body())
        .build()
}

/// The socket peer, unless a trusted proxy header supplies the original
/// client as its first comma-separated entry.
fn client_ip(config: &Config, headers: &HeaderMap, remote_addr: SocketAddr) -> String {
    if config.trust_proxy {
        if let Some(forwarded) = headers.get(&config.proxy_header) {
            return forwarded.split(',').next().unwrap_or_default().trim().to_owned();
        }
    }
    remote_addr.ip().to_string()
}

/// Resolves when the process receives `ctrl-c` or, on unix, `SIGTERM`.
/// `SIGTERM` is what most process managers send first.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        _ = terminate => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer() -> SocketAddr {
        "10.0.0.9:55000".parse().unwrap()
    }

    #[test]
    fn client_ip_defaults_to_the_socket_peer() {
        let mut headers = HeaderMap::new();
        headers.insert("X-Forwarded-For", "203.0.113.7, 10.0.0.1");
        let config = Config::default();
        assert_eq!(client_ip(&config, &headers, peer()), "10.0.0.9");
    }

    #[test]
    fn trusted_proxy_header_overrides_with_its_first_entry() {
        let mut headers = HeaderMap::new();
        headers.insert("X-Forwarded-For", " 203.0.113.7 , 10.0.0.1");
        let config = Config { trust_proxy: true, ..Config::default() };
        assert_eq!(client_ip(&config, &headers, peer()), "203.0.113.7");
    }

    #[test]
    fn trusted_proxy_without_the_header_falls_back_to_the_peer() {
        let config = Config { trust_proxy: true, ..Config::default() };
        assert_eq!(client_ip(&config, &HeaderMap::new(), peer()), "10.0.0.9");
    }
}
