//! Minimal riva application: routes, middleware, a mounted sub-router, and
//! an error handler.
//!
//! Run:
//!
//! ```sh
//! cargo run --example basic
//! ```
//!
//! Then poke it:
//!
//! ```sh
//! curl http://localhost:3000/users/42
//! curl -X POST http://localhost:3000/users -d '{"name":"alice"}'
//! curl http://localhost:3000/api/ping
//! curl -i -X OPTIONS http://localhost:3000/users/42     # preflight
//! curl -i http://localhost:3000/boom                    # recovered error
//! curl -i http://localhost:3000/nope                    # plain-text 404
//! ```

use riva::{App, Error, Next, Request, Response, Router, Server, StatusCode};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let api = Router::new().get("/ping", ping);

    let router = Router::new()
        .with(log_requests)
        .get("/users/:id", get_user)
        .post("/users", create_user)
        .mount("/api", api)
        .get("/boom", boom)
        .catch(recover);

    Server::bind("0.0.0.0:3000")
        .serve(App::new(router))
        .await
        .unwrap();
}

async fn log_requests(req: Request, _res: Response, next: Next) -> riva::Result<()> {
    tracing::info!("{} {} from {}", req.method(), req.path(), req.ip());
    next.run().await
}

async fn get_user(req: Request, res: Response) -> riva::Result<()> {
    let id = req.param("id").unwrap_or_default();
    res.json(format!(r#"{{"id":"{id}","name":"alice"}}"#))
}

async fn create_user(req: Request, res: Response) -> riva::Result<()> {
    let body = req.json().await?;
    let Some(name) = body["name"].as_str() else {
        res.status(StatusCode::UNPROCESSABLE_ENTITY)?;
        return res.text("missing `name`");
    };
    res.status(StatusCode::CREATED)?;
    res.header("location", "/users/99")?;
    res.json(format!(r#"{{"id":"99","name":"{name}"}}"#))
}

async fn ping(_req: Request, res: Response) -> riva::Result<()> {
    res.text("pong")
}

async fn boom(_req: Request, _res: Response) -> riva::Result<()> {
    Err(Error::handler("the demo handler always fails"))
}

async fn recover(req: Request, res: Response, err: Error) -> riva::Result<()> {
    tracing::warn!("recovered {} {}: {err}", req.method(), req.path());
    res.status(StatusCode::BAD_GATEWAY)?;
    res.text(format!("recovered: {err}"))
}
