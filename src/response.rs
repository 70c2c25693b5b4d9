//! Outgoing HTTP response type.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use http::StatusCode;
use http_body_util::Full;
use tracing::error;

use crate::error::Error;
use crate::headers::HeaderMap;

/// An outgoing HTTP response, staged in memory until dispatch completes.
///
/// Like [`Request`](crate::Request), `Response` is a cheap-clone handle:
/// the handler, the middleware around it, and the error handlers all write
/// to the same staged state. Status defaults to `200 OK`.
///
/// Exactly one send is allowed. The terminal methods ([`send`](Self::send),
/// [`text`](Self::text), [`json`](Self::json), [`html`](Self::html),
/// [`body`](Self::body), [`redirect`](Self::redirect)) mark the response
/// sent, and every later mutation fails with [`Error::HeadersSent`]. The
/// convenience senders fill in their content type only when none has been
/// set, so an explicit [`content_type`](Self::content_type) always wins.
#[derive(Clone)]
pub struct Response {
    state: Arc<Mutex<State>>,
}

struct State {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
    sent: bool,
}

impl Response {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                status: StatusCode::OK,
                headers: HeaderMap::new(),
                body: Bytes::new(),
                sent: false,
            })),
        }
    }

    /// Sets the status code.
    pub fn status(&self, status: StatusCode) -> Result<(), Error> {
        let mut state = self.lock();
        if state.sent {
            return Err(Error::HeadersSent);
        }
        state.status = status;
        Ok(())
    }

    /// Sets a header, replacing any previous value under the same name.
    pub fn header(&self, name: &str, value: &str) -> Result<(), Error> {
        let mut state = self.lock();
        if state.sent {
            return Err(Error::HeadersSent);
        }
        state.headers.insert(name, value);
        Ok(())
    }

    /// Sets the `content-type` header.
    pub fn content_type(&self, value: &str) -> Result<(), Error> {
        self.header("content-type", value)
    }

    /// Sends an empty body without touching the content type.
    pub fn send(&self) -> Result<(), Error> {
        self.send_with(None, Bytes::new())
    }

    /// Sends raw bytes as `application/octet-stream`.
    pub fn body(&self, body: impl Into<Bytes>) -> Result<(), Error> {
        self.send_with(Some("application/octet-stream"), body.into())
    }

    /// Sends a plain-text body as `text/plain`.
    pub fn text(&self, body: impl Into<String>) -> Result<(), Error> {
        self.send_with(Some("text/plain"), Bytes::from(body.into()))
    }

    /// Sends an HTML body as `text/html`.
    pub fn html(&self, body: impl Into<String>) -> Result<(), Error> {
        self.send_with(Some("text/html"), Bytes::from(body.into()))
    }

    /// Sends a JSON body as `application/json`.
    ///
    /// Takes pre-serialized bytes: `serde_json::to_vec(&value)?` or a
    /// `format!` literal both work.
    pub fn json(&self, body: impl Into<Bytes>) -> Result<(), Error> {
        self.send_with(Some("application/json"), body.into())
    }

    /// Sends a `302 Found` redirect to `location`.
    pub fn redirect(&self, location: &str) -> Result<(), Error> {
        self.redirect_with(location, StatusCode::FOUND)
    }

    /// Sends a redirect with an explicit status code.
    pub fn redirect_with(&self, location: &str, status: StatusCode) -> Result<(), Error> {
        {
            let mut state = self.lock();
            if state.sent {
                return Err(Error::HeadersSent);
            }
            state.status = status;
            state.headers.insert("location", location);
        }
        self.send()
    }

    /// Whether a terminal method has run.
    pub fn sent(&self) -> bool {
        self.lock().sent
    }

    pub fn status_code(&self) -> StatusCode {
        self.lock().status
    }

    /// Case-insensitive lookup of a staged header.
    pub fn header_value(&self, name: &str) -> Option<String> {
        self.lock().headers.get(name).map(str::to_owned)
    }

    /// The staged body bytes.
    pub fn body_bytes(&self) -> Bytes {
        self.lock().body.clone()
    }

    fn send_with(&self, content_type: Option<&str>, body: Bytes) -> Result<(), Error> {
        let mut state = self.lock();
        if state.sent {
            return Err(Error::HeadersSent);
        }
        if let Some(value) = content_type {
            if !state.headers.contains("content-type") {
                state.headers.insert("content-type", value);
            }
        }
        state.body = body;
        state.sent = true;
        Ok(())
    }

    // A poisoned lock means a handler panicked mid-write; the staged fields
    // are all owned values, so the state is still coherent.
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Converts the staged state into hyper's response type.
    pub(crate) fn to_http(&self) -> http::Response<Full<Bytes>> {
        let state = self.lock();
        let mut builder = http::Response::builder().status(state.status);
        for (name, value) in state.headers.iter() {
            builder = builder.header(name, value);
        }
        match builder.body(Full::new(state.body.clone())) {
            Ok(response) => response,
            Err(e) => {
                error!("staged response could not be encoded: {e}");
                let mut fallback = http::Response::new(Full::new(Bytes::new()));
                *fallback.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
                fallback
            }
        }
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}
