//! Incoming HTTP request type.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

use bytes::Bytes;
use http_body_util::BodyExt;
use percent_encoding::percent_decode_str;
use serde_json::Value;

use crate::error::Error;
use crate::headers::HeaderMap;
use crate::method::Method;

/// An incoming HTTP request.
///
/// `Request` is a cheap-clone handle: clones share one underlying record, so
/// the handler, every middleware on the chain, and the error handlers all
/// observe the same accumulated params, wildcard captures, and metadata.
/// The snapshot fields (method, path, headers, query, cookies) are frozen at
/// normalization time; only the match bindings and the memoized body cells
/// change while a request is in flight.
#[derive(Clone)]
pub struct Request {
    inner: Arc<Inner>,
}

struct Inner {
    method: Method,
    url: String,
    path: String,
    host: String,
    ip: String,
    timestamp: SystemTime,
    headers: HeaderMap,
    query: HashMap<String, String>,
    cookies: HashMap<String, String>,
    silent_json: bool,
    params: Mutex<HashMap<String, String>>,
    wildcards: Mutex<Vec<String>>,
    meta: Mutex<HashMap<String, Value>>,
    // Async mutexes: the body cell is held across the collect await.
    body: tokio::sync::Mutex<BodyCell>,
    json: tokio::sync::Mutex<Option<Value>>,
}

enum BodyCell {
    Stream(hyper::body::Incoming),
    Buffered(Bytes),
}

impl Request {
    /// Starts building a request. `url` is the request target as it appears
    /// on the wire, e.g. `/users/42?full=1`.
    pub fn builder(method: Method, url: &str) -> RequestBuilder {
        RequestBuilder {
            method,
            url: url.to_owned(),
            host: String::new(),
            ip: String::new(),
            headers: HeaderMap::new(),
            silent_json: false,
            body: BodyCell::Buffered(Bytes::new()),
        }
    }

    pub fn method(&self) -> Method {
        self.inner.method
    }

    /// The raw request target, path and query string included.
    pub fn url(&self) -> &str {
        &self.inner.url
    }

    /// The path component alone, without the query string.
    pub fn path(&self) -> &str {
        &self.inner.path
    }

    pub fn host(&self) -> &str {
        &self.inner.host
    }

    /// The client address: the socket peer, or the trusted proxy header's
    /// first entry when the app is configured to trust it.
    pub fn ip(&self) -> &str {
        &self.inner.ip
    }

    /// When this request entered the framework.
    pub fn timestamp(&self) -> SystemTime {
        self.inner.timestamp
    }

    /// Case-insensitive header lookup. Repeated wire headers keep their
    /// first value.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.inner.headers.get(name)
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.inner.headers
    }

    /// Returns a decoded query value. `?param=` yields `Some("")`, a bare
    /// `?param` yields `None`, and a repeated key keeps its last value.
    pub fn query(&self, name: &str) -> Option<&str> {
        self.inner.query.get(name).map(String::as_str)
    }

    pub fn queries(&self) -> &HashMap<String, String> {
        &self.inner.query
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.inner.cookies.get(name).map(String::as_str)
    }

    pub fn cookies(&self) -> &HashMap<String, String> {
        &self.inner.cookies
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/users/:id`, `req.param("id")` on `/users/42` returns
    /// `Some("42")`. Params accumulate as dispatch descends through mounted
    /// routers, so a handler sees its own route's bindings and everything
    /// bound upstream.
    pub fn param(&self, name: &str) -> Option<String> {
        lock(&self.inner.params).get(name).cloned()
    }

    /// A snapshot of every path parameter bound so far.
    pub fn params(&self) -> HashMap<String, String> {
        lock(&self.inner.params).clone()
    }

    /// Wildcard captures in pattern order. For a route `/files/*.txt`,
    /// `/files/report.txt` yields `["report"]`.
    pub fn wildcards(&self) -> Vec<String> {
        lock(&self.inner.wildcards).clone()
    }

    /// Reads a value from the per-request scratch space.
    pub fn meta(&self, key: &str) -> Option<Value> {
        lock(&self.inner.meta).get(key).cloned()
    }

    /// Stores a value in the per-request scratch space. Middleware uses this
    /// to pass data (an authenticated user, a request id) to handlers
    /// further down the chain.
    pub fn set_meta(&self, key: &str, value: impl Into<Value>) {
        lock(&self.inner.meta).insert(key.to_owned(), value.into());
    }

    /// Reads the body into memory. The first call drains the stream; later
    /// calls return the cached buffer.
    pub async fn bytes(&self) -> Result<Bytes, Error> {
        let mut cell = self.inner.body.lock().await;
        let buffered = match std::mem::replace(&mut *cell, BodyCell::Buffered(Bytes::new())) {
            BodyCell::Buffered(bytes) => bytes,
            BodyCell::Stream(body) => match body.collect().await {
                Ok(collected) => collected.to_bytes(),
                Err(e) => return Err(Error::Io(std::io::Error::other(e))),
            },
        };
        *cell = BodyCell::Buffered(buffered.clone());
        Ok(buffered)
    }

    /// Parses the body as JSON, at most once: the parsed value is cached for
    /// the lifetime of the request.
    ///
    /// When the app runs with [`Config`](crate::Config) `silent_json`, a
    /// malformed body parses to `Value::Null` instead of failing.
    pub async fn json(&self) -> Result<Value, Error> {
        let mut cell = self.inner.json.lock().await;
        if let Some(value) = cell.as_ref() {
            return Ok(value.clone());
        }
        let bytes = self.bytes().await?;
        let value = match serde_json::from_slice(&bytes) {
            Ok(value) => value,
            Err(_) if self.inner.silent_json => Value::Null,
            Err(e) => return Err(Error::Json(e)),
        };
        *cell = Some(value.clone());
        Ok(value)
    }

    pub(crate) fn merge_params(&self, params: HashMap<String, String>) {
        lock(&self.inner.params).extend(params);
    }

    pub(crate) fn append_wildcards(&self, captures: Vec<String>) {
        lock(&self.inner.wildcards).extend(captures);
    }
}

/// Builder for [`Request`] values.
///
/// The server normalizes wire requests through this; tests and tools can
/// construct requests directly the same way.
pub struct RequestBuilder {
    method: Method,
    url: String,
    host: String,
    ip: String,
    headers: HeaderMap,
    silent_json: bool,
    body: BodyCell,
}

impl RequestBuilder {
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub(crate) fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn host(mut self, host: &str) -> Self {
        self.host = host.to_owned();
        self
    }

    pub fn ip(mut self, ip: &str) -> Self {
        self.ip = ip.to_owned();
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = BodyCell::Buffered(body.into());
        self
    }

    pub(crate) fn streaming_body(mut self, body: hyper::body::Incoming) -> Self {
        self.body = BodyCell::Stream(body);
        self
    }

    pub fn silent_json(mut self, silent: bool) -> Self {
        self.silent_json = silent;
        self
    }

    pub fn build(self) -> Request {
        let (path, query) = match self.url.split_once('?') {
            Some((path, raw)) => (path.to_owned(), parse_query(raw)),
            None => (self.url.clone(), HashMap::new()),
        };
        let cookies = self
            .headers
            .get("cookie")
            .map(parse_cookies)
            .unwrap_or_default();
        Request {
            inner: Arc::new(Inner {
                method: self.method,
                url: self.url,
                path,
                host: self.host,
                ip: self.ip,
                timestamp: SystemTime::now(),
                headers: self.headers,
                query,
                cookies,
                silent_json: self.silent_json,
                params: Mutex::new(HashMap::new()),
                wildcards: Mutex::new(Vec::new()),
                meta: Mutex::new(HashMap::new()),
                body: tokio::sync::Mutex::new(self.body),
                json: tokio::sync::Mutex::new(None),
            }),
        }
    }
}

// A poisoned request slot only means some other handler panicked mid-write;
// the maps hold owned strings, so the stored state is still coherent.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Splits a raw query string. Pairs without `=` are skipped, duplicate keys
/// keep the last value, and keys and values are percent-decoded with `+`
/// treated as space.
fn parse_query(raw: &str) -> HashMap<String, String> {
    let mut pairs = HashMap::new();
    for pair in raw.split('&') {
        let Some((key, value)) = pair.split_once('=') else {
            continue;
        };
        pairs.insert(decode(key), decode(value));
    }
    pairs
}

fn parse_cookies(header: &str) -> HashMap<String, String> {
    let mut cookies = HashMap::new();
    for piece in header.split(';') {
        if let Some((name, value)) = piece.trim().split_once('=') {
            cookies.insert(name.to_owned(), value.to_owned());
        }
    }
    cookies
}

fn decode(raw: &str) -> String {
    let unplussed = raw.replace('+', " ");
    percent_decode_str(&unplussed).decode_utf8_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_splits_into_path_and_query() {
        let req = Request::builder(Method::Get, "/users/42?full=1").build();
        assert_eq!(req.path(), "/users/42");
        assert_eq!(req.url(), "/users/42?full=1");
        assert_eq!(req.query("full"), Some("1"));
    }

    #[test]
    fn query_value_present() {
        let req = Request::builder(Method::Get, "/?param=value").build();
        assert_eq!(req.query("param"), Some("value"));
    }

    #[test]
    fn query_value_empty() {
        let req = Request::builder(Method::Get, "/?param=").build();
        assert_eq!(req.query("param"), Some(""));
    }

    #[test]
    fn query_key_without_equals_is_skipped() {
        let req = Request::builder(Method::Get, "/?param").build();
        assert_eq!(req.query("param"), None);
        assert!(req.queries().is_empty());
    }

    #[test]
    fn duplicate_query_key_keeps_last_value() {
        let req = Request::builder(Method::Get, "/?param=a&param=b").build();
        assert_eq!(req.query("param"), Some("b"));
    }

    #[test]
    fn query_pairs_are_percent_decoded() {
        let req = Request::builder(Method::Get, "/?full+name=Jo%C3%A3o+S").build();
        assert_eq!(req.query("full name"), Some("João S"));
    }

    #[test]
    fn header_lookup_ignores_case() {
        let req = Request::builder(Method::Get, "/")
            .header("X-Request-Id", "abc")
            .build();
        assert_eq!(req.header("x-request-id"), Some("abc"));
    }

    #[test]
    fn cookies_parse_from_the_cookie_header() {
        let req = Request::builder(Method::Get, "/")
            .header("Cookie", "session=s1; theme=dark; theme=light")
            .build();
        assert_eq!(req.cookie("session"), Some("s1"));
        assert_eq!(req.cookie("theme"), Some("light"));
        assert_eq!(req.cookie("missing"), None);
    }

    #[test]
    fn params_accumulate_across_merges() {
        let req = Request::builder(Method::Get, "/users/42/posts/7").build();
        req.merge_params(HashMap::from([("user".to_owned(), "42".to_owned())]));
        req.merge_params(HashMap::from([("post".to_owned(), "7".to_owned())]));
        assert_eq!(req.param("user"), Some("42".to_owned()));
        assert_eq!(req.param("post"), Some("7".to_owned()));
    }

    #[test]
    fn meta_is_shared_across_clones() {
        let req = Request::builder(Method::Get, "/").build();
        let other = req.clone();
        other.set_meta("user", "alice");
        assert_eq!(req.meta("user"), Some(Value::from("alice")));
    }

    #[tokio::test]
    async fn bytes_are_memoized() {
        let req = Request::builder(Method::Post, "/").body("hello").build();
        assert_eq!(req.bytes().await.unwrap(), Bytes::from("hello"));
        assert_eq!(req.bytes().await.unwrap(), Bytes::from("hello"));
    }

    #[tokio::test]
    async fn json_parses_and_caches() {
        let req = Request::builder(Method::Post, "/")
            .body(r#"{"name":"alice"}"#)
            .build();
        let value = req.json().await.unwrap();
        assert_eq!(value["name"], Value::from("alice"));
        assert_eq!(req.json().await.unwrap(), value);
    }

    #[tokio::test]
    async fn malformed_json_is_an_error() {
        let req = Request::builder(Method::Post, "/").body("not json").build();
        assert!(matches!(req.json().await, Err(Error::Json(_))));
    }

    #[tokio::test]
    async fn malformed_json_parses_to_null_when_silent() {
        let req = Request::builder(Method::Post, "/")
            .body("not json")
            .silent_json(true)
            .build();
        assert_eq!(req.json().await.unwrap(), Value::Null);
    }
}
