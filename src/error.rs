//! Error types.
//!
//! Two families. [`Error`] is the request-time currency: handlers and
//! middleware return it, error-handler chains consume it, and whatever
//! survives every chain is resolved to a `500` at the dispatch boundary.
//! [`PathError`] is registration-time only: a route pattern that cannot be
//! parsed is a startup bug, so the router surfaces it as a panic instead of
//! threading a `Result` through every registration call.

use std::fmt;

/// Shorthand for the result type returned by handlers, middleware, and the
/// server itself.
pub type Result<T> = std::result::Result<T, Error>;

/// Any failure raised while dispatching a request.
#[derive(Debug)]
pub enum Error {
    /// Socket or body-stream failure.
    Io(std::io::Error),
    /// The response was mutated or sent after its one allowed send.
    HeadersSent,
    /// The request body is not valid JSON.
    Json(serde_json::Error),
    /// A failure raised by application code.
    Handler(String),
}

impl Error {
    /// Wraps an application-level failure message.
    pub fn handler(message: impl Into<String>) -> Self {
        Self::Handler(message.into())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "io: {e}"),
            Self::HeadersSent => f.write_str("headers already sent"),
            Self::Json(e) => write!(f, "json: {e}"),
            Self::Handler(message) => f.write_str(message),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Json(e) => Some(e),
            Self::HeadersSent | Self::Handler(_) => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e)
    }
}

impl From<&str> for Error {
    fn from(message: &str) -> Self {
        Self::Handler(message.to_owned())
    }
}

impl From<String> for Error {
    fn from(message: String) -> Self {
        Self::Handler(message)
    }
}

/// A route pattern that cannot be parsed.
#[derive(Debug, PartialEq, Eq)]
pub enum PathError {
    /// A segment containing `:` did not split into exactly `prefix:name`.
    ParamSegment(String),
    /// A wildcard segment contains `**`, `?*`, or `*?`.
    AdjacentWildcards(String),
}

impl fmt::Display for PathError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ParamSegment(segment) => {
                write!(f, "param segment `{segment}` must have the form `prefix:name`")
            }
            Self::AdjacentWildcards(segment) => {
                write!(f, "wildcard segment `{segment}` must not contain `**`, `?*`, or `*?`")
            }
        }
    }
}

impl std::error::Error for PathError {}
