//! src/error.rs
//!
//! Defines the library's `Error` enum using `thiserror`.

use crate::client::FetchResponse;
use std::net::SocketAddr;
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] figment::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to bind a listening socket on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Tester is not set up")]
    NotReady,

    #[error("Tester is already set up")]
    AlreadySetUp,

    #[error("Tester can not be reused after teardown")]
    Reused,

    #[error("Cannot block on the event loop from inside an async context")]
    InsideEventLoop,

    #[error("HTTP client is bound to a different event loop than the one being driven")]
    LoopMismatch,

    #[error("No route named `{0}`")]
    UnknownRoute(String),

    #[error("Route `{name}` expects {expected} argument(s), got {given}")]
    RouteArguments {
        name: String,
        expected: usize,
        given: usize,
    },

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),

    #[error("HTTP {} returned by {}", .0.status, .0.url)]
    Status(Box<FetchResponse>),

    #[error("Unsupported response charset `{0}`")]
    UnsupportedCharset(String),

    #[error("Response body is not valid `{0}` text")]
    MalformedText(&'static str),

    #[error("Response body is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("Failed to serialize or deserialize JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Tokio task join error: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}

impl Error {
    /// The HTTP status carried by an `Error::Status`, if any.
    pub fn status(&self) -> Option<reqwest::StatusCode> {
        match self {
            Error::Status(response) => Some(response.status),
            _ => None,
        }
    }
}
