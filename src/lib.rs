//! src/lib.rs
//!
//! Test harness for `axum` applications. A [`Tester`] binds an application to
//! an ephemeral local port on a single-threaded [`EventLoop`], hands out the
//! resulting URLs and a loop-bound [`HttpClient`], and closes the socket
//! deterministically when the test is done.
//!
//! The loop is cooperative: the server only runs while a test future is being
//! driven through [`Tester::run_sync`] (or [`EventLoop::run_sync`]).

pub mod client;
pub mod config;
pub mod error;
pub mod event_loop;
pub mod routes;
pub mod server;
pub mod tester;

pub use client::{ClientCustomizer, FetchRequest, FetchResponse, FilePart, HttpClient};
pub use config::TesterConfig;
pub use error::{Error, Result};
pub use event_loop::EventLoop;
pub use routes::with_query;
pub use tester::{Tester, TesterGuard};
