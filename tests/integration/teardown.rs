//! tests/integration/teardown.rs
//!
//! The socket is released on every exit path of a scoped tester.

use crate::common::harness::{hello_app, port_is_free};
use anyhow::{bail, Result};
use app_tester::{Tester, TesterConfig};
use axum::Router;
use std::{
    net::SocketAddr,
    panic::{self, AssertUnwindSafe},
};
use test_log::test;
use tower_http::services::ServeDir;

#[test]
fn port_is_released_after_requests() -> Result<()> {
    let tester = Tester::new(hello_app()).enter()?;
    let addr = tester.local_addr()?;
    let client = tester.http_client()?;
    let response = tester.run_sync(client.get("/hello"))??;
    assert_eq!(response.text()?, "Hello");

    tester.finish()?;
    assert!(port_is_free(addr));

    // The freed port can be taken by a new tester.
    let config = TesterConfig {
        port: Some(addr.port()),
        ..TesterConfig::default()
    };
    let again = Tester::new(hello_app()).config(config).enter()?;
    assert_eq!(again.local_addr()?, addr);
    Ok(())
}

#[test]
fn client_clones_do_not_keep_the_server_alive() -> Result<()> {
    let config = TesterConfig {
        shutdown_timeout_ms: 2000,
        ..TesterConfig::default()
    };
    let tester = Tester::new(hello_app()).config(config).enter()?;
    let addr = tester.local_addr()?;
    let client = tester.http_client()?;
    tester.run_sync(client.get("/hello"))??;

    // `client` still holds a pooled keep-alive connection.
    tester.finish()?;
    assert!(port_is_free(addr));
    drop(client);
    Ok(())
}

#[test]
fn panic_inside_scope_still_tears_down() {
    let mut bound: Option<SocketAddr> = None;
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        let tester = Tester::new(hello_app()).enter().unwrap();
        bound = Some(tester.local_addr().unwrap());
        panic!("test body failed");
    }));

    assert!(outcome.is_err());
    let addr = bound.expect("address recorded before the panic");
    assert!(port_is_free(addr));
}

#[test]
fn error_inside_scope_still_tears_down() {
    fn failing_test(bound: &mut Option<SocketAddr>) -> Result<()> {
        let tester = Tester::new(hello_app()).enter()?;
        *bound = Some(tester.local_addr()?);
        bail!("assertion failed");
    }

    let mut bound = None;
    assert!(failing_test(&mut bound).is_err());
    assert!(port_is_free(bound.expect("address recorded before the error")));
}

#[test]
fn static_files_are_served_until_teardown() -> Result<()> {
    let dir = tempfile::tempdir()?;
    std::fs::write(dir.path().join("index.html"), "<h1>Hello</h1>")?;
    let app = Router::new().nest_service("/static", ServeDir::new(dir.path()));

    let tester = Tester::new(app).enter()?;
    let addr = tester.local_addr()?;
    let client = tester.http_client()?;
    let response = tester.run_sync(client.get("/static/index.html"))??;
    assert_eq!(response.text()?, "<h1>Hello</h1>");

    drop(tester);
    assert!(port_is_free(addr));
    Ok(())
}
