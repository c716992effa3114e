//! tests/integration/timeouts.rs
//!
//! Requests that never finish: the client's timeout, teardown's forced stop,
//! and serving without request tracing.

use crate::common::harness::{echo_app, port_is_free, slow_app};
use anyhow::Result;
use app_tester::{Error, Tester, TesterConfig};
use std::time::{Duration, Instant};
use test_log::test;

#[test]
fn teardown_aborts_a_server_that_does_not_drain() -> Result<()> {
    let config = TesterConfig {
        shutdown_timeout_ms: 200,
        ..TesterConfig::default()
    };
    let mut tester = Tester::new(slow_app()).config(config);
    tester.setup()?;
    let addr = tester.local_addr()?;
    let client = tester.http_client()?;

    // Leave a request hanging in the handler so graceful shutdown can not end.
    let hanging = tester.event_loop()?.spawn(async move { client.get("/slow").await });
    tester.run_sync(async { tokio::time::sleep(Duration::from_millis(100)).await })?;
    assert!(!hanging.is_finished());

    let started = Instant::now();
    tester.teardown()?;
    let elapsed = started.elapsed();

    assert!(elapsed >= Duration::from_millis(200), "returned after {elapsed:?}");
    assert!(elapsed < Duration::from_secs(5), "returned after {elapsed:?}");
    assert!(port_is_free(addr));
    Ok(())
}

#[test]
fn request_timeout_surfaces_as_a_client_error() -> Result<()> {
    let config = TesterConfig {
        request_timeout_ms: Some(100),
        shutdown_timeout_ms: 200,
        ..TesterConfig::default()
    };
    let tester = Tester::new(slow_app()).config(config).enter()?;
    let client = tester.http_client()?;

    match tester.run_sync(client.get("/slow"))? {
        Err(Error::Client(e)) => assert!(e.is_timeout(), "not a timeout: {e}"),
        other => panic!("expected a client timeout, got {other:?}"),
    }

    // Fast routes are unaffected.
    let response = tester.run_sync(client.get("/hello"))??;
    assert_eq!(response.text()?, "Hello");
    Ok(())
}

#[test]
fn requests_work_without_tracing() -> Result<()> {
    let config = TesterConfig {
        trace_requests: false,
        ..TesterConfig::default()
    };
    let tester = Tester::new(echo_app()).config(config).enter()?;
    let client = tester.http_client()?;
    let response = tester.run_sync(client.get("/hello"))??;
    assert_eq!(response.text()?, "Hello");
    Ok(())
}
