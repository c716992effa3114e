//! src/config.rs
//!
//! Defines the strongly-typed `TesterConfig` struct for the harness, loaded
//! from a file and environment variables via `figment`.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Settings for binding and tearing down the in-process server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TesterConfig {
    /// Interface the listening socket binds to.
    pub host: IpAddr,
    /// Fixed port to bind. `None` asks the OS for an ephemeral port.
    pub port: Option<u16>,
    /// Listen backlog for the bound socket.
    pub backlog: u32,
    /// How long `teardown` waits for the server to drain before aborting it.
    pub shutdown_timeout_ms: u64,
    /// Per-request timeout applied by the harness's HTTP client.
    pub request_timeout_ms: Option<u64>,
    /// Wrap the application in a `TraceLayer` so every request is logged.
    pub trace_requests: bool,
}

impl TesterConfig {
    /// Loads configuration from `app-tester.toml` and `APP_TESTER_*`
    /// environment variables, on top of the `Default` values.
    pub fn load() -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Serialized::defaults(TesterConfig::default()))
            .merge(Toml::file("app-tester.toml"))
            .merge(Env::prefixed("APP_TESTER_"))
            .extract()
    }

    /// The address handed to `bind`. Port `0` means "any free port".
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port.unwrap_or(0))
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }
}

impl Default for TesterConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: None,
            backlog: 1024,
            shutdown_timeout_ms: 5000,
            request_timeout_ms: None,
            trace_requests: true,
        }
    }
}
