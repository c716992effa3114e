//! src/server.rs
//!
//! Binds the listening socket and runs the application with `axum::serve`
//! on the tester's event loop until the shutdown token fires.

use crate::{
    config::TesterConfig,
    error::{Error, Result},
    event_loop::EventLoop,
};
use axum::Router;
use socket2::{Domain, Protocol, Socket, Type};
use std::{io, net::SocketAddr};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

/// Opens a non-blocking listening socket on `addr`.
///
/// `SO_REUSEADDR` lets a fixed port be rebound right after a previous tester
/// released it, even while old connections linger in `TIME_WAIT`.
pub fn bind_listener(addr: SocketAddr, backlog: u32) -> Result<std::net::TcpListener> {
    let open = || -> io::Result<std::net::TcpListener> {
        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
        #[cfg(not(windows))]
        socket.set_reuse_address(true)?;
        socket.set_nonblocking(true)?;
        socket.bind(&addr.into())?;
        socket.listen(backlog.min(i32::MAX as u32) as i32)?;
        Ok(socket.into())
    };
    open().map_err(|source| Error::Bind { addr, source })
}

/// A running server task and the means to stop it.
pub struct ServerHandle {
    pub local_addr: SocketAddr,
    shutdown_token: CancellationToken,
    task: JoinHandle<io::Result<()>>,
}

impl ServerHandle {
    /// Binds according to `config` and spawns the server onto `event_loop`.
    ///
    /// The socket is bound synchronously so the address is known on return;
    /// connections are accepted once the loop is driven.
    pub fn start(app: Router, config: &TesterConfig, event_loop: &EventLoop) -> Result<Self> {
        let listener = bind_listener(config.bind_addr(), config.backlog)?;
        let local_addr = listener.local_addr()?;

        let app = if config.trace_requests {
            app.layer(TraceLayer::new_for_http())
        } else {
            app
        };

        let shutdown_token = CancellationToken::new();
        let task = event_loop.spawn(serve(listener, app, shutdown_token.clone()));
        tracing::info!(listen_addr = %local_addr, "Test server listening");

        Ok(Self {
            local_addr,
            shutdown_token,
            task,
        })
    }

    /// Waits until the server task has finished, which closes the socket.
    /// Aborts the task if it has not drained within `timeout`.
    ///
    /// Aborting stops the accept loop only. Connection tasks that `axum` has
    /// already spawned are separate tasks on the loop: on an owned loop they
    /// end when the loop is released, on a shared loop they keep running
    /// until their handler returns or the shared loop is dropped.
    pub async fn stopped(self, timeout: std::time::Duration) -> Result<()> {
        self.shutdown_token.cancel();
        let mut task = self.task;
        match tokio::time::timeout(timeout, &mut task).await {
            Ok(joined) => joined??,
            Err(_) => {
                tracing::warn!(
                    listen_addr = %self.local_addr,
                    timeout_ms = timeout.as_millis() as u64,
                    "Test server did not drain in time; aborting"
                );
                task.abort();
                match task.await {
                    Ok(served) => served?,
                    Err(e) if e.is_cancelled() => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }
        tracing::info!(listen_addr = %self.local_addr, "Test server stopped");
        Ok(())
    }

    /// Stops the server without waiting. The socket closes the next time the
    /// loop is driven or when the loop is released. In-flight connections
    /// are not aborted, as with a timed out `stopped`.
    pub fn abort(self) {
        self.shutdown_token.cancel();
        self.task.abort();
    }
}

async fn serve(
    listener: std::net::TcpListener,
    app: Router,
    shutdown_token: CancellationToken,
) -> io::Result<()> {
    let listener = tokio::net::TcpListener::from_std(listener)?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_token.cancelled().await;
            tracing::debug!("Test server received shutdown signal.");
        })
        .await
}
