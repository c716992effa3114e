//! src/tester.rs
//!
//! Defines `Tester`, which binds an `axum` application to a local port on an
//! event loop for the duration of a test, and `TesterGuard`, its scoped form.

use crate::{
    client::{ClientCustomizer, HttpClient},
    config::TesterConfig,
    error::{Error, Result},
    event_loop::EventLoop,
    routes::{under_origin, RouteNames},
    server::ServerHandle,
};
use axum::Router;
use std::{
    future::Future,
    net::SocketAddr,
    ops::{Deref, DerefMut},
    sync::Arc,
};
use url::Url;

/// Everything that exists only between `setup` and `teardown`.
struct Running {
    event_loop: EventLoop,
    server: ServerHandle,
    client: HttpClient,
    base_url: Url,
}

enum State {
    Idle,
    Running(Running),
    Finished,
}

/// Serves an application on a local port for a single test.
///
/// ```no_run
/// use app_tester::Tester;
/// use axum::{routing::get, Router};
///
/// # fn main() -> app_tester::Result<()> {
/// let app = Router::new().route("/hello", get(|| async { "Hello" }));
/// let tester = Tester::new(app).enter()?;
/// let body = tester.run_sync(async {
///     tester.http_client()?.get("/hello").await?.text()
/// })??;
/// assert_eq!(body, "Hello");
/// # Ok(())
/// # }
/// ```
///
/// A `Tester` is single use: once torn down it cannot be set up again.
/// Testers that must talk to each other, or be driven from the same test
/// future, have to share one `EventLoop` via [`Tester::with_event_loop`].
pub struct Tester {
    app: Router,
    shared_loop: Option<EventLoop>,
    config: TesterConfig,
    routes: RouteNames,
    client_setup: Option<ClientCustomizer>,
    state: State,
}

impl Tester {
    /// A tester that creates (and owns) its own event loop at `setup`.
    pub fn new(app: Router) -> Self {
        Self {
            app,
            shared_loop: None,
            config: TesterConfig::default(),
            routes: RouteNames::new(),
            client_setup: None,
            state: State::Idle,
        }
    }

    /// A tester that runs on a caller-supplied loop. The loop outlives
    /// `teardown`.
    pub fn with_event_loop(app: Router, event_loop: EventLoop) -> Self {
        Self {
            app,
            shared_loop: Some(event_loop),
            config: TesterConfig::default(),
            routes: RouteNames::new(),
            client_setup: None,
            state: State::Idle,
        }
    }

    pub fn config(mut self, config: TesterConfig) -> Self {
        self.config = config;
        self
    }

    /// Customizes the `reqwest` client built at `setup`, e.g. with default
    /// headers or a cookie store.
    pub fn client_builder<F>(mut self, customize: F) -> Self
    where
        F: Fn(reqwest::ClientBuilder) -> reqwest::ClientBuilder + Send + Sync + 'static,
    {
        self.client_setup = Some(Arc::new(customize));
        self
    }

    /// Registers `pattern` (an `axum` path such as `/user/:name`) under `name`
    /// for `url_for` and `url_for_route`.
    pub fn named_route(mut self, name: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.routes.insert(name, pattern);
        self
    }

    /// Sets the tester up and returns a guard that tears it down on drop.
    pub fn enter(mut self) -> Result<TesterGuard> {
        self.setup()?;
        Ok(TesterGuard { tester: self })
    }

    /// Binds the application to a port and starts serving it on the loop.
    pub fn setup(&mut self) -> Result<()> {
        match self.state {
            State::Idle => {}
            State::Running(_) => return Err(Error::AlreadySetUp),
            State::Finished => return Err(Error::Reused),
        }

        let event_loop = match &self.shared_loop {
            Some(shared) => shared.clone(),
            None => EventLoop::new()?,
        };

        let server = ServerHandle::start(self.app.clone(), &self.config, &event_loop)?;
        let base_url = Url::parse(&format!("http://{}/", server.local_addr))?;
        let client = HttpClient::new(
            &event_loop,
            base_url.clone(),
            &self.config,
            self.client_setup.as_ref(),
        )?;

        tracing::debug!(
            base_url = %base_url,
            owns_loop = self.shared_loop.is_none(),
            "Tester set up"
        );
        self.state = State::Running(Running {
            event_loop,
            server,
            client,
            base_url,
        });
        Ok(())
    }

    /// Stops the server, waits for its socket to close and releases the loop
    /// if this tester created it.
    ///
    /// Must be called outside of any async context, since it drives the loop
    /// until the server has drained.
    pub fn teardown(&mut self) -> Result<()> {
        if !matches!(self.state, State::Running(_)) {
            return Err(Error::NotReady);
        }
        if tokio::runtime::Handle::try_current().is_ok() {
            return Err(Error::InsideEventLoop);
        }
        let State::Running(running) = std::mem::replace(&mut self.state, State::Finished) else {
            return Err(Error::NotReady);
        };

        let Running {
            event_loop,
            server,
            client,
            base_url,
        } = running;
        drop(client);

        let stopped = event_loop.run_sync(server.stopped(self.config.shutdown_timeout()));
        drop(event_loop);
        tracing::debug!(base_url = %base_url, "Tester torn down");
        stopped?
    }

    /// Best-effort teardown for contexts where blocking is not possible.
    fn abandon(&mut self) {
        if let State::Running(running) = std::mem::replace(&mut self.state, State::Finished) {
            tracing::warn!(
                base_url = %running.base_url,
                "Tester dropped inside an async context; aborting server without waiting"
            );
            running.server.abort();
        }
    }

    fn running(&self) -> Result<&Running> {
        match &self.state {
            State::Running(running) => Ok(running),
            _ => Err(Error::NotReady),
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, State::Running(_))
    }

    pub fn app(&self) -> &Router {
        &self.app
    }

    /// The loop the server runs on.
    pub fn event_loop(&self) -> Result<&EventLoop> {
        Ok(&self.running()?.event_loop)
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.running()?.server.local_addr)
    }

    pub fn port(&self) -> Result<u16> {
        Ok(self.local_addr()?.port())
    }

    /// `http://host:port/` of the bound socket.
    pub fn base_url(&self) -> Result<&Url> {
        Ok(&self.running()?.base_url)
    }

    /// A client bound to this tester's loop.
    pub fn http_client(&self) -> Result<HttpClient> {
        Ok(self.running()?.client.clone())
    }

    /// Builds a URL for the application.
    ///
    /// Absolute `http://`/`https://` URLs are returned as given; paths
    /// starting with `/` are appended to the bound host and port; anything
    /// else is taken as the name of a route without captures.
    pub fn url_for(&self, name_or_url: &str) -> Result<Url> {
        let base = self.base_url()?;
        if name_or_url.starts_with("http://") || name_or_url.starts_with("https://") {
            Ok(Url::parse(name_or_url)?)
        } else if name_or_url.starts_with('/') {
            under_origin(base, name_or_url)
        } else {
            self.routes.reverse(base, name_or_url, &[])
        }
    }

    /// Builds the URL of the route registered as `name`, filling its
    /// captures with `args` in order.
    pub fn url_for_route(&self, name: &str, args: &[&str]) -> Result<Url> {
        self.routes.reverse(self.base_url()?, name, args)
    }

    /// Drives `future` to completion on this tester's loop.
    pub fn run_sync<F: Future>(&self, future: F) -> Result<F::Output> {
        self.event_loop()?.run_sync(future)
    }
}

impl Drop for Tester {
    fn drop(&mut self) {
        if !self.is_running() {
            return;
        }
        match self.teardown() {
            Ok(()) => {}
            Err(Error::InsideEventLoop) => self.abandon(),
            Err(e) => tracing::error!(error = %e, "Tester teardown failed"),
        }
    }
}

/// A set-up `Tester` that is torn down when the guard goes out of scope,
/// whether by normal exit, early return or panic.
pub struct TesterGuard {
    tester: Tester,
}

impl TesterGuard {
    /// Tears down now and reports the outcome, instead of on drop.
    pub fn finish(mut self) -> Result<()> {
        self.tester.teardown()
    }
}

impl Deref for TesterGuard {
    type Target = Tester;

    fn deref(&self) -> &Tester {
        &self.tester
    }
}

impl DerefMut for TesterGuard {
    fn deref_mut(&mut self) -> &mut Tester {
        &mut self.tester
    }
}
