//! src/event_loop.rs
//!
//! A cloneable handle to the single-threaded tokio runtime that runs both the
//! server under test and the client talking to it.

use crate::error::{Error, Result};
use std::{
    fmt,
    future::Future,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};
use tokio::{
    runtime::{Builder, Handle, Runtime},
    task::JoinHandle,
};

static NEXT_LOOP_ID: AtomicU64 = AtomicU64::new(1);

tokio::task_local! {
    /// Identity of the loop currently driving a `run_sync` future.
    static DRIVING_LOOP: LoopId;
}

/// Unique identity of an `EventLoop`, shared by all of its clones.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LoopId(u64);

struct Inner {
    id: LoopId,
    runtime: Option<Runtime>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        // A runtime may not be dropped (blocking) from within an async context.
        if let Some(runtime) = self.runtime.take() {
            if Handle::try_current().is_ok() {
                tracing::warn!(
                    loop_id = self.id.0,
                    "Event loop released inside an async context; shutting down in background"
                );
                runtime.shutdown_background();
            } else {
                tracing::debug!(loop_id = self.id.0, "Event loop released");
                drop(runtime);
            }
        }
    }
}

/// A single-threaded cooperative scheduler.
///
/// Tasks spawned on the loop only make progress while a thread is inside
/// [`EventLoop::run_sync`]. Clones share the same runtime; the runtime is
/// released when the last clone is dropped.
#[derive(Clone)]
pub struct EventLoop {
    inner: Arc<Inner>,
}

impl EventLoop {
    /// Creates a new `current_thread` runtime with I/O and time enabled.
    pub fn new() -> Result<Self> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        let id = LoopId(NEXT_LOOP_ID.fetch_add(1, Ordering::Relaxed));
        tracing::debug!(loop_id = id.0, "Event loop created");
        Ok(Self {
            inner: Arc::new(Inner {
                id,
                runtime: Some(runtime),
            }),
        })
    }

    pub fn id(&self) -> LoopId {
        self.inner.id
    }

    fn runtime(&self) -> &Runtime {
        // Only `Inner::drop` takes the runtime out.
        self.inner
            .runtime
            .as_ref()
            .unwrap_or_else(|| unreachable!("runtime is present until drop"))
    }

    pub fn handle(&self) -> &Handle {
        self.runtime().handle()
    }

    /// Spawns a task onto the loop. It runs whenever the loop is driven.
    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.runtime().spawn(future)
    }

    /// Drives `future` to completion on this loop, blocking the calling thread.
    ///
    /// Fails with `Error::InsideEventLoop` when called from within an async
    /// context, where blocking would deadlock the outer scheduler.
    pub fn run_sync<F: Future>(&self, future: F) -> Result<F::Output> {
        if Handle::try_current().is_ok() {
            return Err(Error::InsideEventLoop);
        }
        Ok(self
            .runtime()
            .block_on(DRIVING_LOOP.scope(self.id(), future)))
    }

    /// The loop driving the current task, if it was entered via `run_sync`.
    pub fn driving() -> Option<LoopId> {
        DRIVING_LOOP.try_with(|id| *id).ok()
    }
}

impl fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLoop")
            .field("id", &self.inner.id.0)
            .field("handles", &Arc::strong_count(&self.inner))
            .finish()
    }
}
