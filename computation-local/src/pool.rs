//! Worker pool on which batches run

use std::future::Future;
use std::io;
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::task::JoinHandle;
use tracing::debug;

/// Either a dedicated multi-threaded runtime or a handle to an existing one
#[derive(Debug)]
pub struct WorkerPool {
    runtime: Option<Runtime>,
    handle: Handle,
}

impl WorkerPool {
    /// Dedicated runtime with `threads` worker threads
    pub fn new(threads: usize) -> io::Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(threads.max(1))
            .thread_name("computation-worker")
            .enable_all()
            .build()?;
        debug!("Started worker pool with {} threads", threads.max(1));
        let handle = runtime.handle().clone();
        Ok(Self {
            runtime: Some(runtime),
            handle,
        })
    }

    /// Run on a runtime owned by the caller
    pub fn from_handle(handle: Handle) -> Self {
        Self { runtime: None, handle }
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    pub fn is_dedicated(&self) -> bool {
        self.runtime.is_some()
    }

    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.handle.spawn(future)
    }

    /// Stop a dedicated runtime without waiting for its tasks; tasks still
    /// running are dropped. Does nothing for a borrowed handle.
    pub fn shutdown(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            debug!("Shutting down worker pool");
            runtime.shutdown_background();
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}
