use std::io;
use std::time::Duration;

use tokio::runtime::{Builder, Handle, Runtime};
use tracing::debug;

/// Injected scheduling primitives: the coordinator's single-thread
/// scheduled executor plus a launcher for the blocking reader thread.
/// Lifecycle is owned by the host; one manager can serve one session.
pub struct ExecutorManager {
    runtime: Runtime,
}

impl ExecutorManager {
    pub fn new() -> io::Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("filament-coordinator")
            .enable_all()
            .build()?;
        Ok(Self { runtime })
    }

    /// Handle for spawning coordinator tasks. Single worker thread, so
    /// a non-yielding task sequence runs in submission order.
    pub fn handle(&self) -> Handle {
        self.runtime.handle().clone()
    }

    /// Launch the named reader thread. The reader blocks on the
    /// connector, so it lives on a plain OS thread rather than the
    /// async executor.
    pub fn spawn_reader<F>(&self, name: &str, f: F) -> io::Result<std::thread::JoinHandle<()>>
    where
        F: FnOnce() + Send + 'static,
    {
        std::thread::Builder::new().name(name.to_string()).spawn(f)
    }

    /// Tear the executor down without waiting for stray timers.
    pub fn shutdown(self, grace: Duration) {
        debug!("shutting down executor");
        self.runtime.shutdown_timeout(grace);
    }
}
