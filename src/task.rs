//! Cancellable background task groups
//!
//! Each start/stop-able component owns at most one [`TaskGroup`]. Tasks watch
//! a shared shutdown signal at their suspension points; stopping sends the
//! signal and joins every handle so no task outlives the group.

use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::warn;

/// Receiving side of a group's shutdown signal
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    /// Resolves once shutdown has been requested or the group is gone
    pub async fn requested(&mut self) {
        while !*self.rx.borrow_and_update() {
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Tasks sharing one shutdown signal
#[derive(Debug)]
pub struct TaskGroup {
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl TaskGroup {
    pub fn new() -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            shutdown,
            handles: Vec::new(),
        }
    }

    /// Spawn a task on the current runtime, handing it the shutdown signal
    pub fn spawn<F, Fut>(&mut self, task: F)
    where
        F: FnOnce(Shutdown) -> Fut,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let shutdown = Shutdown {
            rx: self.shutdown.subscribe(),
        };
        self.handles.push(tokio::spawn(task(shutdown)));
    }

    /// True while at least one task is still running
    pub fn is_active(&self) -> bool {
        self.handles.iter().any(|h| !h.is_finished())
    }

    /// Signal shutdown and wait for every task to exit
    pub async fn shutdown(mut self) {
        self.shutdown.send_replace(true);
        for handle in self.handles.drain(..) {
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    warn!(error = %e, "Background task ended abnormally");
                }
            }
        }
    }
}

impl Default for TaskGroup {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TaskGroup {
    fn drop(&mut self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}

/// Lock a std mutex, recovering the data if a holder panicked
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
