/// Owned background tasks that are aborted when their guard is dropped
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Guard over a spawned task. Dropping it aborts the task.
#[derive(Debug)]
pub struct ScopedTask {
    handle: Option<JoinHandle<()>>,
}

impl ScopedTask {
    /// Spawn `fut` on the current runtime
    pub fn spawn<F>(fut: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self {
            handle: Some(tokio::spawn(fut)),
        }
    }

    /// Run `f` once after `delay`, unless the guard is dropped first
    pub fn delayed<F, Fut>(delay: Duration, f: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self::spawn(async move {
            tokio::time::sleep(delay).await;
            f().await;
        })
    }

    /// Abort now. Equivalent to dropping the guard.
    pub fn cancel(mut self) {
        self.abort();
    }

    /// Release the task without aborting it
    pub fn detach(mut self) {
        self.handle.take();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }

    fn abort(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for ScopedTask {
    fn drop(&mut self) {
        self.abort();
    }
}
