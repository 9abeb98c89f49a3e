//! Execution strategies for event dispatch.
//!
//! A dispatch is handed to an [`Executor`] as a single task: every listener
//! matched by one event runs in order inside that task.

use tokio::runtime::Handle;

/// A unit of dispatch work.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Runs dispatch tasks.
pub trait Executor: Send + Sync {
    fn execute(&self, task: Task);
}

/// Runs each task immediately on the calling thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectExecutor;

impl Executor for DirectExecutor {
    fn execute(&self, task: Task) {
        task();
    }
}

/// Runs each task on a tokio runtime's blocking pool.
///
/// Listeners are synchronous and may block, so tasks go through
/// `spawn_blocking` rather than the async worker threads.
#[derive(Debug, Clone)]
pub struct TokioExecutor {
    handle: Handle,
}

impl TokioExecutor {
    #[must_use]
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Binds to the runtime of the calling context, if there is one.
    #[must_use]
    pub fn try_current() -> Option<Self> {
        Handle::try_current().ok().map(Self::new)
    }
}

impl Executor for TokioExecutor {
    fn execute(&self, task: Task) {
        // Detached: completion is observed through the listeners themselves.
        drop(self.handle.spawn_blocking(task));
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    #[test]
    fn direct_executor_runs_inline() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        DirectExecutor.execute(Box::new(move || {
            flag.store(true, Ordering::SeqCst);
        }));
        assert!(ran.load(Ordering::SeqCst));
    }

    #[test]
    fn try_current_outside_runtime_is_none() {
        assert!(TokioExecutor::try_current().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn tokio_executor_runs_task_off_thread() {
        let executor = TokioExecutor::try_current().unwrap();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let caller = std::thread::current().id();

        executor.execute(Box::new(move || {
            let _ = tx.send(std::thread::current().id());
        }));

        let worker = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_ne!(worker, caller);
    }
}
