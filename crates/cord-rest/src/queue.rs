//! Per-bucket request queue
//!
//! Each queue owns a dedicated worker task that drains tasks strictly in
//! arrival order, one at a time. Before each task the worker asks the bucket's
//! limiter for admission and sleeps until the reset time when the bucket is
//! exhausted. A single worker per queue means a finished task and an expired
//! wait can never start two tasks at once.

use crate::error::{RestError, RestResult};
use crate::limiter::{now_millis, Acquire, BucketLimiter};
use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

type Task = BoxFuture<'static, ()>;

/// FIFO queue for one rate-limit bucket
pub struct RequestQueue {
    key: Arc<str>,
    limiter: Arc<Mutex<BucketLimiter>>,
    sender: mpsc::UnboundedSender<Task>,
    pending: Arc<AtomicUsize>,
}

impl RequestQueue {
    /// Create a queue and spawn its worker on the current Tokio runtime
    ///
    /// # Panics
    /// Panics if called outside of a Tokio runtime.
    pub fn new(key: impl Into<Arc<str>>) -> Self {
        let key = key.into();
        let limiter = Arc::new(Mutex::new(BucketLimiter::new()));
        let pending = Arc::new(AtomicUsize::new(0));
        let (sender, receiver) = mpsc::unbounded_channel();

        tokio::spawn(drain(
            key.clone(),
            limiter.clone(),
            pending.clone(),
            receiver,
        ));

        Self {
            key,
            limiter,
            sender,
            pending,
        }
    }

    /// Bucket key this queue serializes
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The bucket's limiter, shared with running tasks so they can record
    /// response headers before the next task is admitted
    pub fn limiter(&self) -> &Arc<Mutex<BucketLimiter>> {
        &self.limiter
    }

    /// Number of tasks waiting to start
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Append a task and return a future for its result.
    ///
    /// The task is queued when this method is called, not when the returned
    /// future is first polled, so call order is execution order. Dropping the
    /// returned future does not remove the task from the queue.
    pub fn enqueue<F, T>(&self, task: F) -> impl Future<Output = RestResult<T>> + Send + 'static
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let job: Task = Box::pin(async move {
            let _ = tx.send(task.await);
        });

        self.pending.fetch_add(1, Ordering::SeqCst);
        let queued = self.sender.send(job).is_ok();
        if !queued {
            self.pending.fetch_sub(1, Ordering::SeqCst);
        }

        async move {
            if !queued {
                return Err(RestError::QueueClosed);
            }
            rx.await.map_err(|_| RestError::QueueClosed)
        }
    }
}

impl std::fmt::Debug for RequestQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestQueue")
            .field("key", &self.key)
            .field("pending", &self.pending())
            .field("limiter", &*self.limiter.lock())
            .finish()
    }
}

/// Worker loop: admit, run, repeat. Ends when the queue is dropped.
async fn drain(
    key: Arc<str>,
    limiter: Arc<Mutex<BucketLimiter>>,
    pending: Arc<AtomicUsize>,
    mut receiver: mpsc::UnboundedReceiver<Task>,
) {
    while let Some(task) = receiver.recv().await {
        loop {
            let decision = limiter.lock().try_acquire(now_millis());
            match decision {
                Acquire::Ready => break,
                Acquire::Wait(wait) => {
                    tracing::debug!(
                        bucket = %key,
                        wait_ms = wait.as_millis() as u64,
                        "Bucket exhausted, waiting for reset"
                    );
                    tokio::time::sleep(wait).await;
                }
            }
        }

        pending.fetch_sub(1, Ordering::SeqCst);
        task.await;
    }

    tracing::trace!(bucket = %key, "Request queue worker stopped");
}
