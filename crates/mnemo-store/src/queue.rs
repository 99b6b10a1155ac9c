// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Single-consumer serial executor for all hot-store and archive mutations.
//!
//! Every mutation in mnemo-store is funneled through one background task:
//! the next write begins only after the previous one completed, success or
//! failure. Reads never pass through the queue. There is no cancellation;
//! a task is guaranteed to run once `submit` has been called, even if the
//! caller stops awaiting the returned future.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use mnemo_core::MnemoError;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

type Job = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Counters exposed by [`WriteQueue::stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteQueueStats {
    /// Total tasks ever enqueued.
    pub total_writes: u64,
    /// Highest queue depth observed.
    pub queue_max: usize,
    /// Tasks currently queued or running.
    pub current_queue: usize,
}

/// Serial FIFO executor for store mutations.
pub struct WriteQueue {
    tx: mpsc::UnboundedSender<Job>,
    total_writes: Arc<AtomicU64>,
    queue_max: Arc<AtomicUsize>,
    current_queue: Arc<AtomicUsize>,
}

impl WriteQueue {
    /// Creates the queue and spawns its consumer task.
    ///
    /// `inter_task_delay` inserts a pause after each completed task;
    /// zero (the default configuration) disables it.
    pub fn new(inter_task_delay: Duration) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        let current_queue = Arc::new(AtomicUsize::new(0));
        let consumer_current = Arc::clone(&current_queue);

        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                job.await;
                consumer_current.fetch_sub(1, Ordering::SeqCst);
                if !inter_task_delay.is_zero() {
                    tokio::time::sleep(inter_task_delay).await;
                }
            }
            debug!("write queue consumer stopped");
        });

        Self {
            tx,
            total_writes: Arc::new(AtomicU64::new(0)),
            queue_max: Arc::new(AtomicUsize::new(0)),
            current_queue,
        }
    }

    /// Enqueues a mutation and returns a receiver for its result.
    ///
    /// The task is on the queue before this returns, so it will run
    /// regardless of what the caller does with the receiver.
    pub fn enqueue<T, F, Fut>(&self, task: F) -> oneshot::Receiver<Result<T, MnemoError>>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, MnemoError>> + Send + 'static,
        T: Send + 'static,
    {
        let (done_tx, done_rx) = oneshot::channel();
        let job: Job = Box::pin(async move {
            let result = task().await;
            // Receiver may have been dropped; the write still happened.
            let _ = done_tx.send(result);
        });

        let depth = self.current_queue.fetch_add(1, Ordering::SeqCst) + 1;
        self.queue_max.fetch_max(depth, Ordering::SeqCst);
        self.total_writes.fetch_add(1, Ordering::SeqCst);

        if self.tx.send(job).is_err() {
            // Consumer is gone (runtime shutdown); undo the depth bump so
            // stats do not report a phantom task.
            self.current_queue.fetch_sub(1, Ordering::SeqCst);
        }
        done_rx
    }

    /// Enqueues a mutation and awaits its result.
    pub async fn submit<T, F, Fut>(&self, task: F) -> Result<T, MnemoError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, MnemoError>> + Send + 'static,
        T: Send + 'static,
    {
        self.enqueue(task)
            .await
            .map_err(|_| MnemoError::Internal("write queue task was dropped".to_string()))?
    }

    /// Waits until every previously enqueued task has completed.
    ///
    /// Implemented as a barrier task: FIFO ordering guarantees all prior
    /// work is done once the barrier runs.
    pub async fn drain(&self) -> Result<(), MnemoError> {
        self.submit(|| async { Ok(()) }).await
    }

    /// Current counter snapshot.
    pub fn stats(&self) -> WriteQueueStats {
        WriteQueueStats {
            total_writes: self.total_writes.load(Ordering::SeqCst),
            queue_max: self.queue_max.load(Ordering::SeqCst),
            current_queue: self.current_queue.load(Ordering::SeqCst),
        }
    }
}
