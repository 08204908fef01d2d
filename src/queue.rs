//! Ordered, one-at-a-time task runner.
//!
//! Session persistence goes through a [`WriteQueue`] so that two mutations of
//! the same session never write the cookie concurrently, even when they come
//! from overlapping async work.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;

use crate::error::Error;

type Job = Pin<Box<dyn Future<Output = ()> + Send>>;

#[derive(Default)]
struct QueueState {
    pending: VecDeque<Job>,
    draining: bool,
}

/// Runs enqueued tasks strictly in enqueue order, at most one at a time.
///
/// Cloning yields another handle to the same queue.
#[derive(Clone, Default)]
pub struct WriteQueue {
    state: Arc<Mutex<QueueState>>,
}

impl WriteQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue `task` and wait for it to run.
    ///
    /// Resolves with the task's own result. A failing task does not affect
    /// the tasks queued behind it.
    ///
    /// # Errors
    ///
    /// Returns the task's error, or [`Error::QueueAborted`] if the task
    /// panicked before producing a result.
    pub async fn enqueue<F, T>(&self, task: F) -> Result<T, Error>
    where
        F: Future<Output = Result<T, Error>> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let job: Job = Box::pin(async move {
            // Receiver may be gone if the caller was dropped; the task still ran in order.
            let _ = tx.send(task.await);
        });

        let start_drain = {
            let mut state = self.lock();
            state.pending.push_back(job);
            !std::mem::replace(&mut state.draining, true)
        };
        if start_drain {
            tokio::spawn(self.clone().drain());
        }

        rx.await.map_err(|_| Error::QueueAborted)?
    }

    /// Number of tasks waiting to run (excluding the one in flight).
    #[must_use]
    pub fn pending(&self) -> usize {
        self.lock().pending.len()
    }

    async fn drain(self) {
        loop {
            let job = {
                let mut state = self.lock();
                match state.pending.pop_front() {
                    Some(job) => job,
                    None => {
                        state.draining = false;
                        return;
                    }
                }
            };
            // Each job runs in its own task so a panic only aborts that job.
            if let Err(e) = tokio::spawn(job).await {
                tracing::error!(error = %e, "Session write task aborted");
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
