//! Bounded Task Pool
//!
//! A fixed-size permit set shared by the tasks of one operation, plus a
//! cancellation token that stops every pending and running task at once.
//!
//! Submitted tasks are plain futures: the pool never spawns, so tasks may
//! borrow from the caller and are driven by whatever combinator the caller
//! uses (typically `FuturesUnordered`).
//!
//! [`with_timeout`] layers a deadline on top of any cancellable operation.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// Bounded, cancellable set of concurrent tasks.
#[derive(Debug, Clone)]
pub struct TaskPool {
    permits: Arc<Semaphore>,
    capacity: usize,
    cancel: CancellationToken,
}

impl TaskPool {
    /// Create a pool running at most `capacity` tasks at a time.
    ///
    /// The pool's token is a child of `parent`: cancelling the caller's
    /// operation cancels the pool, but `cancel_all` never reaches the parent.
    pub fn new(capacity: usize, parent: &CancellationToken) -> Self {
        let capacity = capacity.max(1);
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
            cancel: parent.child_token(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Permits not currently held by a running task.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Token to hand to the tasks' own suspension points.
    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Wrap `task` so it waits for a permit before running.
    ///
    /// Resolves to `Error::Cancelled` if the pool is cancelled while the task
    /// waits or runs. The permit is released when the returned future
    /// completes or is dropped.
    pub fn submit<F>(&self, task: F) -> impl Future<Output = Result<F::Output>>
    where
        F: Future,
    {
        let permits = Arc::clone(&self.permits);
        let cancel = self.cancel.clone();

        async move {
            let _permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                permit = permits.acquire_owned() => permit.map_err(|_| Error::Cancelled)?,
            };

            tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(Error::Cancelled),
                output = task => Ok(output),
            }
        }
    }

    /// Cancel every pending and running task. Safe to call repeatedly.
    pub fn cancel_all(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Run `operation` with a child of `cancel`, cancelling that child and
/// returning `Error::Timeout` if it does not finish within `timeout`.
///
/// Without a timeout the operation runs under the caller's token directly.
pub async fn with_timeout<T, F, Fut>(
    timeout: Option<Duration>,
    cancel: &CancellationToken,
    operation: F,
) -> Result<T>
where
    F: FnOnce(CancellationToken) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let Some(timeout) = timeout else {
        return operation(cancel.clone()).await;
    };

    let token = cancel.child_token();
    match tokio::time::timeout(timeout, operation(token.clone())).await {
        Ok(result) => result,
        Err(_) => {
            token.cancel();
            Err(Error::Timeout(timeout))
        }
    }
}
