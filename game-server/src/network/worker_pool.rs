use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkerPoolError {
    #[error("worker pool is closed")]
    Closed,
    #[error("job panicked")]
    Panicked,
    #[error("job was cancelled")]
    Cancelled,
}

/// Runs synchronous request handling on blocking threads, with at most
/// `size` jobs in flight across the whole server.
#[derive(Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    size: usize,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Free slots right now.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Waits for a free slot, then runs `job` to completion on it.
    pub async fn execute<F, T>(&self, job: F) -> Result<T, WorkerPoolError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| WorkerPoolError::Closed)?;

        let handle = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            job()
        });

        match handle.await {
            Ok(value) => Ok(value),
            Err(e) if e.is_panic() => {
                error!("Worker job panicked");
                Err(WorkerPoolError::Panicked)
            }
            Err(_) => Err(WorkerPoolError::Cancelled),
        }
    }

    /// Rejects every job submitted after this call.
    pub fn close(&self) {
        self.permits.close();
    }

    pub fn is_closed(&self) -> bool {
        self.permits.is_closed()
    }
}
