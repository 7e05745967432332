use std::{future::Future, sync::Arc};
use tokio::sync::{AcquireError, Semaphore, SemaphorePermit};

/// Process-wide cap on concurrent outbound work (HTTP calls and browser captures).
#[derive(Debug, Clone)]
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

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Waits for a free slot. The slot is released when the permit drops.
    pub async fn acquire(&self) -> Result<SemaphorePermit<'_>, AcquireError> {
        self.permits.acquire().await
    }

    /// Runs `task` while holding a slot.
    pub async fn run<F: Future>(&self, task: F) -> Result<F::Output, AcquireError> {
        let _permit = self.acquire().await?;
        Ok(task.await)
    }
}
