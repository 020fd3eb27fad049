//! Bounded worker pool for materialization builds.
//!
//! Builds are submitted eagerly but at most `size` run at once; the
//! rest wait on the semaphore inside their spawned task, which is what
//! lets a queued build observe a cancellation that arrived before its
//! slot came up.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

#[derive(Clone)]
pub struct WorkerPool {
    slots: Arc<Semaphore>,
    size: usize,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            slots: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of builds that could start immediately.
    pub fn available(&self) -> usize {
        self.slots.available_permits()
    }

    /// Spawn a job that waits for a slot before running.
    pub fn spawn<F>(&self, job: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let slots = Arc::clone(&self.slots);
        tokio::spawn(async move {
            // Acquisition only fails if the semaphore is closed, which
            // never happens while the pool is alive.
            let Ok(_permit) = slots.acquire_owned().await else {
                return;
            };
            job.await;
        })
    }
}
