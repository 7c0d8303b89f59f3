//! Parallel test execution
//!
//! Bounds how many test functions run at once and decides whether a group
//! of sibling units runs concurrently or one after another.

use futures::future::join_all;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

/// Concurrency policy of one run
#[derive(Debug, Clone)]
pub struct ParallelPolicy {
    parallel: bool,
    max_concurrent: usize,
    semaphore: Arc<Semaphore>,
}

impl ParallelPolicy {
    pub fn new(parallel: bool, max_concurrent: usize) -> Self {
        let max_concurrent = if parallel { max_concurrent.max(1) } else { 1 };
        Self {
            parallel,
            max_concurrent,
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
        }
    }

    pub fn is_parallel(&self) -> bool {
        self.parallel
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Wait for a slot to run one test function
    pub async fn acquire(&self) -> Option<OwnedSemaphorePermit> {
        self.semaphore.clone().acquire_owned().await.ok()
    }

    /// Run `units` concurrently, or in order when `serialized` or when
    /// parallelism is off
    pub async fn run_all<F>(&self, serialized: bool, units: Vec<F>)
    where
        F: Future<Output = ()>,
    {
        if serialized || !self.parallel {
            debug!("Running {} units sequentially", units.len());
            for unit in units {
                unit.await;
            }
        } else {
            debug!("Running {} units concurrently", units.len());
            join_all(units).await;
        }
    }
}
