//! Batch Coordinator
//!
//! Fans independent jobs across a bounded number of workers. Results come
//! back in input order whatever order the jobs finish in.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error};

use crate::error::JobError;
use crate::job::{Job, JobId, JobResult};

/// Default worker limit
pub const DEFAULT_MAX_CONCURRENCY: usize = 4;

#[derive(Debug, Clone, Copy)]
pub struct BatchCoordinator {
    max_concurrency: usize,
}

impl BatchCoordinator {
    /// A limit of 0 is treated as 1
    pub fn new(max_concurrency: usize) -> Self {
        Self {
            max_concurrency: max_concurrency.max(1),
        }
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Run every job through `run`, at most `max_concurrency` at a time
    ///
    /// Permits are handed out in submission order. One job failing or
    /// panicking never affects its siblings.
    pub async fn run_batch<F, Fut>(&self, jobs: Vec<Job>, run: F) -> Vec<JobResult>
    where
        F: Fn(Job) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = JobResult> + Send + 'static,
    {
        let total = jobs.len();
        let ids: Vec<JobId> = jobs.iter().map(|job| job.id).collect();
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let results = Arc::new(Mutex::new(vec![None; total]));
        let run = Arc::new(run);
        let mut join_set = JoinSet::new();

        debug!(jobs = total, max_concurrency = self.max_concurrency, "Starting batch");

        for (index, job) in jobs.into_iter().enumerate() {
            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    error!(error = %e, "Batch semaphore closed");
                    break;
                }
            };
            let run = run.clone();
            let results = results.clone();

            join_set.spawn(async move {
                let result = run(job).await;
                drop(permit);

                let mut slots = results.lock().await;
                slots[index] = Some(result);
            });
        }

        // Wait for all tasks
        while let Some(joined) = join_set.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Batch job panicked");
            }
        }

        let mut slots = results.lock().await;
        slots
            .drain(..)
            .zip(ids)
            .map(|(slot, id)| {
                slot.unwrap_or_else(|| {
                    JobResult::failure(id, JobError::Internal("job did not complete".to_string()))
                })
            })
            .collect()
    }
}

impl Default for BatchCoordinator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CONCURRENCY)
    }
}
