//! Bounded worker pool that drains a [`PriorityJobQueue`]
//!
//! Each dequeued job runs in its own tokio task holding one permit of a
//! semaphore sized to the worker limit, so at most `workers` handler calls
//! are in flight at any time. A permit is taken *before* a job is dequeued:
//! when cancellation fires, jobs not yet handed to a worker stay in the
//! queue, while jobs already running are left to finish.

use std::future::Future;
use std::sync::{Arc, Mutex};

use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::queue::{Job, PriorityJobQueue};
use crate::error::{Error, Result};

/// What a call to [`Dispatcher::process_all`] did
#[derive(Debug, Default)]
pub struct DispatchOutcome {
    /// Jobs dequeued and handed to a worker
    pub processed: usize,
    /// First error any handler returned; later ones are only logged
    pub first_error: Option<Error>,
    /// Whether the loop stopped because of cancellation
    pub cancelled: bool,
}

impl DispatchOutcome {
    pub fn into_result(self) -> Result<usize> {
        match self.first_error {
            Some(e) => Err(e),
            None => Ok(self.processed),
        }
    }
}

/// Fixed-size worker pool
#[derive(Debug, Clone)]
pub struct Dispatcher {
    workers: usize,
}

impl Dispatcher {
    /// Create a dispatcher running at most `workers` jobs concurrently
    pub fn new(workers: usize) -> Result<Self> {
        if workers == 0 {
            return Err(Error::config("worker count must be greater than 0"));
        }
        Ok(Self { workers })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Drain `queue` through the pool until it is empty or `cancel` fires
    ///
    /// Always waits for every dispatched task before returning.
    pub async fn process_all<H, Fut>(
        &self,
        queue: &PriorityJobQueue,
        cancel: &CancellationToken,
        handler: H,
    ) -> DispatchOutcome
    where
        H: Fn(Job) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        let errors = Arc::new(ErrorSlot::default());
        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut tasks = JoinSet::new();
        let mut outcome = DispatchOutcome::default();

        debug!(workers = self.workers, queued = queue.len(), "Dispatcher starting");

        loop {
            if cancel.is_cancelled() {
                outcome.cancelled = true;
                break;
            }

            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    outcome.cancelled = true;
                    break;
                }
                permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let Some(job) = queue.dequeue() else {
                break;
            };

            outcome.processed += 1;
            debug!(
                user = %job.user,
                priority = job.priority,
                dispatched = outcome.processed,
                "Dispatching job"
            );

            let handler = Arc::clone(&handler);
            let errors = Arc::clone(&errors);
            tasks.spawn(async move {
                let _permit = permit;
                if let Err(e) = handler(job).await {
                    errors.record(e);
                }
            });
        }

        if outcome.cancelled {
            info!(
                in_flight = tasks.len(),
                abandoned = queue.len(),
                "Dispatcher cancelled, waiting for in-flight jobs"
            );
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(join_err) = joined {
                errors.record(panic_error(join_err));
            }
        }

        outcome.first_error = errors.take();
        debug!(processed = outcome.processed, "Dispatcher finished");
        outcome
    }
}

/// Keeps the first error in completion order
#[derive(Default)]
struct ErrorSlot {
    first: Mutex<Option<Error>>,
}

impl ErrorSlot {
    fn record(&self, err: Error) {
        let mut first = self.first.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if first.is_none() {
            *first = Some(err);
        } else {
            warn!(error = %err, "Additional job error");
        }
    }

    fn take(&self) -> Option<Error> {
        self.first
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }
}

fn panic_error(join_err: JoinError) -> Error {
    if join_err.is_panic() {
        Error::WorkerPanic(join_err.to_string())
    } else {
        Error::other(format!("worker task aborted: {join_err}"))
    }
}
