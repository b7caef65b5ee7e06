//! Bounded, all-or-nothing concurrent lookups.

use std::future::Future;
use std::sync::{Arc, OnceLock};

use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error};

use crate::context::{ServeContext, StopCause};

#[derive(Debug, Error)]
pub enum FanOutError<E> {
    /// The first job to fail; the rest of the batch was cancelled.
    #[error("{0}")]
    Job(E),

    /// The serve context stopped during the batch.
    #[error(transparent)]
    Cancelled(StopCause),

    #[error("fan-out job panicked")]
    Panicked,
}

/// Runs one job per input with at most `concurrency` in flight.
///
/// Each call to [`FanOut::run`] is its own batch: the first failing job
/// cancels the others (queued jobs never start, running ones are dropped) and
/// its error is returned. Outputs keep input order.
#[derive(Debug, Clone, Copy)]
pub struct FanOut {
    concurrency: usize,
}

impl FanOut {
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
        }
    }

    /// One slot per available CPU.
    pub fn with_available_parallelism() -> Self {
        let n = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self::new(n)
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub async fn run<I, T, E, F, Fut>(
        &self,
        ctx: &ServeContext,
        inputs: Vec<I>,
        job: F,
    ) -> Result<Vec<T>, FanOutError<E>>
    where
        I: Send + 'static,
        T: Send + 'static,
        E: Send + Sync + 'static,
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let total = inputs.len();
        let batch = ctx.child_token();
        let permits = Arc::new(Semaphore::new(self.concurrency));
        let first_error: Arc<OnceLock<E>> = Arc::new(OnceLock::new());
        let job = Arc::new(job);

        let mut tasks = JoinSet::new();
        for (index, input) in inputs.into_iter().enumerate() {
            let batch = batch.clone();
            let permits = permits.clone();
            let first_error = first_error.clone();
            let job = job.clone();

            tasks.spawn(async move {
                let _permit = tokio::select! {
                    biased;
                    _ = batch.cancelled() => return (index, None),
                    permit = permits.acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => return (index, None),
                    },
                };
                if batch.is_cancelled() {
                    return (index, None);
                }

                let outcome = tokio::select! {
                    biased;
                    _ = batch.cancelled() => None,
                    result = (*job)(input) => Some(result),
                };
                match outcome {
                    Some(Ok(value)) => (index, Some(value)),
                    Some(Err(e)) => {
                        // Cancel before the permit is released so no queued job starts.
                        let _ = first_error.set(e);
                        batch.cancel();
                        (index, None)
                    }
                    None => (index, None),
                }
            });
        }

        let mut slots: Vec<Option<T>> = (0..total).map(|_| None).collect();
        let mut panicked = false;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, value)) => slots[index] = value,
                Err(e) => {
                    error!(error = %e, "Fan-out job failed to complete");
                    panicked = true;
                    batch.cancel();
                }
            }
        }

        if let Some(e) = Arc::into_inner(first_error).and_then(OnceLock::into_inner) {
            debug!(total, "Fan-out batch failed");
            return Err(FanOutError::Job(e));
        }
        if panicked {
            return Err(FanOutError::Panicked);
        }
        if let Some(cause) = ctx.cause() {
            return Err(FanOutError::Cancelled(cause));
        }

        slots
            .into_iter()
            .collect::<Option<Vec<T>>>()
            .ok_or(FanOutError::Cancelled(StopCause::Shutdown))
    }
}
