//! Bounded task scheduler for per-token work.

use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::StreamExt;
use futures::stream::FuturesUnordered;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::{AbortHandle, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::error::{RenderError, RenderResult};

const DEFAULT_MAX_CONCURRENCY: NonZeroUsize = match NonZeroUsize::new(32) {
    Some(limit) => limit,
    None => unreachable!(),
};

/// Maximum number of concurrent store and authorization calls.
#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    max_concurrency: NonZeroUsize,
}

impl SchedulerConfig {
    /// Creates a new configuration with the supplied concurrency limit.
    #[must_use]
    pub const fn new(max_concurrency: NonZeroUsize) -> Self {
        Self { max_concurrency }
    }

    /// Returns the configured concurrency limit.
    #[must_use]
    pub const fn max_concurrency(self) -> NonZeroUsize {
        self.max_concurrency
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CONCURRENCY)
    }
}

/// Wrapper around `tokio::spawn` that bounds how many tasks run at once.
///
/// Clones share the same permit pool, so one scheduler can bound every render
/// running in a process.
#[derive(Debug, Clone)]
pub struct TaskScheduler {
    semaphore: Arc<Semaphore>,
    closed: Arc<AtomicBool>,
    config: SchedulerConfig,
}

impl TaskScheduler {
    /// Constructs a scheduler using the provided configuration.
    #[must_use]
    pub fn new(config: SchedulerConfig) -> Self {
        let permits = config.max_concurrency().get();
        Self {
            semaphore: Arc::new(Semaphore::new(permits)),
            closed: Arc::new(AtomicBool::new(false)),
            config,
        }
    }

    /// Returns the associated configuration.
    #[must_use]
    pub const fn config(&self) -> SchedulerConfig {
        self.config
    }

    /// Returns `true` if the scheduler has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Closes the scheduler. Queued tasks resolve to [`SchedulerError::Closed`].
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.semaphore.close();
    }

    /// Spawns a future once a concurrency permit is available. The task runs
    /// inside the caller's current span.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Closed`] when the scheduler is closed before the
    /// task is enqueued. A task still waiting for a permit when the scheduler
    /// closes yields the same error through its handle.
    pub fn spawn<F, T>(&self, future: F) -> SchedulerResult<JoinHandle<SchedulerResult<T>>>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        if self.is_closed() {
            return Err(SchedulerError::Closed);
        }

        let semaphore = Arc::clone(&self.semaphore);

        let handle = tokio::spawn(async move {
            let permit = semaphore
                .acquire_owned()
                .await
                .map_err(|_| SchedulerError::Closed)?;
            let output = future.await;
            drop(permit);
            Ok::<_, SchedulerError>(output)
        }
        .in_current_span());

        Ok(handle)
    }
}

impl Default for TaskScheduler {
    fn default() -> Self {
        Self::new(SchedulerConfig::default())
    }
}

/// Errors produced by the scheduler.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchedulerError {
    /// Scheduler is closed and will not accept new tasks.
    #[error("scheduler closed")]
    Closed,
}

/// Result alias for scheduler operations.
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Aborts every tracked task when dropped.
struct AbortOnDrop(Vec<AbortHandle>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        for handle in &self.0 {
            handle.abort();
        }
    }
}

/// Awaits every handle, returning outputs in submission order.
///
/// The first failure or a cancellation of `cancel` aborts every task that is
/// still running. Dropping the returned future does the same.
pub(crate) async fn join_fail_fast<T>(
    handles: Vec<JoinHandle<SchedulerResult<RenderResult<T>>>>,
    cancel: &CancellationToken,
) -> RenderResult<Vec<T>>
where
    T: Send + 'static,
{
    let _abort = AbortOnDrop(handles.iter().map(JoinHandle::abort_handle).collect());
    let mut outputs: Vec<Option<T>> = handles.iter().map(|_| None).collect();
    let mut pending: FuturesUnordered<_> = handles
        .into_iter()
        .enumerate()
        .map(|(index, handle)| async move { (index, handle.await) })
        .collect();

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(RenderError::Cancelled),
            next = pending.next() => {
                let Some((index, joined)) = next else { break };
                let output = joined
                    .map_err(|err| RenderError::internal(format!("render task failed: {err}")))??;
                outputs[index] = Some(output?);
            }
        }
    }

    Ok(outputs.into_iter().flatten().collect())
}
