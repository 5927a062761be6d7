//! Bounded-concurrency task runner using a Tokio Semaphore.
//!
//! One limiter is built per top-level request so that concurrent requests do
//! not starve each other. The semaphore hands out permits in FIFO order, so
//! tasks are dispatched in submission order.

use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// Hard ceiling on simultaneous verification calls.
pub const MAX_CONCURRENCY: usize = 8;
/// Concurrency used when the caller does not ask for one.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Runs async tasks with at most `limit` in flight.
///
/// Tasks return plain values: a task that wants to report failure returns a
/// `Result`, and the limiter hands it back untouched. A finished task frees
/// its slot whatever it returned.
///
/// # Example
///
/// ```
/// use guildsync_rate_limit::ConcurrencyLimiter;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let limiter = ConcurrencyLimiter::new(2);
/// let doubled = limiter
///     .run_all((1..=5).map(|n| move || async move { n * 2 }))
///     .await;
/// assert_eq!(doubled, vec![2, 4, 6, 8, 10]);
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ConcurrencyLimiter {
    semaphore: Arc<Semaphore>,
    limit: usize,
}

impl ConcurrencyLimiter {
    /// Create a limiter running `min(MAX_CONCURRENCY, max(1, requested))` tasks at once.
    pub fn new(requested: usize) -> Self {
        let limit = requested.clamp(1, MAX_CONCURRENCY);
        debug!(requested, limit, "Creating concurrency limiter");
        Self {
            semaphore: Arc::new(Semaphore::new(limit)),
            limit,
        }
    }

    /// Maximum number of tasks run at once.
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Run one task once a slot is free.
    pub async fn run<F, Fut, T>(&self, task: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let permit = self.semaphore.acquire().await;
        if permit.is_err() {
            // Only reachable if the semaphore is closed, which this type never does.
            warn!("Concurrency limiter closed, running task unbounded");
        }
        let output = task().await;
        drop(permit);
        output
    }

    /// Run every task, at most `limit` at a time, returning outputs in submission order.
    pub async fn run_all<I, F, Fut, T>(&self, tasks: I) -> Vec<T>
    where
        I: IntoIterator<Item = F>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        futures::future::join_all(tasks.into_iter().map(|task| self.run(task))).await
    }
}

impl Default for ConcurrencyLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_CONCURRENCY)
    }
}
