use crate::client::HttpClient;
use crate::config::RunMode;
use crate::error::StressError;
use crate::pool::RequestPool;
use crate::statistics::RequestResult;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Notify, Semaphore};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, trace, warn};

/// Fires exactly once, when the `target`th completion arrives.
pub struct CompletionBarrier {
    target: u64,
    completed: AtomicU64,
    reached: Notify,
}

impl CompletionBarrier {
    #[must_use]
    pub fn new(target: u64) -> Self {
        Self {
            target,
            completed: AtomicU64::new(0),
            reached: Notify::new(),
        }
    }

    pub fn arrive(&self) {
        let completed = self.completed.fetch_add(1, Ordering::AcqRel) + 1;
        if completed == self.target {
            // Stores a permit if nobody waits yet, so the wakeup is never lost
            self.reached.notify_one();
        }
    }

    #[inline]
    #[must_use]
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Acquire)
    }

    /// Resolves once `target` completions have arrived. Meant for a single waiter.
    pub async fn wait(&self) {
        if self.completed() >= self.target {
            return;
        }
        self.reached.notified().await;
    }
}

/// Issues requests under a concurrency cap, one worker task per request.
pub struct Dispatcher {
    client: HttpClient,
    limiter: Arc<Semaphore>,
    pool: RequestPool,
    results: mpsc::Sender<RequestResult>,
    completions: Option<Arc<CompletionBarrier>>,
    workers: TaskTracker,
    count_bytes: bool,
}

impl Dispatcher {
    #[must_use]
    pub fn new(
        client: HttpClient,
        concurrency: usize,
        pool: RequestPool,
        results: mpsc::Sender<RequestResult>,
        completions: Option<Arc<CompletionBarrier>>,
        count_bytes: bool,
    ) -> Self {
        Self {
            client,
            limiter: Arc::new(Semaphore::new(concurrency.max(1))),
            pool,
            results,
            completions,
            workers: TaskTracker::new(),
            count_bytes,
        }
    }

    /// Handle on every worker this dispatcher spawns.
    #[must_use]
    pub fn workers(&self) -> TaskTracker {
        self.workers.clone()
    }

    /// Waits for a permit and a pooled request, then spawns the worker.
    pub async fn dispatch(&mut self) -> Result<(), StressError> {
        let permit = self
            .limiter
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| StressError::LimiterClosed)?;
        let request = self.pool.acquire().await?;
        let client = self.client.clone();
        let results = self.results.clone();
        let completions = self.completions.clone();
        let count_bytes = self.count_bytes;
        self.workers.spawn(async move {
            let result = client.execute(request, count_bytes).await;
            drop(permit);
            if results.send(result).await.is_err() {
                trace!("result pipeline closed, dropping late result");
            }
            if let Some(completions) = completions {
                completions.arrive();
            }
        });
        Ok(())
    }

    /// Dispatches until `stop` fires, or until exactly `n` requests have
    /// gone out in count mode. Returns how many were dispatched.
    pub async fn run(mut self, mode: RunMode, stop: CancellationToken) -> u64 {
        let limit = match mode {
            RunMode::Count(n) => Some(n),
            RunMode::Duration(_) => None,
        };
        let mut dispatched = 0u64;
        while limit.map_or(true, |n| dispatched < n) {
            tokio::select! {
                biased;
                () = stop.cancelled() => break,
                res = self.dispatch() => match res {
                    Ok(()) => dispatched += 1,
                    Err(e) => {
                        warn!(error = %e, dispatched, "dispatcher stopped");
                        break;
                    }
                },
            }
        }
        debug!(dispatched, "dispatcher exiting");
        dispatched
    }
}
