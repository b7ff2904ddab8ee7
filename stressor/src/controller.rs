use crate::aggregator::pipeline;
use crate::client::HttpClient;
use crate::config::{RunConfig, RunMode};
use crate::dispatcher::{CompletionBarrier, Dispatcher};
use crate::error::StressError;
use crate::pool::{RequestPool, RequestPrototype};
use crate::statistics::Stats;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RunState {
    Running,
    Stopping,
    Drained,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// The configured duration elapsed.
    Elapsed,
    /// Every requested completion arrived.
    CountReached,
    /// The external cancellation token fired.
    Cancelled,
    /// The dispatcher gave up before the run was over.
    DispatcherExited,
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub stats: Stats,
    pub stop_reason: StopReason,
    pub dispatched: u64,
    pub elapsed: Duration,
    pub state: RunState,
}

type StopTrigger = Pin<Box<dyn Future<Output = StopReason> + Send>>;

/// The one-shot event that ends a run in `mode`, plus the barrier that
/// workers signal in count mode.
fn arm_stop_trigger(mode: RunMode) -> (Option<Arc<CompletionBarrier>>, StopTrigger) {
    match mode {
        RunMode::Count(n) => {
            let barrier = Arc::new(CompletionBarrier::new(n));
            let waiter = barrier.clone();
            let trigger: StopTrigger = Box::pin(async move {
                waiter.wait().await;
                StopReason::CountReached
            });
            (Some(barrier), trigger)
        }
        RunMode::Duration(duration) => {
            let trigger: StopTrigger = Box::pin(async move {
                sleep(duration).await;
                StopReason::Elapsed
            });
            (None, trigger)
        }
    }
}

/// Why the run ended once the dispatcher is gone after sending `dispatched`
/// requests. Reaching the count target is a normal end.
fn exit_reason(mode: RunMode, dispatched: u64, cancelled: bool) -> StopReason {
    if cancelled {
        return StopReason::Cancelled;
    }
    match mode {
        RunMode::Count(target) if dispatched == target => StopReason::CountReached,
        _ => StopReason::DispatcherExited,
    }
}

/// Drives one load run from pool fill to final drain.
pub struct RunController {
    config: RunConfig,
    client: HttpClient,
    state: RunState,
}

impl RunController {
    #[must_use]
    pub fn new(config: RunConfig, client: HttpClient) -> Self {
        Self {
            config,
            client,
            state: RunState::Running,
        }
    }

    #[inline]
    #[must_use]
    pub fn state(&self) -> RunState {
        self.state
    }

    fn transition(&mut self, next: RunState) {
        debug!(from = ?self.state, to = ?next, "run state change");
        self.state = next;
    }

    /// Runs until the duration elapses, the request count completes or
    /// `cancel` fires, then drains and returns the final stats.
    /// Fails only if the pool cannot be built, before any request goes out.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<RunOutcome, StressError> {
        let prototype = RequestPrototype::new(&self.config.url)?;
        let (pool, replenisher) = RequestPool::fill(prototype, self.config.pool_capacity())?;
        let (results, mut aggregator) = pipeline();
        let (barrier, mut stop_trigger) = arm_stop_trigger(self.config.mode);
        info!(
            url = %self.config.url,
            concurrency = self.config.concurrency,
            mode = ?self.config.mode,
            pool = pool.capacity(),
            "starting run"
        );

        let dispatcher = Dispatcher::new(
            self.client.clone(),
            self.config.concurrency,
            pool,
            results,
            barrier,
            self.config.count_bytes,
        );
        let workers = dispatcher.workers();
        let dispatch_stop = cancel.child_token();
        let started = Instant::now();
        let mut dispatch_task =
            tokio::spawn(dispatcher.run(self.config.mode, dispatch_stop.clone()));

        let mut dispatched = None;
        let mut replenishing = true;
        let mut pipeline_open = true;
        // None: every producer is gone, the reason depends on what was dispatched
        let stop_reason = loop {
            tokio::select! {
                reason = &mut stop_trigger => break Some(reason),
                () = cancel.cancelled() => break Some(StopReason::Cancelled),
                joined = &mut dispatch_task, if dispatched.is_none() => {
                    let n = joined?;
                    dispatched = Some(n);
                    match exit_reason(self.config.mode, n, cancel.is_cancelled()) {
                        StopReason::CountReached => {}
                        reason => break Some(reason),
                    }
                }
                folded = aggregator.fold_next(), if pipeline_open => {
                    if !folded {
                        pipeline_open = false;
                        break None;
                    }
                }
                refilled = replenisher.replenish_one(), if replenishing => {
                    if let Err(e) = refilled {
                        debug!(error = %e, "stopped replenishing the request pool");
                        replenishing = false;
                    }
                }
            }
        };
        self.transition(RunState::Stopping);
        dispatch_stop.cancel();
        let dispatched = match dispatched {
            Some(n) => n,
            None => dispatch_task.await?,
        };
        let stop_reason = stop_reason.unwrap_or_else(|| {
            exit_reason(self.config.mode, dispatched, cancel.is_cancelled())
        });
        info!(reason = ?stop_reason, elapsed = ?started.elapsed(), "stopping run");
        drop(replenisher);

        workers.close();
        let grace = sleep(self.config.grace);
        tokio::pin!(grace);
        loop {
            tokio::select! {
                () = workers.wait() => break,
                () = &mut grace => {
                    warn!(
                        in_flight = workers.len(),
                        grace = ?self.config.grace,
                        "in-flight requests still running after the grace period, their results are dropped"
                    );
                    break;
                }
                folded = aggregator.fold_next(), if pipeline_open => {
                    if !folded {
                        // Every worker has finished
                        break;
                    }
                }
            }
        }

        let stats = aggregator.close_and_drain().await;
        self.transition(RunState::Drained);
        let elapsed = started.elapsed();
        debug!(
            dispatched,
            folded = stats.request_count,
            errors = stats.error_count,
            ?elapsed,
            "run drained"
        );
        Ok(RunOutcome {
            stats,
            stop_reason,
            dispatched,
            elapsed,
            state: self.state,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_test_util::target::{TargetBehavior, TargetHandle};

    #[tokio::test]
    async fn invalid_url_fails_before_any_request() {
        let config = RunConfig::new("ftp://example.com/", RunMode::Count(5));
        let controller = RunController::new(config, HttpClient::new());
        assert_eq!(controller.state(), RunState::Running);
        let err = controller.run(CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, StressError::UnsupportedScheme(_)));
    }

    #[test]
    fn exit_reason_after_producers_are_gone() {
        assert_eq!(
            exit_reason(RunMode::Count(12), 12, false),
            StopReason::CountReached
        );
        assert_eq!(
            exit_reason(RunMode::Count(12), 7, false),
            StopReason::DispatcherExited
        );
        assert_eq!(
            exit_reason(RunMode::Duration(Duration::from_secs(1)), 40, false),
            StopReason::DispatcherExited
        );
        assert_eq!(exit_reason(RunMode::Count(12), 7, true), StopReason::Cancelled);
    }

    #[tokio::test]
    async fn count_run_ends_drained() {
        let target = TargetHandle::spawn(TargetBehavior::default()).await.unwrap();
        let mut config = RunConfig::new(target.url(), RunMode::Count(12));
        config.concurrency = 4;
        let outcome = RunController::new(config, HttpClient::new())
            .run(CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome.state, RunState::Drained);
        assert_eq!(outcome.stop_reason, StopReason::CountReached);
        assert_eq!(outcome.dispatched, 12);
        assert_eq!(outcome.stats.request_count, 12);
    }

    #[tokio::test]
    async fn zero_duration_stops_immediately() {
        let target = TargetHandle::spawn(TargetBehavior::default()).await.unwrap();
        let config = RunConfig::new(target.url(), RunMode::Duration(Duration::ZERO));
        let outcome = RunController::new(config, HttpClient::new())
            .run(CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome.stop_reason, StopReason::Elapsed);
        assert_eq!(outcome.state, RunState::Drained);
        assert_eq!(outcome.stats.request_count, outcome.dispatched);
    }
}
