use crate::statistics::{RequestResult, Stats};
use tokio::sync::mpsc;

/// Slots in the result pipeline between workers and the aggregator.
pub const RESULT_PIPELINE_CAPACITY: usize = 12_000;

/// Creates the bounded pipeline that carries results to the aggregator.
#[must_use]
pub fn pipeline() -> (mpsc::Sender<RequestResult>, Aggregator) {
    let (tx, rx) = mpsc::channel(RESULT_PIPELINE_CAPACITY);
    (tx, Aggregator::new(rx))
}

/// Sole consumer of the result pipeline and sole owner of the run's stats.
pub struct Aggregator {
    results: mpsc::Receiver<RequestResult>,
    stats: Stats,
}

impl Aggregator {
    #[must_use]
    pub fn new(results: mpsc::Receiver<RequestResult>) -> Self {
        Self {
            results,
            stats: Stats::default(),
        }
    }

    /// Waits for one result and folds it. Returns `false` once the pipeline
    /// is closed and empty. Cancel safe.
    pub async fn fold_next(&mut self) -> bool {
        match self.results.recv().await {
            Some(result) => {
                self.stats.fold(&result);
                true
            }
            None => false,
        }
    }

    #[inline]
    #[must_use]
    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    /// Closes the pipeline to further sends and folds what is still buffered.
    pub async fn close_and_drain(mut self) -> Stats {
        self.results.close();
        while let Some(result) = self.results.recv().await {
            self.stats.fold(&result);
        }
        self.stats
    }
}
