//! The scan loop: drives one task's checkpoint to its end height.
//!
//! # Cycle
//! 1. Compute the next batch (`min(batch_size, end - current)` heights).
//! 2. Dispatch every height of the batch to the worker pool.
//! 3. Wait for one outcome per height (the commit barrier).
//! 4. Any failure → pause, redo the same batch from scratch.
//! 5. All succeeded → `flush`; failure → pause, redo the batch.
//! 6. Advance the checkpoint and persist it, retrying until stored.
//!
//! Nothing in this loop gives up: a collaborator that keeps failing stalls
//! the task (with an error log per attempt) until it recovers or the
//! scanner is cancelled.

use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::checkpoint::CheckpointStore;
use crate::error::ScanError;
use crate::executor::HeightExecutor;
use crate::pool::WorkerPool;
use crate::task::ScanTask;

/// Delay before redoing a failed batch or retrying a checkpoint write.
pub const REPEAT_PAUSE: Duration = Duration::from_secs(5);

/// Upper bound on the height queue and on the worker count; larger batches
/// are fed as workers drain the queue.
const MAX_QUEUE_CAPACITY: u64 = 1 << 16;

/// Workers beyond the batch size would never receive a height.
fn worker_count(task: &ScanTask) -> usize {
    task.concurrency
        .min(task.batch_size)
        .min(MAX_QUEUE_CAPACITY) as usize
}

enum Cycle {
    Committed,
    Failed,
    Cancelled,
}

/// Scans one task's height range in atomic batches.
pub struct Scanner {
    task: ScanTask,
    executor: Arc<dyn HeightExecutor>,
    store: Arc<dyn CheckpointStore>,
    cancel: CancellationToken,
}

impl Scanner {
    /// Build a scanner for `task`.
    ///
    /// The scanner listens on a child of `cancel`: cancelling the parent stops
    /// it, while a scanner finishing its range only stops itself.
    pub fn new(
        task: ScanTask,
        executor: Arc<dyn HeightExecutor>,
        store: Arc<dyn CheckpointStore>,
        cancel: &CancellationToken,
    ) -> Result<Self, ScanError> {
        task.validate()?;
        Ok(Self {
            task,
            executor,
            store,
            cancel: cancel.child_token(),
        })
    }

    /// Run until the range is exhausted or the scanner is cancelled.
    ///
    /// Returns the last record the store accepted (or the initial record if
    /// nothing was stored), so it never runs ahead of the durable checkpoint.
    pub async fn run(mut self) -> ScanTask {
        let capacity = self.task.batch_size.min(MAX_QUEUE_CAPACITY) as usize;
        let mut pool = WorkerPool::spawn(
            Arc::clone(&self.executor),
            worker_count(&self.task),
            capacity,
            &self.cancel,
        );

        info!(
            task = %self.task.title,
            from = self.task.current_height,
            to = self.task.end_height,
            batch = self.task.batch_size,
            workers = pool.size(),
            "Scanner started"
        );

        loop {
            if self.cancel.is_cancelled() {
                info!(task = %self.task.title, height = self.task.current_height, "Scanner cancelled");
                break;
            }

            let Some(heights) = self.task.next_batch() else {
                info!(task = %self.task.title, height = self.task.current_height, "Scan complete");
                self.cancel.cancel();
                break;
            };
            let batch = heights.end - heights.start;

            match self.run_batch(&mut pool, heights.clone()).await {
                Cycle::Committed => {}
                Cycle::Failed => {
                    self.pause().await;
                    continue;
                }
                Cycle::Cancelled => continue,
            }

            let mut advanced = self.task.clone();
            if let Err(e) = advanced.advance(batch) {
                error!(task = %self.task.title, error = %e, "Checkpoint advance rejected");
                break;
            }
            if !self.persist(&advanced).await {
                continue;
            }
            self.task = advanced;

            info!(
                task = %self.task.title,
                from = heights.start,
                to = heights.end,
                remaining = self.task.remaining(),
                "Batch committed"
            );
        }

        pool.shutdown().await;
        self.task
    }

    /// Dispatch, collect and flush one batch.
    async fn run_batch(&self, pool: &mut WorkerPool, heights: Range<u64>) -> Cycle {
        debug!(task = %self.task.title, from = heights.start, to = heights.end, "Dispatching batch");

        let expected = heights.end - heights.start;
        for height in heights.clone() {
            if !pool.dispatch(height).await {
                return Cycle::Cancelled;
            }
        }

        let mut failed = 0u64;
        for _ in 0..expected {
            let Some(outcome) = pool.next_outcome().await else {
                return Cycle::Cancelled;
            };
            if let Err(e) = outcome.result {
                error!(
                    task = %self.task.title,
                    height = outcome.height,
                    error = %e,
                    "Height execution failed"
                );
                failed += 1;
            }
        }

        if failed > 0 {
            warn!(
                task = %self.task.title,
                from = heights.start,
                to = heights.end,
                failed,
                "Batch failed, redoing after pause"
            );
            return Cycle::Failed;
        }

        if let Err(e) = self.executor.flush().await {
            error!(
                task = %self.task.title,
                from = heights.start,
                to = heights.end,
                error = %e,
                "Batch flush failed, redoing after pause"
            );
            return Cycle::Failed;
        }

        Cycle::Committed
    }

    /// Write the checkpoint, retrying until it sticks.
    ///
    /// Returns `false` only if cancelled before a write succeeded.
    async fn persist(&self, task: &ScanTask) -> bool {
        loop {
            match self.store.update_checkpoint(task).await {
                Ok(()) => {
                    debug!(task = %task.title, height = task.current_height, "Checkpoint saved");
                    return true;
                }
                Err(e) => {
                    error!(
                        task = %task.title,
                        height = task.current_height,
                        error = %e,
                        "Checkpoint update failed, retrying"
                    );
                    if !self.pause().await {
                        return false;
                    }
                }
            }
        }
    }

    /// Sleep `REPEAT_PAUSE`; returns `false` if cancelled meanwhile.
    async fn pause(&self) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(REPEAT_PAUSE) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_count_is_capped_by_batch_size() {
        let task = ScanTask::new("blocks", 0, 100, 10, 4).unwrap();
        assert_eq!(worker_count(&task), 4);

        let huge = ScanTask::new("blocks", 0, 100, 10, 1_000_000_000).unwrap();
        assert_eq!(worker_count(&huge), 10);

        let both_huge = ScanTask::new("blocks", 0, u64::MAX, u64::MAX, u64::MAX).unwrap();
        assert_eq!(worker_count(&both_huge), MAX_QUEUE_CAPACITY as usize);
    }
}
