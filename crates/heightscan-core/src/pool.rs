//! Worker pool: bounded parallel execution of heights.
//!
//! A fixed number of workers share one bounded height queue. Each worker
//! takes a height, runs the executor on it and reports exactly one
//! [`HeightOutcome`]. Workers never retry; retry policy belongs to the
//! scanner.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::ScanError;
use crate::executor::HeightExecutor;

/// Result of executing a single height.
#[derive(Debug)]
pub struct HeightOutcome {
    pub height: u64,
    pub result: Result<(), ScanError>,
}

impl HeightOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Fixed-size pool of height workers.
pub struct WorkerPool {
    queue: mpsc::Sender<u64>,
    outcomes: mpsc::UnboundedReceiver<HeightOutcome>,
    workers: Vec<JoinHandle<()>>,
    cancel: CancellationToken,
}

impl WorkerPool {
    /// Start `concurrency` workers.
    ///
    /// `capacity` bounds the height queue; the scanner sizes it to one batch.
    /// Outcomes are never more than one batch because the scanner collects
    /// every outcome before dispatching again.
    /// Workers stop when `cancel` (or [`WorkerPool::shutdown`]) fires.
    pub fn spawn(
        executor: Arc<dyn HeightExecutor>,
        concurrency: usize,
        capacity: usize,
        cancel: &CancellationToken,
    ) -> Self {
        let cancel = cancel.child_token();
        let (queue_tx, queue_rx) = mpsc::channel(capacity.max(1));
        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
        let queue_rx = Arc::new(Mutex::new(queue_rx));

        let workers = (0..concurrency.max(1))
            .map(|worker| {
                tokio::spawn(run_worker(
                    worker,
                    Arc::clone(&executor),
                    Arc::clone(&queue_rx),
                    outcome_tx.clone(),
                    cancel.clone(),
                ))
            })
            .collect();

        Self {
            queue: queue_tx,
            outcomes: outcome_rx,
            workers,
            cancel,
        }
    }

    /// Number of running workers.
    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Queue one height, waiting while the queue is full.
    ///
    /// Returns `false` if the pool was cancelled before the height was queued.
    pub async fn dispatch(&self, height: u64) -> bool {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            sent = self.queue.send(height) => sent.is_ok(),
        }
    }

    /// Wait for the next outcome. `None` means the pool was cancelled.
    pub async fn next_outcome(&mut self) -> Option<HeightOutcome> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            outcome = self.outcomes.recv() => outcome,
        }
    }

    /// Stop all workers and wait for them to exit.
    ///
    /// An executor call already in progress runs to completion first.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        drop(self.queue);
        for handle in self.workers {
            if let Err(e) = handle.await {
                warn!(error = %e, "worker task ended abnormally");
            }
        }
    }
}

async fn run_worker(
    worker: usize,
    executor: Arc<dyn HeightExecutor>,
    queue: Arc<Mutex<mpsc::Receiver<u64>>>,
    outcomes: mpsc::UnboundedSender<HeightOutcome>,
    cancel: CancellationToken,
) {
    loop {
        let next = {
            let mut queue = queue.lock().await;
            tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                height = queue.recv() => height,
            }
        };
        let Some(height) = next else { break };

        let result = match AssertUnwindSafe(executor.execute_height(height))
            .catch_unwind()
            .await
        {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) if e.height() == Some(height) => Err(e),
            Ok(Err(e)) => Err(ScanError::Execution {
                height,
                reason: e.to_string(),
            }),
            Err(_) => Err(ScanError::Panicked { height }),
        };

        if outcomes.send(HeightOutcome { height, result }).is_err() {
            break;
        }
    }
    debug!(worker, "worker stopped");
}
