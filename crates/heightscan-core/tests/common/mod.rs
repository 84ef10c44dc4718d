#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use heightscan_core::{
    CancellationToken, CheckpointStore, HeightExecutor, MemoryCheckpointStore, ScanError,
    ScanTask, StagingBuffer,
};

/// Executor double: records every call, stages per height, commits on flush.
#[derive(Default)]
pub struct RecordingExecutor {
    pub attempts: Mutex<Vec<u64>>,
    pub committed: Mutex<Vec<u64>>,
    pub flushes: AtomicU32,
    fail_once: Mutex<HashSet<u64>>,
    flush_failures: AtomicU32,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    staged: StagingBuffer<u64>,
    cancel_at: Mutex<Option<(u64, CancellationToken)>>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// `height` fails on its first execution only.
    pub fn fail_once(self, height: u64) -> Self {
        self.fail_once.lock().unwrap().insert(height);
        self
    }

    /// The first `n` flushes fail.
    pub fn failing_flushes(self, n: u32) -> Self {
        self.flush_failures.store(n, Ordering::SeqCst);
        self
    }

    /// Cancel `token` while executing `height`.
    pub fn cancel_at(self, height: u64, token: CancellationToken) -> Self {
        *self.cancel_at.lock().unwrap() = Some((height, token));
        self
    }

    pub fn attempts(&self) -> Vec<u64> {
        self.attempts.lock().unwrap().clone()
    }

    pub fn attempts_of(&self, height: u64) -> usize {
        self.attempts().iter().filter(|h| **h == height).count()
    }

    pub fn committed(&self) -> Vec<u64> {
        self.committed.lock().unwrap().clone()
    }

    pub fn flushes(&self) -> u32 {
        self.flushes.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HeightExecutor for RecordingExecutor {
    async fn execute_height(&self, height: u64) -> Result<(), ScanError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.attempts.lock().unwrap().push(height);

        tokio::time::sleep(Duration::from_millis(10)).await;

        if let Some((at, token)) = self.cancel_at.lock().unwrap().as_ref() {
            if *at == height {
                token.cancel();
            }
        }

        let failed = self.fail_once.lock().unwrap().remove(&height);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        if failed {
            return Err(ScanError::Other("node returned 502".into()));
        }
        self.staged.stage(height, vec![height]);
        Ok(())
    }

    async fn flush(&self) -> Result<(), ScanError> {
        let n = self.flushes.fetch_add(1, Ordering::SeqCst) + 1;
        if n <= self.flush_failures.load(Ordering::SeqCst) {
            self.staged.clear();
            return Err(ScanError::Flush("clickhouse unavailable".into()));
        }
        let mut committed = self.committed.lock().unwrap();
        for (_, records) in self.staged.drain() {
            committed.extend(records);
        }
        Ok(())
    }
}

/// Checkpoint store double that fails its first `n` writes.
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryCheckpointStore,
    fail_first: AtomicU32,
    pub attempts: AtomicU32,
    pub writes: Mutex<Vec<ScanTask>>,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_first(self, n: u32) -> Self {
        self.fail_first.store(n, Ordering::SeqCst);
        self
    }

    pub fn written_heights(&self) -> Vec<u64> {
        self.writes.lock().unwrap().iter().map(|t| t.current_height).collect()
    }

    pub fn writes(&self) -> Vec<ScanTask> {
        self.writes.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CheckpointStore for FlakyStore {
    async fn update_checkpoint(&self, task: &ScanTask) -> Result<(), ScanError> {
        let n = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if n <= self.fail_first.load(Ordering::SeqCst) {
            return Err(ScanError::Storage("connection reset".into()));
        }
        self.writes.lock().unwrap().push(task.clone());
        self.inner.update_checkpoint(task).await
    }

    async fn load_task(&self, title: &str) -> Result<Option<ScanTask>, ScanError> {
        self.inner.load_task(title).await
    }

    async fn active_tasks(&self) -> Result<Vec<ScanTask>, ScanError> {
        self.inner.active_tasks().await
    }
}

/// Every persisted record must satisfy the task invariants.
pub fn assert_invariants(tasks: &[ScanTask]) {
    for task in tasks {
        assert!(task.current_height <= task.end_height, "{task:?}");
        assert_eq!(task.is_active, task.current_height < task.end_height, "{task:?}");
    }
}
