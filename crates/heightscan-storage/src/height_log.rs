//! Height log: a chain-agnostic executor that records which heights were
//! scanned and when.
//!
//! It follows the executor contract to the letter: each height is staged in
//! memory, and `flush` hands the whole batch to a [`HeightSink`] that must
//! write it atomically. A redone batch simply re-stages the same heights.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use heightscan_core::{ExecutorProvider, HeightExecutor, ScanError, StagingBuffer};

/// One scanned height.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScannedHeight {
    pub height: u64,
    /// Unix timestamp of when the height was executed.
    pub scanned_at: i64,
}

/// Destination for committed height rows.
#[async_trait]
pub trait HeightSink: Send + Sync {
    /// Write `rows` for task `title` all-or-nothing.
    ///
    /// Writing a height that already exists replaces it.
    async fn write_heights(&self, title: &str, rows: &[ScannedHeight]) -> Result<(), ScanError>;
}

/// Executor that stages a [`ScannedHeight`] per height and flushes to a sink.
pub struct HeightLogExecutor<S> {
    title: String,
    sink: Arc<S>,
    staged: StagingBuffer<ScannedHeight>,
}

impl<S: HeightSink> HeightLogExecutor<S> {
    pub fn new(title: impl Into<String>, sink: Arc<S>) -> Self {
        Self {
            title: title.into(),
            sink,
            staged: StagingBuffer::new(),
        }
    }

    /// Heights staged but not yet flushed.
    pub fn pending(&self) -> usize {
        self.staged.len()
    }
}

#[async_trait]
impl<S: HeightSink> HeightExecutor for HeightLogExecutor<S> {
    async fn execute_height(&self, height: u64) -> Result<(), ScanError> {
        let row = ScannedHeight {
            height,
            scanned_at: chrono::Utc::now().timestamp(),
        };
        self.staged.stage(height, vec![row]);
        Ok(())
    }

    async fn flush(&self) -> Result<(), ScanError> {
        let rows: Vec<ScannedHeight> = self
            .staged
            .drain()
            .into_iter()
            .flat_map(|(_, rows)| rows)
            .collect();
        if rows.is_empty() {
            return Ok(());
        }
        self.sink
            .write_heights(&self.title, &rows)
            .await
            .map_err(|e| ScanError::Flush(e.to_string()))?;
        debug!(task = %self.title, rows = rows.len(), "height log flushed");
        Ok(())
    }
}

/// Hands out a [`HeightLogExecutor`] for any task title, all sharing one sink.
pub struct HeightLogProvider<S> {
    sink: Arc<S>,
}

impl<S> HeightLogProvider<S> {
    pub fn new(sink: Arc<S>) -> Self {
        Self { sink }
    }
}

impl<S: HeightSink + 'static> ExecutorProvider for HeightLogProvider<S> {
    fn task_executor(&self, title: &str) -> Result<Arc<dyn HeightExecutor>, ScanError> {
        Ok(Arc::new(HeightLogExecutor::new(title, Arc::clone(&self.sink))))
    }
}
