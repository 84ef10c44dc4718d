//! Scan manager: runs one scanner per task under a shared cancellation.

use std::collections::HashSet;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::checkpoint::CheckpointStore;
use crate::error::ScanError;
use crate::executor::ExecutorProvider;
use crate::scanner::Scanner;
use crate::task::ScanTask;

/// Spawns and joins the scanners of several tasks.
pub struct ScanManager {
    store: Arc<dyn CheckpointStore>,
    provider: Arc<dyn ExecutorProvider>,
}

impl ScanManager {
    pub fn new(store: Arc<dyn CheckpointStore>, provider: Arc<dyn ExecutorProvider>) -> Self {
        Self { store, provider }
    }

    /// Load every active task from the store and scan them.
    pub async fn run_active(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<ScanTask>, ScanError> {
        let tasks = self.store.active_tasks().await?;
        self.run(tasks, cancel).await
    }

    /// Scan `tasks` concurrently until each finishes or `cancel` fires.
    ///
    /// Every task is validated and matched with its executor before any
    /// scanner starts. Inactive tasks are skipped. Returns the final record
    /// of each scanner that ran.
    pub async fn run(
        &self,
        tasks: Vec<ScanTask>,
        cancel: &CancellationToken,
    ) -> Result<Vec<ScanTask>, ScanError> {
        let mut titles = HashSet::new();
        let mut scanners = Vec::with_capacity(tasks.len());

        for task in tasks {
            if !titles.insert(task.title.clone()) {
                return Err(ScanError::InvalidTask {
                    title: task.title,
                    reason: "task listed twice".into(),
                });
            }
            if !task.is_active {
                info!(task = %task.title, height = task.current_height, "Task already complete, skipping");
                continue;
            }
            let executor = self.provider.task_executor(&task.title)?;
            scanners.push(Scanner::new(task, executor, Arc::clone(&self.store), cancel)?);
        }

        info!(scanners = scanners.len(), "Starting scan tasks");

        let handles: Vec<_> = scanners
            .into_iter()
            .map(|scanner| tokio::spawn(scanner.run()))
            .collect();

        let mut finished = Vec::with_capacity(handles.len());
        for joined in futures::future::join_all(handles).await {
            let task = joined.map_err(|e| ScanError::Other(format!("scanner task failed: {e}")))?;
            finished.push(task);
        }
        Ok(finished)
    }
}
