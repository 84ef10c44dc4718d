//! Checkpoint store: persists scan task progress for crash recovery.
//!
//! The scanner writes the full [`ScanTask`] record after every committed
//! batch. On restart, tasks resume from their last persisted
//! `current_height` rather than re-scanning from scratch.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::ScanError;
use crate::task::ScanTask;

/// Trait for storing and loading scan task checkpoints.
///
/// Implementations include `MemoryCheckpointStore` here, and
/// `InMemoryStorage` / `SqliteStorage` in `heightscan-storage`.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Persist (upsert) a task record.
    ///
    /// May be called repeatedly with the same payload while a previous
    /// attempt is being retried.
    async fn update_checkpoint(&self, task: &ScanTask) -> Result<(), ScanError>;

    /// Load one task by title.
    async fn load_task(&self, title: &str) -> Result<Option<ScanTask>, ScanError>;

    /// All tasks that still have heights left to scan.
    async fn active_tasks(&self) -> Result<Vec<ScanTask>, ScanError>;
}

// ─── In-memory store (for testing) ────────────────────────────────────────────

/// In-memory checkpoint store for tests and ephemeral scans.
#[derive(Default)]
pub struct MemoryCheckpointStore {
    tasks: Mutex<HashMap<String, ScanTask>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with a provisioned task.
    pub fn with_task(self, task: ScanTask) -> Self {
        self.lock().insert(task.title.clone(), task);
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, ScanTask>> {
        self.tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn update_checkpoint(&self, task: &ScanTask) -> Result<(), ScanError> {
        self.lock().insert(task.title.clone(), task.clone());
        Ok(())
    }

    async fn load_task(&self, title: &str) -> Result<Option<ScanTask>, ScanError> {
        Ok(self.lock().get(title).cloned())
    }

    async fn active_tasks(&self) -> Result<Vec<ScanTask>, ScanError> {
        let mut tasks: Vec<_> = self.lock().values().filter(|t| t.is_active).cloned().collect();
        tasks.sort_by(|a, b| a.title.cmp(&b.title));
        Ok(tasks)
    }
}
