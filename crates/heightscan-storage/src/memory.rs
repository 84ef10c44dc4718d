//! In-memory storage backend.
//!
//! Stores scan tasks, every checkpoint write, and scanned heights in RAM.
//! Useful for testing and short-lived scans that don't need persistence.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use heightscan_core::{CheckpointStore, ScanError, ScanTask};

use crate::height_log::{HeightSink, ScannedHeight};

/// In-memory scan storage.
///
/// All data is lost when the process exits.
#[derive(Default)]
pub struct InMemoryStorage {
    tasks: Mutex<HashMap<String, ScanTask>>,
    checkpoint_log: Mutex<Vec<ScanTask>>,
    heights: Mutex<BTreeMap<(String, u64), ScannedHeight>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Provision a new task. Fails if the title is taken.
    pub fn insert_task(&self, task: ScanTask) -> Result<(), ScanError> {
        task.validate()?;
        let mut tasks = lock(&self.tasks);
        if tasks.contains_key(&task.title) {
            return Err(ScanError::InvalidTask {
                title: task.title,
                reason: "task already exists".into(),
            });
        }
        tasks.insert(task.title.clone(), task);
        Ok(())
    }

    /// Every checkpoint written so far, oldest first.
    pub fn checkpoint_history(&self) -> Vec<ScanTask> {
        lock(&self.checkpoint_log).clone()
    }

    /// Heights recorded for `title`, ascending.
    pub fn scanned_heights(&self, title: &str) -> Vec<u64> {
        lock(&self.heights)
            .keys()
            .filter(|(t, _)| t == title)
            .map(|(_, h)| *h)
            .collect()
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl CheckpointStore for InMemoryStorage {
    async fn update_checkpoint(&self, task: &ScanTask) -> Result<(), ScanError> {
        lock(&self.tasks).insert(task.title.clone(), task.clone());
        lock(&self.checkpoint_log).push(task.clone());
        Ok(())
    }

    async fn load_task(&self, title: &str) -> Result<Option<ScanTask>, ScanError> {
        Ok(lock(&self.tasks).get(title).cloned())
    }

    async fn active_tasks(&self) -> Result<Vec<ScanTask>, ScanError> {
        let mut active: Vec<_> = lock(&self.tasks)
            .values()
            .filter(|t| t.is_active)
            .cloned()
            .collect();
        active.sort_by(|a, b| a.title.cmp(&b.title));
        Ok(active)
    }
}

#[async_trait]
impl HeightSink for InMemoryStorage {
    async fn write_heights(&self, title: &str, rows: &[ScannedHeight]) -> Result<(), ScanError> {
        let mut heights = lock(&self.heights);
        for row in rows {
            heights.insert((title.to_string(), row.height), *row);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_task_rejects_duplicates() {
        let store = InMemoryStorage::new();
        store.insert_task(ScanTask::new("blocks", 0, 10, 5, 1).unwrap()).unwrap();
        let err = store
            .insert_task(ScanTask::new("blocks", 5, 10, 5, 1).unwrap())
            .unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[tokio::test]
    async fn checkpoint_history_keeps_every_write() {
        let store = InMemoryStorage::new();
        let mut task = ScanTask::new("blocks", 0, 10, 5, 1).unwrap();
        store.insert_task(task.clone()).unwrap();

        task.advance(5).unwrap();
        store.update_checkpoint(&task).await.unwrap();
        store.update_checkpoint(&task).await.unwrap();
        task.advance(5).unwrap();
        store.update_checkpoint(&task).await.unwrap();

        let history: Vec<_> = store.checkpoint_history().iter().map(|t| t.current_height).collect();
        assert_eq!(history, vec![5, 5, 10]);
        assert!(store.active_tasks().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn rewriting_heights_does_not_duplicate() {
        let store = InMemoryStorage::new();
        let rows = [
            ScannedHeight { height: 1, scanned_at: 10 },
            ScannedHeight { height: 2, scanned_at: 10 },
        ];
        store.write_heights("blocks", &rows).await.unwrap();
        store.write_heights("blocks", &rows).await.unwrap();
        assert_eq!(store.scanned_heights("blocks"), vec![1, 2]);
        assert!(store.scanned_heights("accounts").is_empty());
    }
}
