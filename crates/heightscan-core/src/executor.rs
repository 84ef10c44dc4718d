//! Height executor traits + registry.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ScanError;

/// Turns heights into staged records and commits them per batch.
///
/// The scanner calls `execute_height` from several workers at once, always
/// for different heights within one batch. After a failed batch every height
/// of that batch is executed again, so staging must overwrite (or discard)
/// what a previous attempt left behind instead of duplicating it.
#[async_trait]
pub trait HeightExecutor: Send + Sync {
    /// Fetch, transform and stage everything derived from `height`.
    async fn execute_height(&self, height: u64) -> Result<(), ScanError>;

    /// Durably commit everything staged for the batch that just completed.
    ///
    /// Called only after every height of the batch succeeded. Must be
    /// all-or-nothing: on error nothing of the batch may stay committed.
    async fn flush(&self) -> Result<(), ScanError>;
}

/// Resolves the executor that serves a given task.
pub trait ExecutorProvider: Send + Sync {
    fn task_executor(&self, title: &str) -> Result<Arc<dyn HeightExecutor>, ScanError>;
}

/// Registry of executors keyed by task title.
#[derive(Default)]
pub struct ExecutorRegistry {
    executors: HashMap<String, Arc<dyn HeightExecutor>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the executor for `title`, replacing any previous one.
    pub fn register(&mut self, title: impl Into<String>, executor: Arc<dyn HeightExecutor>) {
        self.executors.insert(title.into(), executor);
    }
}

impl ExecutorProvider for ExecutorRegistry {
    fn task_executor(&self, title: &str) -> Result<Arc<dyn HeightExecutor>, ScanError> {
        self.executors
            .get(title)
            .cloned()
            .ok_or_else(|| ScanError::ExecutorUnavailable {
                title: title.to_string(),
                reason: "no executor registered".into(),
            })
    }
}
