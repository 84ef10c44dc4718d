//! Fluent builder for scan task records.
//!
//! # Example
//!
//! ```rust
//! use heightscan_core::ScanTaskBuilder;
//!
//! let task = ScanTaskBuilder::new("blocks")
//!     .from_height(100)
//!     .to_height(115)
//!     .batch_size(10)
//!     .concurrency(3)
//!     .build()
//!     .unwrap();
//! assert!(task.is_active);
//! ```

use crate::error::ScanError;
use crate::task::ScanTask;

/// Default heights per batch.
pub const DEFAULT_BATCH_SIZE: u64 = 100;
/// Default worker count.
pub const DEFAULT_CONCURRENCY: u64 = 4;

/// Fluent builder for [`ScanTask`].
#[derive(Debug, Clone)]
pub struct ScanTaskBuilder {
    title: String,
    from_height: u64,
    to_height: u64,
    batch_size: u64,
    concurrency: u64,
}

impl ScanTaskBuilder {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            from_height: 0,
            to_height: 0,
            batch_size: DEFAULT_BATCH_SIZE,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    /// First height to scan (inclusive).
    pub fn from_height(mut self, height: u64) -> Self {
        self.from_height = height;
        self
    }

    /// Height where the scan stops (exclusive).
    pub fn to_height(mut self, height: u64) -> Self {
        self.to_height = height;
        self
    }

    pub fn batch_size(mut self, size: u64) -> Self {
        self.batch_size = size;
        self
    }

    pub fn concurrency(mut self, workers: u64) -> Self {
        self.concurrency = workers;
        self
    }

    /// Build and validate the task.
    pub fn build(self) -> Result<ScanTask, ScanError> {
        ScanTask::new(
            self.title,
            self.from_height,
            self.to_height,
            self.batch_size,
            self.concurrency,
        )
    }
}
