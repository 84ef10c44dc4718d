//! Scan task: the persisted checkpoint record of one height range.

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::error::ScanError;

/// The progress state of a scan task.
///
/// The record knows:
/// - Which height will be processed next (`current_height`)
/// - Where the scan stops (`end_height`, exclusive)
/// - How many heights make up one atomic batch, and how many run in parallel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanTask {
    /// Stable identifier of the task (also the checkpoint key).
    pub title: String,
    /// Next unprocessed height; inclusive lower bound of the next batch.
    pub current_height: u64,
    /// Exclusive upper bound of the scan range.
    pub end_height: u64,
    /// Heights processed per orchestration cycle.
    pub batch_size: u64,
    /// Number of parallel workers.
    pub concurrency: u64,
    /// `true` while `current_height < end_height`.
    pub is_active: bool,
}

impl ScanTask {
    /// Create a task covering `[current_height, end_height)`.
    pub fn new(
        title: impl Into<String>,
        current_height: u64,
        end_height: u64,
        batch_size: u64,
        concurrency: u64,
    ) -> Result<Self, ScanError> {
        let task = Self {
            title: title.into(),
            current_height,
            end_height,
            batch_size,
            concurrency,
            is_active: current_height < end_height,
        };
        task.validate()?;
        Ok(task)
    }

    /// Check the record's invariants (used on records loaded from a store).
    pub fn validate(&self) -> Result<(), ScanError> {
        let reason = if self.title.is_empty() {
            "title must not be empty".to_string()
        } else if self.batch_size == 0 {
            "batch_size must be > 0".to_string()
        } else if self.concurrency == 0 {
            "concurrency must be > 0".to_string()
        } else if self.current_height > self.end_height {
            format!(
                "current height {} is past end height {}",
                self.current_height, self.end_height
            )
        } else if self.is_active != (self.current_height < self.end_height) {
            format!(
                "is_active={} contradicts range {}..{}",
                self.is_active, self.current_height, self.end_height
            )
        } else {
            return Ok(());
        };
        Err(ScanError::InvalidTask {
            title: self.title.clone(),
            reason,
        })
    }

    /// Heights left to scan.
    pub fn remaining(&self) -> u64 {
        self.end_height.saturating_sub(self.current_height)
    }

    /// The next batch of heights, or `None` once the range is exhausted.
    ///
    /// The last batch shrinks to the remainder of the range.
    pub fn next_batch(&self) -> Option<Range<u64>> {
        let batch = self.batch_size.min(self.remaining());
        if batch == 0 {
            return None;
        }
        Some(self.current_height..self.current_height + batch)
    }

    /// Mark `batch` heights as durably committed.
    ///
    /// Refuses to move past `end_height`.
    pub fn advance(&mut self, batch: u64) -> Result<(), ScanError> {
        if batch > self.remaining() {
            return Err(ScanError::InvalidTask {
                title: self.title.clone(),
                reason: format!(
                    "cannot advance {} heights from {} (end {})",
                    batch, self.current_height, self.end_height
                ),
            });
        }
        self.current_height += batch;
        if self.current_height == self.end_height {
            self.is_active = false;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_derives_active_flag() {
        let task = ScanTask::new("blocks", 100, 115, 10, 3).unwrap();
        assert!(task.is_active);

        let done = ScanTask::new("blocks", 115, 115, 10, 3).unwrap();
        assert!(!done.is_active);
        assert!(done.next_batch().is_none());
    }

    #[test]
    fn new_rejects_bad_records() {
        assert!(ScanTask::new("blocks", 0, 10, 0, 1).is_err());
        assert!(ScanTask::new("blocks", 0, 10, 5, 0).is_err());
        assert!(ScanTask::new("blocks", 20, 10, 5, 1).is_err());
        assert!(ScanTask::new("", 0, 10, 5, 1).is_err());
    }

    #[test]
    fn validate_catches_stale_active_flag() {
        let mut task = ScanTask::new("blocks", 0, 10, 5, 1).unwrap();
        task.is_active = false;
        let err = task.validate().unwrap_err();
        assert!(err.to_string().contains("contradicts"));
    }

    #[test]
    fn last_batch_is_the_remainder() {
        let mut task = ScanTask::new("blocks", 100, 115, 10, 3).unwrap();
        assert_eq!(task.next_batch(), Some(100..110));

        task.advance(10).unwrap();
        assert_eq!(task.current_height, 110);
        assert_eq!(task.next_batch(), Some(110..115));

        task.advance(5).unwrap();
        assert_eq!(task.current_height, 115);
        assert!(!task.is_active);
        assert!(task.next_batch().is_none());
    }

    #[test]
    fn advance_never_passes_end() {
        let mut task = ScanTask::new("blocks", 0, 4, 10, 1).unwrap();
        assert!(task.advance(5).is_err());
        assert_eq!(task.current_height, 0);
        assert!(task.is_active);
    }
}
