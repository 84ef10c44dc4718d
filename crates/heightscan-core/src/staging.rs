//! Per-height staging for executors that commit once per batch.

use std::collections::BTreeMap;
use std::sync::Mutex;

/// Records staged by height, waiting for the next flush.
///
/// Staging a height again replaces what was staged for it before, which is
/// what makes a redone batch idempotent.
#[derive(Debug)]
pub struct StagingBuffer<R> {
    staged: Mutex<BTreeMap<u64, Vec<R>>>,
}

impl<R> Default for StagingBuffer<R> {
    fn default() -> Self {
        Self {
            staged: Mutex::new(BTreeMap::new()),
        }
    }
}

impl<R> StagingBuffer<R> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage `records` for `height`, replacing any earlier attempt.
    pub fn stage(&self, height: u64, records: Vec<R>) {
        self.lock().insert(height, records);
    }

    /// Take everything staged, ordered by height.
    pub fn drain(&self) -> Vec<(u64, Vec<R>)> {
        std::mem::take(&mut *self.lock()).into_iter().collect()
    }

    /// Drop everything staged.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Number of staged heights.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<u64, Vec<R>>> {
        self.staged.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restaging_replaces_previous_attempt() {
        let buffer = StagingBuffer::new();
        buffer.stage(101, vec!["tx-a", "tx-b"]);
        buffer.stage(100, vec!["tx-c"]);
        buffer.stage(101, vec!["tx-a"]);

        let drained = buffer.drain();
        assert_eq!(drained, vec![(100, vec!["tx-c"]), (101, vec!["tx-a"])]);
        assert!(buffer.is_empty());
    }
}
