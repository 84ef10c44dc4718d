//! heightscan-core: checkpointed, batch-atomic block height scanning.
//!
//! # Architecture
//!
//! ```text
//! ScanManager → Scanner (one per task)
//!                  ├── ScanTask        (checkpoint record, owned by the scan loop)
//!                  ├── WorkerPool      (N workers, bounded height queue)
//!                  ├── HeightExecutor  (stage per height, flush per batch)
//!                  └── CheckpointStore (persist after every committed batch)
//! ```
//!
//! A batch either commits completely (every height executed, flushed, and
//! the checkpoint advanced) or is redone from scratch after a fixed pause.

pub mod builder;
pub mod checkpoint;
pub mod error;
pub mod executor;
pub mod manager;
pub mod pool;
pub mod scanner;
pub mod staging;
pub mod task;

pub use builder::ScanTaskBuilder;
pub use checkpoint::{CheckpointStore, MemoryCheckpointStore};
pub use error::ScanError;
pub use executor::{ExecutorProvider, ExecutorRegistry, HeightExecutor};
pub use manager::ScanManager;
pub use pool::{HeightOutcome, WorkerPool};
pub use scanner::{Scanner, REPEAT_PAUSE};
pub use staging::StagingBuffer;
pub use task::ScanTask;

pub use tokio_util::sync::CancellationToken;
