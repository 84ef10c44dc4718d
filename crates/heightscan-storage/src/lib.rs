//! heightscan-storage: pluggable backends for heightscan.
//!
//! Backends:
//! - [`memory`]: in-memory (dev/testing, no persistence)
//! - [`sqlite`]: SQLite via `sqlx` (embedded, single-file persistence)
//!
//! Both implement [`heightscan_core::CheckpointStore`] and [`HeightSink`], so
//! either can back the [`HeightLogExecutor`].

pub mod height_log;
pub mod memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use height_log::{HeightLogExecutor, HeightLogProvider, HeightSink, ScannedHeight};
pub use memory::InMemoryStorage;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStorage;
