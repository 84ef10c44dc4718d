//! SQLite storage backend for heightscan.
//!
//! Persists scan tasks and scanned heights to a single SQLite file.
//! Uses `sqlx` with WAL mode for concurrent read performance.
//!
//! # Usage
//! ```rust,no_run
//! use heightscan_storage::sqlite::SqliteStorage;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // File-backed (persistent)
//! let store = SqliteStorage::open("./heightscan.db").await?;
//!
//! // In-memory (tests / ephemeral)
//! let store = SqliteStorage::in_memory().await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use tracing::debug;

use heightscan_core::{CheckpointStore, ScanError, ScanTask};

use crate::height_log::{HeightSink, ScannedHeight};

/// SQLite-backed storage for scan tasks and the height log.
pub struct SqliteStorage {
    pool: SqlitePool,
}

fn storage_err(e: sqlx::Error) -> ScanError {
    ScanError::Storage(e.to_string())
}

impl SqliteStorage {
    /// Open (or create) a SQLite database at `path`.
    ///
    /// The path may be a plain file path (`"./heightscan.db"`) or a full
    /// SQLite URL (`"sqlite:./heightscan.db?mode=rwc"`).
    pub async fn open(path: &str) -> Result<Self, ScanError> {
        let url = if path.starts_with("sqlite:") {
            path.to_string()
        } else {
            format!("sqlite:{path}?mode=rwc")
        };

        let pool = SqlitePool::connect(&url).await.map_err(storage_err)?;

        let storage = Self { pool };
        storage.init_schema().await?;
        Ok(storage)
    }

    /// Open an in-memory SQLite database.
    ///
    /// Pinned to one connection so every query sees the same database.
    pub async fn in_memory() -> Result<Self, ScanError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(storage_err)?;

        let storage = Self { pool };
        storage.init_schema().await?;
        Ok(storage)
    }

    /// Create tables and enable WAL mode.
    async fn init_schema(&self) -> Result<(), ScanError> {
        sqlx::query("PRAGMA journal_mode=WAL;")
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS scan_tasks (
                title          TEXT    NOT NULL PRIMARY KEY,
                current_height INTEGER NOT NULL,
                end_height     INTEGER NOT NULL,
                batch_size     INTEGER NOT NULL,
                concurrency    INTEGER NOT NULL,
                is_active      INTEGER NOT NULL,
                updated_at     INTEGER NOT NULL
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS scanned_heights (
                title      TEXT    NOT NULL,
                height     INTEGER NOT NULL CHECK (height >= 0),
                scanned_at INTEGER NOT NULL,
                PRIMARY KEY (title, height)
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(())
    }

    // ─── Task provisioning ──────────────────────────────────────────────────────

    /// Provision a new task. Fails if the title is taken.
    pub async fn insert_task(&self, task: &ScanTask) -> Result<(), ScanError> {
        task.validate()?;
        if self.load_task(&task.title).await?.is_some() {
            return Err(ScanError::InvalidTask {
                title: task.title.clone(),
                reason: "task already exists".into(),
            });
        }
        self.upsert(task).await
    }

    /// All tasks, finished ones included, ordered by title.
    pub async fn all_tasks(&self) -> Result<Vec<ScanTask>, ScanError> {
        let rows = sqlx::query(
            "SELECT title, current_height, end_height, batch_size, concurrency, is_active
             FROM scan_tasks ORDER BY title",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(rows.iter().map(task_from_row).collect())
    }

    /// Unix timestamp of the last checkpoint write for `title`.
    pub async fn updated_at(&self, title: &str) -> Result<Option<i64>, ScanError> {
        let row = sqlx::query("SELECT updated_at FROM scan_tasks WHERE title = ?")
            .bind(title)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(row.map(|r| r.get::<i64, _>("updated_at")))
    }

    // ─── Height log ─────────────────────────────────────────────────────────────

    /// Number of heights recorded for `title`.
    pub async fn scanned_count(&self, title: &str) -> Result<u64, ScanError> {
        let row = sqlx::query("SELECT COUNT(*) as cnt FROM scanned_heights WHERE title = ?")
            .bind(title)
            .fetch_one(&self.pool)
            .await
            .map_err(storage_err)?;

        let cnt: i64 = row.get("cnt");
        Ok(cnt as u64)
    }

    /// Heights recorded for `title` within `[from, to)`, ascending.
    pub async fn scanned_heights(
        &self,
        title: &str,
        from: u64,
        to: u64,
    ) -> Result<Vec<u64>, ScanError> {
        let rows = sqlx::query(
            "SELECT height FROM scanned_heights
             WHERE title = ? AND height >= ? AND height < ?
             ORDER BY height",
        )
        .bind(title)
        .bind(from as i64)
        .bind(to as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(rows.iter().map(|r| r.get::<i64, _>("height") as u64).collect())
    }

    async fn upsert(&self, task: &ScanTask) -> Result<(), ScanError> {
        sqlx::query(
            "INSERT OR REPLACE INTO scan_tasks
             (title, current_height, end_height, batch_size, concurrency, is_active, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&task.title)
        .bind(task.current_height as i64)
        .bind(task.end_height as i64)
        .bind(task.batch_size as i64)
        .bind(task.concurrency as i64)
        .bind(task.is_active)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(())
    }
}

fn task_from_row(r: &SqliteRow) -> ScanTask {
    ScanTask {
        title: r.get("title"),
        current_height: r.get::<i64, _>("current_height") as u64,
        end_height: r.get::<i64, _>("end_height") as u64,
        batch_size: r.get::<i64, _>("batch_size") as u64,
        concurrency: r.get::<i64, _>("concurrency") as u64,
        is_active: r.get("is_active"),
    }
}

// ─── CheckpointStore impl ────────────────────────────────────────────────────

#[async_trait]
impl CheckpointStore for SqliteStorage {
    async fn update_checkpoint(&self, task: &ScanTask) -> Result<(), ScanError> {
        self.upsert(task).await?;
        debug!(
            task = %task.title,
            height = task.current_height,
            active = task.is_active,
            "checkpoint saved"
        );
        Ok(())
    }

    async fn load_task(&self, title: &str) -> Result<Option<ScanTask>, ScanError> {
        let row = sqlx::query(
            "SELECT title, current_height, end_height, batch_size, concurrency, is_active
             FROM scan_tasks WHERE title = ?",
        )
        .bind(title)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(row.as_ref().map(task_from_row))
    }

    async fn active_tasks(&self) -> Result<Vec<ScanTask>, ScanError> {
        let rows = sqlx::query(
            "SELECT title, current_height, end_height, batch_size, concurrency, is_active
             FROM scan_tasks WHERE is_active = 1 ORDER BY title",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(rows.iter().map(task_from_row).collect())
    }
}

// ─── HeightSink impl ─────────────────────────────────────────────────────────

#[async_trait]
impl HeightSink for SqliteStorage {
    async fn write_heights(&self, title: &str, rows: &[ScannedHeight]) -> Result<(), ScanError> {
        let mut tx = self.pool.begin().await.map_err(storage_err)?;

        for row in rows {
            sqlx::query(
                "INSERT OR REPLACE INTO scanned_heights (title, height, scanned_at)
                 VALUES (?, ?, ?)",
            )
            .bind(title)
            .bind(row.height as i64)
            .bind(row.scanned_at)
            .execute(&mut *tx)
            .await
            .map_err(storage_err)?;
        }

        tx.commit().await.map_err(storage_err)?;
        debug!(task = title, rows = rows.len(), "heights written");
        Ok(())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn row(height: u64) -> ScannedHeight {
        ScannedHeight {
            height,
            scanned_at: 1_700_000_000,
        }
    }

    // ── Tasks ─────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn task_roundtrip() {
        let store = SqliteStorage::in_memory().await.unwrap();
        let task = ScanTask::new("blocks", 100, 115, 10, 3).unwrap();

        store.insert_task(&task).await.unwrap();

        let loaded = store.load_task("blocks").await.unwrap().unwrap();
        assert_eq!(loaded, task);
        assert!(store.updated_at("blocks").await.unwrap().is_some());
        assert!(store.load_task("accounts").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn insert_task_rejects_duplicates() {
        let store = SqliteStorage::in_memory().await.unwrap();
        let task = ScanTask::new("blocks", 0, 10, 5, 1).unwrap();
        store.insert_task(&task).await.unwrap();

        let err = store.insert_task(&task).await.unwrap_err();
        assert!(matches!(err, ScanError::InvalidTask { .. }));
    }

    #[tokio::test]
    async fn checkpoint_upsert_and_active_filter() {
        let store = SqliteStorage::in_memory().await.unwrap();
        let mut blocks = ScanTask::new("blocks", 0, 10, 5, 1).unwrap();
        let accounts = ScanTask::new("accounts", 0, 10, 5, 1).unwrap();
        store.insert_task(&blocks).await.unwrap();
        store.insert_task(&accounts).await.unwrap();

        blocks.advance(5).unwrap();
        store.update_checkpoint(&blocks).await.unwrap();
        store.update_checkpoint(&blocks).await.unwrap();
        blocks.advance(5).unwrap();
        store.update_checkpoint(&blocks).await.unwrap();

        let loaded = store.load_task("blocks").await.unwrap().unwrap();
        assert_eq!(loaded.current_height, 10);
        assert!(!loaded.is_active);

        let active = store.active_tasks().await.unwrap();
        assert_eq!(active, vec![accounts]);
        assert_eq!(store.all_tasks().await.unwrap().len(), 2);
    }

    // ── Height log ────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn rewritten_heights_are_not_duplicated() {
        let store = SqliteStorage::in_memory().await.unwrap();
        let batch: Vec<_> = (100..110).map(row).collect();

        store.write_heights("blocks", &batch).await.unwrap();
        store.write_heights("blocks", &batch).await.unwrap();

        assert_eq!(store.scanned_count("blocks").await.unwrap(), 10);
        assert_eq!(
            store.scanned_heights("blocks", 105, 108).await.unwrap(),
            vec![105, 106, 107]
        );
    }

    #[tokio::test]
    async fn failed_batch_commits_nothing() {
        let store = SqliteStorage::in_memory().await.unwrap();
        // u64::MAX wraps to a negative INTEGER and trips the CHECK constraint
        let batch = vec![row(1), row(2), row(u64::MAX)];

        let err = store.write_heights("blocks", &batch).await.unwrap_err();
        assert!(matches!(err, ScanError::Storage(_)));
        assert_eq!(store.scanned_count("blocks").await.unwrap(), 0);
    }
}
