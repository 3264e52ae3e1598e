use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};

use super::{ConversationSummary, SaveOutcome, SummaryStore};
use crate::errors::StoreError;

/// Async-safe summary store backed by SQLite.
///
/// Wraps `SummaryDb` behind `Arc<Mutex>` and runs all access on tokio's
/// blocking thread pool via `spawn_blocking`.
#[derive(Clone)]
pub struct SqliteSummaryStore {
    inner: Arc<std::sync::Mutex<SummaryDb>>,
}

impl SqliteSummaryStore {
    pub fn new(db: SummaryDb) -> Self {
        Self {
            inner: Arc::new(std::sync::Mutex::new(db)),
        }
    }

    /// Open (or create) the database file, creating parent directories.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create store directory: {}", parent.display())
            })?;
        }
        Ok(Self::new(SummaryDb::new(path)?))
    }

    /// In-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        Ok(Self::new(SummaryDb::new_in_memory()?))
    }

    /// Run a closure with access to the database on a blocking thread.
    /// All data passed into `f` must be owned (`'static`).
    async fn call<F, R>(&self, f: F) -> Result<R, StoreError>
    where
        F: FnOnce(&SummaryDb) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let db = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let guard = db.lock().map_err(|_| StoreError::LockPoisoned)?;
            f(&guard).map_err(StoreError::Database)
        })
        .await
        .map_err(|e| StoreError::Database(anyhow::anyhow!("Store task panicked: {}", e)))?
    }
}

#[async_trait]
impl SummaryStore for SqliteSummaryStore {
    async fn load(&self, conversation_id: &str) -> Result<Option<ConversationSummary>, StoreError> {
        let id = conversation_id.to_string();
        self.call(move |db| db.get_summary(&id)).await
    }

    async fn save(
        &self,
        conversation_id: &str,
        summary_text: &str,
        compacted_through: usize,
    ) -> Result<SaveOutcome, StoreError> {
        let progress =
            i64::try_from(compacted_through).map_err(|_| StoreError::ProgressOutOfRange {
                conversation_id: conversation_id.to_string(),
                value: compacted_through,
            })?;
        let id = conversation_id.to_string();
        let text = summary_text.to_string();
        self.call(move |db| db.upsert_summary(&id, &text, progress))
            .await
    }
}

/// Synchronous access to the `conversation_summaries` table.
pub struct SummaryDb {
    conn: Connection,
}

impl SummaryDb {
    /// Open (or create) a SQLite database at the given path and run migrations.
    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).context("Failed to open SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Create an in-memory SQLite database (for testing).
    pub fn new_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> Result<()> {
        self.conn
            .busy_timeout(Duration::from_secs(5))
            .context("Failed to set busy timeout")?;
        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS conversation_summaries (
                    conversation_id TEXT PRIMARY KEY,
                    summary_text TEXT NOT NULL,
                    compacted_through INTEGER NOT NULL,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );
                ",
            )
            .context("Failed to create conversation_summaries table")?;
        Ok(())
    }

    pub fn get_summary(&self, conversation_id: &str) -> Result<Option<ConversationSummary>> {
        let row = self
            .conn
            .query_row(
                "SELECT conversation_id, summary_text, compacted_through, created_at, updated_at
                 FROM conversation_summaries WHERE conversation_id = ?1",
                params![conversation_id],
                |row| {
                    Ok(SummaryRow {
                        conversation_id: row.get(0)?,
                        summary_text: row.get(1)?,
                        compacted_through: row.get(2)?,
                        created_at: row.get(3)?,
                        updated_at: row.get(4)?,
                    })
                },
            )
            .optional()
            .context("Failed to query summary")?;

        row.map(SummaryRow::into_summary).transpose()
    }

    /// Insert or advance the summary in a single statement. The `WHERE`
    /// clause on the conflict branch is the monotonic progress guard.
    pub fn upsert_summary(
        &self,
        conversation_id: &str,
        summary_text: &str,
        compacted_through: i64,
    ) -> Result<SaveOutcome> {
        let existed: bool = self
            .conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM conversation_summaries WHERE conversation_id = ?1)",
                params![conversation_id],
                |row| row.get(0),
            )
            .context("Failed to check for existing summary")?;

        let now = Utc::now().to_rfc3339();
        let changed = self
            .conn
            .execute(
                "INSERT INTO conversation_summaries
                    (conversation_id, summary_text, compacted_through, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)
                 ON CONFLICT(conversation_id) DO UPDATE SET
                    summary_text = excluded.summary_text,
                    compacted_through = excluded.compacted_through,
                    updated_at = excluded.updated_at
                 WHERE excluded.compacted_through > conversation_summaries.compacted_through",
                params![conversation_id, summary_text, compacted_through, now],
            )
            .context("Failed to upsert summary")?;

        Ok(match (changed, existed) {
            (0, _) => SaveOutcome::Stale,
            (_, true) => SaveOutcome::Updated,
            (_, false) => SaveOutcome::Inserted,
        })
    }

    #[cfg(test)]
    fn count(&self) -> Result<i64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM conversation_summaries", [], |row| {
                row.get(0)
            })
            .context("Failed to count summaries")
    }
}

struct SummaryRow {
    conversation_id: String,
    summary_text: String,
    compacted_through: i64,
    created_at: String,
    updated_at: String,
}

impl SummaryRow {
    fn into_summary(self) -> Result<ConversationSummary> {
        let compacted_through = usize::try_from(self.compacted_through).map_err(|_| {
            StoreError::InvalidProgress {
                conversation_id: self.conversation_id.clone(),
                value: self.compacted_through,
            }
        })?;
        Ok(ConversationSummary {
            compacted_through,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
            conversation_id: self.conversation_id,
            summary_text: self.summary_text,
        })
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .with_context(|| format!("Invalid timestamp in store: {}", raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_create_database_and_run_migrations() -> Result<()> {
        let db = SummaryDb::new_in_memory()?;
        assert_eq!(db.count()?, 0);
        Ok(())
    }

    #[test]
    fn test_insert_then_get() -> Result<()> {
        let db = SummaryDb::new_in_memory()?;
        assert_eq!(db.upsert_summary("c1", "hello", 4)?, SaveOutcome::Inserted);

        let row = db.get_summary("c1")?.expect("row exists");
        assert_eq!(row.conversation_id, "c1");
        assert_eq!(row.summary_text, "hello");
        assert_eq!(row.compacted_through, 4);
        assert_eq!(row.created_at, row.updated_at);
        Ok(())
    }

    #[test]
    fn test_get_missing_returns_none() -> Result<()> {
        let db = SummaryDb::new_in_memory()?;
        assert!(db.get_summary("missing")?.is_none());
        Ok(())
    }

    #[test]
    fn test_monotonic_guard_discards_stale_write() -> Result<()> {
        let db = SummaryDb::new_in_memory()?;
        db.upsert_summary("c1", "new summary", 5)?;
        assert_eq!(db.upsert_summary("c1", "stale summary", 3)?, SaveOutcome::Stale);
        assert_eq!(db.upsert_summary("c1", "same progress", 5)?, SaveOutcome::Stale);

        let row = db.get_summary("c1")?.expect("row exists");
        assert_eq!(row.summary_text, "new summary");
        assert_eq!(row.compacted_through, 5);
        assert_eq!(db.count()?, 1);
        Ok(())
    }

    #[test]
    fn test_update_preserves_created_at() -> Result<()> {
        let db = SummaryDb::new_in_memory()?;
        db.upsert_summary("c1", "first", 5)?;
        let created = db.get_summary("c1")?.expect("row exists").created_at;

        assert_eq!(db.upsert_summary("c1", "second", 8)?, SaveOutcome::Updated);
        let row = db.get_summary("c1")?.expect("row exists");
        assert_eq!(row.summary_text, "second");
        assert_eq!(row.compacted_through, 8);
        assert_eq!(row.created_at, created);
        Ok(())
    }

    #[test]
    fn test_conversations_are_independent() -> Result<()> {
        let db = SummaryDb::new_in_memory()?;
        db.upsert_summary("a", "A", 10)?;
        assert_eq!(db.upsert_summary("b", "B", 2)?, SaveOutcome::Inserted);
        assert_eq!(db.count()?, 2);
        Ok(())
    }

    #[test]
    fn test_negative_progress_in_row_is_rejected() -> Result<()> {
        let db = SummaryDb::new_in_memory()?;
        db.conn.execute(
            "INSERT INTO conversation_summaries VALUES ('bad', 't', -1, ?1, ?1)",
            params![Utc::now().to_rfc3339()],
        )?;
        assert!(db.get_summary("bad").is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_store_persists_across_reopen() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("nested").join("summaries.db");

        {
            let store = SqliteSummaryStore::open(&path)?;
            assert_eq!(store.save("c1", "persisted", 7).await?, SaveOutcome::Inserted);
        }

        let store = SqliteSummaryStore::open(&path)?;
        let row = store.load("c1").await?.expect("row exists");
        assert_eq!(row.summary_text, "persisted");
        assert_eq!(row.compacted_through, 7);
        Ok(())
    }

    #[tokio::test]
    async fn test_store_guard_through_async_handle() -> Result<()> {
        let store = SqliteSummaryStore::in_memory()?;
        store.save("c1", "new summary", 5).await?;
        assert_eq!(store.save("c1", "stale summary", 3).await?, SaveOutcome::Stale);

        let row = store.load("c1").await?.expect("row exists");
        assert_eq!(row.summary_text, "new summary");
        assert_eq!(row.compacted_through, 5);
        Ok(())
    }

    #[tokio::test]
    async fn test_save_rejects_progress_beyond_sqlite_range() -> Result<()> {
        let store = SqliteSummaryStore::in_memory()?;
        let too_far = i64::MAX as usize + 1;

        match store.save("c1", "summary", too_far).await {
            Err(StoreError::ProgressOutOfRange {
                conversation_id,
                value,
            }) => {
                assert_eq!(conversation_id, "c1");
                assert_eq!(value, too_far);
            }
            other => panic!("Expected ProgressOutOfRange, got {:?}", other),
        }
        assert!(store.load("c1").await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_store_is_usable_from_spawned_tasks() -> Result<()> {
        let store = SqliteSummaryStore::in_memory()?;
        let mut handles = Vec::new();
        for progress in 1..=8usize {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.save("shared", &format!("summary {}", progress), progress).await
            }));
        }
        for handle in handles {
            handle.await??;
        }

        let row = store.load("shared").await?.expect("row exists");
        assert_eq!(row.compacted_through, 8);
        assert_eq!(row.summary_text, "summary 8");
        Ok(())
    }
}
