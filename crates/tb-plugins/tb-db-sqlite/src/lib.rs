//! # tb-db-sqlite Implementation
//!
//! This module implements the data mapping between the SQLite relational model
//! and the `tb-core` domain models.
//!
//! Timestamps are stored as integer microseconds since the epoch so that
//! ordering in SQL matches ordering in Rust. Every write transaction starts
//! with a write statement, which takes SQLite's write lock up front and keeps
//! writers serialized.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow,
};
use sqlx::{Row, Sqlite, Transaction};
use tb_core::clock::{from_micros, MonotonicClock};
use tb_core::error::{AppError, Result};
use tb_core::models::{
    NewPost, Post, PostId, Thread, ThreadId, ThreadPreview, ThreadView, PREVIEW_POSTS,
};
use tb_core::traits::ThreadStore;
use tb_core::validation::{validate_post, validate_title};
use tracing::{debug, info};

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS threads (
        id            INTEGER PRIMARY KEY AUTOINCREMENT,
        title         TEXT    NOT NULL,
        created_at    INTEGER NOT NULL,
        last_activity INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS posts (
        id         INTEGER PRIMARY KEY AUTOINCREMENT,
        thread_id  INTEGER NOT NULL REFERENCES threads (id),
        name       TEXT    NOT NULL,
        contact    TEXT    NOT NULL,
        text       TEXT    NOT NULL,
        created_at INTEGER NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_posts_thread ON posts (thread_id, created_at, id)",
    "CREATE INDEX IF NOT EXISTS idx_threads_activity ON threads (last_activity DESC, id DESC)",
];

/// Connection tuning for [`SqliteThreadStore::connect`].
#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub max_connections: u32,
    /// How long a writer waits for the lock before reporting a conflict.
    pub busy_timeout: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            max_connections: 5,
            busy_timeout: Duration::from_secs(5),
        }
    }
}

pub struct SqliteThreadStore {
    pool: SqlitePool,
    clock: MonotonicClock,
}

impl SqliteThreadStore {
    pub async fn new(url: &str) -> Result<Self> {
        Self::connect(url, StoreOptions::default()).await
    }

    /// Opens (creating if missing) the database at `url` and bootstraps the schema.
    ///
    /// An in-memory database lives only as long as its connection, so it is
    /// served from a single connection that is never recycled.
    pub async fn connect(url: &str, options: StoreOptions) -> Result<Self> {
        let in_memory = url.contains(":memory:") || url.contains("mode=memory");

        let mut connect = SqliteConnectOptions::from_str(url)
            .map_err(storage_error)?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(options.busy_timeout);
        if !in_memory {
            connect = connect.journal_mode(SqliteJournalMode::Wal);
        }

        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(options.max_connections.max(1))
        };
        let pool = pool_options
            .connect_with(connect)
            .await
            .map_err(storage_error)?;

        for statement in SCHEMA {
            sqlx::query(*statement)
                .execute(&pool)
                .await
                .map_err(storage_error)?;
        }

        let store = Self {
            pool,
            clock: MonotonicClock::new(),
        };
        store.resume_clock().await?;
        info!(url, in_memory, "sqlite thread store ready");
        Ok(store)
    }

    /// Keeps timestamps ahead of anything an earlier process persisted.
    async fn resume_clock(&self) -> Result<()> {
        let latest: Option<i64> = sqlx::query_scalar(
            "SELECT MAX(ts) FROM (
                SELECT MAX(last_activity) AS ts FROM threads
                UNION ALL
                SELECT MAX(created_at) FROM posts
            )",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(storage_error)?;

        if let Some(micros) = latest {
            self.clock.observe(from_micros(micros));
        }
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Inserts the thread row, then stamps it.
    ///
    /// The clock is read only after the insert holds the write lock, so
    /// creation times follow commit order.
    async fn insert_thread(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        title: &str,
    ) -> Result<(ThreadId, i64)> {
        let thread_id = sqlx::query(
            "INSERT INTO threads (title, created_at, last_activity) VALUES (?, 0, 0)",
        )
        .bind(title)
        .execute(&mut **tx)
        .await
        .map_err(storage_error)?
        .last_insert_rowid();

        let at = self.clock.now().timestamp_micros();
        sqlx::query("UPDATE threads SET created_at = ?, last_activity = ? WHERE id = ?")
            .bind(at)
            .bind(at)
            .bind(thread_id)
            .execute(&mut **tx)
            .await
            .map_err(storage_error)?;
        Ok((ThreadId(thread_id), at))
    }

    async fn insert_post(
        tx: &mut Transaction<'_, Sqlite>,
        thread_id: ThreadId,
        post: &NewPost,
        at: i64,
    ) -> Result<PostId> {
        let result = sqlx::query(
            "INSERT INTO posts (thread_id, name, contact, text, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(thread_id.0)
        .bind(&post.name)
        .bind(&post.contact)
        .bind(&post.text)
        .bind(at)
        .execute(&mut **tx)
        .await
        .map_err(storage_error)?;
        Ok(PostId(result.last_insert_rowid()))
    }

    async fn fetch_thread(
        tx: &mut Transaction<'_, Sqlite>,
        thread_id: ThreadId,
    ) -> Result<Thread> {
        let row = sqlx::query(
            "SELECT id, title, created_at, last_activity FROM threads WHERE id = ?",
        )
        .bind(thread_id.0)
        .fetch_optional(&mut **tx)
        .await
        .map_err(storage_error)?;

        match row {
            Some(row) => thread_from_row(&row).map_err(storage_error),
            None => Err(AppError::ThreadNotFound(thread_id)),
        }
    }
}

#[async_trait]
impl ThreadStore for SqliteThreadStore {
    async fn create_thread(&self, title: &str) -> Result<ThreadId> {
        validate_title(title)?;

        let mut tx = self.pool.begin().await.map_err(storage_error)?;
        let (thread_id, _) = self.insert_thread(&mut tx, title).await?;
        tx.commit().await.map_err(storage_error)?;

        debug!(thread_id = %thread_id, "thread row inserted");
        Ok(thread_id)
    }

    async fn append_post(&self, thread_id: ThreadId, post: NewPost) -> Result<PostId> {
        validate_post(&post)?;

        let mut tx = self.pool.begin().await.map_err(storage_error)?;

        // No-op write: takes the write lock and proves the thread exists.
        let touched = sqlx::query("UPDATE threads SET last_activity = last_activity WHERE id = ?")
            .bind(thread_id.0)
            .execute(&mut *tx)
            .await
            .map_err(storage_error)?
            .rows_affected();
        if touched == 0 {
            return Err(AppError::ThreadNotFound(thread_id));
        }

        let at = self.clock.now().timestamp_micros();
        let post_id = Self::insert_post(&mut tx, thread_id, &post, at).await?;

        if !post.is_sage() {
            sqlx::query("UPDATE threads SET last_activity = MAX(last_activity, ?) WHERE id = ?")
                .bind(at)
                .bind(thread_id.0)
                .execute(&mut *tx)
                .await
                .map_err(storage_error)?;
        }

        tx.commit().await.map_err(storage_error)?;
        Ok(post_id)
    }

    /// Atomic operation to create a thread and its first post.
    ///
    /// # Developer Note
    /// Using a Transaction (tx) ensures we don't end up with "ghost threads"
    /// that have no initial post if the second insert fails.
    async fn create_thread_with_opening_post(
        &self,
        title: &str,
        post: NewPost,
    ) -> Result<(ThreadId, PostId)> {
        validate_title(title)?;
        validate_post(&post)?;

        let mut tx = self.pool.begin().await.map_err(storage_error)?;
        let (thread_id, at) = self.insert_thread(&mut tx, title).await?;
        let post_id = Self::insert_post(&mut tx, thread_id, &post, at).await?;
        tx.commit().await.map_err(storage_error)?;

        Ok((thread_id, post_id))
    }

    async fn list_threads(&self) -> Result<Vec<ThreadPreview>> {
        // One read transaction, so threads and previews come from the same snapshot.
        let mut tx = self.pool.begin().await.map_err(storage_error)?;

        let threads = sqlx::query(
            "SELECT id, title, created_at, last_activity FROM threads
             ORDER BY last_activity DESC, id DESC",
        )
        .fetch_all(&mut *tx)
        .await
        .map_err(storage_error)?
        .iter()
        .map(thread_from_row)
        .collect::<sqlx::Result<Vec<_>>>()
        .map_err(storage_error)?;

        let preview_rows = sqlx::query(
            "SELECT id, thread_id, name, contact, text, created_at FROM (
                SELECT p.*, ROW_NUMBER() OVER (
                    PARTITION BY thread_id ORDER BY created_at DESC, id DESC
                ) AS recency
                FROM posts p
             )
             WHERE recency <= ?
             ORDER BY thread_id, created_at ASC, id ASC",
        )
        .bind(PREVIEW_POSTS as i64)
        .fetch_all(&mut *tx)
        .await
        .map_err(storage_error)?;

        tx.commit().await.map_err(storage_error)?;

        let mut previews: HashMap<ThreadId, Vec<Post>> = HashMap::new();
        for row in &preview_rows {
            let post = post_from_row(row).map_err(storage_error)?;
            previews.entry(post.thread_id).or_default().push(post);
        }

        debug!(threads = threads.len(), "listed threads");
        Ok(threads
            .into_iter()
            .map(|thread| {
                let posts = previews.remove(&thread.id).unwrap_or_default();
                ThreadPreview { thread, posts }
            })
            .collect())
    }

    /// Retrieves a thread and all its posts in a single logical operation.
    async fn get_thread(&self, thread_id: ThreadId) -> Result<ThreadView> {
        let mut tx = self.pool.begin().await.map_err(storage_error)?;

        let thread = Self::fetch_thread(&mut tx, thread_id).await?;

        let posts = sqlx::query(
            "SELECT id, thread_id, name, contact, text, created_at FROM posts
             WHERE thread_id = ? ORDER BY created_at ASC, id ASC",
        )
        .bind(thread_id.0)
        .fetch_all(&mut *tx)
        .await
        .map_err(storage_error)?
        .iter()
        .map(post_from_row)
        .collect::<sqlx::Result<Vec<_>>>()
        .map_err(storage_error)?;

        tx.commit().await.map_err(storage_error)?;
        Ok(ThreadView { thread, posts })
    }
}

fn thread_from_row(row: &SqliteRow) -> sqlx::Result<Thread> {
    Ok(Thread {
        id: ThreadId(row.try_get("id")?),
        title: row.try_get("title")?,
        created_at: from_micros(row.try_get("created_at")?),
        last_activity: from_micros(row.try_get("last_activity")?),
    })
}

fn post_from_row(row: &SqliteRow) -> sqlx::Result<Post> {
    Ok(Post {
        id: PostId(row.try_get("id")?),
        thread_id: ThreadId(row.try_get("thread_id")?),
        name: row.try_get("name")?,
        contact: row.try_get("contact")?,
        text: row.try_get("text")?,
        created_at: from_micros(row.try_get("created_at")?),
    })
}

// SQLite primary result codes (the low byte of an extended code).
const SQLITE_BUSY: i64 = 5;
const SQLITE_LOCKED: i64 = 6;
const SQLITE_CONSTRAINT: i64 = 19;

/// Constraint violations of any kind (unique, foreign key, check, trigger
/// abort) and lock contention are conflicts the caller may retry; anything
/// else is an infrastructure failure.
fn storage_error(err: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() || db.is_foreign_key_violation() || db.is_check_violation() {
            return AppError::StorageConflict(db.message().to_string());
        }
        let primary = db
            .code()
            .and_then(|code| code.parse::<i64>().ok())
            .map(|code| code & 0xff);
        if matches!(
            primary,
            Some(SQLITE_BUSY) | Some(SQLITE_LOCKED) | Some(SQLITE_CONSTRAINT)
        ) {
            return AppError::StorageConflict(db.message().to_string());
        }
    }
    AppError::Internal(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_store() -> SqliteThreadStore {
        SqliteThreadStore::new("sqlite::memory:").await.unwrap()
    }

    fn post(name: &str, contact: &str, text: &str) -> NewPost {
        NewPost::new(name, contact, text)
    }

    #[tokio::test]
    async fn test_create_and_get_thread() {
        let repo = memory_store().await;

        let (thread_id, post_id) = repo
            .create_thread_with_opening_post("Rust", post("anon", "", "OP"))
            .await
            .expect("Failed to create thread");

        let view = repo.get_thread(thread_id).await.unwrap();
        assert_eq!(view.thread.title, "Rust");
        assert_eq!(view.posts.len(), 1);
        assert_eq!(view.posts[0].id, post_id);
        assert_eq!(view.posts[0].text, "OP");
        assert_eq!(view.posts[0].created_at, view.thread.created_at);
        assert_eq!(view.thread.last_activity, view.thread.created_at);
    }

    #[tokio::test]
    async fn test_append_to_missing_thread_inserts_nothing() {
        let repo = memory_store().await;

        let err = repo
            .append_post(ThreadId(99), post("anon", "", "orphan"))
            .await
            .unwrap_err();
        assert_eq!(err, AppError::ThreadNotFound(ThreadId(99)));

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM posts")
            .fetch_one(&repo.pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_sage_keeps_last_activity() {
        let repo = memory_store().await;
        let (thread_id, _) = repo
            .create_thread_with_opening_post("t", post("anon", "", "op"))
            .await
            .unwrap();
        let before = repo.get_thread(thread_id).await.unwrap().thread.last_activity;

        repo.append_post(thread_id, post("anon", "sage", "quiet"))
            .await
            .unwrap();
        let after_sage = repo.get_thread(thread_id).await.unwrap();
        assert_eq!(after_sage.thread.last_activity, before);

        let bump_id = repo
            .append_post(thread_id, post("anon", "mail@example.com", "loud"))
            .await
            .unwrap();
        let after_bump = repo.get_thread(thread_id).await.unwrap();
        let bump = after_bump.posts.iter().find(|p| p.id == bump_id).unwrap();
        assert_eq!(after_bump.thread.last_activity, bump.created_at);
    }

    #[tokio::test]
    async fn test_preview_keeps_five_most_recent() {
        let repo = memory_store().await;
        let (thread_id, _) = repo
            .create_thread_with_opening_post("long", post("anon", "", "0"))
            .await
            .unwrap();
        for i in 1..8 {
            repo.append_post(thread_id, post("anon", "", &i.to_string()))
                .await
                .unwrap();
        }

        let listing = repo.list_threads().await.unwrap();
        let texts: Vec<_> = listing[0].posts.iter().map(|p| p.text.as_str()).collect();
        assert_eq!(texts, ["3", "4", "5", "6", "7"]);
    }

    #[tokio::test]
    async fn test_validation_happens_before_any_write() {
        let repo = memory_store().await;

        let err = repo
            .create_thread_with_opening_post("ok", post("", "", "no name"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationError { field: "name", .. }));
        assert!(repo.list_threads().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reopened_file_keeps_data_and_ordering() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("board.db").display());

        let first = SqliteThreadStore::new(&url).await.unwrap();
        let (old_id, _) = first
            .create_thread_with_opening_post("old", post("anon", "", "op"))
            .await
            .unwrap();
        first.close().await;

        let second = SqliteThreadStore::new(&url).await.unwrap();
        let (new_id, _) = second
            .create_thread_with_opening_post("new", post("anon", "", "op"))
            .await
            .unwrap();

        let order: Vec<_> = second
            .list_threads()
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.thread.id)
            .collect();
        assert_eq!(order, [new_id, old_id]);
    }

    #[tokio::test]
    async fn test_failed_opening_post_rolls_back_thread() {
        let repo = memory_store().await;
        sqlx::query("CREATE UNIQUE INDEX posts_text_unique ON posts (text)")
            .execute(&repo.pool)
            .await
            .unwrap();

        repo.create_thread_with_opening_post("first", post("anon", "", "same"))
            .await
            .unwrap();
        let err = repo
            .create_thread_with_opening_post("second", post("anon", "", "same"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::StorageConflict(_)), "got {err:?}");

        let listing = repo.list_threads().await.unwrap();
        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0].thread.title, "first");
        let posts: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM posts")
            .fetch_one(&repo.pool)
            .await
            .unwrap();
        assert_eq!(posts, 1);
    }

    #[tokio::test]
    async fn test_trigger_abort_is_conflict() {
        let repo = memory_store().await;
        sqlx::query(
            "CREATE TRIGGER no_posts BEFORE INSERT ON posts
             BEGIN SELECT RAISE(ABORT, 'board closed'); END",
        )
        .execute(&repo.pool)
        .await
        .unwrap();

        let err = repo
            .create_thread_with_opening_post("t", post("anon", "", "op"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::StorageConflict(_)), "got {err:?}");
        assert!(repo.list_threads().await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_creations_stamp_in_id_order() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("board.db").display());
        let repo = std::sync::Arc::new(
            SqliteThreadStore::connect(
                &url,
                StoreOptions {
                    max_connections: 8,
                    busy_timeout: Duration::from_secs(30),
                },
            )
            .await
            .unwrap(),
        );

        let tasks: Vec<_> = (0..64)
            .map(|i| {
                let repo = repo.clone();
                tokio::spawn(async move {
                    let title = format!("t{i}");
                    if i % 2 == 0 {
                        repo.create_thread(&title).await.map(|_| ())
                    } else {
                        repo.create_thread_with_opening_post(&title, post("anon", "", "op"))
                            .await
                            .map(|_| ())
                    }
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let mut threads: Vec<_> = repo
            .list_threads()
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.thread)
            .collect();
        assert_eq!(threads.len(), 64);
        threads.sort_by_key(|t| t.id);
        for pair in threads.windows(2) {
            assert!(
                pair[0].created_at < pair[1].created_at,
                "thread {} created after thread {}",
                pair[0].id,
                pair[1].id
            );
        }
    }

    #[test]
    fn test_pool_timeout_is_internal() {
        let err = storage_error(sqlx::Error::PoolTimedOut);
        assert!(matches!(err, AppError::Internal(_)));
    }
}
