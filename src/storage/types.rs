use sqlx::FromRow;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Errors raised while opening or migrating the database file.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Another process holds a lock on the database file
    #[error("The gator database is locked by another process. Please try again.")]
    InstanceLocked,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Check if a sqlx error indicates database locking
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        if is_lock_error(&err.to_string()) {
            return DatabaseError::InstanceLocked;
        }
        DatabaseError::Other(err)
    }
}

/// SQLITE_BUSY (5) and SQLITE_LOCKED (6) surface through the error message
/// rather than a stable error kind. SQLITE_CANTOPEN (14) is a path or
/// permission problem, not a lock.
pub(crate) fn is_lock_error(message: &str) -> bool {
    let message = message.to_lowercase();
    message.contains("database is locked")
        || message.contains("database table is locked")
        || message.contains("sqlite_busy")
        || message.contains("sqlite_locked")
}

/// Errors returned by the feed store operations the scheduler depends on.
#[derive(Debug, Error)]
pub enum StoreError {
    /// There is no row to return (e.g. no feeds exist to claim)
    #[error("Not found")]
    NotFound,

    /// A uniqueness constraint rejected the write
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    /// Any other database failure
    #[error("Database error: {0}")]
    Database(#[source] sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                StoreError::DuplicateKey(db_err.message().to_string())
            }
            sqlx::Error::RowNotFound => StoreError::NotFound,
            _ => StoreError::Database(err),
        }
    }
}

// ============================================================================
// Data Structures
// ============================================================================

/// A registered user.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A subscribed feed.
///
/// `last_fetched_at` is `None` until the feed is claimed for the first time.
/// All timestamps are Unix epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct Feed {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub user_id: i64,
    pub created_at: i64,
    pub updated_at: i64,
    pub last_fetched_at: Option<i64>,
}

/// Feed listing row with the name of the user who added it.
#[derive(Debug, Clone, FromRow)]
pub struct FeedWithOwner {
    pub name: String,
    pub url: String,
    pub user_name: String,
}

/// A follow relation joined with the user and feed names.
#[derive(Debug, Clone, FromRow)]
pub struct FeedFollow {
    pub id: i64,
    pub created_at: i64,
    pub updated_at: i64,
    pub user_name: String,
    pub feed_name: String,
}

/// A stored post. Posts are immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct Post {
    pub id: i64,
    pub feed_id: i64,
    pub title: String,
    pub url: String,
    pub description: Option<String>,
    pub published_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A post ready to be inserted, produced by ingestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPost {
    pub feed_id: i64,
    pub title: String,
    pub url: String,
    pub description: Option<String>,
    pub published_at: Option<i64>,
}

/// Post listing row for `browse`, carrying the feed name.
#[derive(Debug, Clone, FromRow)]
pub struct PostWithFeed {
    pub title: String,
    pub url: String,
    pub description: Option<String>,
    pub published_at: Option<i64>,
    pub feed_name: String,
}

/// Current time as Unix epoch milliseconds.
pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
