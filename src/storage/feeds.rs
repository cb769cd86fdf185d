use super::schema::Database;
use super::types::{now_millis, Feed, FeedWithOwner, StoreError};

const FEED_COLUMNS: &str = "id, name, url, user_id, created_at, updated_at, last_fetched_at";

impl Database {
    // ========================================================================
    // Feed Operations
    // ========================================================================

    /// Create a feed owned by `user_id`.
    ///
    /// Returns `StoreError::DuplicateKey` if a feed with the same URL exists.
    pub async fn create_feed(&self, name: &str, url: &str, user_id: i64) -> Result<Feed, StoreError> {
        let now = now_millis();
        let feed = sqlx::query_as::<_, Feed>(&format!(
            "INSERT INTO feeds (name, url, user_id, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?) RETURNING {FEED_COLUMNS}"
        ))
        .bind(name)
        .bind(url)
        .bind(user_id)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(feed)
    }

    /// All feeds with the name of the user who added them, oldest first
    pub async fn get_feeds(&self) -> Result<Vec<FeedWithOwner>, StoreError> {
        let feeds = sqlx::query_as::<_, FeedWithOwner>(
            r#"
            SELECT f.name, f.url, u.name AS user_name
            FROM feeds f
            JOIN users u ON u.id = f.user_id
            ORDER BY f.created_at, f.id
        "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(feeds)
    }

    pub async fn get_feed_by_url(&self, url: &str) -> Result<Option<Feed>, StoreError> {
        let feed =
            sqlx::query_as::<_, Feed>(&format!("SELECT {FEED_COLUMNS} FROM feeds WHERE url = ?"))
                .bind(url)
                .fetch_optional(&self.pool)
                .await?;
        Ok(feed)
    }

    pub async fn get_feed(&self, feed_id: i64) -> Result<Option<Feed>, StoreError> {
        let feed =
            sqlx::query_as::<_, Feed>(&format!("SELECT {FEED_COLUMNS} FROM feeds WHERE id = ?"))
                .bind(feed_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(feed)
    }

    // ========================================================================
    // Fetch Scheduling
    // ========================================================================

    /// Atomically select the least recently fetched feed and stamp it with `now`.
    ///
    /// Never-fetched feeds (`last_fetched_at IS NULL`) sort before every
    /// fetched feed; ties fall back to the feed id so the rotation is stable.
    /// Selection and stamp happen in one `UPDATE ... RETURNING` statement, so
    /// two processes sharing the database cannot both claim the same feed for
    /// the same stamp.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` when there are no feeds.
    pub async fn claim_next_feed_at(&self, now: i64) -> Result<Feed, StoreError> {
        let claimed = sqlx::query_as::<_, Feed>(&format!(
            r#"
            UPDATE feeds SET last_fetched_at = ?, updated_at = ?
            WHERE id = (
                SELECT id FROM feeds
                ORDER BY last_fetched_at ASC NULLS FIRST, id ASC
                LIMIT 1
            )
            RETURNING {FEED_COLUMNS}
        "#
        ))
        .bind(now)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        claimed.ok_or(StoreError::NotFound)
    }

    /// Stamp a feed's `last_fetched_at` with `now`.
    ///
    /// Returns `StoreError::NotFound` if the feed no longer exists.
    pub async fn mark_feed_fetched_at(&self, feed_id: i64, now: i64) -> Result<(), StoreError> {
        let result =
            sqlx::query("UPDATE feeds SET last_fetched_at = ?, updated_at = ? WHERE id = ?")
                .bind(now)
                .bind(now)
                .bind(feed_id)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}
