use super::schema::Database;
use super::types::{now_millis, FeedFollow, StoreError};

impl Database {
    // ========================================================================
    // Feed Follow Operations
    // ========================================================================

    /// Follow a feed, returning the relation joined with user and feed names.
    ///
    /// Returns `StoreError::DuplicateKey` if the user already follows the feed.
    pub async fn create_feed_follow(
        &self,
        user_id: i64,
        feed_id: i64,
    ) -> Result<FeedFollow, StoreError> {
        let now = now_millis();
        let mut tx = self.pool.begin().await?;

        let (follow_id,): (i64,) = sqlx::query_as(
            "INSERT INTO feed_follows (user_id, feed_id, created_at, updated_at) \
             VALUES (?, ?, ?, ?) RETURNING id",
        )
        .bind(user_id)
        .bind(feed_id)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        let follow = sqlx::query_as::<_, FeedFollow>(
            r#"
            SELECT ff.id, ff.created_at, ff.updated_at,
                   u.name AS user_name, f.name AS feed_name
            FROM feed_follows ff
            JOIN users u ON u.id = ff.user_id
            JOIN feeds f ON f.id = ff.feed_id
            WHERE ff.id = ?
        "#,
        )
        .bind(follow_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(follow)
    }

    /// Feeds followed by a user, in the order they were followed
    pub async fn get_feed_follows_for_user(
        &self,
        user_id: i64,
    ) -> Result<Vec<FeedFollow>, StoreError> {
        let follows = sqlx::query_as::<_, FeedFollow>(
            r#"
            SELECT ff.id, ff.created_at, ff.updated_at,
                   u.name AS user_name, f.name AS feed_name
            FROM feed_follows ff
            JOIN users u ON u.id = ff.user_id
            JOIN feeds f ON f.id = ff.feed_id
            WHERE ff.user_id = ?
            ORDER BY ff.created_at, ff.id
        "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(follows)
    }

    /// Remove a follow. Returns whether a row was deleted.
    pub async fn delete_feed_follow(&self, user_id: i64, feed_id: i64) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM feed_follows WHERE user_id = ? AND feed_id = ?")
            .bind(user_id)
            .bind(feed_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
