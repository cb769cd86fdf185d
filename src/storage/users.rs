use super::schema::Database;
use super::types::{now_millis, StoreError, User};

impl Database {
    // ========================================================================
    // User Operations
    // ========================================================================

    /// Register a user. Returns `StoreError::DuplicateKey` if the name is taken.
    pub async fn create_user(&self, name: &str) -> Result<User, StoreError> {
        let now = now_millis();
        let user = sqlx::query_as::<_, User>(
            "INSERT INTO users (name, created_at, updated_at) VALUES (?, ?, ?) \
             RETURNING id, name, created_at, updated_at",
        )
        .bind(name)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(user)
    }

    pub async fn get_user(&self, name: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, name, created_at, updated_at FROM users WHERE name = ?",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    /// All users in registration order
    pub async fn get_users(&self) -> Result<Vec<User>, StoreError> {
        let users = sqlx::query_as::<_, User>(
            "SELECT id, name, created_at, updated_at FROM users ORDER BY created_at, id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(users)
    }

    /// Delete every user. Feeds, follows and posts go with them (ON DELETE CASCADE).
    ///
    /// Returns the number of users removed.
    pub async fn delete_users(&self) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM users")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use crate::storage::{Database, NewPost, StoreError};

    async fn test_db() -> Database {
        Database::open(":memory:").await.unwrap()
    }

    #[tokio::test]
    async fn test_create_and_get_user() {
        let db = test_db().await;
        let created = db.create_user("kris").await.unwrap();

        let fetched = db.get_user("kris").await.unwrap().unwrap();
        assert_eq!(created, fetched);
        assert!(db.get_user("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_user_rejected() {
        let db = test_db().await;
        db.create_user("kris").await.unwrap();

        let result = db.create_user("kris").await;
        assert!(matches!(result, Err(StoreError::DuplicateKey(_))));
    }

    #[tokio::test]
    async fn test_get_users_in_registration_order() {
        let db = test_db().await;
        db.create_user("alice").await.unwrap();
        db.create_user("bob").await.unwrap();

        let names: Vec<_> = db
            .get_users()
            .await
            .unwrap()
            .into_iter()
            .map(|u| u.name)
            .collect();
        assert_eq!(names, vec!["alice", "bob"]);
    }

    #[tokio::test]
    async fn test_delete_users_cascades() {
        let db = test_db().await;
        let user = db.create_user("kris").await.unwrap();
        let feed = db
            .create_feed("A", "https://a.example.com/rss", user.id)
            .await
            .unwrap();
        db.create_feed_follow(user.id, feed.id).await.unwrap();
        db.insert_post(&NewPost {
            feed_id: feed.id,
            title: "Hello".to_string(),
            url: "https://a.example.com/hello".to_string(),
            description: None,
            published_at: None,
        })
        .await
        .unwrap();

        let removed = db.delete_users().await.unwrap();
        assert_eq!(removed, 1);

        assert!(db.get_users().await.unwrap().is_empty());
        assert!(db.get_feeds().await.unwrap().is_empty());
        assert!(db.get_posts_for_feed(feed.id).await.unwrap().is_empty());
    }
}
