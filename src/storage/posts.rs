use super::schema::Database;
use super::types::{now_millis, NewPost, Post, PostWithFeed, StoreError};

// ============================================================================
// Query Limit Constants
// ============================================================================

/// Maximum number of posts to return from `browse` (OOM protection)
const MAX_BROWSE_LIMIT: i64 = 1000;

impl Database {
    // ========================================================================
    // Post Operations
    // ========================================================================

    /// Insert a post. Posts are never updated afterwards.
    ///
    /// The `url` column is unique across all feeds, so re-ingesting an item
    /// (from this feed or any other) fails with `StoreError::DuplicateKey`
    /// instead of creating a second row.
    pub async fn insert_post(&self, post: &NewPost) -> Result<Post, StoreError> {
        let now = now_millis();
        let inserted = sqlx::query_as::<_, Post>(
            r#"
            INSERT INTO posts (feed_id, title, url, description, published_at, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            RETURNING id, feed_id, title, url, description, published_at, created_at, updated_at
        "#,
        )
        .bind(post.feed_id)
        .bind(&post.title)
        .bind(&post.url)
        .bind(&post.description)
        .bind(post.published_at)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(inserted)
    }

    /// All posts of one feed in insertion order
    pub async fn get_posts_for_feed(&self, feed_id: i64) -> Result<Vec<Post>, StoreError> {
        let posts = sqlx::query_as::<_, Post>(
            r#"
            SELECT id, feed_id, title, url, description, published_at, created_at, updated_at
            FROM posts
            WHERE feed_id = ?
            ORDER BY id
        "#,
        )
        .bind(feed_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(posts)
    }

    /// Newest posts from the feeds a user follows.
    ///
    /// Posts without a publish date sort after dated ones. `limit` is capped at
    /// MAX_BROWSE_LIMIT.
    pub async fn get_posts_for_user(
        &self,
        user_id: i64,
        limit: i64,
    ) -> Result<Vec<PostWithFeed>, StoreError> {
        let limit = limit.clamp(0, MAX_BROWSE_LIMIT);
        let posts = sqlx::query_as::<_, PostWithFeed>(
            r#"
            SELECT p.title, p.url, p.description, p.published_at, f.name AS feed_name
            FROM posts p
            JOIN feed_follows ff ON ff.feed_id = p.feed_id
            JOIN feeds f ON f.id = p.feed_id
            WHERE ff.user_id = ?
            ORDER BY p.published_at DESC NULLS LAST, p.id DESC
            LIMIT ?
        "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(posts)
    }
}

#[cfg(test)]
mod tests {
    use crate::storage::{Database, Feed, NewPost, StoreError};
    use pretty_assertions::assert_eq;

    async fn test_db() -> Database {
        Database::open(":memory:").await.unwrap()
    }

    async fn seed_feed(db: &Database, user_id: i64, slug: &str) -> Feed {
        db.create_feed(slug, &format!("https://{slug}.example.com/rss"), user_id)
            .await
            .unwrap()
    }

    fn new_post(feed_id: i64, slug: &str, published_at: Option<i64>) -> NewPost {
        NewPost {
            feed_id,
            title: format!("Post {slug}"),
            url: format!("https://example.com/{slug}"),
            description: Some("Test description".to_string()),
            published_at,
        }
    }

    #[tokio::test]
    async fn test_insert_post() {
        let db = test_db().await;
        let user = db.create_user("kris").await.unwrap();
        let feed = seed_feed(&db, user.id, "a").await;

        let post = db
            .insert_post(&new_post(feed.id, "1", Some(1_700_000_000_000)))
            .await
            .unwrap();

        assert_eq!(post.feed_id, feed.id);
        assert_eq!(post.title, "Post 1");
        assert_eq!(post.published_at, Some(1_700_000_000_000));
        assert_eq!(post.description.as_deref(), Some("Test description"));
    }

    #[tokio::test]
    async fn test_insert_duplicate_url_same_feed() {
        let db = test_db().await;
        let user = db.create_user("kris").await.unwrap();
        let feed = seed_feed(&db, user.id, "a").await;

        db.insert_post(&new_post(feed.id, "1", None)).await.unwrap();
        let result = db.insert_post(&new_post(feed.id, "1", None)).await;

        assert!(matches!(result, Err(StoreError::DuplicateKey(_))));
        assert_eq!(db.get_posts_for_feed(feed.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_insert_duplicate_url_other_feed() {
        let db = test_db().await;
        let user = db.create_user("kris").await.unwrap();
        let a = seed_feed(&db, user.id, "a").await;
        let b = seed_feed(&db, user.id, "b").await;

        db.insert_post(&new_post(a.id, "shared", None)).await.unwrap();
        let result = db.insert_post(&new_post(b.id, "shared", None)).await;

        assert!(matches!(result, Err(StoreError::DuplicateKey(_))));
        assert!(db.get_posts_for_feed(b.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_posts_for_user_only_followed_feeds() {
        let db = test_db().await;
        let user = db.create_user("kris").await.unwrap();
        let followed = seed_feed(&db, user.id, "followed").await;
        let other = seed_feed(&db, user.id, "other").await;
        db.create_feed_follow(user.id, followed.id).await.unwrap();

        db.insert_post(&new_post(followed.id, "mine", Some(10)))
            .await
            .unwrap();
        db.insert_post(&new_post(other.id, "theirs", Some(20)))
            .await
            .unwrap();

        let posts = db.get_posts_for_user(user.id, 10).await.unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].title, "Post mine");
        assert_eq!(posts[0].feed_name, "followed");
    }

    #[tokio::test]
    async fn test_posts_for_user_newest_first_with_limit() {
        let db = test_db().await;
        let user = db.create_user("kris").await.unwrap();
        let feed = seed_feed(&db, user.id, "a").await;
        db.create_feed_follow(user.id, feed.id).await.unwrap();

        db.insert_post(&new_post(feed.id, "undated", None))
            .await
            .unwrap();
        db.insert_post(&new_post(feed.id, "old", Some(100)))
            .await
            .unwrap();
        db.insert_post(&new_post(feed.id, "new", Some(300)))
            .await
            .unwrap();
        db.insert_post(&new_post(feed.id, "mid", Some(200)))
            .await
            .unwrap();

        let titles: Vec<_> = db
            .get_posts_for_user(user.id, 2)
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.title)
            .collect();
        assert_eq!(titles, vec!["Post new", "Post mid"]);

        let all = db.get_posts_for_user(user.id, 10).await.unwrap();
        assert_eq!(all.last().map(|p| p.title.as_str()), Some("Post undated"));
    }
}
