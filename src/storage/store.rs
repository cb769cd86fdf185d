use async_trait::async_trait;

use super::schema::Database;
use super::types::{now_millis, Feed, NewPost, Post, StoreError};

/// The storage operations the fetch scheduler depends on.
///
/// `claim_next_feed` must select and stamp the feed in one atomic step;
/// implementations backed by a shared database rely on that to keep
/// concurrent aggregators from double-claiming within one interval.
#[async_trait]
pub trait FeedStore: Send + Sync {
    /// Claim the least recently fetched feed, stamping it with the current time.
    ///
    /// Returns `StoreError::NotFound` when the store has no feeds.
    async fn claim_next_feed(&self) -> Result<Feed, StoreError>;

    /// Record that a fetch of `feed_id` completed now.
    async fn mark_fetched(&self, feed_id: i64) -> Result<(), StoreError>;

    /// Insert one post. A URL that already exists yields `StoreError::DuplicateKey`.
    async fn insert_post(&self, post: &NewPost) -> Result<Post, StoreError>;
}

#[async_trait]
impl FeedStore for Database {
    async fn claim_next_feed(&self) -> Result<Feed, StoreError> {
        self.claim_next_feed_at(now_millis()).await
    }

    async fn mark_fetched(&self, feed_id: i64) -> Result<(), StoreError> {
        self.mark_feed_fetched_at(feed_id, now_millis()).await
    }

    async fn insert_post(&self, post: &NewPost) -> Result<Post, StoreError> {
        Database::insert_post(self, post).await
    }
}

#[cfg(test)]
mod tests {
    use super::FeedStore;
    use crate::storage::{Database, StoreError};

    #[tokio::test]
    async fn test_claim_rotates_through_feeds() {
        let db = Database::open(":memory:").await.unwrap();
        let user = db.create_user("kris").await.unwrap();
        let a = db
            .create_feed("A", "https://a.example.com/rss", user.id)
            .await
            .unwrap();
        let b = db
            .create_feed("B", "https://b.example.com/rss", user.id)
            .await
            .unwrap();

        let store: &dyn FeedStore = &db;
        let first = store.claim_next_feed().await.unwrap();
        let second = store.claim_next_feed().await.unwrap();

        assert_eq!(first.id, a.id);
        assert_eq!(second.id, b.id);
        assert!(first.last_fetched_at.is_some());
    }

    #[tokio::test]
    async fn test_claim_with_no_feeds() {
        let db = Database::open(":memory:").await.unwrap();
        let result = FeedStore::claim_next_feed(&db).await;
        assert!(matches!(result, Err(StoreError::NotFound)));
    }
}
