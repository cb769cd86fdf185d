mod feeds;
mod follows;
mod posts;
mod schema;
mod store;
mod types;
mod users;

pub use schema::Database;
pub use store::FeedStore;
pub use types::{
    DatabaseError, Feed, FeedFollow, FeedWithOwner, NewPost, Post, PostWithFeed, StoreError, User,
};
