//! `gator <command>` handlers.
//!
//! Handlers write their human-readable output to a caller-supplied writer
//! (stdout in the binary, a buffer in tests). Commands that act on behalf of
//! a user resolve it once through [`require_user`].
use chrono::{TimeZone, Utc};
use clap::Subcommand;
use std::future::Future;
use std::io::Write;
use std::path::PathBuf;
use thiserror::Error;

use crate::config::{Config, ConfigError};
use crate::feed::{FeedFetcher, FetchError};
use crate::scheduler::{parse_interval, IntervalError, Scheduler, SchedulerError};
use crate::storage::{Database, Feed, StoreError, User};
use crate::util::{sanitize_for_terminal, validate_feed_url, UrlValidationError};

/// Number of posts `browse` shows when no limit is given
pub const DEFAULT_BROWSE_LIMIT: i64 = 2;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("{0}")]
    Usage(String),

    #[error("not logged in: run `gator login <name>` or `gator register <name>` first")]
    NotLoggedIn,

    #[error("user {0:?} doesn't exist")]
    UnknownUser(String),

    #[error("user {0:?} already exists")]
    UserExists(String),

    #[error("no feed with URL {0:?}")]
    UnknownFeed(String),

    #[error("a feed with URL {0:?} already exists")]
    FeedExists(String),

    #[error("already following {0:?}")]
    AlreadyFollowing(String),

    #[error("not following {0:?}")]
    NotFollowing(String),

    #[error("invalid feed URL: {0}")]
    InvalidUrl(#[from] UrlValidationError),

    #[error("invalid time between requests: {0}")]
    Interval(#[from] IntervalError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error("failed to write output: {0}")]
    Output(#[from] std::io::Error),
}

// ============================================================================
// Command Line
// ============================================================================

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Create a user and log in as them
    Register { name: String },

    /// Switch the current user
    Login { name: String },

    /// Delete every user, feed, follow and post
    Reset,

    /// List registered users
    Users,

    /// Fetch feeds continuously, one per interval (e.g. 30s, 1m, 1h30m)
    Agg { time_between_reqs: String },

    /// Add a feed and follow it
    Addfeed { name: String, url: String },

    /// List every feed and who added it
    Feeds,

    /// Follow an existing feed by URL
    Follow { url: String },

    /// List the feeds the current user follows
    Following,

    /// Stop following a feed
    Unfollow { url: String },

    /// Show the newest posts from followed feeds
    Browse { limit: Option<i64> },
}

/// State shared by every command.
pub struct Context {
    pub db: Database,
    pub config: Config,
    pub config_path: PathBuf,
}

/// Run one command. `agg` runs until Ctrl-C.
pub async fn run(ctx: &mut Context, command: Command, out: &mut impl Write) -> Result<(), CommandError> {
    tracing::debug!(?command, "Running command");
    match command {
        Command::Register { name } => register(ctx, &name, out).await,
        Command::Login { name } => login(ctx, &name, out).await,
        Command::Reset => reset(ctx, out).await,
        Command::Users => users(ctx, out).await,
        Command::Agg { time_between_reqs } => {
            let shutdown = async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
                    std::future::pending::<()>().await;
                }
            };
            agg(ctx, &time_between_reqs, shutdown, out).await
        }
        Command::Addfeed { name, url } => {
            let user = require_user(ctx).await?;
            add_feed(ctx, &user, &name, &url, out).await
        }
        Command::Feeds => feeds(ctx, out).await,
        Command::Follow { url } => {
            let user = require_user(ctx).await?;
            follow(ctx, &user, &url, out).await
        }
        Command::Following => {
            let user = require_user(ctx).await?;
            following(ctx, &user, out).await
        }
        Command::Unfollow { url } => {
            let user = require_user(ctx).await?;
            unfollow(ctx, &user, &url, out).await
        }
        Command::Browse { limit } => {
            let user = require_user(ctx).await?;
            browse(ctx, &user, limit.unwrap_or(DEFAULT_BROWSE_LIMIT), out).await
        }
    }
}

/// Resolve the user named in the config.
pub async fn require_user(ctx: &Context) -> Result<User, CommandError> {
    let name = ctx
        .config
        .current_user_name
        .as_deref()
        .ok_or(CommandError::NotLoggedIn)?;
    ctx.db
        .get_user(name)
        .await?
        .ok_or_else(|| CommandError::UnknownUser(name.to_string()))
}

fn clean(text: &str) -> std::borrow::Cow<'_, str> {
    sanitize_for_terminal(text)
}

fn validate_name(name: &str) -> Result<&str, CommandError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(CommandError::Usage("name must not be empty".to_string()));
    }
    Ok(name)
}

// ============================================================================
// User Commands
// ============================================================================

pub async fn register(ctx: &mut Context, name: &str, out: &mut impl Write) -> Result<(), CommandError> {
    let name = validate_name(name)?;
    let user = match ctx.db.create_user(name).await {
        Ok(user) => user,
        Err(StoreError::DuplicateKey(_)) => return Err(CommandError::UserExists(name.to_string())),
        Err(e) => return Err(e.into()),
    };
    ctx.config.set_user(&user.name, &ctx.config_path)?;

    tracing::info!(user = %user.name, "Registered user");
    writeln!(out, "User created: {}", clean(&user.name))?;
    Ok(())
}

pub async fn login(ctx: &mut Context, name: &str, out: &mut impl Write) -> Result<(), CommandError> {
    let name = validate_name(name)?;
    let user = ctx
        .db
        .get_user(name)
        .await?
        .ok_or_else(|| CommandError::UnknownUser(name.to_string()))?;
    ctx.config.set_user(&user.name, &ctx.config_path)?;

    writeln!(out, "Logged in as {}", clean(&user.name))?;
    Ok(())
}

pub async fn reset(ctx: &Context, out: &mut impl Write) -> Result<(), CommandError> {
    let removed = ctx.db.delete_users().await?;
    tracing::info!(users = removed, "Database reset");
    writeln!(out, "Reset complete: removed {removed} user(s)")?;
    Ok(())
}

pub async fn users(ctx: &Context, out: &mut impl Write) -> Result<(), CommandError> {
    let current = ctx.config.current_user_name.as_deref();
    for user in ctx.db.get_users().await? {
        if Some(user.name.as_str()) == current {
            writeln!(out, "* {} (current)", clean(&user.name))?;
        } else {
            writeln!(out, "* {}", clean(&user.name))?;
        }
    }
    Ok(())
}

// ============================================================================
// Aggregation
// ============================================================================

/// Parse the interval, then run the scheduler until `shutdown` resolves.
///
/// A bad interval is reported before any network activity.
pub async fn agg<F>(
    ctx: &Context,
    time_between_reqs: &str,
    shutdown: F,
    out: &mut impl Write,
) -> Result<(), CommandError>
where
    F: Future<Output = ()>,
{
    let interval = parse_interval(time_between_reqs)?;
    let fetcher = FeedFetcher::new(&ctx.config.user_agent, ctx.config.request_timeout())?;
    let scheduler = Scheduler::new(ctx.db.clone(), fetcher, interval);

    writeln!(out, "Collecting feeds every {:?}", scheduler.interval())?;
    out.flush()?;

    scheduler.run_until(shutdown).await?;
    Ok(())
}

// ============================================================================
// Feed Commands
// ============================================================================

pub async fn add_feed(
    ctx: &Context,
    user: &User,
    name: &str,
    url: &str,
    out: &mut impl Write,
) -> Result<(), CommandError> {
    let name = validate_name(name)?;
    let url = validate_feed_url(url)?;

    let feed = match ctx.db.create_feed(name, url.as_str(), user.id).await {
        Ok(feed) => feed,
        Err(StoreError::DuplicateKey(_)) => return Err(CommandError::FeedExists(url.to_string())),
        Err(e) => return Err(e.into()),
    };
    ctx.db.create_feed_follow(user.id, feed.id).await?;

    tracing::info!(feed = %feed.name, url = %feed.url, user = %user.name, "Feed added");
    writeln!(out, "Name: {}", clean(&feed.name))?;
    writeln!(out, "URL: {}", clean(&feed.url))?;
    writeln!(out, "Followed by: {}", clean(&user.name))?;
    Ok(())
}

pub async fn feeds(ctx: &Context, out: &mut impl Write) -> Result<(), CommandError> {
    let feeds = ctx.db.get_feeds().await?;
    if feeds.is_empty() {
        writeln!(out, "No feeds yet")?;
        return Ok(());
    }
    for feed in feeds {
        writeln!(out, "Name: {}", clean(&feed.name))?;
        writeln!(out, "URL: {}", clean(&feed.url))?;
        writeln!(out, "Added by: {}", clean(&feed.user_name))?;
        writeln!(out)?;
    }
    Ok(())
}

/// Find a feed by URL as typed, falling back to its normalized form
/// (`https://example.com` is stored as `https://example.com/`).
async fn lookup_feed(db: &Database, url: &str) -> Result<Feed, CommandError> {
    let url = url.trim();
    if let Some(feed) = db.get_feed_by_url(url).await? {
        return Ok(feed);
    }
    if let Ok(parsed) = url::Url::parse(url) {
        if let Some(feed) = db.get_feed_by_url(parsed.as_str()).await? {
            return Ok(feed);
        }
    }
    Err(CommandError::UnknownFeed(url.to_string()))
}

pub async fn follow(
    ctx: &Context,
    user: &User,
    url: &str,
    out: &mut impl Write,
) -> Result<(), CommandError> {
    let feed = lookup_feed(&ctx.db, url).await?;
    let follow = match ctx.db.create_feed_follow(user.id, feed.id).await {
        Ok(follow) => follow,
        Err(StoreError::DuplicateKey(_)) => {
            return Err(CommandError::AlreadyFollowing(feed.name))
        }
        Err(e) => return Err(e.into()),
    };

    writeln!(
        out,
        "{} now follows {}",
        clean(&follow.user_name),
        clean(&follow.feed_name)
    )?;
    Ok(())
}

pub async fn following(ctx: &Context, user: &User, out: &mut impl Write) -> Result<(), CommandError> {
    let follows = ctx.db.get_feed_follows_for_user(user.id).await?;
    if follows.is_empty() {
        writeln!(out, "{} isn't following any feeds", clean(&user.name))?;
        return Ok(());
    }
    for follow in follows {
        writeln!(out, "* {}", clean(&follow.feed_name))?;
    }
    Ok(())
}

pub async fn unfollow(
    ctx: &Context,
    user: &User,
    url: &str,
    out: &mut impl Write,
) -> Result<(), CommandError> {
    let feed = lookup_feed(&ctx.db, url).await?;
    if !ctx.db.delete_feed_follow(user.id, feed.id).await? {
        return Err(CommandError::NotFollowing(feed.name));
    }
    writeln!(out, "Unfollowed {}", clean(&feed.name))?;
    Ok(())
}

// ============================================================================
// Browsing
// ============================================================================

fn format_published(millis: i64) -> String {
    match Utc.timestamp_millis_opt(millis).single() {
        Some(dt) => dt.format("%a, %d %b %Y %H:%M UTC").to_string(),
        None => "unknown".to_string(),
    }
}

pub async fn browse(
    ctx: &Context,
    user: &User,
    limit: i64,
    out: &mut impl Write,
) -> Result<(), CommandError> {
    if limit <= 0 {
        return Err(CommandError::Usage(format!(
            "limit must be a positive number, got {limit}"
        )));
    }

    let posts = ctx.db.get_posts_for_user(user.id, limit).await?;
    if posts.is_empty() {
        writeln!(out, "No posts found")?;
        return Ok(());
    }

    for post in posts {
        writeln!(out)?;
        writeln!(out, "Title: {}", clean(&post.title))?;
        writeln!(out, "URL: {}", clean(&post.url))?;
        if let Some(description) = &post.description {
            writeln!(out, "Description: {}", clean(description))?;
        }
        writeln!(out, "Feed: {}", clean(&post.feed_name))?;
        if let Some(published) = post.published_at {
            writeln!(out, "Published: {}", format_published(published))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::NewPost;
    use pretty_assertions::assert_eq;

    async fn context(name: &str) -> Context {
        let dir = std::env::temp_dir().join(format!("gator_commands_test_{name}"));
        let _ = std::fs::remove_dir_all(&dir);
        Context {
            db: Database::open(":memory:").await.unwrap(),
            config: Config::default(),
            config_path: dir.join("config.toml"),
        }
    }

    fn text(out: Vec<u8>) -> String {
        String::from_utf8(out).unwrap()
    }

    #[tokio::test]
    async fn test_register_sets_current_user() {
        let mut ctx = context("register").await;
        let mut out = Vec::new();

        register(&mut ctx, "kris", &mut out).await.unwrap();

        assert_eq!(text(out), "User created: kris\n");
        assert_eq!(ctx.config.current_user_name.as_deref(), Some("kris"));
        let saved = Config::load(&ctx.config_path).unwrap();
        assert_eq!(saved.current_user_name.as_deref(), Some("kris"));
    }

    #[tokio::test]
    async fn test_register_twice_fails() {
        let mut ctx = context("register_twice").await;
        register(&mut ctx, "kris", &mut Vec::new()).await.unwrap();

        let result = register(&mut ctx, "kris", &mut Vec::new()).await;
        assert!(matches!(result, Err(CommandError::UserExists(_))));
    }

    #[tokio::test]
    async fn test_login_unknown_user_fails() {
        let mut ctx = context("login_unknown").await;
        let result = login(&mut ctx, "ghost", &mut Vec::new()).await;
        assert!(matches!(result, Err(CommandError::UnknownUser(_))));
        assert!(ctx.config.current_user_name.is_none());
    }

    #[tokio::test]
    async fn test_users_marks_current() {
        let mut ctx = context("users").await;
        register(&mut ctx, "alice", &mut Vec::new()).await.unwrap();
        register(&mut ctx, "bob", &mut Vec::new()).await.unwrap();
        login(&mut ctx, "alice", &mut Vec::new()).await.unwrap();

        let mut out = Vec::new();
        users(&ctx, &mut out).await.unwrap();
        assert_eq!(text(out), "* alice (current)\n* bob\n");
    }

    #[tokio::test]
    async fn test_require_user_when_logged_out() {
        let ctx = context("logged_out").await;
        assert!(matches!(
            require_user(&ctx).await,
            Err(CommandError::NotLoggedIn)
        ));
    }

    #[tokio::test]
    async fn test_addfeed_follows_automatically() {
        let mut ctx = context("addfeed").await;
        register(&mut ctx, "kris", &mut Vec::new()).await.unwrap();
        let user = require_user(&ctx).await.unwrap();

        add_feed(
            &ctx,
            &user,
            "Boot.dev",
            "https://blog.boot.dev/index.xml",
            &mut Vec::new(),
        )
        .await
        .unwrap();

        let follows = ctx.db.get_feed_follows_for_user(user.id).await.unwrap();
        assert_eq!(follows.len(), 1);
        assert_eq!(follows[0].feed_name, "Boot.dev");

        let duplicate = add_feed(
            &ctx,
            &user,
            "Again",
            "https://blog.boot.dev/index.xml",
            &mut Vec::new(),
        )
        .await;
        assert!(matches!(duplicate, Err(CommandError::FeedExists(_))));
    }

    #[tokio::test]
    async fn test_addfeed_rejects_private_url() {
        let mut ctx = context("addfeed_private").await;
        register(&mut ctx, "kris", &mut Vec::new()).await.unwrap();
        let user = require_user(&ctx).await.unwrap();

        let result = add_feed(&ctx, &user, "Local", "http://127.0.0.1/rss", &mut Vec::new()).await;
        assert!(matches!(result, Err(CommandError::InvalidUrl(_))));
        assert!(ctx.db.get_feeds().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_follow_and_unfollow() {
        let mut ctx = context("follow").await;
        register(&mut ctx, "alice", &mut Vec::new()).await.unwrap();
        let alice = require_user(&ctx).await.unwrap();
        add_feed(&ctx, &alice, "HN", "https://news.ycombinator.com/rss", &mut Vec::new())
            .await
            .unwrap();

        register(&mut ctx, "bob", &mut Vec::new()).await.unwrap();
        let bob = require_user(&ctx).await.unwrap();

        let mut out = Vec::new();
        follow(&ctx, &bob, "https://news.ycombinator.com/rss", &mut out)
            .await
            .unwrap();
        assert_eq!(text(out), "bob now follows HN\n");

        let again = follow(&ctx, &bob, "https://news.ycombinator.com/rss", &mut Vec::new()).await;
        assert!(matches!(again, Err(CommandError::AlreadyFollowing(_))));

        unfollow(&ctx, &bob, "https://news.ycombinator.com/rss", &mut Vec::new())
            .await
            .unwrap();
        let mut out = Vec::new();
        following(&ctx, &bob, &mut out).await.unwrap();
        assert_eq!(text(out), "bob isn't following any feeds\n");

        let missing = unfollow(&ctx, &bob, "https://news.ycombinator.com/rss", &mut Vec::new()).await;
        assert!(matches!(missing, Err(CommandError::NotFollowing(_))));
    }

    #[tokio::test]
    async fn test_follow_accepts_unnormalized_url() {
        let mut ctx = context("follow_normalized").await;
        register(&mut ctx, "kris", &mut Vec::new()).await.unwrap();
        let user = require_user(&ctx).await.unwrap();
        add_feed(&ctx, &user, "Ex", "https://example.com", &mut Vec::new())
            .await
            .unwrap();
        unfollow(&ctx, &user, "https://example.com", &mut Vec::new())
            .await
            .unwrap();

        follow(&ctx, &user, "https://example.com", &mut Vec::new())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_browse_defaults_and_sanitizes() {
        let mut ctx = context("browse").await;
        register(&mut ctx, "kris", &mut Vec::new()).await.unwrap();
        let user = require_user(&ctx).await.unwrap();
        add_feed(&ctx, &user, "Blog", "https://blog.example.com/rss", &mut Vec::new())
            .await
            .unwrap();
        let feed = ctx
            .db
            .get_feed_by_url("https://blog.example.com/rss")
            .await
            .unwrap()
            .unwrap();

        for (slug, published) in [("old", 1_000), ("new", 3_000), ("mid", 2_000)] {
            ctx.db
                .insert_post(&NewPost {
                    feed_id: feed.id,
                    title: format!("\x1b[31m{slug}\x1b[0m"),
                    url: format!("https://blog.example.com/{slug}"),
                    description: None,
                    published_at: Some(published),
                })
                .await
                .unwrap();
        }

        let mut out = Vec::new();
        browse(&ctx, &user, DEFAULT_BROWSE_LIMIT, &mut out)
            .await
            .unwrap();
        let printed = text(out);

        assert!(!printed.contains('\x1b'));
        let titles: Vec<_> = printed
            .lines()
            .filter_map(|l| l.strip_prefix("Title: "))
            .collect();
        assert_eq!(titles, vec!["new", "mid"]);
    }

    #[tokio::test]
    async fn test_browse_rejects_non_positive_limit() {
        let mut ctx = context("browse_limit").await;
        register(&mut ctx, "kris", &mut Vec::new()).await.unwrap();
        let user = require_user(&ctx).await.unwrap();

        let result = browse(&ctx, &user, 0, &mut Vec::new()).await;
        assert!(matches!(result, Err(CommandError::Usage(_))));
    }

    #[tokio::test]
    async fn test_agg_bad_interval_fails_before_fetching() {
        let ctx = context("agg_bad").await;
        let mut out = Vec::new();

        let result = agg(&ctx, "soon", std::future::ready(()), &mut out).await;
        assert!(matches!(result, Err(CommandError::Interval(_))));
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_reset_removes_everything() {
        let mut ctx = context("reset").await;
        register(&mut ctx, "kris", &mut Vec::new()).await.unwrap();
        let user = require_user(&ctx).await.unwrap();
        add_feed(&ctx, &user, "Blog", "https://blog.example.com/rss", &mut Vec::new())
            .await
            .unwrap();

        let mut out = Vec::new();
        reset(&ctx, &mut out).await.unwrap();
        assert_eq!(text(out), "Reset complete: removed 1 user(s)\n");
        assert!(ctx.db.get_users().await.unwrap().is_empty());
        assert!(ctx.db.get_feeds().await.unwrap().is_empty());
    }
}
