//! gator: a command-line RSS aggregator.
//!
//! Users register, add and follow feeds, and `gator agg` keeps fetching the
//! least recently fetched feed at a fixed interval, storing new posts in a
//! shared SQLite database.
//!
//! - [`storage`] - SQLite persistence and the [`storage::FeedStore`] trait
//! - [`feed`] - Fetching, RSS parsing and ingestion
//! - [`scheduler`] - The aggregation loop
//! - [`commands`] - CLI subcommand handlers
//! - [`config`] - `~/.config/gator/config.toml`

pub mod commands;
pub mod config;
pub mod feed;
pub mod scheduler;
pub mod storage;
pub mod util;
