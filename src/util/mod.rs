//! Input validation and output hygiene shared by the commands.
//!
//! - **Feed URL validation**: `addfeed` only accepts public http(s) URLs
//! - **Terminal sanitizing**: feed-supplied text is printed without escape sequences

mod feed_url;
mod terminal;

pub use feed_url::{validate_feed_url, UrlValidationError};
pub use terminal::sanitize_for_terminal;
