//! Feed retrieval and ingestion.
//!
//! - [`fetcher`] - HTTP GET with size and time limits
//! - [`parser`] - RSS 2.0 document parsing with `rss`
//! - [`ingest`] - Normalizes parsed items and writes them as posts
//!
//! The scheduler drives these in sequence for one claimed feed per tick:
//!
//! ```ignore
//! let doc = fetcher.fetch(&feed.url).await?;
//! let report = ingest_document(&store, &feed, &doc).await;
//! ```

mod fetcher;
mod ingest;
mod parser;

pub use fetcher::{FeedFetcher, FetchError, DEFAULT_TIMEOUT};
pub use ingest::{ingest_document, normalize_item, parse_published, IngestReport};
pub use parser::{parse_document, ParseError, ParsedDocument, ParsedItem};
