use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone};

use crate::feed::parser::{ParsedDocument, ParsedItem};
use crate::storage::{Feed, FeedStore, NewPost, StoreError};

/// Counts produced by one ingestion pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IngestReport {
    /// New rows written
    pub inserted: usize,
    /// Items whose URL was already stored
    pub skipped: usize,
    /// Items rejected (no link) or that failed to insert
    pub failed: usize,
}

impl IngestReport {
    pub fn total(&self) -> usize {
        self.inserted + self.skipped + self.failed
    }
}

// ============================================================================
// Publish Date Normalization
// ============================================================================

type DateParser = fn(&str) -> Option<DateTime<FixedOffset>>;

/// Tried in order; the first match wins.
const DATE_PARSERS: [(&str, DateParser); 4] = [
    ("rfc1123z", parse_rfc1123z),
    ("rfc1123", parse_rfc1123_named_zone),
    ("rfc2822", parse_rfc2822),
    ("rfc3339", parse_rfc3339),
];

/// `Mon, 02 Jan 2006 15:04:05 -0700`
fn parse_rfc1123z(s: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_str(s, "%a, %d %b %Y %H:%M:%S %z").ok()
}

/// `Mon, 02 Jan 2006 15:04:05 MST`
///
/// North American zone abbreviations resolve to their offsets; any other
/// alphabetic zone is read as UTC.
fn parse_rfc1123_named_zone(s: &str) -> Option<DateTime<FixedOffset>> {
    let (stamp, zone) = s.rsplit_once(' ')?;
    if zone.is_empty() || !zone.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    let naive = NaiveDateTime::parse_from_str(stamp, "%a, %d %b %Y %H:%M:%S").ok()?;
    let hours = match zone.to_ascii_uppercase().as_str() {
        "EST" => -5,
        "EDT" => -4,
        "CST" => -6,
        "CDT" => -5,
        "MST" => -7,
        "MDT" => -6,
        "PST" => -8,
        "PDT" => -7,
        _ => 0,
    };
    let offset = FixedOffset::east_opt(hours * 3600)?;
    offset.from_local_datetime(&naive).single()
}

fn parse_rfc2822(s: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc2822(s).ok()
}

fn parse_rfc3339(s: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(s).ok()
}

/// Normalize a raw `<pubDate>` to Unix epoch milliseconds.
///
/// Returns `None` when no known layout matches; the post is stored
/// without a publish date.
pub fn parse_published(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    for (name, parse) in DATE_PARSERS {
        if let Some(dt) = parse(raw) {
            tracing::trace!(layout = name, "Publish date parsed");
            return Some(dt.timestamp_millis());
        }
    }
    tracing::debug!(raw = %raw, "Unrecognized publish date");
    None
}

// ============================================================================
// Ingestion
// ============================================================================

/// Turn a parsed item into an insertable post.
///
/// Items without a link have nothing to key on and are rejected.
pub fn normalize_item(feed_id: i64, item: &ParsedItem) -> Option<NewPost> {
    let url = item.link.trim();
    if url.is_empty() {
        return None;
    }

    let description = (!item.description.trim().is_empty()).then(|| item.description.clone());

    Some(NewPost {
        feed_id,
        title: item.title.clone(),
        url: url.to_string(),
        description,
        published_at: parse_published(&item.pub_date),
    })
}

/// Store every item of `doc` as a post of `feed`, in document order.
///
/// A duplicate URL is a normal outcome of re-fetching and is skipped quietly.
/// Any other per-item failure is logged and counted; it never stops the
/// remaining items from being stored.
pub async fn ingest_document<S>(store: &S, feed: &Feed, doc: &ParsedDocument) -> IngestReport
where
    S: FeedStore + ?Sized,
{
    let mut report = IngestReport::default();

    for item in &doc.items {
        let Some(post) = normalize_item(feed.id, item) else {
            tracing::warn!(feed = %feed.name, title = %item.title, "Skipping item without link");
            report.failed += 1;
            continue;
        };

        match store.insert_post(&post).await {
            Ok(_) => report.inserted += 1,
            Err(StoreError::DuplicateKey(_)) => {
                tracing::debug!(url = %post.url, "Post already stored");
                report.skipped += 1;
            }
            Err(e) => {
                tracing::warn!(
                    feed = %feed.name,
                    title = %post.title,
                    error = %e,
                    "Failed to save post"
                );
                report.failed += 1;
            }
        }
    }

    report
}
