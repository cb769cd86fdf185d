use rss::Channel;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("invalid RSS document: {0}")]
    Rss(#[from] rss::Error),
}

/// Channel metadata plus the items of one RSS document, in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedDocument {
    pub title: String,
    pub link: String,
    pub description: String,
    pub items: Vec<ParsedItem>,
}

/// One `<item>` as it appeared in the feed.
///
/// `pub_date` is the raw string; normalization happens at ingestion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedItem {
    pub title: String,
    pub link: String,
    pub description: String,
    pub pub_date: String,
}

/// Parse an RSS 2.0 document (`<rss><channel><item>...`).
///
/// Text fields come back XML-unescaped from the reader and are then
/// HTML-entity decoded, which undoes feeds that double-encode
/// (`&amp;amp;` becomes `&`).
///
/// # Errors
///
/// Fails on malformed XML and on documents that are not RSS.
pub fn parse_document(bytes: &[u8]) -> Result<ParsedDocument, ParseError> {
    let channel = Channel::read_from(bytes)?;
    Ok(ParsedDocument::from(channel))
}

impl From<Channel> for ParsedDocument {
    fn from(channel: Channel) -> Self {
        let items = channel
            .items()
            .iter()
            .map(|item| ParsedItem {
                title: decode_entities(item.title().unwrap_or_default()),
                link: decode_entities(item.link().unwrap_or_default()),
                description: decode_entities(item.description().unwrap_or_default()),
                pub_date: item.pub_date().unwrap_or_default().to_string(),
            })
            .collect();

        ParsedDocument {
            title: decode_entities(channel.title()),
            link: decode_entities(channel.link()),
            description: decode_entities(channel.description()),
            items,
        }
    }
}

/// Longest `&name;` sequence considered an entity candidate.
const MAX_ENTITY_LEN: usize = 32;

/// Decode HTML entities left over after XML unescaping.
///
/// Each `&...;` sequence is decoded on its own. An `&` that does not start a
/// known entity is kept literally, so "Q&A" and "AT&T" survive alongside
/// decoded entities.
fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];

        let end = tail[1..]
            .char_indices()
            .take(MAX_ENTITY_LEN)
            .find(|&(_, c)| c == ';' || c == '&' || c.is_whitespace())
            .filter(|&(_, c)| c == ';')
            .map(|(i, _)| i + 2);

        match end.and_then(|end| htmlescape::decode_html(&tail[..end]).ok().map(|d| (d, end))) {
            Some((decoded, end)) => {
                out.push_str(&decoded);
                rest = &tail[end..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}
