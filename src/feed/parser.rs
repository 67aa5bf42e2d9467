use chrono::{DateTime, Utc};
use quick_xml::events::Event;
use quick_xml::Reader;
use serde::Deserialize;
use thiserror::Error;

use crate::util::parse_timestamp;

/// Errors produced while normalizing an Atom document.
///
/// `Xml`, `MissingRoot` and `UnexpectedRoot` reject the whole document.
/// `IncompleteAuthor` only ever rejects a single entry.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Malformed XML: {0}")]
    Xml(String),
    #[error("Document has no root element")]
    MissingRoot,
    #[error("Unexpected root element <{0}>, expected <feed>")]
    UnexpectedRoot(String),
    #[error("Author block is missing <{0}>")]
    IncompleteAuthor(&'static str),
}

/// Canonical feed built from one fetch. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Feed {
    /// Canonical (alternate) link of the site
    pub link: Option<String>,
    /// The feed's own URL, from its `rel="self"` link
    pub feed_url: Option<String>,
    pub title: Option<String>,
    /// Feed-level `<updated>` value, kept verbatim. Becomes the next cutoff.
    pub updated_at: Option<String>,
    pub entries: Vec<Entry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Author {
    pub name: String,
    pub link: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Entry {
    pub title: Option<String>,
    pub link: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub author: Option<Author>,
    /// Category terms in document order, duplicates included
    pub tags: Vec<String>,
    pub summary: Option<String>,
    pub id: Option<String>,
}

/// A parsed feed plus the number of entries dropped for malformed fields.
#[derive(Debug)]
pub struct ParseResult {
    pub feed: Feed,
    pub skipped: usize,
}

// ============================================================================
// Raw document shape
// ============================================================================

#[derive(Debug, Default, Deserialize)]
struct RawFeed {
    #[serde(default)]
    title: Vec<RawText>,
    #[serde(default)]
    link: Vec<RawLink>,
    #[serde(default)]
    updated: Vec<String>,
    #[serde(default)]
    entry: Vec<RawEntry>,
}

#[derive(Debug, Default, Deserialize)]
struct RawEntry {
    #[serde(default)]
    title: Vec<RawText>,
    #[serde(default)]
    link: Vec<RawLink>,
    #[serde(default)]
    published: Vec<String>,
    #[serde(default)]
    author: Vec<RawAuthor>,
    #[serde(default)]
    category: Vec<RawCategory>,
    #[serde(default)]
    summary: Vec<RawText>,
    #[serde(default)]
    id: Vec<String>,
}

/// Text construct (`<title type="html">...</title>`). Attributes are ignored.
///
/// Content may be mixed (`a <i>b</i> c`): only the element's own character
/// data is kept, and inline child elements are dropped.
#[derive(Debug, Default, Deserialize)]
struct RawText {
    #[serde(rename = "$value", default)]
    parts: Vec<TextPart>,
}

#[derive(Debug, Deserialize)]
enum TextPart {
    #[serde(rename = "$text")]
    Text(String),
    #[serde(other)]
    Element,
}

impl RawText {
    /// Direct text nodes joined by single spaces, `None` when blank.
    fn text(&self) -> Option<String> {
        let joined = self
            .parts
            .iter()
            .filter_map(|part| match part {
                TextPart::Text(text) => Some(text.trim()),
                TextPart::Element => None,
            })
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        (!joined.is_empty()).then_some(joined)
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawLink {
    #[serde(rename = "@rel", default)]
    rel: Option<String>,
    #[serde(rename = "@href", default)]
    href: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawAuthor {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    uri: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawCategory {
    #[serde(rename = "@term", default)]
    term: Option<String>,
}

// ============================================================================
// Normalization
// ============================================================================

/// Parses an Atom document into a [`Feed`].
///
/// Entries with a malformed author block are skipped (logged and counted in
/// [`ParseResult::skipped`]); every other field is best-effort and simply
/// absent when missing.
///
/// # Errors
///
/// - [`ParseError::Xml`] - the document is not well-formed
/// - [`ParseError::MissingRoot`] - no root element at all
/// - [`ParseError::UnexpectedRoot`] - the root is not `<feed>` (e.g. RSS)
pub fn parse_feed(text: &str) -> Result<ParseResult, ParseError> {
    // SEC-002: quick-xml never expands <!ENTITY> declarations, so DOCTYPE
    // tricks surface as unescape errors instead of external reads.
    let root = root_element_name(text)?;
    if root != "feed" {
        return Err(ParseError::UnexpectedRoot(root));
    }

    let raw: RawFeed = quick_xml::de::from_str(text).map_err(|e| ParseError::Xml(e.to_string()))?;

    let mut entries = Vec::with_capacity(raw.entry.len());
    let mut skipped = 0;
    for (position, raw_entry) in raw.entry.into_iter().enumerate() {
        match normalize_entry(raw_entry) {
            Ok(entry) => entries.push(entry),
            Err(e) => {
                skipped += 1;
                tracing::warn!(position = position, error = %e, "Skipping malformed feed entry");
            }
        }
    }

    let feed = Feed {
        link: select_link(&raw.link, "alternate", 0),
        feed_url: select_link(&raw.link, "self", 1),
        title: first_text(&raw.title),
        updated_at: raw.updated.into_iter().find(|u| !u.trim().is_empty()),
        entries,
    };

    Ok(ParseResult { feed, skipped })
}

fn normalize_entry(raw: RawEntry) -> Result<Entry, ParseError> {
    let author = match raw.author.into_iter().next() {
        None => None,
        Some(block) => {
            let name = block.name.ok_or(ParseError::IncompleteAuthor("name"))?;
            let link = block.uri.ok_or(ParseError::IncompleteAuthor("uri"))?;
            Some(Author { name, link })
        }
    };

    let published_at = match raw.published.iter().map(|p| p.trim()).find(|p| !p.is_empty()) {
        None => None,
        Some(value) => {
            let parsed = parse_timestamp(value);
            if parsed.is_none() {
                tracing::warn!(published = %value, "Unparsable entry timestamp, treating as absent");
            }
            parsed
        }
    };

    let tags = raw
        .category
        .into_iter()
        .filter_map(|c| c.term)
        .filter(|term| !term.trim().is_empty())
        .collect();

    Ok(Entry {
        title: first_text(&raw.title),
        link: select_link(&raw.link, "alternate", 0),
        published_at,
        author,
        tags,
        summary: raw.summary.iter().find_map(RawText::text),
        id: raw.id.into_iter().next(),
    })
}

/// Picks the href of the first link with relation `rel`, falling back to the
/// link at `fallback` when no link carries that relation.
fn select_link(links: &[RawLink], rel: &str, fallback: usize) -> Option<String> {
    links
        .iter()
        .find(|l| l.rel.as_deref() == Some(rel))
        .or_else(|| links.get(fallback))
        .and_then(|l| l.href.clone())
}

fn first_text(nodes: &[RawText]) -> Option<String> {
    nodes.first().and_then(RawText::text)
}

/// Local name of the first element in the document, e.g. `feed` for both
/// `<feed>` and `<atom:feed>`.
fn root_element_name(text: &str) -> Result<String, ParseError> {
    let mut reader = Reader::from_str(text);
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                return Ok(String::from_utf8_lossy(e.local_name().as_ref()).into_owned());
            }
            Ok(Event::Eof) => return Err(ParseError::MissingRoot),
            Err(e) => return Err(ParseError::Xml(e.to_string())),
            _ => {}
        }
    }
}
