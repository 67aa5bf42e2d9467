//! Feed retrieval and normalization.
//!
//! - [`fetcher`] - single-attempt HTTP retrieval with a body size limit
//! - [`parser`] - Atom XML into the canonical [`Feed`] / [`Entry`] model
//! - [`delta`] - which entries are new relative to a subscription's cutoff
//!
//! # Example
//!
//! ```ignore
//! use feedsync::feed::{fetch_feed, parse_feed, new_since};
//!
//! let body = fetch_feed(&client, &subscription.url).await?;
//! let parsed = parse_feed(&body)?;
//! let fresh = new_since(subscription.feed_updated_at.as_deref(), parsed.feed.entries, Utc::now());
//! ```

mod delta;
mod fetcher;
mod parser;

pub use delta::{new_since, next_cutoff};
pub use fetcher::{fetch_feed, FetchError};
pub use parser::{parse_feed, Author, Entry, Feed, ParseError, ParseResult};
