use chrono::{DateTime, Utc};
use secrecy::SecretString;
use thiserror::Error;

use crate::util::parse_timestamp;

// ============================================================================
// Error Types
// ============================================================================

/// Persistence errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

// ============================================================================
// Data Structures
// ============================================================================

/// A registered feed subscription.
///
/// `callback_url` is a webhook URL that usually embeds an access token, so it
/// is kept secret and redacted from `Debug` output.
#[derive(Debug)]
pub struct Subscription {
    pub id: i64,
    pub url: String,
    pub callback_url: SecretString,
    pub is_active: bool,
    /// Cutoff: the feed's `<updated>` value as of the last successful sync
    pub feed_updated_at: Option<String>,
}

/// A persisted feed entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub id: i64,
    pub subscription_id: i64,
    pub title: Option<String>,
    pub url: Option<String>,
    pub published: Option<DateTime<Utc>>,
    /// The entry summary
    pub content: Option<String>,
    /// Distinct tag names, in first-seen order. An entry tagged
    /// `[rust, async, rust]` stores and notifies `[rust, async]`: an item is
    /// linked to each tag row at most once.
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Tag {
    pub id: i64,
    pub name: String,
}

// ============================================================================
// Helper Types
// ============================================================================

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct SubscriptionRow {
    pub id: i64,
    pub url: String,
    pub callback_url: String,
    pub is_active: bool,
    pub feed_updated_at: Option<String>,
}

impl SubscriptionRow {
    pub(crate) fn into_subscription(self) -> Subscription {
        Subscription {
            id: self.id,
            url: self.url,
            callback_url: SecretString::from(self.callback_url),
            is_active: self.is_active,
            feed_updated_at: self.feed_updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ItemRow {
    pub id: i64,
    pub subscription_id: i64,
    pub title: Option<String>,
    pub url: Option<String>,
    pub published: Option<String>,
    pub content: Option<String>,
}

impl ItemRow {
    pub(crate) fn into_item(self, tags: Vec<String>) -> Item {
        Item {
            id: self.id,
            subscription_id: self.subscription_id,
            title: self.title,
            url: self.url,
            published: self.published.as_deref().and_then(parse_timestamp),
            content: self.content,
            tags,
        }
    }
}
