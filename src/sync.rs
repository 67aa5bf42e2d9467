//! One synchronization run over every active subscription.
//!
//! Subscriptions are processed strictly one after another. For each one the
//! pipeline is fetch → parse → filter → advance cutoff → persist → notify.
//! A failure in any step abandons only that subscription for this run.

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use std::fmt;
use thiserror::Error;

use crate::feed::{
    fetch_feed, new_since, next_cutoff, parse_feed, FetchError, ParseError, ParseResult,
};
use crate::notify::{self, DispatchReport};
use crate::storage::{Database, DatabaseError, Subscription};
use crate::util::parse_timestamp;

/// Fatal errors that end a run before any subscription is processed.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Failed to list active subscriptions: {0}")]
    ListSubscriptions(#[source] DatabaseError),
}

/// Errors that abandon a single subscription for the current run.
#[derive(Debug, Error)]
pub enum SubscriptionError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Persistence(#[from] DatabaseError),
}

impl SubscriptionError {
    /// Pipeline step the error came from, for log context.
    pub fn step(&self) -> &'static str {
        match self {
            SubscriptionError::Fetch(_) => "fetch",
            SubscriptionError::Parse(_) => "parse",
            SubscriptionError::Persistence(_) => "persist",
        }
    }
}

/// What one successfully synced subscription contributed to the run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FeedTally {
    pub items_seen: usize,
    pub new_items: usize,
    pub notifications: DispatchReport,
}

/// Totals for one run. Displays as `"<feeds> feeds, <items> items, <new> new."`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncSummary {
    pub feeds_checked: usize,
    pub items_seen: usize,
    pub new_items: usize,
}

impl SyncSummary {
    fn absorb(self, tally: FeedTally) -> Self {
        Self {
            feeds_checked: self.feeds_checked + 1,
            items_seen: self.items_seen + tally.items_seen,
            new_items: self.new_items + tally.new_items,
        }
    }
}

impl fmt::Display for SyncSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} feeds, {} items, {} new.",
            self.feeds_checked, self.items_seen, self.new_items
        )
    }
}

/// Runs one sync cycle over all active subscriptions.
///
/// # Errors
///
/// Only [`SyncError::ListSubscriptions`]; per-subscription failures are
/// logged and excluded from the summary.
pub async fn run_sync(db: &Database, client: &reqwest::Client) -> Result<SyncSummary, SyncError> {
    run_sync_at(db, client, Utc::now()).await
}

/// [`run_sync`] with an explicit "now", used as the cutoff for subscriptions
/// that have never synced.
pub async fn run_sync_at(
    db: &Database,
    client: &reqwest::Client,
    now: DateTime<Utc>,
) -> Result<SyncSummary, SyncError> {
    let subscriptions = db
        .list_active_subscriptions()
        .await
        .map_err(SyncError::ListSubscriptions)?;

    let total = subscriptions.len();
    tracing::info!(subscriptions = total, "Sync run started");

    // `then` drives one subscription at a time: tag rows and the connection
    // pool are never written by two subscriptions at once.
    let summary = stream::iter(subscriptions)
        .then(|subscription| async move {
            let result = sync_subscription(db, client, &subscription, now).await;
            if let Err(e) = &result {
                tracing::warn!(
                    subscription_id = subscription.id,
                    url = %subscription.url,
                    step = e.step(),
                    error = %e,
                    "Subscription sync failed"
                );
            }
            result.ok()
        })
        .fold(SyncSummary::default(), |summary, tally| async move {
            match tally {
                Some(tally) => summary.absorb(tally),
                None => summary,
            }
        })
        .await;

    tracing::info!(
        subscriptions = total,
        failed = total - summary.feeds_checked,
        feeds = summary.feeds_checked,
        items = summary.items_seen,
        new = summary.new_items,
        "Sync run completed"
    );
    Ok(summary)
}

/// Runs the full pipeline for one subscription.
///
/// The cutoff is advanced as soon as the feed has been fetched, parsed, and
/// filtered, before any item is stored.
pub async fn sync_subscription(
    db: &Database,
    client: &reqwest::Client,
    subscription: &Subscription,
    now: DateTime<Utc>,
) -> Result<FeedTally, SubscriptionError> {
    let body = fetch_feed(client, &subscription.url).await?;

    let ParseResult { feed, skipped } = parse_feed(&body)?;
    if skipped > 0 {
        tracing::warn!(
            subscription_id = subscription.id,
            skipped = skipped,
            "Malformed entries skipped"
        );
    }

    let items_seen = feed.entries.len();
    let cutoff = subscription.feed_updated_at.as_deref();
    if let Some(stored) = cutoff.filter(|c| parse_timestamp(c).is_none()) {
        // Falls back to `now`: every entry already in the feed is treated as seen
        tracing::warn!(
            subscription_id = subscription.id,
            cutoff = %stored,
            "Stored cutoff is not a valid timestamp, using the current time"
        );
    }
    let fresh = new_since(cutoff, feed.entries, now);

    if let Some(next) = next_cutoff(cutoff, feed.updated_at.as_deref()) {
        db.advance_feed_updated_at(subscription.id, next).await?;
    }

    let items = db.persist_entries(subscription.id, &fresh).await;
    if items.len() < fresh.len() {
        tracing::warn!(
            subscription_id = subscription.id,
            expected = fresh.len(),
            persisted = items.len(),
            "Some new entries were not persisted"
        );
    }

    let notifications = notify::dispatch(client, &subscription.callback_url, &items).await;

    tracing::debug!(
        subscription_id = subscription.id,
        items = items_seen,
        new = items.len(),
        delivered = notifications.delivered,
        failed = notifications.failed,
        "Subscription synced"
    );

    Ok(FeedTally {
        items_seen,
        new_items: items.len(),
        notifications,
    })
}
