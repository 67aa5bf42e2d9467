//! Per-item webhook notifications.
//!
//! Each new item becomes one chat message POSTed to the subscription's
//! callback as `{"Content": "<message>"}`. The `/md ` prefix asks the
//! receiving chat service to render the message as markdown.

use futures::future::join_all;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use thiserror::Error;

use crate::storage::Item;

/// Protocol marker telling the callback to render markdown
pub const MARKDOWN_MARKER: &str = "/md ";

const COMMENT_PREFIX: &str = "Comment by";
const ANSWER_PREFIX: &str = "Answer by";

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Callback returned status {0}")]
    HttpStatus(u16),
}

#[derive(Serialize)]
struct Payload<'a> {
    #[serde(rename = "Content")]
    content: &'a str,
}

/// Outcome of notifying one subscription's new items.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Renders the chat message for one item.
///
/// Comments and answers get a single icon-prefixed link; anything else gets
/// the link followed by its tags in a code span. Tags are the item's stored
/// distinct tags, so a term repeated in the entry is listed once.
pub fn format_message(item: &Item) -> String {
    let title = item.title.as_deref().unwrap_or_default();
    let link = format!("[{}]({})", title, item.url.as_deref().unwrap_or_default());

    let payload = if title.starts_with(COMMENT_PREFIX) {
        format!("💬 {link}")
    } else if title.starts_with(ANSWER_PREFIX) {
        format!("🏆 {link}")
    } else {
        let tags: String = item.tags.iter().map(|t| format!("[{t}] ")).collect();
        format!("{link}\r\n`{tags}`")
    };

    format!("{MARKDOWN_MARKER}{payload}")
}

/// Sends one notification per item to `callback_url`, all concurrently.
///
/// Returns once every send has finished. A failed send is logged and counted
/// but never cancels or fails the others, and nothing is retried.
pub async fn dispatch(
    client: &reqwest::Client,
    callback_url: &SecretString,
    items: &[Item],
) -> DispatchReport {
    if items.is_empty() {
        return DispatchReport::default();
    }

    let url = callback_url.expose_secret();
    let sends = items.iter().map(|item| async move {
        let message = format_message(item);
        let result = send_one(client, url, &message).await;
        if let Err(e) = &result {
            tracing::warn!(
                item_id = item.id,
                subscription_id = item.subscription_id,
                error = %e,
                "Notification failed"
            );
        }
        result.is_ok()
    });

    let outcomes = join_all(sends).await;
    let delivered = outcomes.iter().filter(|ok| **ok).count();

    DispatchReport {
        delivered,
        failed: outcomes.len() - delivered,
    }
}

async fn send_one(
    client: &reqwest::Client,
    url: &str,
    message: &str,
) -> Result<(), NotificationError> {
    let response = client
        .post(url)
        .json(&Payload { content: message })
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        return Err(NotificationError::HttpStatus(status.as_u16()));
    }
    Ok(())
}
