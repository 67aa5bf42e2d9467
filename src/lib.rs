//! Feed synchronization pipeline.
//!
//! Polls the Atom feeds of active subscriptions, stores entries published
//! since each subscription's cutoff, and posts one notification per new item
//! to the subscription's callback URL.
//!
//! - [`feed`] - fetching, parsing, and delta filtering
//! - [`storage`] - SQLite persistence for subscriptions, items, and tags
//! - [`notify`] - message formatting and webhook dispatch
//! - [`sync`] - the per-run orchestrator

pub mod config;
pub mod feed;
pub mod notify;
pub mod storage;
pub mod sync;
pub mod util;
