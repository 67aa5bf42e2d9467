use chrono::{DateTime, Utc};

use super::parser::Entry;
use crate::util::parse_timestamp;

/// Returns the entries published strictly after the subscription's cutoff,
/// in their original order.
///
/// An absent or unparsable cutoff is replaced by `now`. On a subscription's
/// first cycle that suppresses every existing entry instead of notifying the
/// whole backlog. Entries without a publish date never qualify.
pub fn new_since(cutoff: Option<&str>, entries: Vec<Entry>, now: DateTime<Utc>) -> Vec<Entry> {
    let cutoff = cutoff.and_then(parse_timestamp).unwrap_or(now);

    entries
        .into_iter()
        .filter(|entry| entry.published_at.is_some_and(|published| published > cutoff))
        .collect()
}

/// Decides what to store as the next cutoff after a successful fetch.
///
/// Returns `None` when the feed reported no `<updated>` value, or when the
/// reported value would move a parsable cutoff backwards (or not at all).
pub fn next_cutoff<'a>(current: Option<&str>, reported: Option<&'a str>) -> Option<&'a str> {
    let reported = reported.filter(|r| !r.trim().is_empty())?;

    match (current.and_then(parse_timestamp), parse_timestamp(reported)) {
        (Some(current), Some(candidate)) if candidate <= current => None,
        _ => Some(reported),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn entry_at(title: &str, published: Option<&str>) -> Entry {
        Entry {
            title: Some(title.to_string()),
            published_at: published.and_then(parse_timestamp),
            ..Default::default()
        }
    }

    fn titles(entries: &[Entry]) -> Vec<&str> {
        entries.iter().filter_map(|e| e.title.as_deref()).collect()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_only_entries_after_cutoff() {
        let entries = vec![
            entry_at("old", Some("2023-12-31T23:59:59Z")),
            entry_at("new", Some("2024-01-02T00:00:00Z")),
        ];
        let fresh = new_since(Some("2024-01-01T00:00:00Z"), entries, now());
        assert_eq!(titles(&fresh), vec!["new"]);
    }

    #[test]
    fn test_equal_timestamp_excluded() {
        let entries = vec![entry_at("same", Some("2024-01-01T00:00:00Z"))];
        assert!(new_since(Some("2024-01-01T00:00:00Z"), entries, now()).is_empty());
    }

    #[test]
    fn test_missing_or_invalid_cutoff_uses_now() {
        let entries = || {
            vec![
                entry_at("past", Some("2020-01-01T00:00:00Z")),
                entry_at("recent", Some("2024-06-01T11:59:59Z")),
            ]
        };
        assert!(new_since(None, entries(), now()).is_empty());
        assert!(new_since(Some("not a date"), entries(), now()).is_empty());
        assert!(new_since(Some(""), entries(), now()).is_empty());
    }

    #[test]
    fn test_entries_after_now_survive_missing_cutoff() {
        let entries = vec![entry_at("scheduled", Some("2024-06-02T00:00:00Z"))];
        assert_eq!(titles(&new_since(None, entries, now())), vec!["scheduled"]);
    }

    #[test]
    fn test_undated_entries_never_new() {
        let entries = vec![
            entry_at("undated", None),
            entry_at("dated", Some("2024-01-05T00:00:00Z")),
        ];
        let fresh = new_since(Some("2024-01-01T00:00:00Z"), entries, now());
        assert_eq!(titles(&fresh), vec!["dated"]);
    }

    #[test]
    fn test_order_preserved() {
        let entries = vec![
            entry_at("b", Some("2024-01-03T00:00:00Z")),
            entry_at("a", Some("2024-01-02T00:00:00Z")),
            entry_at("c", Some("2024-01-04T00:00:00Z")),
        ];
        let fresh = new_since(Some("2024-01-01T00:00:00Z"), entries, now());
        assert_eq!(titles(&fresh), vec!["b", "a", "c"]);
    }

    #[test]
    fn test_next_cutoff_advances() {
        assert_eq!(
            next_cutoff(Some("2024-01-01T00:00:00Z"), Some("2024-01-03T00:00:00Z")),
            Some("2024-01-03T00:00:00Z")
        );
        assert_eq!(next_cutoff(None, Some("2024-01-03T00:00:00Z")), Some("2024-01-03T00:00:00Z"));
        assert_eq!(next_cutoff(Some("garbage"), Some("2024-01-03T00:00:00Z")), Some("2024-01-03T00:00:00Z"));
    }

    #[test]
    fn test_next_cutoff_never_moves_backwards() {
        assert_eq!(next_cutoff(Some("2024-01-03T00:00:00Z"), Some("2024-01-01T00:00:00Z")), None);
        assert_eq!(next_cutoff(Some("2024-01-03T00:00:00Z"), Some("2024-01-03T00:00:00Z")), None);
    }

    #[test]
    fn test_next_cutoff_requires_reported_value() {
        assert_eq!(next_cutoff(Some("2024-01-03T00:00:00Z"), None), None);
        assert_eq!(next_cutoff(None, Some("  ")), None);
    }

    proptest! {
        #[test]
        fn prop_no_entry_at_or_before_cutoff(
            cutoff_secs in 0i64..4_000_000_000,
            offsets in proptest::collection::vec(-100_000i64..100_000, 0..40),
        ) {
            let cutoff = Utc.timestamp_opt(cutoff_secs, 0).unwrap();
            let entries: Vec<Entry> = offsets
                .iter()
                .map(|off| Entry {
                    published_at: Some(cutoff + chrono::Duration::seconds(*off)),
                    ..Default::default()
                })
                .collect();
            let expected = offsets.iter().filter(|off| **off > 0).count();

            let fresh = new_since(Some(&cutoff.to_rfc3339()), entries, now());
            prop_assert_eq!(fresh.len(), expected);
            prop_assert!(fresh.iter().all(|e| e.published_at.unwrap() > cutoff));
        }
    }
}
