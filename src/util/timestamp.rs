use chrono::{DateTime, Utc};

/// Parses a feed or cutoff timestamp into an absolute instant.
///
/// Accepts RFC 3339 (Atom), RFC 2822 (RSS-style dates some Atom producers
/// still emit), and `YYYY-MM-DD HH:MM:SS±HH:MM`. Strings without an explicit
/// offset are rejected rather than guessed. Empty input yields `None`.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_rfc2822(raw))
        .or_else(|_| DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%:z"))
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
