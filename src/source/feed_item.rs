//! The data types a feed source hands to the poll loop.
//!
//! A [`FeedSnapshot`] is produced once per cycle, consumed immediately by the
//! poller and then dropped.  Nothing here is persisted.
//!
//! ## Timestamps
//!
//! Feeds in the wild are loose about date formats.  [`parse_timestamp`] is the
//! single place that decides what counts as a readable point in time; anything
//! it rejects is treated as "unknown" and can never trigger a notification.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

/// A single feed entry as the relay sees it.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct FeedItem {
    /// Headline, untrimmed, exactly as the feed delivered it.
    pub title: String,

    /// URL to the full content, if the feed provided one.
    pub link: Option<String>,

    /// Publication timestamp.
    ///
    /// `None` when the feed omitted the date or it could not be parsed.
    pub published: Option<DateTime<Utc>>,
}

/// One fetch worth of feed data.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct FeedSnapshot {
    /// When the feed as a whole was last rebuilt.  This is the candidate
    /// high-water mark for the cycle.
    pub build_date: Option<DateTime<Utc>>,

    /// Entries in the order the feed lists them.
    pub items: Vec<FeedItem>,
}

/// Parse a feed or configuration timestamp into UTC.
///
/// Accepted, in order: RFC 2822 (what RSS uses), RFC 3339, and the naive
/// forms `YYYY-MM-DD HH:MM:SS`, `YYYY-MM-DDTHH:MM:SS` and `YYYY-MM-DD`, which
/// are read as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
