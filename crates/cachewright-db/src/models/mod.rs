//! Database models for persistent storage.

mod activity;
mod listing;

pub use activity::*;
pub use listing::*;

use chrono::{DateTime, Utc};

/// Timestamps are stored as microseconds since the epoch.
pub(crate) fn to_micros(at: DateTime<Utc>) -> i64 {
    at.timestamp_micros()
}

pub(crate) fn from_micros(micros: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_micros(micros).unwrap_or_default()
}

/// Composite key of a row owned by a cache, e.g. `"17:EN"`.
pub(crate) fn cache_scoped_key(cache: u64, part: &str) -> String {
    format!("{}:{}", cache, part)
}

/// Composite key of a (user, cache) pair.
pub(crate) fn pair_key(user: u64, cache: u64) -> String {
    format!("{}:{}", user, cache)
}
