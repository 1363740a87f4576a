//! Log entries: visits, comments and status changes recorded against a cache

use crate::cache::CacheStatus;
use crate::error::{Error, Result};
use crate::identity::{CacheId, LogId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogType {
    FoundIt,
    DidNotFindIt,
    Comment,
    WillAttend,
    Attended,
    TemporarilyUnavailable,
    ReadyToSearch,
    Archived,
    NeedsMaintenance,
    MaintenancePerformed,
}

impl LogType {
    pub const ALL: [LogType; 10] = [
        LogType::FoundIt,
        LogType::DidNotFindIt,
        LogType::Comment,
        LogType::WillAttend,
        LogType::Attended,
        LogType::TemporarilyUnavailable,
        LogType::ReadyToSearch,
        LogType::Archived,
        LogType::NeedsMaintenance,
        LogType::MaintenancePerformed,
    ];

    /// External name, as submitted by clients
    pub fn name(&self) -> &'static str {
        match self {
            LogType::FoundIt => "Found it",
            LogType::DidNotFindIt => "Didn't find it",
            LogType::Comment => "Comment",
            LogType::WillAttend => "Will attend",
            LogType::Attended => "Attended",
            LogType::TemporarilyUnavailable => "Temporarily unavailable",
            LogType::ReadyToSearch => "Ready to search",
            LogType::Archived => "Archived",
            LogType::NeedsMaintenance => "Needs maintenance",
            LogType::MaintenancePerformed => "Maintenance performed",
        }
    }

    /// Parse an external name; unknown names are an invalid `logtype`
    pub fn parse(name: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.name() == name)
            .ok_or_else(|| {
                Error::invalid_because("logtype", format!("'{}' is not a valid log type", name))
            })
    }

    /// Stable numeric code used for storage
    pub fn code(&self) -> u8 {
        match self {
            LogType::FoundIt => 1,
            LogType::DidNotFindIt => 2,
            LogType::Comment => 3,
            LogType::NeedsMaintenance => 5,
            LogType::MaintenancePerformed => 6,
            LogType::Attended => 7,
            LogType::WillAttend => 8,
            LogType::Archived => 9,
            LogType::ReadyToSearch => 10,
            LogType::TemporarilyUnavailable => 11,
        }
    }

    /// Inverse of [`LogType::code`]
    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.code() == code)
    }

    /// Counts as a find for statistics (Found it, Attended)
    pub fn is_find(&self) -> bool {
        matches!(self, LogType::FoundIt | LogType::Attended)
    }

    /// Counts as a not-found for cache statistics (Didn't find it, Will attend)
    pub fn is_not_found(&self) -> bool {
        matches!(self, LogType::DidNotFindIt | LogType::WillAttend)
    }

    /// Types that only make sense on event caches
    pub fn is_event_only(&self) -> bool {
        matches!(self, LogType::WillAttend | LogType::Attended)
    }

    /// Types that never make sense on event caches
    pub fn is_search_only(&self) -> bool {
        matches!(self, LogType::FoundIt | LogType::DidNotFindIt)
    }

    /// Types subject to duplicate-find suppression
    pub fn is_visit(&self) -> bool {
        self.is_find() || self.is_not_found()
    }

    /// Availability change carried by this type, if any
    pub fn status_effect(&self) -> Option<CacheStatus> {
        match self {
            LogType::ReadyToSearch => Some(CacheStatus::Available),
            LogType::TemporarilyUnavailable => Some(CacheStatus::TemporarilyUnavailable),
            LogType::Archived => Some(CacheStatus::Archived),
            _ => None,
        }
    }

    /// Status logs reserved for the cache owner
    pub fn is_owner_only(&self) -> bool {
        self.status_effect().is_some()
    }

    /// The prior log type whose existence blocks a new log of this type
    ///
    /// A not-found is blocked by an earlier find, a will-attend by an
    /// earlier attended.
    pub fn matching_find_type(&self) -> LogType {
        match self {
            LogType::DidNotFindIt => LogType::FoundIt,
            LogType::WillAttend => LogType::Attended,
            other => *other,
        }
    }
}

impl fmt::Display for LogType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Original format of a submitted comment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommentFormat {
    /// HTML with newlines converted to line breaks
    Auto,
    Html,
    Plaintext,
}

impl CommentFormat {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw {
            "auto" => Ok(CommentFormat::Auto),
            "html" => Ok(CommentFormat::Html),
            "plaintext" => Ok(CommentFormat::Plaintext),
            _ => Err(Error::invalid_because(
                "comment_format",
                format!("'{}' is not a valid comment format", raw),
            )),
        }
    }
}

/// A comment ready for storage: HTML text plus its original-format tag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormattedComment {
    pub html: String,
    pub format_tag: u8,
}

/// Snapshot of a published log entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: LogId,
    pub uuid: String,
    pub cache: CacheId,
    pub node: u32,
    pub author: UserId,
    pub log_type: LogType,
    pub date: DateTime<Utc>,
    pub comment: FormattedComment,
    pub deleted: bool,
}
