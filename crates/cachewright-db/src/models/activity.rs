//! Activity models: logs, users and what users give to caches.

use super::{from_micros, pair_key, to_micros};
use crate::error::{Error, Result};
use cachewright_core::{
    CacheId, FormattedComment, LogEntry, LogId, LogType, NewLog, User, UserId, UserStats,
};
use chrono::{DateTime, Utc};
use native_db::*;
use native_model::{native_model, Model};
use serde::{Deserialize, Serialize};

/// Stored log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[native_model(id = 4, version = 1)]
#[native_db]
pub struct StoredLog {
    /// Primary key - log ID.
    #[primary_key]
    pub id: u64,
    /// External reference handed to clients.
    #[secondary_key(unique)]
    pub uuid: String,
    #[secondary_key]
    pub cache_id: u64,
    pub node: u32,
    #[secondary_key]
    pub author: u64,
    pub log_type: u8,
    pub date: i64,
    pub text: String,
    /// Original-format tag of `text`.
    pub text_html: u8,
    pub deleted: bool,
    pub last_modified: i64,
}

impl StoredLog {
    pub fn from_entry(log: &LogEntry) -> Self {
        Self {
            id: log.id.raw(),
            uuid: log.uuid.clone(),
            cache_id: log.cache.raw(),
            node: log.node,
            author: log.author.raw(),
            log_type: log.log_type.code(),
            date: to_micros(log.date),
            text: log.comment.html.clone(),
            text_html: log.comment.format_tag,
            deleted: log.deleted,
            last_modified: to_micros(log.date),
        }
    }

    /// Row for a freshly published log.
    pub fn from_new(id: LogId, log: &NewLog, at: DateTime<Utc>) -> Self {
        Self {
            id: id.raw(),
            uuid: log.uuid.clone(),
            cache_id: log.cache.raw(),
            node: log.node,
            author: log.author.raw(),
            log_type: log.log_type.code(),
            date: to_micros(log.date),
            text: log.comment.html.clone(),
            text_html: log.comment.format_tag,
            deleted: false,
            last_modified: to_micros(at),
        }
    }

    pub fn to_entry(&self) -> Result<LogEntry> {
        let log_type = LogType::from_code(self.log_type).ok_or_else(|| {
            Error::Serialization(format!("log {}: unknown type code {}", self.id, self.log_type))
        })?;
        Ok(LogEntry {
            id: LogId::new(self.id),
            uuid: self.uuid.clone(),
            cache: CacheId::new(self.cache_id),
            node: self.node,
            author: UserId::new(self.author),
            log_type,
            date: from_micros(self.date),
            comment: FormattedComment {
                html: self.text.clone(),
                format_tag: self.text_html,
            },
            deleted: self.deleted,
        })
    }
}

/// Stored user with aggregate log counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[native_model(id = 5, version = 1)]
#[native_db]
pub struct StoredUser {
    #[primary_key]
    pub id: u64,
    pub username: String,
    pub founds: u32,
    pub notfounds: u32,
    pub notes: u32,
}

impl StoredUser {
    pub fn from_user(user: &User) -> Self {
        Self {
            id: user.id.raw(),
            username: user.username.clone(),
            founds: user.stats.founds,
            notfounds: user.stats.notfounds,
            notes: user.stats.notes,
        }
    }

    pub fn to_user(&self) -> User {
        User {
            id: UserId::new(self.id),
            username: self.username.clone(),
            stats: self.stats(),
        }
    }

    pub fn stats(&self) -> UserStats {
        UserStats {
            founds: self.founds,
            notfounds: self.notfounds,
            notes: self.notes,
        }
    }

    pub fn set_stats(&mut self, stats: &UserStats) {
        self.founds = stats.founds;
        self.notfounds = stats.notfounds;
        self.notes = stats.notes;
    }
}

/// A user's recommendation of a cache, dated at their find.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[native_model(id = 6, version = 1)]
#[native_db]
pub struct StoredRecommendation {
    /// Primary key - `"{user}:{cache}"`.
    #[primary_key]
    pub key: String,
    #[secondary_key]
    pub user_id: u64,
    pub cache_id: u64,
    pub date: i64,
}

impl StoredRecommendation {
    pub fn new(user: UserId, cache: CacheId, date: DateTime<Utc>) -> Self {
        Self {
            key: pair_key(user.raw(), cache.raw()),
            user_id: user.raw(),
            cache_id: cache.raw(),
            date: to_micros(date),
        }
    }
}

/// A user's score for a cache, folded into the cache's rating.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[native_model(id = 7, version = 1)]
#[native_db]
pub struct StoredScore {
    /// Primary key - `"{user}:{cache}"`.
    #[primary_key]
    pub key: String,
    pub user_id: u64,
    pub cache_id: u64,
    pub score: u8,
}

impl StoredScore {
    pub fn new(user: UserId, cache: CacheId, score: u8) -> Self {
        Self {
            key: pair_key(user.raw(), cache.raw()),
            user_id: user.raw(),
            cache_id: cache.raw(),
            score,
        }
    }
}

/// Next free id of a named sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[native_model(id = 8, version = 1)]
#[native_db]
pub struct StoredSequence {
    #[primary_key]
    pub name: String,
    pub next: u64,
}
