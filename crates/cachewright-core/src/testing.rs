//! Shared fixtures for the unit tests of this crate

use crate::branch::{BranchPolicy, DePolicy};
use crate::cache::{Cache, CacheSize, CacheType, User};
use crate::error::Result;
use crate::i18n::Messages;
use crate::identity::{CacheId, LogId, UserId};
use crate::log::{FormattedComment, LogEntry, LogType};
use crate::log_rules::{LogContext, DEFAULT_FUTURE_GRACE_SECS};
use crate::services::{
    AttributeCatalog, AttributeInfo, CacheReader, Capabilities, TrustedHtml, Untranslated,
};
use crate::validator::EditContext;
use chrono::{DateTime, Duration, TimeZone, Utc};
use indexmap::IndexMap;
use std::collections::HashSet;

pub fn fixture_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

/// Reader over plain vectors
#[derive(Default)]
pub struct MemoryReader {
    pub caches: Vec<Cache>,
    pub logs: Vec<LogEntry>,
    pub users: Vec<User>,
    pub descriptions: Vec<(CacheId, String)>,
    pub recommendations: HashSet<(UserId, CacheId)>,
}

impl CacheReader for MemoryReader {
    fn cache_by_code(&self, code: &str) -> Result<Option<Cache>> {
        Ok(self.caches.iter().find(|c| c.code == code).cloned())
    }

    fn log_by_uuid(&self, uuid: &str) -> Result<Option<LogEntry>> {
        Ok(self.logs.iter().find(|l| l.uuid == uuid).cloned())
    }

    fn description_languages(&self, cache: CacheId) -> Result<Vec<String>> {
        Ok(self
            .descriptions
            .iter()
            .filter(|(c, _)| *c == cache)
            .map(|(_, lang)| lang.clone())
            .collect())
    }

    fn logs_by_author(&self, cache: CacheId, author: UserId) -> Result<Vec<LogEntry>> {
        Ok(self
            .logs
            .iter()
            .filter(|l| l.cache == cache && l.author == author)
            .cloned()
            .collect())
    }

    fn user(&self, id: UserId) -> Result<Option<User>> {
        Ok(self.users.iter().find(|u| u.id == id).cloned())
    }

    fn recommendation_count(&self, user: UserId) -> Result<u32> {
        Ok(self.recommendations.iter().filter(|(u, _)| *u == user).count() as u32)
    }

    fn has_recommended(&self, user: UserId, cache: CacheId) -> Result<bool> {
        Ok(self.recommendations.contains(&(user, cache)))
    }
}

pub struct FixtureCatalog;

impl AttributeCatalog for FixtureCatalog {
    fn attribute(&self, code: &str, _langprefs: &[String]) -> Option<AttributeInfo> {
        let (name, incompatible): (&str, &[&str]) = match code {
            "A1" => ("Dogs allowed", &["A2"]),
            "A2" => ("No dogs", &["A1"]),
            "A3" => ("Wheelchair", &[]),
            _ => return None,
        };
        Some(AttributeInfo {
            code: code.to_string(),
            name: name.to_string(),
            addable: true,
            incompatible: incompatible.iter().map(|s| s.to_string()).collect(),
        })
    }
}

pub struct FixtureCapabilities {
    pub column_length: usize,
    pub traditional_max: usize,
}

impl Capabilities for FixtureCapabilities {
    fn cache_types(&self) -> Vec<CacheType> {
        vec![
            CacheType::Traditional,
            CacheType::Multi,
            CacheType::Quiz,
            CacheType::Virtual,
            CacheType::Event,
            CacheType::Webcam,
            CacheType::Moving,
            CacheType::Math,
            CacheType::Other,
        ]
    }

    fn cache_sizes(&self) -> Vec<CacheSize> {
        CacheSize::ALL.to_vec()
    }

    fn sizes_for(&self, cache_type: CacheType) -> Vec<CacheSize> {
        match cache_type {
            CacheType::Virtual | CacheType::Webcam => vec![CacheSize::None],
            CacheType::Moving => vec![CacheSize::Small],
            CacheType::Event => vec![CacheSize::None, CacheSize::Other],
            _ => CacheSize::ALL
                .iter()
                .copied()
                .filter(|s| *s != CacheSize::None)
                .collect(),
        }
    }

    fn password_max_length(&self, cache_type: CacheType) -> usize {
        if cache_type == CacheType::Traditional {
            self.traditional_max
        } else {
            self.column_length
        }
    }

    fn languages(&self, _langprefs: &[String]) -> IndexMap<String, String> {
        [("en", "English"), ("de", "German"), ("pl", "Polish"), ("fr", "French")]
            .into_iter()
            .map(|(code, name)| (code.to_string(), name.to_string()))
            .collect()
    }
}

/// Cache edit fixture: owner editing their own Traditional on node 0
pub struct Fixture {
    pub cache: Cache,
    pub actor: UserId,
    pub policy: Box<dyn BranchPolicy>,
    pub capabilities: FixtureCapabilities,
    pub password_column_length: usize,
    pub langprefs: Vec<String>,
    pub description_languages: Vec<String>,
    pub language_priority: Vec<String>,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_policy(Box::new(DePolicy))
    }

    pub fn with_policy(policy: Box<dyn BranchPolicy>) -> Self {
        let owner = UserId(10);
        let created = Utc.with_ymd_and_hms(2009, 1, 1, 0, 0, 0).unwrap();
        let mut cache = Cache::new(CacheId(1), "OP0001", owner, CacheType::Traditional, created);
        cache.name = "Old mill".to_string();
        let column_length = 20;
        let capabilities = FixtureCapabilities {
            column_length,
            traditional_max: policy.password_max_length(CacheType::Traditional, column_length),
        };
        Self {
            cache,
            actor: owner,
            policy,
            capabilities,
            password_column_length: column_length,
            langprefs: vec!["en".to_string()],
            description_languages: vec!["EN".to_string()],
            language_priority: vec!["PL".to_string(), "EN".to_string()],
        }
    }

    pub fn edit_context(&self) -> EditContext<'_> {
        EditContext {
            cache: &self.cache,
            actor: self.actor,
            node_id: 0,
            site_name: "Opencaching.TEST",
            policy: self.policy.as_ref(),
            capabilities: &self.capabilities,
            catalog: &FixtureCatalog,
            sanitizer: &TrustedHtml,
            messages: Messages::new(&Untranslated, &self.langprefs),
            description_languages: &self.description_languages,
            language_priority: &self.language_priority,
            now: fixture_now(),
        }
    }
}

/// Log fixture: a finder who does not own the cache
pub struct LogFixture {
    pub cache: Cache,
    pub actor: User,
    pub policy: Box<dyn BranchPolicy>,
    pub reader: MemoryReader,
    pub langprefs: Vec<String>,
}

impl LogFixture {
    pub fn new(policy: Box<dyn BranchPolicy>) -> Self {
        let hidden = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let cache = Cache::new(CacheId(1), "OP0001", UserId(10), CacheType::Traditional, hidden);
        Self {
            cache,
            actor: User::new(UserId(20), "finder"),
            policy,
            reader: MemoryReader::default(),
            langprefs: vec!["en".to_string()],
        }
    }

    /// Record a log by the actor and return it
    pub fn add_log(&mut self, log_type: LogType, deleted: bool) -> LogEntry {
        let id = self.reader.logs.len() as u64 + 1;
        let log = LogEntry {
            id: LogId(id),
            uuid: format!("log-{}", id),
            cache: self.cache.id,
            node: 0,
            author: self.actor.id,
            log_type,
            date: Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap(),
            comment: FormattedComment {
                html: "earlier visit".to_string(),
                format_tag: 1,
            },
            deleted,
        };
        self.reader.logs.push(log.clone());
        log
    }

    pub fn context(&self) -> LogContext<'_> {
        LogContext {
            cache: &self.cache,
            actor: &self.actor,
            node_id: 0,
            policy: self.policy.as_ref(),
            sanitizer: &TrustedHtml,
            reader: &self.reader,
            messages: Messages::new(&Untranslated, &self.langprefs),
            recommendation_ratio: 10,
            future_grace: Duration::seconds(DEFAULT_FUTURE_GRACE_SECS),
            now: fixture_now(),
        }
    }
}
