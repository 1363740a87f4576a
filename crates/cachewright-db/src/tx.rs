//! Write transaction handle.
//!
//! Everything a commit touches goes through one [`Tx`]; nothing is visible
//! to readers until [`Tx::commit`]. Dropping a `Tx` without committing
//! discards its writes.

use crate::error::{Error, Result};
use crate::models::*;
use crate::store::{Store, LOG_SEQUENCE};
use cachewright_core::stats::recompute_last_found;
use cachewright_core::{
    BranchPolicy, Cache, CacheField, CacheId, CacheStats, CacheStatus, CounterDelta, Description,
    FormattedComment, LogEntry, LogId, LogType, NewLog, RatingStats, Transition, UserId,
    UserStats, Visit,
};
use chrono::{DateTime, Utc};
use native_db::transaction::RwTransaction;
use std::collections::BTreeSet;

/// An open write transaction.
pub struct Tx<'db> {
    rw: RwTransaction<'db>,
}

impl Store {
    /// Open a write transaction.
    pub fn begin(&self) -> Result<Tx<'_>> {
        Ok(Tx {
            rw: self.db.rw_transaction()?,
        })
    }
}

impl<'db> Tx<'db> {
    /// Make all writes of this transaction visible.
    pub fn commit(self) -> Result<()> {
        self.rw.commit()?;
        Ok(())
    }

    // Caches

    fn stored_cache(&self, id: CacheId) -> Result<StoredCache> {
        self.rw
            .get()
            .primary::<StoredCache>(id.raw())?
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    fn update_cache(&self, id: CacheId, f: impl FnOnce(&mut StoredCache)) -> Result<()> {
        let mut stored = self.stored_cache(id)?;
        f(&mut stored);
        self.rw.upsert(stored)?;
        Ok(())
    }

    /// Current state of a cache as seen inside the transaction.
    pub fn cache(&self, id: CacheId) -> Result<Cache> {
        let stored = self.stored_cache(id)?;
        stored.to_cache(self.attribute_codes(id)?)
    }

    pub fn set_cache_field(&self, id: CacheId, field: &CacheField) -> Result<()> {
        self.update_cache(id, |c| match field {
            CacheField::Name(name) => c.name = name.clone(),
            CacheField::Type(t) => c.cache_type = t.code(),
            CacheField::Size(s) => c.size = s.code(),
            CacheField::Location(loc) => {
                c.latitude = loc.lat;
                c.longitude = loc.lon;
            }
            CacheField::Difficulty(d) => c.difficulty = d.doubled(),
            CacheField::Terrain(t) => c.terrain = t.doubled(),
            CacheField::TripTime(v) => c.trip_time = *v,
            CacheField::TripDistance(v) => c.trip_distance = *v,
            CacheField::Password(p) => c.password = p.clone(),
            CacheField::GcCode(code) => c.gc_code = code.clone(),
        })
    }

    pub fn touch_cache(&self, id: CacheId, at: DateTime<Utc>) -> Result<()> {
        self.update_cache(id, |c| c.last_modified = to_micros(at))
    }

    pub fn set_cache_status(&self, id: CacheId, status: CacheStatus) -> Result<()> {
        self.update_cache(id, |c| c.status = status.code())
    }

    pub fn cache_stats(&self, id: CacheId) -> Result<CacheStats> {
        Ok(self.stored_cache(id)?.stats())
    }

    pub fn set_cache_stats(&self, id: CacheId, stats: &CacheStats) -> Result<()> {
        self.update_cache(id, |c| c.set_stats(stats))
    }

    pub fn rating(&self, id: CacheId) -> Result<RatingStats> {
        Ok(self.stored_cache(id)?.rating())
    }

    pub fn set_rating(&self, id: CacheId, rating: RatingStats) -> Result<()> {
        self.update_cache(id, |c| {
            c.score = rating.score;
            c.votes = rating.votes;
        })
    }

    pub fn set_description_languages(
        &self,
        id: CacheId,
        languages: &str,
        default: &str,
    ) -> Result<()> {
        self.update_cache(id, |c| {
            c.desc_languages = languages.to_string();
            c.default_desc_lang = default.to_string();
        })
    }

    // Attributes

    pub fn attribute_codes(&self, cache: CacheId) -> Result<BTreeSet<String>> {
        let scan = self
            .rw
            .scan()
            .secondary::<StoredAttributeLink>(StoredAttributeLinkKey::cache_id)?;
        let iter = scan.start_with(cache.raw())?;
        let links: std::result::Result<Vec<StoredAttributeLink>, _> = iter.collect();
        let links = links.map_err(|e| Error::Database(e.to_string()))?;
        Ok(links.into_iter().map(|l| l.code).collect())
    }

    /// Link an attribute. Returns false if it was already linked.
    pub fn add_attribute(&self, cache: CacheId, code: &str) -> Result<bool> {
        let link = StoredAttributeLink::new(cache, code);
        let existing: Option<StoredAttributeLink> = self.rw.get().primary(link.key.clone())?;
        if existing.is_some() {
            return Ok(false);
        }
        self.rw.insert(link)?;
        Ok(true)
    }

    /// Unlink an attribute. Returns false if it was not linked.
    pub fn remove_attribute(&self, cache: CacheId, code: &str) -> Result<bool> {
        let key = StoredAttributeLink::new(cache, code).key;
        match self.rw.get().primary::<StoredAttributeLink>(key)? {
            Some(link) => {
                self.rw.remove(link)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    // Descriptions

    pub fn description(&self, cache: CacheId, language: &str) -> Result<Option<Description>> {
        let stored: Option<StoredDescription> = self
            .rw
            .get()
            .primary(StoredDescription::key_of(cache, language))?;
        Ok(stored.map(|s| s.to_description()))
    }

    pub fn description_languages(&self, cache: CacheId) -> Result<Vec<String>> {
        let scan = self
            .rw
            .scan()
            .secondary::<StoredDescription>(StoredDescriptionKey::cache_id)?;
        let iter = scan.start_with(cache.raw())?;
        let descs: std::result::Result<Vec<StoredDescription>, _> = iter.collect();
        let descs = descs.map_err(|e| Error::Database(e.to_string()))?;
        Ok(descs.into_iter().map(|d| d.language).collect())
    }

    /// Insert a description. Returns false, writing nothing, if the language exists.
    pub fn insert_description(&self, description: &Description) -> Result<bool> {
        if self
            .description(description.cache, &description.language)?
            .is_some()
        {
            return Ok(false);
        }
        self.rw
            .insert(StoredDescription::from_description(description))?;
        Ok(true)
    }

    pub fn put_description(&self, description: &Description) -> Result<()> {
        self.rw
            .upsert(StoredDescription::from_description(description))?;
        Ok(())
    }

    pub fn delete_description(&self, cache: CacheId, language: &str) -> Result<bool> {
        let key = StoredDescription::key_of(cache, language);
        match self.rw.get().primary::<StoredDescription>(key)? {
            Some(desc) => {
                self.rw.remove(desc)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    // Logs

    /// Take the next id of a sequence.
    pub fn next_id(&self, sequence: &str) -> Result<u64> {
        let current = self
            .rw
            .get()
            .primary::<StoredSequence>(sequence.to_string())?
            .map_or(1, |s| s.next);
        self.rw.upsert(StoredSequence {
            name: sequence.to_string(),
            next: current + 1,
        })?;
        Ok(current)
    }

    pub fn log(&self, id: LogId) -> Result<Option<LogEntry>> {
        let stored: Option<StoredLog> = self.rw.get().primary(id.raw())?;
        stored.map(|s| s.to_entry()).transpose()
    }

    /// Store a new log under a fresh id.
    pub fn insert_log(&self, log: &NewLog, at: DateTime<Utc>) -> Result<LogEntry> {
        let existing: Option<StoredLog> = self
            .rw
            .get()
            .secondary(StoredLogKey::uuid, log.uuid.clone())?;
        if existing.is_some() {
            return Err(Error::DuplicateKey(format!("log uuid {}", log.uuid)));
        }
        let id = LogId::new(self.next_id(LOG_SEQUENCE)?);
        let stored = StoredLog::from_new(id, log, at);
        let entry = stored.to_entry()?;
        self.rw.insert(stored)?;
        Ok(entry)
    }

    pub fn update_log(
        &self,
        id: LogId,
        log_type: LogType,
        date: DateTime<Utc>,
        comment: Option<&FormattedComment>,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let mut stored = self
            .rw
            .get()
            .primary::<StoredLog>(id.raw())?
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        stored.log_type = log_type.code();
        stored.date = to_micros(date);
        if let Some(comment) = comment {
            stored.text = comment.html.clone();
            stored.text_html = comment.format_tag;
        }
        stored.last_modified = to_micros(at);
        self.rw.upsert(stored)?;
        Ok(())
    }

    /// All logs of a cache, deleted ones included.
    pub fn logs_of_cache(&self, cache: CacheId) -> Result<Vec<LogEntry>> {
        let scan = self
            .rw
            .scan()
            .secondary::<StoredLog>(StoredLogKey::cache_id)?;
        let iter = scan.start_with(cache.raw())?;
        let logs: std::result::Result<Vec<StoredLog>, _> = iter.collect();
        let logs = logs.map_err(|e| Error::Database(e.to_string()))?;
        logs.iter().map(StoredLog::to_entry).collect()
    }

    /// All logs written by a user, deleted ones included.
    pub fn logs_of_author(&self, author: UserId) -> Result<Vec<LogEntry>> {
        let scan = self
            .rw
            .scan()
            .secondary::<StoredLog>(StoredLogKey::author)?;
        let iter = scan.start_with(author.raw())?;
        let logs: std::result::Result<Vec<StoredLog>, _> = iter.collect();
        let logs = logs.map_err(|e| Error::Database(e.to_string()))?;
        logs.iter().map(StoredLog::to_entry).collect()
    }

    // Users

    pub fn user_stats(&self, user: UserId) -> Result<UserStats> {
        let stored: Option<StoredUser> = self.rw.get().primary(user.raw())?;
        stored
            .map(|u| u.stats())
            .ok_or_else(|| Error::NotFound(user.to_string()))
    }

    pub fn set_user_stats(&self, user: UserId, stats: &UserStats) -> Result<()> {
        let mut stored = self
            .rw
            .get()
            .primary::<StoredUser>(user.raw())?
            .ok_or_else(|| Error::NotFound(user.to_string()))?;
        stored.set_stats(stats);
        self.rw.upsert(stored)?;
        Ok(())
    }

    // Recommendations and scores

    pub fn recommendation(&self, user: UserId, cache: CacheId) -> Result<Option<DateTime<Utc>>> {
        let stored: Option<StoredRecommendation> = self
            .rw
            .get()
            .primary(pair_key(user.raw(), cache.raw()))?;
        Ok(stored.map(|s| from_micros(s.date)))
    }

    pub fn save_recommendation(
        &self,
        user: UserId,
        cache: CacheId,
        date: DateTime<Utc>,
    ) -> Result<()> {
        self.rw
            .upsert(StoredRecommendation::new(user, cache, date))?;
        Ok(())
    }

    pub fn delete_recommendation(&self, user: UserId, cache: CacheId) -> Result<bool> {
        let key = pair_key(user.raw(), cache.raw());
        match self.rw.get().primary::<StoredRecommendation>(key)? {
            Some(rec) => {
                self.rw.remove(rec)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn score(&self, user: UserId, cache: CacheId) -> Result<Option<u8>> {
        let stored: Option<StoredScore> = self
            .rw
            .get()
            .primary(pair_key(user.raw(), cache.raw()))?;
        Ok(stored.map(|s| s.score))
    }

    pub fn save_score(&self, user: UserId, cache: CacheId, score: u8) -> Result<()> {
        self.rw.upsert(StoredScore::new(user, cache, score))?;
        Ok(())
    }

    /// Remove a score and return what it was.
    pub fn delete_score(&self, user: UserId, cache: CacheId) -> Result<Option<u8>> {
        let key = pair_key(user.raw(), cache.raw());
        match self.rw.get().primary::<StoredScore>(key)? {
            Some(score) => {
                let value = score.score;
                self.rw.remove(score)?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    // Counters derived from the log history

    /// Rebuild the counters of a cache from its active logs.
    pub fn replay_cache_stats(&self, cache: CacheId, policy: &dyn BranchPolicy) -> Result<CacheStats> {
        let logs = self.logs_of_cache(cache)?;
        let mut stats = CacheStats::default();
        for log in logs.iter().filter(|l| policy.is_log_active(l)) {
            CounterDelta::for_cache(&Transition::publish(Visit::new(log.log_type, log.date)))
                .apply_to_cache(&mut stats);
        }
        stats.last_found = recompute_last_found(&logs, policy);
        self.set_cache_stats(cache, &stats)?;
        Ok(stats)
    }

    /// Rebuild the counters of a user from their active logs.
    pub fn replay_user_stats(&self, user: UserId, policy: &dyn BranchPolicy) -> Result<UserStats> {
        let mut stats = UserStats::default();
        for log in self
            .logs_of_author(user)?
            .iter()
            .filter(|l| policy.is_log_active(l))
        {
            CounterDelta::for_user(&Transition::publish(Visit::new(log.log_type, log.date)))
                .apply_to_user(&mut stats);
        }
        self.set_user_stats(user, &stats)?;
        Ok(stats)
    }
}
