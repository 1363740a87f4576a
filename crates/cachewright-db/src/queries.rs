//! Common query patterns for the database.

use crate::error::{Error, Result};
use crate::models::*;
use crate::store::Store;
use cachewright_core::{
    Cache, CacheId, CacheReader, CacheStatus, Description, LogEntry, User, UserId,
};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet, HashSet};

impl Store {
    /// Attribute codes linked to a cache.
    pub fn attribute_codes(&self, cache: CacheId) -> Result<BTreeSet<String>> {
        let r = self.db.r_transaction()?;
        let scan = r
            .scan()
            .secondary::<StoredAttributeLink>(StoredAttributeLinkKey::cache_id)?;
        let iter = scan.start_with(cache.raw())?;
        let links: std::result::Result<Vec<StoredAttributeLink>, _> = iter.collect();
        let links = links.map_err(|e| Error::Database(e.to_string()))?;
        Ok(links.into_iter().map(|l| l.code).collect())
    }

    /// Find a cache by its waypoint code.
    pub fn find_cache(&self, code: &str) -> Result<Option<Cache>> {
        let r = self.db.r_transaction()?;
        let stored: Option<StoredCache> = r
            .get()
            .secondary(StoredCacheKey::code, code.to_string())?;
        match stored {
            Some(s) => {
                let attributes = self.attribute_codes(CacheId::new(s.id))?;
                Ok(Some(s.to_cache(attributes)?))
            }
            None => Ok(None),
        }
    }

    /// Find a log by its UUID.
    pub fn find_log(&self, uuid: &str) -> Result<Option<LogEntry>> {
        let r = self.db.r_transaction()?;
        let stored: Option<StoredLog> = r.get().secondary(StoredLogKey::uuid, uuid.to_string())?;
        stored.map(|s| s.to_entry()).transpose()
    }

    /// All logs of a cache, deleted ones included.
    pub fn logs_of_cache(&self, cache: CacheId) -> Result<Vec<LogEntry>> {
        let r = self.db.r_transaction()?;
        let scan = r.scan().secondary::<StoredLog>(StoredLogKey::cache_id)?;
        let iter = scan.start_with(cache.raw())?;
        let logs: std::result::Result<Vec<StoredLog>, _> = iter.collect();
        let logs = logs.map_err(|e| Error::Database(e.to_string()))?;
        logs.iter().map(StoredLog::to_entry).collect()
    }

    /// All descriptions of a cache.
    pub fn descriptions(&self, cache: CacheId) -> Result<Vec<Description>> {
        let r = self.db.r_transaction()?;
        let scan = r
            .scan()
            .secondary::<StoredDescription>(StoredDescriptionKey::cache_id)?;
        let iter = scan.start_with(cache.raw())?;
        let descs: std::result::Result<Vec<StoredDescription>, _> = iter.collect();
        let descs = descs.map_err(|e| Error::Database(e.to_string()))?;
        Ok(descs.iter().map(StoredDescription::to_description).collect())
    }

    /// Description of one language.
    pub fn description(&self, cache: CacheId, language: &str) -> Result<Option<Description>> {
        let r = self.db.r_transaction()?;
        let stored: Option<StoredDescription> = r
            .get()
            .primary(StoredDescription::key_of(cache, language))?;
        Ok(stored.map(|s| s.to_description()))
    }

    /// Load a user by ID.
    pub fn load_user(&self, id: UserId) -> Result<Option<User>> {
        let r = self.db.r_transaction()?;
        let stored: Option<StoredUser> = r.get().primary(id.raw())?;
        Ok(stored.map(|s| s.to_user()))
    }

    /// Date of a user's recommendation of a cache.
    pub fn recommendation(&self, user: UserId, cache: CacheId) -> Result<Option<DateTime<Utc>>> {
        let r = self.db.r_transaction()?;
        let stored: Option<StoredRecommendation> = r
            .get()
            .primary(pair_key(user.raw(), cache.raw()))?;
        Ok(stored.map(|s| from_micros(s.date)))
    }

    /// Number of caches a user recommends.
    pub fn count_recommendations(&self, user: UserId) -> Result<usize> {
        let r = self.db.r_transaction()?;
        let scan = r
            .scan()
            .secondary::<StoredRecommendation>(StoredRecommendationKey::user_id)?;
        let iter = scan.start_with(user.raw())?;
        Ok(iter.count())
    }

    /// Score a user gave a cache.
    pub fn score(&self, user: UserId, cache: CacheId) -> Result<Option<u8>> {
        let r = self.db.r_transaction()?;
        let stored: Option<StoredScore> = r.get().primary(pair_key(user.raw(), cache.raw()))?;
        Ok(stored.map(|s| s.score))
    }

    /// Distinct owners of available caches on `node`, per description language.
    ///
    /// Languages are lower-case; ordered by owner count descending, then by language.
    pub fn language_owner_counts(&self, node: u32) -> Result<Vec<(String, usize)>> {
        let r = self.db.r_transaction()?;
        let scan = r.scan().primary::<StoredCache>()?;
        let iter = scan.all()?;
        let caches: std::result::Result<Vec<StoredCache>, _> = iter.collect();
        let caches = caches.map_err(|e| Error::Database(e.to_string()))?;

        let mut owners: BTreeMap<String, HashSet<u64>> = BTreeMap::new();
        for cache in caches
            .iter()
            .filter(|c| c.node == node && c.status == CacheStatus::Available.code())
        {
            for desc in self.descriptions(CacheId::new(cache.id))? {
                owners
                    .entry(desc.language.to_lowercase())
                    .or_default()
                    .insert(cache.owner);
            }
        }
        let mut counts: Vec<(String, usize)> = owners
            .into_iter()
            .map(|(lang, users)| (lang, users.len()))
            .collect();
        counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        Ok(counts)
    }
}

impl CacheReader for Store {
    fn cache_by_code(&self, code: &str) -> cachewright_core::Result<Option<Cache>> {
        Ok(self.find_cache(code)?)
    }

    fn log_by_uuid(&self, uuid: &str) -> cachewright_core::Result<Option<LogEntry>> {
        Ok(self.find_log(uuid)?)
    }

    fn description_languages(&self, cache: CacheId) -> cachewright_core::Result<Vec<String>> {
        Ok(self
            .descriptions(cache)?
            .into_iter()
            .map(|d| d.language)
            .collect())
    }

    fn logs_by_author(
        &self,
        cache: CacheId,
        author: UserId,
    ) -> cachewright_core::Result<Vec<LogEntry>> {
        Ok(self
            .logs_of_cache(cache)?
            .into_iter()
            .filter(|l| l.author == author)
            .collect())
    }

    fn user(&self, id: UserId) -> cachewright_core::Result<Option<User>> {
        Ok(self.load_user(id)?)
    }

    fn recommendation_count(&self, user: UserId) -> cachewright_core::Result<u32> {
        let count = self.count_recommendations(user)?;
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    fn has_recommended(&self, user: UserId, cache: CacheId) -> cachewright_core::Result<bool> {
        Ok(self.recommendation(user, cache)?.is_some())
    }
}
