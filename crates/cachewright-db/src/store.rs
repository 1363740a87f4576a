//! Database store wrapper.

use crate::error::{Error, Result};
use crate::models::*;
use cachewright_core::{Cache, CacheId, Description, LogEntry, User, UserId};
use chrono::{DateTime, Utc};
use native_db::*;
use std::path::Path;
use std::sync::LazyLock;

// Static models for the database
static MODELS: LazyLock<Models> = LazyLock::new(|| {
    let mut models = Models::new();
    models.define::<StoredCache>().unwrap();
    models.define::<StoredAttributeLink>().unwrap();
    models.define::<StoredDescription>().unwrap();
    models.define::<StoredLog>().unwrap();
    models.define::<StoredUser>().unwrap();
    models.define::<StoredRecommendation>().unwrap();
    models.define::<StoredScore>().unwrap();
    models.define::<StoredSequence>().unwrap();
    models
});

/// Sequence that hands out log ids.
pub const LOG_SEQUENCE: &str = "logs";

/// Database store for caches, their descriptions and logs.
pub struct Store {
    pub(crate) db: Database<'static>,
}

impl Store {
    /// Open or create a database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = Builder::new()
            .create(&MODELS, path.as_ref())
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(Self { db })
    }

    /// Create an in-memory database.
    pub fn in_memory() -> Result<Self> {
        let db = Builder::new()
            .create_in_memory(&MODELS)
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(Self { db })
    }

    /// Save a cache row and replace its attribute links.
    pub fn save_cache(&self, cache: &Cache) -> Result<()> {
        let rw = self.db.rw_transaction()?;
        let old_links: Vec<StoredAttributeLink> = {
            let scan = rw
                .scan()
                .secondary::<StoredAttributeLink>(StoredAttributeLinkKey::cache_id)?;
            let iter = scan.start_with(cache.id.raw())?;
            let links: std::result::Result<Vec<StoredAttributeLink>, _> = iter.collect();
            links.map_err(|e| Error::Database(e.to_string()))?
        };
        for link in old_links {
            rw.remove(link)?;
        }
        for code in &cache.attributes {
            rw.upsert(StoredAttributeLink::new(cache.id, code))?;
        }
        rw.upsert(StoredCache::from_cache(cache))?;
        rw.commit()?;
        Ok(())
    }

    /// Load a cache by ID.
    pub fn load_cache(&self, id: CacheId) -> Result<Option<Cache>> {
        let r = self.db.r_transaction()?;
        let stored: Option<StoredCache> = r.get().primary(id.raw())?;
        match stored {
            Some(s) => {
                let attributes = self.attribute_codes(id)?;
                Ok(Some(s.to_cache(attributes)?))
            }
            None => Ok(None),
        }
    }

    /// Save a user.
    pub fn save_user(&self, user: &User) -> Result<()> {
        let rw = self.db.rw_transaction()?;
        rw.upsert(StoredUser::from_user(user))?;
        rw.commit()?;
        Ok(())
    }

    /// Save a description.
    pub fn save_description(&self, description: &Description) -> Result<()> {
        let rw = self.db.rw_transaction()?;
        rw.upsert(StoredDescription::from_description(description))?;
        rw.commit()?;
        Ok(())
    }

    /// Save an existing log, e.g. from an import. Keeps the log sequence ahead of it.
    pub fn save_log(&self, log: &LogEntry) -> Result<()> {
        let rw = self.db.rw_transaction()?;
        let next = rw
            .get()
            .primary::<StoredSequence>(LOG_SEQUENCE.to_string())?
            .map_or(1, |s| s.next);
        if log.id.raw() >= next {
            rw.upsert(StoredSequence {
                name: LOG_SEQUENCE.to_string(),
                next: log.id.raw() + 1,
            })?;
        }
        rw.upsert(StoredLog::from_entry(log))?;
        rw.commit()?;
        Ok(())
    }

    /// Save a recommendation.
    pub fn save_recommendation(
        &self,
        user: UserId,
        cache: CacheId,
        date: DateTime<Utc>,
    ) -> Result<()> {
        let rw = self.db.rw_transaction()?;
        rw.upsert(StoredRecommendation::new(user, cache, date))?;
        rw.commit()?;
        Ok(())
    }

    /// Save a score without touching the cache's rating.
    pub fn save_score(&self, user: UserId, cache: CacheId, score: u8) -> Result<()> {
        let rw = self.db.rw_transaction()?;
        rw.upsert(StoredScore::new(user, cache, score))?;
        rw.commit()?;
        Ok(())
    }
}

impl From<native_db::db_type::Error> for Error {
    fn from(err: native_db::db_type::Error) -> Self {
        Error::Database(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cachewright_core::CacheType;
    use chrono::TimeZone;

    fn sample_cache() -> Cache {
        let created = Utc.with_ymd_and_hms(2012, 4, 1, 0, 0, 0).unwrap();
        let mut cache = Cache::new(CacheId(1), "OP0001", UserId(10), CacheType::Traditional, created);
        cache.name = "Old mill".into();
        cache.attributes = ["A1".to_string(), "A3".to_string()].into_iter().collect();
        cache
    }

    #[test]
    fn test_save_and_load_cache() {
        let store = Store::in_memory().unwrap();
        let cache = sample_cache();
        store.save_cache(&cache).unwrap();
        assert_eq!(store.load_cache(CacheId(1)).unwrap(), Some(cache));
        assert_eq!(store.load_cache(CacheId(2)).unwrap(), None);
    }

    #[test]
    fn test_save_cache_replaces_attribute_links() {
        let store = Store::in_memory().unwrap();
        let mut cache = sample_cache();
        store.save_cache(&cache).unwrap();
        cache.attributes = ["A2".to_string()].into_iter().collect();
        store.save_cache(&cache).unwrap();
        let loaded = store.load_cache(CacheId(1)).unwrap().unwrap();
        assert_eq!(loaded.attributes, cache.attributes);
    }
}
