//! Cache listing models: the cache row, its attribute links and descriptions.

use super::{cache_scoped_key, from_micros, to_micros};
use crate::error::{Error, Result};
use cachewright_core::{
    Cache, CacheId, CacheSize, CacheStats, CacheStatus, CacheType, Coords, Description, HalfStars,
    RatingStats, UserId,
};
use native_db::*;
use native_model::{native_model, Model};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Stored cache row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[native_model(id = 1, version = 1)]
#[native_db]
pub struct StoredCache {
    /// Primary key - cache ID.
    #[primary_key]
    pub id: u64,
    /// Public waypoint code.
    #[secondary_key(unique)]
    pub code: String,
    pub node: u32,
    pub owner: u64,
    pub name: String,
    pub cache_type: u8,
    pub size: u8,
    pub status: u8,
    /// Doubled star values (2..=10).
    pub difficulty: u8,
    pub terrain: u8,
    pub latitude: f64,
    pub longitude: f64,
    pub trip_time: Option<f64>,
    pub trip_distance: Option<f64>,
    pub password: String,
    pub gc_code: String,
    pub founds: u32,
    pub notfounds: u32,
    pub notes: u32,
    pub last_found: Option<i64>,
    pub score: f64,
    pub votes: u32,
    pub desc_languages: String,
    pub default_desc_lang: String,
    pub date_created: i64,
    pub date_hidden: i64,
    pub last_modified: i64,
}

impl StoredCache {
    /// Create from a cache snapshot. Attributes are stored as links.
    pub fn from_cache(cache: &Cache) -> Self {
        Self {
            id: cache.id.raw(),
            code: cache.code.clone(),
            node: cache.node,
            owner: cache.owner.raw(),
            name: cache.name.clone(),
            cache_type: cache.cache_type.code(),
            size: cache.size.code(),
            status: cache.status.code(),
            difficulty: cache.difficulty.doubled(),
            terrain: cache.terrain.doubled(),
            latitude: cache.location.lat,
            longitude: cache.location.lon,
            trip_time: cache.trip_time,
            trip_distance: cache.trip_distance,
            password: cache.password.clone(),
            gc_code: cache.gc_code.clone(),
            founds: cache.stats.founds,
            notfounds: cache.stats.notfounds,
            notes: cache.stats.notes,
            last_found: cache.stats.last_found.map(to_micros),
            score: cache.rating.score,
            votes: cache.rating.votes,
            desc_languages: cache.desc_languages.clone(),
            default_desc_lang: cache.default_desc_lang.clone(),
            date_created: to_micros(cache.date_created),
            date_hidden: to_micros(cache.date_hidden),
            last_modified: to_micros(cache.last_modified),
        }
    }

    /// Convert to a cache snapshot carrying the given attribute codes.
    pub fn to_cache(&self, attributes: BTreeSet<String>) -> Result<Cache> {
        let corrupt = |what: &str, code: u8| {
            Error::Serialization(format!("cache {}: unknown {} code {}", self.id, what, code))
        };
        Ok(Cache {
            id: CacheId::new(self.id),
            code: self.code.clone(),
            node: self.node,
            owner: UserId::new(self.owner),
            name: self.name.clone(),
            cache_type: CacheType::from_code(self.cache_type)
                .ok_or_else(|| corrupt("type", self.cache_type))?,
            size: CacheSize::from_code(self.size).ok_or_else(|| corrupt("size", self.size))?,
            status: CacheStatus::from_code(self.status)
                .ok_or_else(|| corrupt("status", self.status))?,
            difficulty: HalfStars::from_doubled(self.difficulty)
                .ok_or_else(|| corrupt("difficulty", self.difficulty))?,
            terrain: HalfStars::from_doubled(self.terrain)
                .ok_or_else(|| corrupt("terrain", self.terrain))?,
            location: Coords::new(self.latitude, self.longitude),
            trip_time: self.trip_time,
            trip_distance: self.trip_distance,
            password: self.password.clone(),
            gc_code: self.gc_code.clone(),
            attributes,
            stats: self.stats(),
            rating: self.rating(),
            desc_languages: self.desc_languages.clone(),
            default_desc_lang: self.default_desc_lang.clone(),
            date_created: from_micros(self.date_created),
            date_hidden: from_micros(self.date_hidden),
            last_modified: from_micros(self.last_modified),
        })
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            founds: self.founds,
            notfounds: self.notfounds,
            notes: self.notes,
            last_found: self.last_found.map(from_micros),
        }
    }

    pub fn set_stats(&mut self, stats: &CacheStats) {
        self.founds = stats.founds;
        self.notfounds = stats.notfounds;
        self.notes = stats.notes;
        self.last_found = stats.last_found.map(to_micros);
    }

    pub fn rating(&self) -> RatingStats {
        RatingStats {
            score: self.score,
            votes: self.votes,
        }
    }
}

/// Link between a cache and one attribute code.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[native_model(id = 2, version = 1)]
#[native_db]
pub struct StoredAttributeLink {
    /// Primary key - `"{cache}:{code}"`.
    #[primary_key]
    pub key: String,
    #[secondary_key]
    pub cache_id: u64,
    pub code: String,
}

impl StoredAttributeLink {
    pub fn new(cache: CacheId, code: &str) -> Self {
        Self {
            key: cache_scoped_key(cache.raw(), code),
            cache_id: cache.raw(),
            code: code.to_string(),
        }
    }
}

/// Stored description of one (cache, language) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[native_model(id = 3, version = 1)]
#[native_db]
pub struct StoredDescription {
    /// Primary key - `"{cache}:{LANGUAGE}"`; enforces one record per language.
    #[primary_key]
    pub key: String,
    #[secondary_key]
    pub cache_id: u64,
    pub language: String,
    pub full: String,
    pub full_html_flag: u8,
    pub short: String,
    pub hint: String,
    pub created: i64,
    pub modified: i64,
}

impl StoredDescription {
    pub fn key_of(cache: CacheId, language: &str) -> String {
        cache_scoped_key(cache.raw(), &language.to_uppercase())
    }

    pub fn from_description(description: &Description) -> Self {
        Self {
            key: Self::key_of(description.cache, &description.language),
            cache_id: description.cache.raw(),
            language: description.language.to_uppercase(),
            full: description.full.clone(),
            full_html_flag: description.full_html_flag,
            short: description.short.clone(),
            hint: description.hint.clone(),
            created: to_micros(description.created),
            modified: to_micros(description.modified),
        }
    }

    pub fn to_description(&self) -> Description {
        Description {
            cache: CacheId::new(self.cache_id),
            language: self.language.clone(),
            full: self.full.clone(),
            full_html_flag: self.full_html_flag,
            short: self.short.clone(),
            hint: self.hint.clone(),
            created: from_micros(self.created),
            modified: from_micros(self.modified),
        }
    }
}
