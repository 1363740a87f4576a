//! Read-through caches for derived lookups
//!
//! Two lookups are expensive enough to keep between requests: the
//! dictionary of language names, and the site's primary languages derived
//! from owner statistics. Both live in a [`LookupCache`] owned by the hub.
//!
//! | Key | Value | TTL |
//! |---|---|---|
//! | `()` | language dictionary | `HubConfig::language_ttl` (24 h) |
//! | node id | primary languages | 250 s per counted owner |

use crate::config::HubConfig;
use crate::error::Result;
use cachewright_core::{CacheSize, CacheType, Capabilities};
use cachewright_script::{localize_languages, SiteDefs};
use indexmap::IndexMap;
use moka::sync::Cache;
use moka::Expiry;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Language names by language code, then by the language they are written in
pub type LanguageDictionary = IndexMap<String, IndexMap<String, String>>;

/// Languages used by the most owners of active caches
#[derive(Debug, Clone, PartialEq)]
pub struct PrimaryLanguages {
    /// Lower-case codes, most used first
    pub languages: Vec<String>,
    /// Owners counted over all languages
    pub owners: usize,
}

impl PrimaryLanguages {
    /// Derive from per-language owner counts, sorted by count descending
    ///
    /// A language is primary while its count reaches `floor(ln(total) - 1)`.
    /// Without any owners the site language is the only primary language.
    pub fn from_counts(counts: &[(String, usize)], site_language: &str) -> Self {
        let owners: usize = counts.iter().map(|(_, n)| n).sum();
        if owners == 0 {
            return Self {
                languages: vec![site_language.to_lowercase()],
                owners,
            };
        }
        let threshold = ((owners as f64).ln() - 1.0).floor();
        let languages = counts
            .iter()
            .take_while(|(_, n)| *n as f64 >= threshold)
            .map(|(lang, _)| lang.clone())
            .collect();
        Self { languages, owners }
    }
}

struct PrimaryLanguagesExpiry {
    per_owner: HubConfig,
}

impl Expiry<u32, Arc<PrimaryLanguages>> for PrimaryLanguagesExpiry {
    fn expire_after_create(
        &self,
        _node: &u32,
        value: &Arc<PrimaryLanguages>,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(self.per_owner.primary_language_ttl(value.owners))
    }
}

/// Lookup caches with explicit keys and TTLs
#[derive(Clone)]
pub struct LookupCache {
    languages: Cache<(), Arc<LanguageDictionary>>,
    primary_languages: Cache<u32, Arc<PrimaryLanguages>>,
}

impl LookupCache {
    pub fn new(config: &HubConfig) -> Self {
        let languages = Cache::builder()
            .max_capacity(config.lookup_capacity())
            .time_to_live(config.language_ttl())
            .build();
        let primary_languages = Cache::builder()
            .max_capacity(config.lookup_capacity())
            .expire_after(PrimaryLanguagesExpiry {
                per_owner: config.clone(),
            })
            .build();
        Self {
            languages,
            primary_languages,
        }
    }

    /// The language dictionary, loaded on a miss
    pub fn languages(&self, load: impl FnOnce() -> LanguageDictionary) -> Arc<LanguageDictionary> {
        self.languages.get_with((), || Arc::new(load()))
    }

    /// Primary languages of a node, loaded on a miss
    pub fn primary_languages(
        &self,
        node: u32,
        load: impl FnOnce() -> Result<PrimaryLanguages>,
    ) -> Result<Arc<PrimaryLanguages>> {
        if let Some(hit) = self.primary_languages.get(&node) {
            return Ok(hit);
        }
        let value = Arc::new(load()?);
        self.primary_languages.insert(node, Arc::clone(&value));
        Ok(value)
    }

    /// Drop every cached lookup
    pub fn invalidate_all(&self) {
        self.languages.invalidate_all();
        self.primary_languages.invalidate_all();
    }
}

/// Site capabilities whose language list comes from the lookup cache
pub struct SiteCapabilities<'a> {
    pub defs: &'a SiteDefs,
    pub languages: Arc<LanguageDictionary>,
}

impl Capabilities for SiteCapabilities<'_> {
    fn cache_types(&self) -> Vec<CacheType> {
        self.defs.cache_types()
    }

    fn cache_sizes(&self) -> Vec<CacheSize> {
        self.defs.cache_sizes()
    }

    fn sizes_for(&self, cache_type: CacheType) -> Vec<CacheSize> {
        self.defs.sizes_for(cache_type)
    }

    fn password_max_length(&self, cache_type: CacheType) -> usize {
        self.defs.password_max_length(cache_type)
    }

    fn languages(&self, langprefs: &[String]) -> IndexMap<String, String> {
        localize_languages(&self.languages, langprefs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn counts(pairs: &[(&str, usize)]) -> Vec<(String, usize)> {
        pairs.iter().map(|(l, n)| (l.to_string(), *n)).collect()
    }

    #[test]
    fn test_primary_languages_threshold() {
        // 100 owners: floor(ln(100) - 1) = 3
        let primary =
            PrimaryLanguages::from_counts(&counts(&[("de", 80), ("en", 15), ("nl", 3), ("fr", 2)]), "en");
        assert_eq!(primary.languages, vec!["de", "en", "nl"]);
        assert_eq!(primary.owners, 100);
    }

    #[test]
    fn test_primary_languages_fall_back_to_site_language() {
        let primary = PrimaryLanguages::from_counts(&[], "PL");
        assert_eq!(primary.languages, vec!["pl"]);
        assert_eq!(primary.owners, 0);
    }

    #[test]
    fn test_single_owner_keeps_every_language() {
        let primary = PrimaryLanguages::from_counts(&counts(&[("pl", 1)]), "en");
        assert_eq!(primary.languages, vec!["pl"]);
    }

    #[test]
    fn test_languages_are_loaded_once() {
        let cache = LookupCache::new(&HubConfig::default());
        let loads = Cell::new(0);
        let load = || {
            loads.set(loads.get() + 1);
            let mut dict = LanguageDictionary::new();
            dict.insert("en".into(), IndexMap::new());
            dict
        };
        assert_eq!(cache.languages(load).len(), 1);
        assert_eq!(cache.languages(load).len(), 1);
        assert_eq!(loads.get(), 1);

        cache.invalidate_all();
        cache.languages(load);
        assert_eq!(loads.get(), 2);
    }

    #[test]
    fn test_primary_languages_are_cached_per_node() {
        let cache = LookupCache::new(&HubConfig::default());
        let loads = Cell::new(0);
        let load = || {
            loads.set(loads.get() + 1);
            Ok(PrimaryLanguages::from_counts(&counts(&[("de", 100)]), "en"))
        };
        cache.primary_languages(1, load).unwrap();
        cache.primary_languages(1, load).unwrap();
        assert_eq!(loads.get(), 1);
        cache.primary_languages(2, load).unwrap();
        assert_eq!(loads.get(), 2);
    }
}
