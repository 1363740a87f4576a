//! Capability tables: which types, sizes and languages a site uses

use crate::error::{Error, Result};
use cachewright_core::{CacheSize, CacheType};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A description language with its names in other languages
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguageDef {
    /// Lower-case ISO 639-1 code
    pub code: String,
    /// Name of the language by lower-case language code
    pub names: IndexMap<String, String>,
}

/// Site-local cache types, sizes and languages
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CapabilityDefs {
    /// Type names in listing order, e.g. `"Traditional"`
    pub cache_types: Vec<String>,
    /// Size names in listing order, e.g. `"small"`
    pub cache_sizes: Vec<String>,
    /// Sizes allowed per type; unlisted types allow every size but `"none"`
    #[serde(default)]
    pub sizes_by_type: IndexMap<String, Vec<String>>,
    #[serde(default)]
    pub languages: Vec<LanguageDef>,
}

/// Capability tables after name resolution
#[derive(Debug, Clone, Default)]
pub struct ResolvedCapabilities {
    pub cache_types: Vec<CacheType>,
    pub cache_sizes: Vec<CacheSize>,
    pub sizes_by_type: IndexMap<CacheType, Vec<CacheSize>>,
}

fn resolve_type(name: &str) -> Result<CacheType> {
    CacheType::from_name(name)
        .ok_or_else(|| Error::InvalidSchema(format!("unknown cache type '{}'", name)))
}

fn resolve_size(name: &str) -> Result<CacheSize> {
    CacheSize::from_name(name)
        .ok_or_else(|| Error::InvalidSchema(format!("unknown cache size '{}'", name)))
}

impl CapabilityDefs {
    /// Turn names into typed values, rejecting unknown and repeated entries
    pub fn resolve(&self) -> Result<ResolvedCapabilities> {
        let mut resolved = ResolvedCapabilities::default();
        for name in &self.cache_types {
            let t = resolve_type(name)?;
            if resolved.cache_types.contains(&t) {
                return Err(Error::DuplicateDefinition(format!("cache type {}", name)));
            }
            resolved.cache_types.push(t);
        }
        for name in &self.cache_sizes {
            let s = resolve_size(name)?;
            if resolved.cache_sizes.contains(&s) {
                return Err(Error::DuplicateDefinition(format!("cache size {}", name)));
            }
            resolved.cache_sizes.push(s);
        }
        for (type_name, sizes) in &self.sizes_by_type {
            let t = resolve_type(type_name)?;
            let sizes = sizes
                .iter()
                .map(|s| resolve_size(s))
                .collect::<Result<Vec<_>>>()?;
            resolved.sizes_by_type.insert(t, sizes);
        }
        Ok(resolved)
    }
}

impl ResolvedCapabilities {
    pub fn sizes_for(&self, cache_type: CacheType) -> Vec<CacheSize> {
        match self.sizes_by_type.get(&cache_type) {
            Some(sizes) => sizes.clone(),
            None => self
                .cache_sizes
                .iter()
                .copied()
                .filter(|s| *s != CacheSize::None)
                .collect(),
        }
    }
}
