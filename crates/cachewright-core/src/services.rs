//! External collaborators consulted during validation
//!
//! The engine never reaches for global state: every lookup it needs goes
//! through one of these traits, supplied by the caller.

use crate::cache::{Cache, CacheSize, CacheType, User};
use crate::error::Result;
use crate::identity::{CacheId, UserId};
use crate::log::LogEntry;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Read access to persisted state, used before the write transaction opens
pub trait CacheReader {
    /// Cache snapshot by public code
    fn cache_by_code(&self, code: &str) -> Result<Option<Cache>>;

    /// Log snapshot by UUID
    fn log_by_uuid(&self, uuid: &str) -> Result<Option<LogEntry>>;

    /// Upper-case languages that currently have a description for the cache
    fn description_languages(&self, cache: CacheId) -> Result<Vec<String>>;

    /// All logs an author wrote on a cache, deleted ones included
    fn logs_by_author(&self, cache: CacheId, author: UserId) -> Result<Vec<LogEntry>>;

    fn user(&self, id: UserId) -> Result<Option<User>>;

    /// Number of caches the user currently recommends
    fn recommendation_count(&self, user: UserId) -> Result<u32>;

    fn has_recommended(&self, user: UserId, cache: CacheId) -> Result<bool>;
}

/// Catalog entry of an attribute code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeInfo {
    pub code: String,
    /// Display name, localized for the request
    pub name: String,
    /// Whether owners may add it to a listing
    pub addable: bool,
    /// Codes that must not coexist with this one
    pub incompatible: Vec<String>,
}

/// Attribute catalog, filtered to locally used codes
pub trait AttributeCatalog {
    fn attribute(&self, code: &str, langprefs: &[String]) -> Option<AttributeInfo>;
}

/// Site capabilities: which types, sizes, passwords and languages exist
pub trait Capabilities {
    /// Cache types used on this site
    fn cache_types(&self) -> Vec<CacheType>;

    /// Cache sizes used on this site
    fn cache_sizes(&self) -> Vec<CacheSize>;

    /// Sizes a cache of the given type may have
    fn sizes_for(&self, cache_type: CacheType) -> Vec<CacheSize>;

    /// Maximum log password length for the given type (0 = no password allowed)
    fn password_max_length(&self, cache_type: CacheType) -> usize;

    /// Lower-case language code → name localized for `langprefs`
    fn languages(&self, langprefs: &[String]) -> IndexMap<String, String>;
}

/// Message translation by language-preference list
pub trait Translator {
    /// Translate a message id; unknown ids come back unchanged
    fn translate(&self, msgid: &str, langprefs: &[String]) -> String;
}

/// Translator that always answers with the message id
#[derive(Debug, Clone, Copy, Default)]
pub struct Untranslated;

impl Translator for Untranslated {
    fn translate(&self, msgid: &str, _langprefs: &[String]) -> String {
        msgid.to_string()
    }
}

/// Sanitized HTML plus the value stored in the "is HTML" column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sanitized {
    pub html: String,
    pub html_flag: u8,
}

/// Rich-text sanitizer for user-supplied HTML
pub trait HtmlSanitizer {
    fn purify(&self, html: &str) -> Sanitized;
}

/// Sanitizer for trusted input: returns the HTML unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct TrustedHtml;

impl HtmlSanitizer for TrustedHtml {
    fn purify(&self, html: &str) -> Sanitized {
        Sanitized {
            html: html.to_string(),
            html_flag: 1,
        }
    }
}

/// Removes cached per-user derived files (statistics images and the like)
pub trait AssetInvalidator {
    fn invalidate_user_assets(&self, user: UserId) -> std::io::Result<()>;
}

/// Invalidator for deployments without derived assets
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAssets;

impl AssetInvalidator for NoAssets {
    fn invalidate_user_assets(&self, _user: UserId) -> std::io::Result<()> {
        Ok(())
    }
}
