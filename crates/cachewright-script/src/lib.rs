//! Cachewright Script - RON loader for site definitions
//!
//! Loads a site's configuration from RON files:
//! - Site settings (branch, node, language priority, grace window)
//! - Capability tables (local cache types, sizes per type, languages)
//! - Attribute catalog with incompatibility lists
//! - Message translations
//!
//! The resulting [`SiteDefs`] implements the core's `Capabilities`,
//! `AttributeCatalog` and `Translator`.

mod catalog;
mod error;
mod loader;
mod schema;

pub use catalog::localize_languages;
pub use error::{Error, Result};
pub use loader::{Loader, SiteDefs};
pub use schema::attribute::AttributeDefs;
pub use schema::capability::ResolvedCapabilities;
pub use schema::{pick_best_language, AttributeDef, CapabilityDefs, LanguageDef, MessageDef, SiteSettings};
