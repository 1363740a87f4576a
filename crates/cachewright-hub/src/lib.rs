//! Cachewright Hub - transaction coordinator for geocache edits and logs
//!
//! This crate wires the pure validators of `cachewright-core` to the
//! `native_db` store and the RON site definitions.
//!
//! ## Architecture
//!
//! ```text
//! Hub (owns store, site definitions, collaborators)
//!  │
//!  ├── LookupCache ← language dictionary, primary languages (moka, TTL)
//!  │
//!  ├── cachewright-core ← validate, stage a WriteSet
//!  │
//!  └── commit::apply ← re-check guards, apply writes, commit
//! ```
//!
//! ## Key Components
//!
//! - [`Hub`]: the three operations: `edit_cache`, `publish_log`, `edit_log`
//! - [`commit::apply`]: applies a WriteSet inside one write transaction
//! - [`LookupCache`]: read-through caches with explicit keys and TTLs
//! - [`FileAssetInvalidator`]: removes stale statistics images

mod assets;
pub mod commit;
mod config;
mod error;
mod hub;
pub mod lookup;

pub use assets::FileAssetInvalidator;
pub use commit::{apply, CommitResult, CommitStatus};
pub use config::HubConfig;
pub use error::{Error, Result};
pub use hub::{EditOutcome, Hub, LogEditOutcome, PublishOutcome};
pub use lookup::{LanguageDictionary, LookupCache, PrimaryLanguages, SiteCapabilities};
