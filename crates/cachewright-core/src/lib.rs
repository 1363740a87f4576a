//! Cachewright Core - validation rules for geocache edits and log publication
//!
//! This crate is pure domain logic. It never touches storage; it reads
//! typed snapshots and produces staged writes:
//! - Typed snapshots (`Cache`, `LogEntry`, `User`) and identifiers
//! - The branch policy adapter, the single seam for site-specific rules
//! - Cache mutation validator and attribute reconciler
//! - Description lifecycle and default-language recomputation
//! - Log publication rule engine
//! - Statistics delta tables
//!
//! ## Two failure channels
//!
//! Hard failures (`MissingParameter`, `InvalidParameter`, `CannotPublish`,
//! `ConsistencyFault`, ...) travel as [`Error`] and abort the request.
//! Soft validation failures accumulate in [`Problems`], keyed by field,
//! and only prevent the commit.
//!
//! ## Commit model
//!
//! Validators return a [`WriteSet`]: pending writes plus the preconditions
//! to re-check once the write transaction is open. `cachewright-hub`
//! applies it.

pub mod attributes;
pub mod branch;
mod cache;
pub mod description;
mod error;
mod i18n;
mod identity;
mod log;
pub mod log_rules;
mod problems;
pub mod services;
pub mod stats;
pub mod text;
pub mod time;
pub mod validator;
pub mod write_set;

#[cfg(test)]
mod testing;

pub use attributes::{reconcile, AttributeDelta};
pub use branch::{Branch, BranchPolicy, DePolicy, PlPolicy};
pub use cache::{
    Cache, CacheSize, CacheStats, CacheStatus, CacheType, Coords, HalfStars, RatingStats, User,
    UserStats,
};
pub use description::{Description, DescriptionEdit, DescriptionFate, DescriptionPatch};
pub use error::{Error, Result};
pub use i18n::{fill_placeholders, Messages};
pub use identity::{CacheId, LogId, UserId};
pub use log::{CommentFormat, FormattedComment, LogEntry, LogType};
pub use log_rules::{LogContext, LogEdit, LogSubmission, StagedLog};
pub use problems::Problems;
pub use services::{
    AssetInvalidator, AttributeCatalog, AttributeInfo, CacheReader, Capabilities, HtmlSanitizer,
    NoAssets, Sanitized, Translator, TrustedHtml, Untranslated,
};
pub use stats::{CounterDelta, LastFoundUpdate, Transition, Visit};
pub use time::{Clock, FixedClock, SystemClock};
pub use validator::{validate_cache_edit, CacheEdit, EditContext, StagedEdit};
pub use write_set::{CacheField, NewLog, PendingWrite, Precondition, WriteSet};
