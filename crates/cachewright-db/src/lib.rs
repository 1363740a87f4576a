//! Cachewright DB - Database layer using native_db
//!
//! Provides persistent storage for:
//! - Cache listings, their attribute links and per-language descriptions
//! - Log entries with soft-delete flag, and the users who wrote them
//! - Recommendations and scores keyed by (user, cache)
//!
//! Read queries implement the core's `CacheReader`; writes go through a
//! [`Tx`] opened with [`Store::begin`].

mod error;
mod models;
mod queries;
mod store;
mod tx;

pub use error::{Error, Result};
pub use store::{Store, LOG_SEQUENCE};
pub use tx::Tx;
