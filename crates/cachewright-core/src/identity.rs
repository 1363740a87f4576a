//! Identity types for caches, users and log entries

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub u64);

        impl $name {
            /// Create a new ID
            pub fn new(id: u64) -> Self {
                Self(id)
            }

            /// Get the raw ID value
            pub fn raw(&self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, ":{}"), self.0)
            }
        }
    };
}

numeric_id!(
    /// Internal identifier of a geocache listing
    CacheId,
    "cache"
);

numeric_id!(
    /// Internal identifier of a user (owner, log author, actor)
    UserId,
    "user"
);

numeric_id!(
    /// Internal identifier of a log entry
    LogId,
    "log"
);
