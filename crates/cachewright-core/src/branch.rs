//! Branch policy adapter
//!
//! Two backend dialects share this engine. They differ in schema and in a
//! handful of business rules; every such difference is a method on
//! [`BranchPolicy`], and no other module looks at which branch is active.

use crate::cache::CacheType;
use crate::error::{Error, Result};
use crate::log::LogEntry;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Backend dialect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Branch {
    /// `oc.de`: trigger-maintained statistics, multiple finds allowed
    De,
    /// `oc.pl`: manual statistics, one find per user, scores and statpics
    Pl,
}

impl Branch {
    pub fn name(&self) -> &'static str {
        match self {
            Branch::De => "oc.de",
            Branch::Pl => "oc.pl",
        }
    }

    /// The policy object for this branch
    pub fn policy(&self) -> Box<dyn BranchPolicy> {
        match self {
            Branch::De => Box::new(DePolicy),
            Branch::Pl => Box::new(PlPolicy),
        }
    }
}

impl FromStr for Branch {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "oc.de" => Ok(Branch::De),
            "oc.pl" => Ok(Branch::Pl),
            other => Err(Error::invalid_because(
                "branch",
                format!("unknown branch '{}'", other),
            )),
        }
    }
}

impl TryFrom<String> for Branch {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<Branch> for String {
    fn from(branch: Branch) -> Self {
        branch.name().to_string()
    }
}

impl fmt::Display for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Every site-specific rule, queried by the validators and the coordinator
pub trait BranchPolicy: Send + Sync {
    /// Branch name, for diagnostics only
    fn name(&self) -> &'static str;

    /// Cache and user counters are kept current by database triggers
    fn stats_maintained_by_triggers(&self) -> bool;

    /// Edits must stamp `last_modified` explicitly
    fn touches_last_modified(&self) -> bool;

    /// A non-empty log password is refused for this type and creation date
    fn password_forbidden(&self, cache_type: CacheType, date_created: DateTime<Utc>) -> bool;

    /// Password length limit given the column's physical length
    fn password_max_length(&self, cache_type: CacheType, column_length: usize) -> usize;

    /// Changing a cache to `new_type` wipes its log password
    fn clears_password_on_type_change(&self, new_type: CacheType) -> bool;

    /// Original-format tag stored for plaintext comments
    fn plaintext_format_tag(&self) -> u8;

    /// Soft-delete predicate: does this log still count?
    fn is_log_active(&self, log: &LogEntry) -> bool;

    /// A user may log more than one find per cache
    fn allows_multiple_finds(&self) -> bool;

    /// Caches carry a user score table and running average
    fn has_ratings(&self) -> bool;

    /// Recommendations keep the date of the latest find
    fn refreshes_recommendation_date(&self) -> bool;

    /// Per-user derived assets must be deleted after stat changes
    fn invalidates_user_assets(&self) -> bool;
}

/// Rules of the `oc.de` branch
#[derive(Debug, Clone, Copy, Default)]
pub struct DePolicy;

impl BranchPolicy for DePolicy {
    fn name(&self) -> &'static str {
        Branch::De.name()
    }

    fn stats_maintained_by_triggers(&self) -> bool {
        true
    }

    fn touches_last_modified(&self) -> bool {
        false
    }

    fn password_forbidden(&self, _cache_type: CacheType, _date_created: DateTime<Utc>) -> bool {
        false
    }

    fn password_max_length(&self, _cache_type: CacheType, column_length: usize) -> usize {
        column_length
    }

    fn clears_password_on_type_change(&self, _new_type: CacheType) -> bool {
        false
    }

    fn plaintext_format_tag(&self) -> u8 {
        0
    }

    // deleted logs are moved to an archive table, so whatever is left counts
    fn is_log_active(&self, _log: &LogEntry) -> bool {
        true
    }

    fn allows_multiple_finds(&self) -> bool {
        true
    }

    fn has_ratings(&self) -> bool {
        false
    }

    fn refreshes_recommendation_date(&self) -> bool {
        true
    }

    fn invalidates_user_assets(&self) -> bool {
        false
    }
}

/// Rules of the `oc.pl` branch
#[derive(Debug, Clone, Copy, Default)]
pub struct PlPolicy;

impl PlPolicy {
    /// Traditional caches created after this instant may not have a password
    pub fn traditional_password_cutoff() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2010, 6, 18, 20, 3, 18)
            .single()
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

impl BranchPolicy for PlPolicy {
    fn name(&self) -> &'static str {
        Branch::Pl.name()
    }

    fn stats_maintained_by_triggers(&self) -> bool {
        false
    }

    fn touches_last_modified(&self) -> bool {
        true
    }

    fn password_forbidden(&self, cache_type: CacheType, date_created: DateTime<Utc>) -> bool {
        cache_type == CacheType::Traditional && date_created > Self::traditional_password_cutoff()
    }

    fn password_max_length(&self, cache_type: CacheType, column_length: usize) -> usize {
        if cache_type == CacheType::Traditional {
            0
        } else {
            column_length
        }
    }

    fn clears_password_on_type_change(&self, new_type: CacheType) -> bool {
        new_type != CacheType::Traditional
    }

    fn plaintext_format_tag(&self) -> u8 {
        2
    }

    fn is_log_active(&self, log: &LogEntry) -> bool {
        !log.deleted
    }

    fn allows_multiple_finds(&self) -> bool {
        false
    }

    fn has_ratings(&self) -> bool {
        true
    }

    fn refreshes_recommendation_date(&self) -> bool {
        false
    }

    fn invalidates_user_assets(&self) -> bool {
        true
    }
}
