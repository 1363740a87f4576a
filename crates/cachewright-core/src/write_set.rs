//! Deferred writes for the commit phase
//!
//! Validation never touches storage. It collects [`PendingWrite`]s into a
//! [`WriteSet`], together with the [`Precondition`]s that must still hold
//! once the write transaction is open. `cachewright-hub` applies the set.
//!
//! Two levels of re-check exist:
//!
//! - set-level guards: if any fails, the whole set is a duplicate submission
//!   and nothing is written
//! - per-write checks built into a variant (see
//!   [`PendingWrite::InsertDescription`]): if it fails, only that write is
//!   skipped

use crate::cache::{CacheSize, CacheStatus, CacheType, Coords, HalfStars};
use crate::description::{Description, DescriptionPatch};
use crate::identity::{CacheId, LogId, UserId};
use crate::log::{FormattedComment, LogType};
use crate::stats::Transition;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// New value of one cache column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CacheField {
    Name(String),
    Type(CacheType),
    Size(CacheSize),
    Location(Coords),
    Difficulty(HalfStars),
    Terrain(HalfStars),
    TripTime(Option<f64>),
    TripDistance(Option<f64>),
    Password(String),
    GcCode(String),
}

impl CacheField {
    /// Request field name this change belongs to
    pub fn field_name(&self) -> &'static str {
        match self {
            CacheField::Name(_) => "name",
            CacheField::Type(_) => "type",
            CacheField::Size(_) => "size",
            CacheField::Location(_) => "location",
            CacheField::Difficulty(_) => "difficulty",
            CacheField::Terrain(_) => "terrain",
            CacheField::TripTime(_) => "trip_time",
            CacheField::TripDistance(_) => "trip_distance",
            CacheField::Password(_) => "passwd",
            CacheField::GcCode(_) => "gc_code",
        }
    }
}

/// A log entry that does not have a storage id yet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewLog {
    pub uuid: String,
    pub cache: CacheId,
    pub node: u32,
    pub author: UserId,
    pub log_type: LogType,
    pub date: DateTime<Utc>,
    pub comment: FormattedComment,
}

/// Race-sensitive condition re-evaluated inside the write transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Precondition {
    /// The log still has the type and date it was validated against
    LogUnchanged {
        log: LogId,
        log_type: LogType,
        date: DateTime<Utc>,
    },
    /// No active log of `log_type` by `author` exists on `cache`, other than `except`
    NoActiveLog {
        cache: CacheId,
        author: UserId,
        log_type: LogType,
        except: Option<LogId>,
    },
}

/// A pending write operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PendingWrite {
    /// Overwrite one cache column
    SetCacheField { cache: CacheId, field: CacheField },

    /// Stamp the cache's modification time
    TouchCache { cache: CacheId, at: DateTime<Utc> },

    /// Link an attribute; linking an existing one is a no-op
    AddAttribute { cache: CacheId, code: String },

    /// Unlink an attribute
    RemoveAttribute { cache: CacheId, code: String },

    /// Insert a description for a language that had none.
    ///
    /// Skipped if the language appeared since validation.
    InsertDescription(Description),

    /// Patch an existing description; deleted when it ends up empty and
    /// other languages exist
    PatchDescription {
        cache: CacheId,
        language: String,
        patch: DescriptionPatch,
        at: DateTime<Utc>,
    },

    /// Recompute the language list and the default description language
    RefreshDescriptionLanguages {
        cache: CacheId,
        priority: Vec<String>,
    },

    /// Store a new log entry under a fresh id
    InsertLog(NewLog),

    /// Rewrite type, date and optionally the comment of a log
    UpdateLog {
        log: LogId,
        log_type: LogType,
        date: DateTime<Utc>,
        comment: Option<FormattedComment>,
    },

    /// Move the cache counters and last-found date along a transition
    ApplyCacheStats {
        cache: CacheId,
        transition: Transition,
    },

    /// Move the author counters along a transition
    ApplyUserStats {
        user: UserId,
        transition: Transition,
    },

    /// Change availability through a status log
    SetCacheStatus { cache: CacheId, status: CacheStatus },

    /// Record a recommendation dated at the find
    SaveRecommendation {
        user: UserId,
        cache: CacheId,
        date: DateTime<Utc>,
    },

    /// Drop the recommendation if no active find remains, or re-date it
    ReconcileRecommendation { user: UserId, cache: CacheId },

    /// Record a score (1..=5) and fold it into the cache average
    AddScore {
        user: UserId,
        cache: CacheId,
        score: u8,
    },

    /// Remove the user's score and take it out of the cache average
    WithdrawScore { user: UserId, cache: CacheId },
}

/// Writes plus the guards that must hold before any of them is applied
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WriteSet {
    guards: Vec<Precondition>,
    writes: Vec<PendingWrite>,
}

impl WriteSet {
    /// Create a new empty WriteSet
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a pending write to the set
    pub fn push(&mut self, write: PendingWrite) {
        self.writes.push(write);
    }

    /// Require a precondition for the whole set
    pub fn guard(&mut self, precondition: Precondition) {
        self.guards.push(precondition);
    }

    /// Extend this WriteSet with guards and writes from another
    pub fn extend(&mut self, other: WriteSet) {
        self.guards.extend(other.guards);
        self.writes.extend(other.writes);
    }

    /// Get the number of pending writes
    pub fn len(&self) -> usize {
        self.writes.len()
    }

    /// Check if the WriteSet has no writes
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Get an iterator over the pending writes
    pub fn iter(&self) -> impl Iterator<Item = &PendingWrite> {
        self.writes.iter()
    }

    pub fn guards(&self) -> &[Precondition] {
        &self.guards
    }

    pub fn writes(&self) -> &[PendingWrite] {
        &self.writes
    }

    /// Whether a write for this cache column is already staged
    pub fn sets_field(&self, name: &str) -> bool {
        self.writes.iter().any(|w| {
            matches!(w, PendingWrite::SetCacheField { field, .. } if field.field_name() == name)
        })
    }

    /// Drop staged writes of one cache column
    pub fn unset_field(&mut self, name: &str) {
        self.writes.retain(|w| {
            !matches!(w, PendingWrite::SetCacheField { field, .. } if field.field_name() == name)
        });
    }

    /// Consume the WriteSet and return guards and writes
    pub fn into_parts(self) -> (Vec<Precondition>, Vec<PendingWrite>) {
        (self.guards, self.writes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_set_empty() {
        let ws = WriteSet::new();
        assert!(ws.is_empty());
        assert_eq!(ws.len(), 0);
        assert!(ws.guards().is_empty());
    }

    #[test]
    fn test_push_and_guard() {
        let mut ws = WriteSet::new();
        ws.push(PendingWrite::AddAttribute {
            cache: CacheId(1),
            code: "A1".into(),
        });
        ws.guard(Precondition::NoActiveLog {
            cache: CacheId(1),
            author: UserId(2),
            log_type: LogType::FoundIt,
            except: None,
        });
        assert_eq!(ws.len(), 1);
        assert_eq!(ws.guards().len(), 1);
    }

    #[test]
    fn test_field_lookup_and_removal() {
        let mut ws = WriteSet::new();
        ws.push(PendingWrite::SetCacheField {
            cache: CacheId(1),
            field: CacheField::Size(CacheSize::Small),
        });
        ws.push(PendingWrite::SetCacheField {
            cache: CacheId(1),
            field: CacheField::Type(CacheType::Multi),
        });
        assert!(ws.sets_field("size"));
        ws.unset_field("size");
        assert!(!ws.sets_field("size"));
        assert!(ws.sets_field("type"));
    }

    #[test]
    fn test_extend_merges_guards() {
        let mut a = WriteSet::new();
        let mut b = WriteSet::new();
        b.guard(Precondition::LogUnchanged {
            log: LogId(3),
            log_type: LogType::Comment,
            date: Utc::now(),
        });
        b.push(PendingWrite::WithdrawScore {
            user: UserId(1),
            cache: CacheId(1),
        });
        a.extend(b);
        let (guards, writes) = a.into_parts();
        assert_eq!(guards.len(), 1);
        assert_eq!(writes.len(), 1);
    }
}
