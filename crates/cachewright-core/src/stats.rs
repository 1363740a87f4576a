//! Statistics delta tables
//!
//! Counters are never recounted on the hot path. Each log transition maps to
//! a signed delta, applied with a floor at zero, plus a decision on how the
//! cache's last-found timestamp moves.

use crate::branch::BranchPolicy;
use crate::cache::{CacheStats, RatingStats, UserStats};
use crate::identity::UserId;
use crate::log::{LogEntry, LogType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Type and date of a log at one point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Visit {
    pub log_type: LogType,
    pub date: DateTime<Utc>,
}

impl Visit {
    pub fn new(log_type: LogType, date: DateTime<Utc>) -> Self {
        Self { log_type, date }
    }
}

/// Old → new state of a log. A publish has no old state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub old: Option<Visit>,
    pub new: Visit,
}

impl Transition {
    /// Transition of a freshly published log
    pub fn publish(new: Visit) -> Self {
        Self { old: None, new }
    }

    /// Transition of an edited log
    pub fn edit(old: Visit, new: Visit) -> Self {
        Self {
            old: Some(old),
            new,
        }
    }

    pub fn old_type(&self) -> Option<LogType> {
        self.old.map(|v| v.log_type)
    }

    pub fn type_changed(&self) -> bool {
        self.old_type() != Some(self.new.log_type)
    }

    /// The log used to be a find and is now of another type
    pub fn leaves_find(&self) -> bool {
        self.old_type().is_some_and(|t| t.is_find()) && self.type_changed()
    }
}

/// Signed change of the three log counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterDelta {
    pub founds: i32,
    pub notfounds: i32,
    pub notes: i32,
}

impl CounterDelta {
    fn shift(&mut self, slot: Option<Slot>, by: i32) {
        match slot {
            Some(Slot::Found) => self.founds += by,
            Some(Slot::NotFound) => self.notfounds += by,
            Some(Slot::Note) => self.notes += by,
            None => {}
        }
    }

    /// Delta of the cache counters for a transition
    pub fn for_cache(transition: &Transition) -> Self {
        let mut delta = Self::default();
        delta.shift(transition.old_type().and_then(cache_slot), -1);
        delta.shift(cache_slot(transition.new.log_type), 1);
        delta
    }

    /// Delta of the author counters for a transition
    ///
    /// Only "Found it", "Didn't find it" and "Comment" count here; event
    /// attendance does not show up in user statistics.
    pub fn for_user(transition: &Transition) -> Self {
        let mut delta = Self::default();
        delta.shift(transition.old_type().and_then(user_slot), -1);
        delta.shift(user_slot(transition.new.log_type), 1);
        delta
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }

    pub fn net(&self) -> i32 {
        self.founds + self.notfounds + self.notes
    }

    pub fn apply_to_cache(&self, stats: &mut CacheStats) {
        stats.founds = clamp_add(stats.founds, self.founds);
        stats.notfounds = clamp_add(stats.notfounds, self.notfounds);
        stats.notes = clamp_add(stats.notes, self.notes);
    }

    pub fn apply_to_user(&self, stats: &mut UserStats) {
        stats.founds = clamp_add(stats.founds, self.founds);
        stats.notfounds = clamp_add(stats.notfounds, self.notfounds);
        stats.notes = clamp_add(stats.notes, self.notes);
    }
}

#[derive(Debug, Clone, Copy)]
enum Slot {
    Found,
    NotFound,
    Note,
}

fn cache_slot(log_type: LogType) -> Option<Slot> {
    if log_type.is_find() {
        Some(Slot::Found)
    } else if log_type.is_not_found() {
        Some(Slot::NotFound)
    } else if log_type == LogType::Comment {
        Some(Slot::Note)
    } else {
        None
    }
}

fn user_slot(log_type: LogType) -> Option<Slot> {
    match log_type {
        LogType::FoundIt => Some(Slot::Found),
        LogType::DidNotFindIt => Some(Slot::NotFound),
        LogType::Comment => Some(Slot::Note),
        _ => None,
    }
}

fn clamp_add(value: u32, delta: i32) -> u32 {
    let sum = i64::from(value) + i64::from(delta);
    u32::try_from(sum.max(0)).unwrap_or(u32::MAX)
}

/// How the last-found timestamp reacts to a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LastFoundUpdate {
    /// Raise it to this date if it is later
    Bump(DateTime<Utc>),
    /// Recompute from the active find logs
    Recompute,
    Keep,
}

impl LastFoundUpdate {
    pub fn for_transition(transition: &Transition, delta: &CounterDelta) -> Self {
        let is_find = transition.new.log_type.is_find();
        let when = transition.new.date;
        let moved_later = transition.old.is_some_and(|old| when > old.date);
        let moved_earlier = transition.old.is_some_and(|old| when < old.date);

        if delta.founds > 0 || (delta.founds == 0 && is_find && moved_later) {
            LastFoundUpdate::Bump(when)
        } else if delta.founds < 0 || (is_find && moved_earlier) {
            LastFoundUpdate::Recompute
        } else {
            LastFoundUpdate::Keep
        }
    }

    /// Apply a bump; recompute needs the log history and is handled by the caller
    pub fn bump(current: Option<DateTime<Utc>>, when: DateTime<Utc>) -> Option<DateTime<Utc>> {
        Some(current.map_or(when, |c| c.max(when)))
    }
}

/// Latest date of the active find logs in `logs`
pub fn recompute_last_found<'a>(
    logs: impl IntoIterator<Item = &'a LogEntry>,
    policy: &dyn BranchPolicy,
) -> Option<DateTime<Utc>> {
    logs.into_iter()
        .filter(|log| log.log_type.is_find() && policy.is_log_active(log))
        .map(|log| log.date)
        .max()
}

/// Rating after adding one vote of `score`
pub fn add_vote(rating: RatingStats, score: f64) -> RatingStats {
    let votes = f64::from(rating.votes);
    RatingStats {
        score: (rating.score * votes + score) / (votes + 1.0),
        votes: rating.votes + 1,
    }
}

/// Rating after withdrawing one vote of `score`
pub fn withdraw_vote(rating: RatingStats, score: f64) -> RatingStats {
    let votes = f64::from(rating.votes);
    let remaining = rating.votes.saturating_sub(1);
    RatingStats {
        score: (rating.score * votes - score) / f64::from(remaining.max(1)),
        votes: remaining,
    }
}

/// Users whose derived assets are stale after a log transition
pub fn users_to_invalidate(
    policy: &dyn BranchPolicy,
    transition: &Transition,
    actor: UserId,
    owner: UserId,
) -> Vec<UserId> {
    if !policy.invalidates_user_assets() || !transition.type_changed() {
        return Vec::new();
    }
    let types = [transition.old_type(), Some(transition.new.log_type)];
    let mut users = Vec::new();
    if types.iter().flatten().any(|t| t.is_find()) {
        users.push(actor);
    }
    if types.iter().flatten().any(|t| t.status_effect().is_some()) && !users.contains(&owner) {
        users.push(owner);
    }
    users
}
