//! WriteSet application inside one write transaction
//!
//! Validation happens before the transaction opens. Once it is open, the
//! set-level guards are re-evaluated against committed state:
//!
//! - every guard holds: the writes are applied in order and committed
//! - a guard fails: the submission is a duplicate, nothing is written and
//!   the transaction is dropped
//!
//! Writes that carry their own existence check (a description insert whose
//! language appeared in the meantime, a withdrawal of a score that is
//! already gone) are skipped individually.
//!
//! On branches whose counters are maintained by database triggers, the
//! trigger effect is emulated by replaying the counters from the log
//! history after each log insert or update.

use crate::error::Result;
use cachewright_core::description::default_language;
use cachewright_core::stats::{add_vote, recompute_last_found, withdraw_vote};
use cachewright_core::{
    BranchPolicy, CacheId, CounterDelta, DescriptionFate, LastFoundUpdate, LogEntry,
    PendingWrite, Precondition, Transition, UserId, WriteSet,
};
use cachewright_db::{Error as DbError, Store, Tx};
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

/// How a write set ended up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitStatus {
    /// Writes were applied and committed
    Applied,
    /// Nothing needed writing
    Unchanged,
    /// A guard failed inside the transaction; nothing was written
    Duplicate,
}

/// Result of applying a write set
#[derive(Debug, Clone, PartialEq)]
pub struct CommitResult {
    pub status: CommitStatus,
    /// The inserted log, or the already existing one on a duplicate
    pub log: Option<LogEntry>,
    /// Writes applied
    pub applied: usize,
    /// Writes skipped by their own re-check
    pub skipped: usize,
}

impl CommitResult {
    fn new(status: CommitStatus) -> Self {
        Self {
            status,
            log: None,
            applied: 0,
            skipped: 0,
        }
    }
}

enum GuardCheck {
    Holds,
    Violated(Option<LogEntry>),
}

/// Apply a WriteSet atomically
///
/// An empty set opens no transaction and reports [`CommitStatus::Unchanged`].
/// `at` stamps modification times.
pub fn apply(
    store: &Store,
    write_set: WriteSet,
    policy: &dyn BranchPolicy,
    at: DateTime<Utc>,
) -> Result<CommitResult> {
    if write_set.is_empty() {
        return Ok(CommitResult::new(CommitStatus::Unchanged));
    }
    let (guards, writes) = write_set.into_parts();

    let tx = store.begin()?;
    for guard in &guards {
        if let GuardCheck::Violated(existing) = check_guard(&tx, guard, policy)? {
            warn!(?guard, "precondition no longer holds, skipping duplicate submission");
            let mut result = CommitResult::new(CommitStatus::Duplicate);
            result.log = existing;
            return Ok(result);
        }
    }

    let mut result = CommitResult::new(CommitStatus::Applied);
    for write in writes {
        if apply_write(&tx, write, policy, at, &mut result)? {
            result.applied += 1;
        } else {
            result.skipped += 1;
        }
    }
    tx.commit()?;
    debug!(
        applied = result.applied,
        skipped = result.skipped,
        "write set committed"
    );
    Ok(result)
}

fn check_guard(
    tx: &Tx<'_>,
    guard: &Precondition,
    policy: &dyn BranchPolicy,
) -> Result<GuardCheck> {
    match guard {
        Precondition::LogUnchanged {
            log,
            log_type,
            date,
        } => match tx.log(*log)? {
            Some(current)
                if current.log_type == *log_type
                    && current.date == *date
                    && policy.is_log_active(&current) =>
            {
                Ok(GuardCheck::Holds)
            }
            current => Ok(GuardCheck::Violated(current)),
        },
        Precondition::NoActiveLog {
            cache,
            author,
            log_type,
            except,
        } => {
            let existing = tx.logs_of_cache(*cache)?.into_iter().find(|l| {
                l.author == *author
                    && l.log_type == *log_type
                    && policy.is_log_active(l)
                    && Some(l.id) != *except
            });
            Ok(match existing {
                Some(log) => GuardCheck::Violated(Some(log)),
                None => GuardCheck::Holds,
            })
        }
    }
}

/// Apply one write; `false` when its own re-check skipped it
fn apply_write(
    tx: &Tx<'_>,
    write: PendingWrite,
    policy: &dyn BranchPolicy,
    at: DateTime<Utc>,
    result: &mut CommitResult,
) -> Result<bool> {
    match write {
        PendingWrite::SetCacheField { cache, field } => {
            tx.set_cache_field(cache, &field)?;
        }
        PendingWrite::TouchCache { cache, at } => {
            tx.touch_cache(cache, at)?;
        }
        PendingWrite::AddAttribute { cache, code } => {
            return Ok(tx.add_attribute(cache, &code)?);
        }
        PendingWrite::RemoveAttribute { cache, code } => {
            return Ok(tx.remove_attribute(cache, &code)?);
        }
        PendingWrite::InsertDescription(description) => {
            if !tx.insert_description(&description)? {
                warn!(
                    cache = %description.cache,
                    language = %description.language,
                    "description already exists, skipping insert"
                );
                return Ok(false);
            }
        }
        PendingWrite::PatchDescription {
            cache,
            language,
            patch,
            at,
        } => {
            let Some(existing) = tx.description(cache, &language)? else {
                warn!(%cache, %language, "description vanished, skipping patch");
                return Ok(false);
            };
            let others = tx
                .description_languages(cache)?
                .iter()
                .any(|l| !l.eq_ignore_ascii_case(&language));
            match patch.resolve(existing, others, at) {
                DescriptionFate::Update(description) => tx.put_description(&description)?,
                DescriptionFate::Delete => {
                    return Ok(tx.delete_description(cache, &language)?);
                }
            }
        }
        PendingWrite::RefreshDescriptionLanguages { cache, priority } => {
            let languages = tx.description_languages(cache)?;
            let (joined, default) = default_language(&priority, &languages);
            tx.set_description_languages(cache, &joined, &default)?;
        }
        PendingWrite::InsertLog(log) => {
            let entry = tx.insert_log(&log, at)?;
            if policy.stats_maintained_by_triggers() {
                replay_counters(tx, entry.cache, entry.author, policy)?;
            }
            result.log = Some(entry);
        }
        PendingWrite::UpdateLog {
            log,
            log_type,
            date,
            comment,
        } => {
            tx.update_log(log, log_type, date, comment.as_ref(), at)?;
            if policy.stats_maintained_by_triggers() {
                let entry = tx
                    .log(log)?
                    .ok_or_else(|| DbError::NotFound(log.to_string()))?;
                replay_counters(tx, entry.cache, entry.author, policy)?;
            }
        }
        PendingWrite::ApplyCacheStats { cache, transition } => {
            apply_cache_stats(tx, cache, &transition, policy)?;
        }
        PendingWrite::ApplyUserStats { user, transition } => {
            let mut stats = tx.user_stats(user)?;
            CounterDelta::for_user(&transition).apply_to_user(&mut stats);
            tx.set_user_stats(user, &stats)?;
        }
        PendingWrite::SetCacheStatus { cache, status } => {
            tx.set_cache_status(cache, status)?;
        }
        PendingWrite::SaveRecommendation { user, cache, date } => {
            tx.save_recommendation(user, cache, date)?;
        }
        PendingWrite::ReconcileRecommendation { user, cache } => {
            return reconcile_recommendation(tx, user, cache, policy);
        }
        PendingWrite::AddScore { user, cache, score } => {
            let mut rating = tx.rating(cache)?;
            if let Some(previous) = tx.score(user, cache)? {
                rating = withdraw_vote(rating, f64::from(previous));
            }
            tx.save_score(user, cache, score)?;
            tx.set_rating(cache, add_vote(rating, f64::from(score)))?;
        }
        PendingWrite::WithdrawScore { user, cache } => {
            let Some(score) = tx.delete_score(user, cache)? else {
                return Ok(false);
            };
            let rating = withdraw_vote(tx.rating(cache)?, f64::from(score));
            tx.set_rating(cache, rating)?;
        }
    }
    Ok(true)
}

fn apply_cache_stats(
    tx: &Tx<'_>,
    cache: CacheId,
    transition: &Transition,
    policy: &dyn BranchPolicy,
) -> Result<()> {
    let delta = CounterDelta::for_cache(transition);
    let mut stats = tx.cache_stats(cache)?;
    delta.apply_to_cache(&mut stats);
    match LastFoundUpdate::for_transition(transition, &delta) {
        LastFoundUpdate::Bump(when) => {
            stats.last_found = LastFoundUpdate::bump(stats.last_found, when);
        }
        LastFoundUpdate::Recompute => {
            stats.last_found = recompute_last_found(&tx.logs_of_cache(cache)?, policy);
        }
        LastFoundUpdate::Keep => {}
    }
    tx.set_cache_stats(cache, &stats)?;
    Ok(())
}

fn replay_counters(
    tx: &Tx<'_>,
    cache: CacheId,
    author: UserId,
    policy: &dyn BranchPolicy,
) -> Result<()> {
    tx.replay_cache_stats(cache, policy)?;
    tx.replay_user_stats(author, policy)?;
    Ok(())
}

fn reconcile_recommendation(
    tx: &Tx<'_>,
    user: UserId,
    cache: CacheId,
    policy: &dyn BranchPolicy,
) -> Result<bool> {
    if tx.recommendation(user, cache)?.is_none() {
        return Ok(false);
    }
    let latest_find = tx
        .logs_of_cache(cache)?
        .iter()
        .filter(|l| l.author == user && l.log_type.is_find() && policy.is_log_active(l))
        .map(|l| l.date)
        .max();
    match latest_find {
        None => Ok(tx.delete_recommendation(user, cache)?),
        Some(date) if policy.refreshes_recommendation_date() => {
            tx.save_recommendation(user, cache, date)?;
            Ok(true)
        }
        Some(_) => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cachewright_core::{
        Cache, CacheType, DePolicy, Description, FormattedComment, LogType, NewLog,
        PlPolicy, User, Visit,
    };
    use chrono::TimeZone;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, 9, 0, 0).unwrap()
    }

    fn seeded() -> Store {
        let store = Store::in_memory().unwrap();
        let cache = Cache::new(CacheId(1), "OP0001", UserId(10), CacheType::Traditional, at(1));
        store.save_cache(&cache).unwrap();
        store.save_user(&User::new(UserId(10), "owner")).unwrap();
        store.save_user(&User::new(UserId(20), "finder")).unwrap();
        store
    }

    fn new_log(uuid: &str, log_type: LogType, day: u32) -> NewLog {
        NewLog {
            uuid: uuid.to_string(),
            cache: CacheId(1),
            node: 0,
            author: UserId(20),
            log_type,
            date: at(day),
            comment: FormattedComment {
                html: "TFTC".into(),
                format_tag: 1,
            },
        }
    }

    fn description(language: &str) -> Description {
        Description {
            cache: CacheId(1),
            language: language.to_string(),
            full: "<p>Hello</p>".into(),
            full_html_flag: 1,
            short: String::new(),
            hint: String::new(),
            created: at(2),
            modified: at(2),
        }
    }

    #[test]
    fn test_empty_set_is_unchanged() {
        let store = seeded();
        let result = apply(&store, WriteSet::new(), &PlPolicy, at(5)).unwrap();
        assert_eq!(result.status, CommitStatus::Unchanged);
    }

    #[test]
    fn test_second_description_insert_is_skipped() {
        let store = seeded();
        for _ in 0..2 {
            let mut ws = WriteSet::new();
            ws.push(PendingWrite::InsertDescription(description("EN")));
            ws.push(PendingWrite::RefreshDescriptionLanguages {
                cache: CacheId(1),
                priority: vec![],
            });
            apply(&store, ws, &PlPolicy, at(5)).unwrap();
        }
        assert_eq!(store.descriptions(CacheId(1)).unwrap().len(), 1);

        let mut ws = WriteSet::new();
        ws.push(PendingWrite::InsertDescription(description("EN")));
        let result = apply(&store, ws, &PlPolicy, at(5)).unwrap();
        assert_eq!(result.status, CommitStatus::Applied);
        assert_eq!(result.skipped, 1);

        let cache = store.find_cache("OP0001").unwrap().unwrap();
        assert_eq!(cache.desc_languages, "EN");
        assert_eq!(cache.default_desc_lang, "EN");
    }

    #[test]
    fn test_failed_guard_writes_nothing() {
        let store = seeded();
        let mut first = WriteSet::new();
        first.push(PendingWrite::InsertLog(new_log("first", LogType::FoundIt, 2)));
        apply(&store, first, &PlPolicy, at(5)).unwrap();

        let mut second = WriteSet::new();
        second.guard(Precondition::NoActiveLog {
            cache: CacheId(1),
            author: UserId(20),
            log_type: LogType::FoundIt,
            except: None,
        });
        second.push(PendingWrite::InsertLog(new_log("second", LogType::FoundIt, 3)));
        let result = apply(&store, second, &PlPolicy, at(5)).unwrap();

        assert_eq!(result.status, CommitStatus::Duplicate);
        assert_eq!(result.log.unwrap().uuid, "first");
        assert!(store.find_log("second").unwrap().is_none());
    }

    #[test]
    fn test_log_unchanged_guard() {
        let store = seeded();
        let mut ws = WriteSet::new();
        ws.push(PendingWrite::InsertLog(new_log("a", LogType::Comment, 2)));
        let log = apply(&store, ws, &PlPolicy, at(5)).unwrap().log.unwrap();

        let mut stale = WriteSet::new();
        stale.guard(Precondition::LogUnchanged {
            log: log.id,
            log_type: LogType::FoundIt,
            date: log.date,
        });
        stale.push(PendingWrite::UpdateLog {
            log: log.id,
            log_type: LogType::DidNotFindIt,
            date: log.date,
            comment: None,
        });
        let result = apply(&store, stale, &PlPolicy, at(5)).unwrap();
        assert_eq!(result.status, CommitStatus::Duplicate);
        assert_eq!(store.find_log("a").unwrap().unwrap().log_type, LogType::Comment);
    }

    #[test]
    fn test_log_deleted_meanwhile_is_duplicate() {
        let store = seeded();
        let mut ws = WriteSet::new();
        ws.push(PendingWrite::InsertLog(new_log("a", LogType::FoundIt, 2)));
        let mut log = apply(&store, ws, &PlPolicy, at(5)).unwrap().log.unwrap();
        log.deleted = true;
        store.save_log(&log).unwrap();

        let mut edit = WriteSet::new();
        edit.guard(Precondition::LogUnchanged {
            log: log.id,
            log_type: LogType::FoundIt,
            date: log.date,
        });
        edit.push(PendingWrite::UpdateLog {
            log: log.id,
            log_type: LogType::Comment,
            date: log.date,
            comment: None,
        });
        let result = apply(&store, edit, &PlPolicy, at(6)).unwrap();
        assert_eq!(result.status, CommitStatus::Duplicate);
        assert_eq!(store.find_log("a").unwrap().unwrap().log_type, LogType::FoundIt);
    }

    #[test]
    fn test_manual_stats_bump_and_recompute() {
        let store = seeded();
        let mut ws = WriteSet::new();
        ws.push(PendingWrite::InsertLog(new_log("a", LogType::FoundIt, 4)));
        let transition = Transition::publish(Visit::new(LogType::FoundIt, at(4)));
        ws.push(PendingWrite::ApplyCacheStats {
            cache: CacheId(1),
            transition,
        });
        ws.push(PendingWrite::ApplyUserStats {
            user: UserId(20),
            transition,
        });
        let log = apply(&store, ws, &PlPolicy, at(5)).unwrap().log.unwrap();

        let cache = store.find_cache("OP0001").unwrap().unwrap();
        assert_eq!(cache.stats.founds, 1);
        assert_eq!(cache.stats.last_found, Some(at(4)));
        assert_eq!(store.load_user(UserId(20)).unwrap().unwrap().stats.founds, 1);

        // found -> not found drops the counter and the last-found date
        let transition = Transition::edit(
            Visit::new(LogType::FoundIt, at(4)),
            Visit::new(LogType::DidNotFindIt, at(4)),
        );
        let mut ws = WriteSet::new();
        ws.push(PendingWrite::UpdateLog {
            log: log.id,
            log_type: LogType::DidNotFindIt,
            date: at(4),
            comment: None,
        });
        ws.push(PendingWrite::ApplyCacheStats {
            cache: CacheId(1),
            transition,
        });
        apply(&store, ws, &PlPolicy, at(5)).unwrap();

        let cache = store.find_cache("OP0001").unwrap().unwrap();
        assert_eq!(cache.stats.founds, 0);
        assert_eq!(cache.stats.notfounds, 1);
        assert_eq!(cache.stats.last_found, None);
    }

    #[test]
    fn test_trigger_branch_replays_counters() {
        let store = seeded();
        let mut ws = WriteSet::new();
        ws.push(PendingWrite::InsertLog(new_log("a", LogType::FoundIt, 2)));
        ws.push(PendingWrite::InsertLog(new_log("b", LogType::FoundIt, 3)));
        apply(&store, ws, &DePolicy, at(5)).unwrap();

        let cache = store.find_cache("OP0001").unwrap().unwrap();
        assert_eq!(cache.stats.founds, 2);
        assert_eq!(cache.stats.last_found, Some(at(3)));
        assert_eq!(store.load_user(UserId(20)).unwrap().unwrap().stats.founds, 2);
    }

    #[test]
    fn test_score_withdrawal_restores_rating() {
        let store = seeded();
        let mut ws = WriteSet::new();
        ws.push(PendingWrite::AddScore {
            user: UserId(30),
            cache: CacheId(1),
            score: 4,
        });
        ws.push(PendingWrite::AddScore {
            user: UserId(20),
            cache: CacheId(1),
            score: 2,
        });
        apply(&store, ws, &PlPolicy, at(5)).unwrap();
        let rating = store.find_cache("OP0001").unwrap().unwrap().rating;
        assert_eq!(rating.votes, 2);
        assert!((rating.score - 3.0).abs() < 1e-9);

        let mut ws = WriteSet::new();
        ws.push(PendingWrite::WithdrawScore {
            user: UserId(20),
            cache: CacheId(1),
        });
        ws.push(PendingWrite::WithdrawScore {
            user: UserId(20),
            cache: CacheId(1),
        });
        let result = apply(&store, ws, &PlPolicy, at(5)).unwrap();
        assert_eq!(result.applied, 1);
        assert_eq!(result.skipped, 1);

        let rating = store.find_cache("OP0001").unwrap().unwrap().rating;
        assert_eq!(rating.votes, 1);
        assert!((rating.score - 4.0).abs() < 1e-9);
        assert_eq!(store.score(UserId(20), CacheId(1)).unwrap(), None);
    }

    #[test]
    fn test_recommendation_dropped_without_find() {
        let store = seeded();
        store
            .save_recommendation(UserId(20), CacheId(1), at(2))
            .unwrap();
        let mut ws = WriteSet::new();
        ws.push(PendingWrite::InsertLog(new_log("a", LogType::DidNotFindIt, 2)));
        ws.push(PendingWrite::ReconcileRecommendation {
            user: UserId(20),
            cache: CacheId(1),
        });
        apply(&store, ws, &PlPolicy, at(5)).unwrap();
        assert_eq!(store.recommendation(UserId(20), CacheId(1)).unwrap(), None);
    }

    #[test]
    fn test_recommendation_redated_on_trigger_branch() {
        let store = seeded();
        store
            .save_recommendation(UserId(20), CacheId(1), at(2))
            .unwrap();
        let mut ws = WriteSet::new();
        ws.push(PendingWrite::InsertLog(new_log("a", LogType::FoundIt, 3)));
        ws.push(PendingWrite::ReconcileRecommendation {
            user: UserId(20),
            cache: CacheId(1),
        });
        apply(&store, ws, &DePolicy, at(5)).unwrap();
        assert_eq!(
            store.recommendation(UserId(20), CacheId(1)).unwrap(),
            Some(at(3))
        );
    }
}
