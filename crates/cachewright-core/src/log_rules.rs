//! Log publication rule engine
//!
//! Every rule here is publish-blocking: a violation aborts the operation
//! with [`Error::CannotPublish`] (or a parameter error for malformed input)
//! before anything is staged.

use crate::branch::BranchPolicy;
use crate::cache::{Cache, User};
use crate::error::{Error, Result};
use crate::i18n::Messages;
use crate::identity::{LogId, UserId};
use crate::log::{CommentFormat, FormattedComment, LogEntry, LogType};
use crate::services::{CacheReader, HtmlSanitizer};
use crate::stats::{users_to_invalidate, Transition, Visit};
use crate::text::{escape_html, nl2br, preserve_double_spaces};
use crate::write_set::{NewLog, PendingWrite, Precondition, WriteSet};
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};

/// Default tolerance, in seconds, for log dates slightly ahead of the server clock
pub const DEFAULT_FUTURE_GRACE_SECS: i64 = 5 * 60;

/// Scores accepted with a find
pub const SCORE_RANGE: std::ops::RangeInclusive<i64> = 1..=5;

/// Everything a log submission is validated against
pub struct LogContext<'a> {
    pub cache: &'a Cache,
    pub actor: &'a User,
    /// Node id of this site
    pub node_id: u32,
    pub policy: &'a dyn BranchPolicy,
    pub sanitizer: &'a dyn HtmlSanitizer,
    pub reader: &'a dyn CacheReader,
    pub messages: Messages<'a>,
    /// One recommendation may be given per this many finds
    pub recommendation_ratio: u32,
    pub future_grace: Duration,
    pub now: DateTime<Utc>,
}

/// A new log entry as submitted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSubmission {
    pub log_type: String,
    pub when: String,
    pub comment: String,
    pub comment_format: String,
    pub password: Option<String>,
    pub recommend: bool,
    pub rating: Option<i64>,
}

impl LogSubmission {
    pub fn new(log_type: impl Into<String>, when: impl Into<String>) -> Self {
        Self {
            log_type: log_type.into(),
            when: when.into(),
            comment: String::new(),
            comment_format: "auto".to_string(),
            password: None,
            recommend: false,
            rating: None,
        }
    }

    pub fn comment(mut self, comment: impl Into<String>, format: &str) -> Self {
        self.comment = comment.into();
        self.comment_format = format.to_string();
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn recommend(mut self) -> Self {
        self.recommend = true;
        self
    }

    pub fn rating(mut self, rating: i64) -> Self {
        self.rating = Some(rating);
        self
    }
}

/// Changes to an existing log; `None` keeps the stored value
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogEdit {
    pub log_type: Option<String>,
    pub when: Option<String>,
    pub comment: Option<String>,
    pub comment_format: Option<String>,
    pub password: Option<String>,
}

/// Validated log operation, ready for the commit phase
#[derive(Debug, Clone, PartialEq)]
pub struct StagedLog {
    pub writes: WriteSet,
    /// Users whose derived assets go stale once this commits
    pub invalidate: Vec<UserId>,
    pub log_uuid: String,
}

/// Event caches are attended, everything else is found
pub fn check_type_matches_cache(
    cache: &Cache,
    log_type: LogType,
    messages: &Messages<'_>,
) -> Result<()> {
    if cache.cache_type.is_event() && log_type.is_search_only() {
        return Err(Error::CannotPublish(messages.text(
            "This cache is an Event cache. You cannot \"Find\" it (but you can attend it, or comment on it)!",
        )));
    }
    if !cache.cache_type.is_event() && log_type.is_event_only() {
        return Err(Error::CannotPublish(messages.text(
            "This cache is NOT an Event cache. You cannot \"Attend\" it (but you can find it, or comment on it)!",
        )));
    }
    Ok(())
}

/// Finds on password-protected caches must quote the password
pub fn check_password(
    cache: &Cache,
    log_type: LogType,
    supplied: Option<&str>,
    messages: &Messages<'_>,
) -> Result<()> {
    if !log_type.is_find() || !cache.requires_password() {
        return Ok(());
    }
    match supplied {
        None | Some("") => Err(Error::CannotPublish(
            messages.text("This cache requires a password. You didn't provide one!"),
        )),
        Some(pw) if pw.to_lowercase() != cache.password.to_lowercase() => {
            Err(Error::CannotPublish(messages.text("Invalid password!")))
        }
        Some(_) => Ok(()),
    }
}

/// Comments must carry some text
pub fn check_comment(comment: &str, log_type: LogType, messages: &Messages<'_>) -> Result<()> {
    if log_type == LogType::Comment && comment.trim().is_empty() {
        return Err(Error::CannotPublish(
            messages.text("You have to supply some text for your comment."),
        ));
    }
    Ok(())
}

/// Status logs change availability and belong to the owner
pub fn check_owner_only(
    cache: &Cache,
    actor: UserId,
    log_type: LogType,
    messages: &Messages<'_>,
) -> Result<()> {
    if log_type.is_owner_only() && !cache.is_owned_by(actor) {
        return Err(Error::CannotPublish(
            messages.text("Only the owner of this cache may submit this log type."),
        ));
    }
    Ok(())
}

/// Parse a log date: RFC 3339, or a naive date/time taken as UTC
pub fn parse_when(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Ok(naive.and_utc());
    }
    if let Some(naive) = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
    {
        return Ok(naive.and_utc());
    }
    Err(Error::invalid_because(
        "when",
        format!("'{}' is not in a valid format or is not a valid date.", raw),
    ))
}

/// Future dates beyond the grace window and attendance before the event
pub fn check_when(
    when: DateTime<Utc>,
    log_type: LogType,
    cache: &Cache,
    now: DateTime<Utc>,
    grace: Duration,
    messages: &Messages<'_>,
) -> Result<()> {
    if when > now + grace {
        return Err(Error::CannotPublish(messages.text(
            "You are trying to publish a log entry with a date in future. Cache log entries are allowed to be published in the past, but NOT in the future.",
        )));
    }
    if log_type == LogType::Attended && when < cache.date_hidden {
        return Err(Error::CannotPublish(messages.text(
            "You cannot attend an event before it takes place. Please check the log type and date.",
        )));
    }
    Ok(())
}

/// Convert a submitted comment into stored HTML plus its format tag
pub fn format_comment(
    comment: &str,
    format: CommentFormat,
    policy: &dyn BranchPolicy,
    sanitizer: &dyn HtmlSanitizer,
) -> FormattedComment {
    match format {
        CommentFormat::Plaintext => FormattedComment {
            html: preserve_double_spaces(&nl2br(&escape_html(comment))),
            format_tag: policy.plaintext_format_tag(),
        },
        CommentFormat::Auto => {
            let purified = sanitizer.purify(&nl2br(comment));
            FormattedComment {
                html: purified.html,
                format_tag: purified.html_flag,
            }
        }
        CommentFormat::Html => {
            let purified = sanitizer.purify(comment);
            FormattedComment {
                html: purified.html,
                format_tag: purified.html_flag,
            }
        }
    }
}

/// Duplicate-find suppression
///
/// Only enforced where the branch allows a single find per user. Switching
/// a find to a not-found (or an attended to a will-attend) is exempt, and
/// so is keeping the type. Returns the guard to re-check at commit time.
pub fn check_find_allowed(
    ctx: &LogContext<'_>,
    new_type: LogType,
    old_type: Option<LogType>,
    except: Option<LogId>,
) -> Result<Option<Precondition>> {
    let exempt_downgrade = matches!(
        (old_type, new_type),
        (Some(LogType::FoundIt), LogType::DidNotFindIt)
            | (Some(LogType::Attended), LogType::WillAttend)
    );
    if ctx.policy.allows_multiple_finds()
        || old_type == Some(new_type)
        || !new_type.is_visit()
        || exempt_downgrade
    {
        return Ok(None);
    }

    // owners may attend their own events, never search their own caches
    if ctx.cache.is_owned_by(ctx.actor.id) && !new_type.is_event_only() {
        return Err(Error::CannotPublish(ctx.messages.text(
            "You are the owner of this cache. You may submit \"Comments\" and status logs only!",
        )));
    }

    let matching = new_type.matching_find_type();
    let logs = ctx.reader.logs_by_author(ctx.cache.id, ctx.actor.id)?;
    let already = logs.iter().any(|log| {
        log.log_type == matching && ctx.policy.is_log_active(log) && Some(log.id) != except
    });
    if already {
        let msgid = if matching == LogType::FoundIt {
            "You have already submitted a \"Found it\" log entry once. Now you may submit \"Comments\" only!"
        } else {
            "You have already submitted an \"Attended\" log entry once. Now you may submit \"Comments\" only!"
        };
        return Err(Error::CannotPublish(ctx.messages.text(msgid)));
    }
    Ok(Some(Precondition::NoActiveLog {
        cache: ctx.cache.id,
        author: ctx.actor.id,
        log_type: matching,
        except,
    }))
}

/// Finds still needed before the next recommendation may be given
pub fn founds_needed(founds: u32, recommendations_given: u32, ratio: u32) -> u32 {
    (recommendations_given + 1)
        .saturating_mul(ratio)
        .saturating_sub(founds)
}

fn check_recommendation(ctx: &LogContext<'_>, log_type: LogType) -> Result<()> {
    if !log_type.is_find() {
        return Err(Error::invalid_because(
            "recommend",
            "Recommendations are allowed only for 'Found it' and 'Attended' logs.",
        ));
    }
    if ctx.reader.has_recommended(ctx.actor.id, ctx.cache.id)? {
        return Err(Error::CannotPublish(
            ctx.messages.text("You have already recommended this cache."),
        ));
    }
    let given = ctx.reader.recommendation_count(ctx.actor.id)?;
    // this find counts towards the next recommendation
    let needed = founds_needed(ctx.actor.stats.founds, given, ctx.recommendation_ratio)
        .saturating_sub(1);
    if needed > 0 {
        let message = if needed == 1 {
            ctx.messages
                .text("You don't have any recommendations to give. Find one more cache first!")
        } else {
            ctx.messages.format(
                "You don't have any recommendations to give. Find %d more caches first!",
                &[&needed],
            )
        };
        return Err(Error::CannotPublish(message));
    }
    Ok(())
}

fn check_rating(ctx: &LogContext<'_>, log_type: LogType, rating: i64) -> Result<u8> {
    if !ctx.policy.has_ratings() {
        return Err(Error::CannotPublish(
            ctx.messages.text("This site does not support rating caches."),
        ));
    }
    if !log_type.is_find() {
        return Err(Error::invalid_because(
            "rating",
            "Ratings are allowed only for 'Found it' and 'Attended' logs.",
        ));
    }
    if !SCORE_RANGE.contains(&rating) {
        return Err(Error::invalid_because("rating", "must be between 1 and 5"));
    }
    u8::try_from(rating).map_err(|_| Error::invalid("rating"))
}

fn check_node(ctx: &LogContext<'_>) -> Result<()> {
    if ctx.cache.node != ctx.node_id {
        return Err(Error::ConsistencyFault(format!(
            "the database contains the geocache '{}' which has been imported from node {}",
            ctx.cache.code, ctx.cache.node
        )));
    }
    Ok(())
}

fn stage_stats(ctx: &LogContext<'_>, transition: Transition, writes: &mut WriteSet) {
    if !ctx.policy.stats_maintained_by_triggers() {
        writes.push(PendingWrite::ApplyCacheStats {
            cache: ctx.cache.id,
            transition,
        });
        if transition.type_changed() {
            writes.push(PendingWrite::ApplyUserStats {
                user: ctx.actor.id,
                transition,
            });
        }
    }
    if transition.type_changed() {
        if let Some(status) = transition.new.log_type.status_effect() {
            writes.push(PendingWrite::SetCacheStatus {
                cache: ctx.cache.id,
                status,
            });
        }
    }
    if transition.leaves_find() {
        writes.push(PendingWrite::ReconcileRecommendation {
            user: ctx.actor.id,
            cache: ctx.cache.id,
        });
        if ctx.policy.has_ratings() {
            writes.push(PendingWrite::WithdrawScore {
                user: ctx.actor.id,
                cache: ctx.cache.id,
            });
        }
    }
}

/// Validate a new log entry and stage its publication under `uuid`
pub fn stage_publish(
    ctx: &LogContext<'_>,
    submission: &LogSubmission,
    uuid: String,
) -> Result<StagedLog> {
    check_node(ctx)?;
    let log_type = LogType::parse(&submission.log_type)?;
    let format = CommentFormat::parse(&submission.comment_format)?;

    check_type_matches_cache(ctx.cache, log_type, &ctx.messages)?;
    check_owner_only(ctx.cache, ctx.actor.id, log_type, &ctx.messages)?;
    check_password(
        ctx.cache,
        log_type,
        submission.password.as_deref(),
        &ctx.messages,
    )?;
    check_comment(&submission.comment, log_type, &ctx.messages)?;
    let when = parse_when(&submission.when)?;
    check_when(
        when,
        log_type,
        ctx.cache,
        ctx.now,
        ctx.future_grace,
        &ctx.messages,
    )?;
    let guard = check_find_allowed(ctx, log_type, None, None)?;
    if submission.recommend {
        check_recommendation(ctx, log_type)?;
    }
    let score = submission
        .rating
        .map(|r| check_rating(ctx, log_type, r))
        .transpose()?;

    let comment = format_comment(&submission.comment, format, ctx.policy, ctx.sanitizer);
    let transition = Transition::publish(Visit::new(log_type, when));

    let mut writes = WriteSet::new();
    if let Some(guard) = guard {
        writes.guard(guard);
    }
    writes.push(PendingWrite::InsertLog(NewLog {
        uuid: uuid.clone(),
        cache: ctx.cache.id,
        node: ctx.node_id,
        author: ctx.actor.id,
        log_type,
        date: when,
        comment,
    }));
    stage_stats(ctx, transition, &mut writes);
    if submission.recommend {
        writes.push(PendingWrite::SaveRecommendation {
            user: ctx.actor.id,
            cache: ctx.cache.id,
            date: when,
        });
    }
    if let Some(score) = score {
        writes.push(PendingWrite::AddScore {
            user: ctx.actor.id,
            cache: ctx.cache.id,
            score,
        });
    }

    Ok(StagedLog {
        writes,
        invalidate: users_to_invalidate(ctx.policy, &transition, ctx.actor.id, ctx.cache.owner),
        log_uuid: uuid,
    })
}

/// Validate changes to an existing log entry
///
/// An edit that changes nothing stages no writes.
pub fn stage_edit(ctx: &LogContext<'_>, log: &LogEntry, edit: &LogEdit) -> Result<StagedLog> {
    if !ctx.policy.is_log_active(log) {
        return Err(Error::NotFound(format!("log entry '{}'", log.uuid)));
    }
    check_node(ctx)?;
    if log.node != ctx.node_id {
        return Err(Error::ConsistencyFault(format!(
            "the database contains the log entry '{}' which has been imported from node {}",
            log.uuid, log.node
        )));
    }
    if log.cache != ctx.cache.id {
        return Err(Error::ConsistencyFault(format!(
            "log entry '{}' does not belong to geocache '{}'",
            log.uuid, ctx.cache.code
        )));
    }
    if log.author != ctx.actor.id {
        return Err(Error::Forbidden(
            "Only own log entries may be edited.".to_string(),
        ));
    }

    let new_type = match &edit.log_type {
        Some(raw) => LogType::parse(raw)?,
        None => log.log_type,
    };
    let type_changed = new_type != log.log_type;
    if type_changed {
        check_type_matches_cache(ctx.cache, new_type, &ctx.messages)?;
        check_owner_only(ctx.cache, ctx.actor.id, new_type, &ctx.messages)?;
        check_password(ctx.cache, new_type, edit.password.as_deref(), &ctx.messages)?;
    }

    let when = match &edit.when {
        Some(raw) => {
            let when = parse_when(raw)?;
            check_when(
                when,
                new_type,
                ctx.cache,
                ctx.now,
                ctx.future_grace,
                &ctx.messages,
            )?;
            when
        }
        None => log.date,
    };

    let comment = match &edit.comment {
        Some(text) => {
            check_comment(text, new_type, &ctx.messages)?;
            let format = CommentFormat::parse(edit.comment_format.as_deref().unwrap_or("auto"))?;
            Some(format_comment(text, format, ctx.policy, ctx.sanitizer))
        }
        None => {
            if edit.comment_format.is_some() {
                return Err(Error::MissingParameter("comment".to_string()));
            }
            check_comment(&log.comment.html, new_type, &ctx.messages)?;
            None
        }
    };

    let guard = check_find_allowed(ctx, new_type, Some(log.log_type), Some(log.id))?;

    let mut writes = WriteSet::new();
    let comment_changed = comment.as_ref().is_some_and(|c| *c != log.comment);
    if !type_changed && when == log.date && !comment_changed {
        return Ok(StagedLog {
            writes,
            invalidate: Vec::new(),
            log_uuid: log.uuid.clone(),
        });
    }

    writes.guard(Precondition::LogUnchanged {
        log: log.id,
        log_type: log.log_type,
        date: log.date,
    });
    if let Some(guard) = guard {
        writes.guard(guard);
    }
    writes.push(PendingWrite::UpdateLog {
        log: log.id,
        log_type: new_type,
        date: when,
        comment,
    });
    let transition = Transition::edit(Visit::new(log.log_type, log.date), Visit::new(new_type, when));
    if type_changed || when != log.date {
        stage_stats(ctx, transition, &mut writes);
    }

    Ok(StagedLog {
        writes,
        invalidate: users_to_invalidate(ctx.policy, &transition, ctx.actor.id, ctx.cache.owner),
        log_uuid: log.uuid.clone(),
    })
}
