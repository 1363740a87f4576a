//! Per-language descriptions of a cache
//!
//! One record per (cache, language). A language is created the first time
//! it gets text, patched in place afterwards, and removed once all of its
//! texts are empty, unless it is the only language left.

use crate::error::{Error, Result};
use crate::identity::CacheId;
use crate::problems::Problems;
use crate::services::Sanitized;
use crate::text::{collapse_to_line, escape_html, nl2br, normalize_newlines};
use crate::validator::EditContext;
use crate::write_set::{PendingWrite, WriteSet};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stored description of one language
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Description {
    pub cache: CacheId,
    /// Upper-case language code
    pub language: String,
    /// Sanitized HTML
    pub full: String,
    pub full_html_flag: u8,
    pub short: String,
    pub hint: String,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
}

impl Description {
    pub fn is_empty(&self) -> bool {
        self.full.is_empty() && self.short.is_empty() && self.hint.is_empty()
    }
}

/// Requested description change; `None` leaves a text untouched
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DescriptionEdit {
    pub language: Option<String>,
    pub full: Option<String>,
    pub short: Option<String>,
    pub hint: Option<String>,
}

impl DescriptionEdit {
    /// Whether any of the three texts is part of the request
    pub fn is_requested(&self) -> bool {
        self.full.is_some() || self.short.is_some() || self.hint.is_some()
    }
}

/// Normalized texts to write over an existing record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescriptionPatch {
    pub full: Option<Sanitized>,
    pub short: Option<String>,
    pub hint: Option<String>,
}

/// What happens to an existing record once a patch is merged
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DescriptionFate {
    Update(Description),
    Delete,
}

impl DescriptionPatch {
    /// Merge into `existing`; delete instead when the result is empty and
    /// other languages exist
    pub fn resolve(
        &self,
        mut existing: Description,
        other_languages_exist: bool,
        at: DateTime<Utc>,
    ) -> DescriptionFate {
        if let Some(full) = &self.full {
            existing.full = full.html.clone();
            existing.full_html_flag = full.html_flag;
        }
        if let Some(short) = &self.short {
            existing.short = short.clone();
        }
        if let Some(hint) = &self.hint {
            existing.hint = hint.clone();
        }
        if existing.is_empty() && other_languages_exist {
            return DescriptionFate::Delete;
        }
        existing.modified = at;
        DescriptionFate::Update(existing)
    }
}

/// Short descriptions are a single line
pub fn normalize_short(raw: &str) -> String {
    collapse_to_line(raw)
}

/// Hints are plain text, stored as HTML with explicit line breaks
pub fn normalize_hint(raw: &str) -> String {
    let text = normalize_newlines(raw).replace('\t', " ");
    nl2br(&escape_html(text.trim()))
}

/// Comma-separated language list and default language of a cache
///
/// The default is the first entry of `priority` that has a description,
/// otherwise the first language of the list.
pub fn default_language(priority: &[String], languages: &[String]) -> (String, String) {
    let mut sorted: Vec<String> = languages.iter().map(|l| l.to_uppercase()).collect();
    sorted.sort();
    sorted.dedup();
    let joined = sorted.join(",");
    let default = priority
        .iter()
        .map(|l| l.to_uppercase())
        .find(|l| sorted.contains(l))
        .unwrap_or_else(|| joined.chars().take(2).collect());
    (joined, default)
}

/// Validate a description edit and stage its writes
pub fn stage(
    ctx: &EditContext<'_>,
    edit: &DescriptionEdit,
    writes: &mut WriteSet,
    problems: &mut Problems,
) -> Result<()> {
    if !edit.is_requested() {
        return Ok(());
    }
    let language = edit
        .language
        .as_deref()
        .ok_or_else(|| Error::MissingParameter("language".to_string()))?;
    let known = ctx.capabilities.languages(ctx.messages.langprefs());
    if !known.contains_key(&language.to_lowercase()) {
        return Err(Error::invalid_because(
            "language",
            format!("Invalid language code: '{}'", language),
        ));
    }
    let language = language.to_uppercase();

    let full = edit.full.as_deref().map(|raw| {
        if raw.is_empty() {
            Sanitized {
                html: String::new(),
                html_flag: 1,
            }
        } else {
            ctx.sanitizer.purify(raw)
        }
    });
    let short = edit.short.as_deref().map(normalize_short);
    let hint = edit.hint.as_deref().map(normalize_hint);

    let is_new_language = !ctx
        .description_languages
        .iter()
        .any(|l| l.eq_ignore_ascii_case(&language));

    if is_new_language {
        let full_text = full.as_ref().map_or("", |f| f.html.as_str());
        let short_text = short.as_deref().unwrap_or("");
        let hint_text = hint.as_deref().unwrap_or("");
        if full_text.is_empty() && short_text.is_empty() && hint_text.is_empty() {
            let field = if edit.full.is_some() {
                "description"
            } else if edit.hint.is_some() {
                "hint"
            } else {
                "short_description"
            };
            problems.record(field, ctx.messages.text("Please enter some text."));
            return Ok(());
        }
        if full_text.is_empty() {
            problems.record(
                "description",
                ctx.messages
                    .text("Please enter a full description before adding a short description or hint."),
            );
            return Ok(());
        }
        writes.push(PendingWrite::InsertDescription(Description {
            cache: ctx.cache.id,
            language,
            full: full_text.to_string(),
            full_html_flag: full.as_ref().map_or(1, |f| f.html_flag),
            short: short_text.to_string(),
            hint: hint_text.to_string(),
            created: ctx.now,
            modified: ctx.now,
        }));
    } else {
        writes.push(PendingWrite::PatchDescription {
            cache: ctx.cache.id,
            language,
            patch: DescriptionPatch { full, short, hint },
            at: ctx.now,
        });
    }
    writes.push(PendingWrite::RefreshDescriptionLanguages {
        cache: ctx.cache.id,
        priority: ctx.language_priority.to_vec(),
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;
    use chrono::TimeZone;

    fn stored(language: &str) -> Description {
        let at = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        Description {
            cache: CacheId(1),
            language: language.to_string(),
            full: "<p>Hello</p>".into(),
            full_html_flag: 1,
            short: "Short".into(),
            hint: "Under the stone".into(),
            created: at,
            modified: at,
        }
    }

    fn edit(language: &str, full: Option<&str>, short: Option<&str>, hint: Option<&str>) -> DescriptionEdit {
        DescriptionEdit {
            language: Some(language.to_string()),
            full: full.map(str::to_string),
            short: short.map(str::to_string),
            hint: hint.map(str::to_string),
        }
    }

    fn run(fx: &Fixture, edit: &DescriptionEdit) -> (Result<()>, WriteSet, Problems) {
        let ctx = fx.edit_context();
        let mut writes = WriteSet::new();
        let mut problems = Problems::new();
        let result = stage(&ctx, edit, &mut writes, &mut problems);
        (result, writes, problems)
    }

    #[test]
    fn test_normalize_short_and_hint() {
        assert_eq!(normalize_short(" one\r\ntwo\t "), "one two");
        assert_eq!(
            normalize_hint("  under <the>\r\nstone\t"),
            "under &lt;the&gt;<br />\nstone"
        );
    }

    #[test]
    fn test_default_language() {
        let priority = vec!["PL".to_string(), "EN".to_string()];
        let (joined, default) = default_language(&priority, &["en".into(), "DE".into()]);
        assert_eq!(joined, "DE,EN");
        assert_eq!(default, "EN");

        let (joined, default) = default_language(&priority, &["FR".into(), "DE".into()]);
        assert_eq!(joined, "DE,FR");
        assert_eq!(default, "DE");

        assert_eq!(default_language(&priority, &[]), (String::new(), String::new()));
    }

    #[test]
    fn test_sole_language_is_never_deleted() {
        let patch = DescriptionPatch {
            full: Some(Sanitized {
                html: String::new(),
                html_flag: 1,
            }),
            short: Some(String::new()),
            hint: Some(String::new()),
        };
        let at = Utc::now();
        match patch.resolve(stored("EN"), false, at) {
            DescriptionFate::Update(d) => {
                assert!(d.is_empty());
                assert_eq!(d.modified, at);
            }
            DescriptionFate::Delete => panic!("sole language deleted"),
        }
        assert_eq!(patch.resolve(stored("EN"), true, at), DescriptionFate::Delete);
    }

    #[test]
    fn test_partial_patch_keeps_other_texts() {
        let patch = DescriptionPatch {
            full: None,
            short: Some(String::new()),
            hint: None,
        };
        match patch.resolve(stored("EN"), true, Utc::now()) {
            DescriptionFate::Update(d) => {
                assert_eq!(d.full, "<p>Hello</p>");
                assert_eq!(d.short, "");
                assert_eq!(d.hint, "Under the stone");
            }
            DescriptionFate::Delete => panic!("non-empty record deleted"),
        }
    }

    #[test]
    fn test_language_required() {
        let fx = Fixture::new();
        let mut e = edit("en", Some("text"), None, None);
        e.language = None;
        let (result, _, _) = run(&fx, &e);
        assert_eq!(result, Err(Error::MissingParameter("language".into())));
    }

    #[test]
    fn test_unknown_language_is_invalid() {
        let fx = Fixture::new();
        let (result, _, _) = run(&fx, &edit("xx", Some("text"), None, None));
        assert!(matches!(
            result,
            Err(Error::InvalidParameter { param, .. }) if param == "language"
        ));
    }

    #[test]
    fn test_new_language_needs_text() {
        let fx = Fixture::new();
        let (result, writes, problems) = run(&fx, &edit("de", Some(""), Some(""), Some("")));
        assert!(result.is_ok());
        assert!(writes.is_empty());
        assert!(problems.has("description"));

        let (_, _, problems) = run(&fx, &edit("de", None, Some(""), Some("")));
        assert!(problems.has("hint"));

        let (_, _, problems) = run(&fx, &edit("de", None, Some(" "), None));
        assert!(problems.has("short_description"));
    }

    #[test]
    fn test_new_language_needs_full_text_first() {
        let fx = Fixture::new();
        let (_, writes, problems) = run(&fx, &edit("de", None, Some("Kurz"), None));
        assert!(writes.is_empty());
        assert!(problems.has("description"));
    }

    #[test]
    fn test_new_language_insert() {
        let fx = Fixture::new();
        let (result, writes, problems) = run(&fx, &edit("de", Some("<p>Hallo</p>"), None, Some("a\nb")));
        assert!(result.is_ok());
        assert!(problems.is_empty());
        match writes.writes() {
            [PendingWrite::InsertDescription(d), PendingWrite::RefreshDescriptionLanguages { priority, .. }] => {
                assert_eq!(d.language, "DE");
                assert_eq!(d.full, "<p>Hallo</p>");
                assert_eq!(d.hint, "a<br />\nb");
                assert_eq!(d.short, "");
                assert_eq!(priority, &fx.language_priority);
            }
            other => panic!("unexpected writes {:?}", other),
        }
    }

    #[test]
    fn test_existing_language_patch() {
        let fx = Fixture::new();
        let (_, writes, problems) = run(&fx, &edit("EN", Some(""), Some(""), Some("")));
        assert!(problems.is_empty());
        assert!(matches!(
            writes.writes().first(),
            Some(PendingWrite::PatchDescription { language, .. }) if language == "EN"
        ));
    }
}
