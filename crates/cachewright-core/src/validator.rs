//! Cache mutation validator
//!
//! Turns a partial field map into staged writes plus soft problems. Each
//! field is checked on its own: malformed input aborts the whole request,
//! a broken business rule is recorded and the field is left unstaged.

use crate::attributes;
use crate::branch::BranchPolicy;
use crate::cache::{Cache, CacheSize, CacheType, Coords, HalfStars};
use crate::description::{self, DescriptionEdit};
use crate::error::{Error, Result};
use crate::i18n::Messages;
use crate::identity::UserId;
use crate::problems::Problems;
use crate::services::{AttributeCatalog, Capabilities, HtmlSanitizer};
use crate::write_set::{CacheField, PendingWrite, WriteSet};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use regex::Regex;
use std::sync::LazyLock;

static HALF_STAR_FORMAT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9](\.[0-9])?$").expect("static regex"));
static TRIP_FORMAT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(null|[0-9]+\.?[0-9]*)$").expect("static regex"));
static GC_CODE_FORMAT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(|GC[0-9A-HJKMNPQRTV-Z]{2,})$").expect("static regex"));

const MAX_TRIP_HOURS: f64 = 999.0;
const MAX_TRIP_KM: f64 = 99999.0;
const MIN_TRIP: f64 = 0.01;

/// Fields a cache edit may carry
pub const EDITABLE_FIELDS: [&str; 16] = [
    "name",
    "old_name",
    "type",
    "size",
    "location",
    "difficulty",
    "terrain",
    "trip_time",
    "trip_distance",
    "passwd",
    "gc_code",
    "attributes",
    "language",
    "description",
    "short_description",
    "hint",
];

/// Requested changes: field name → raw value. Absent fields stay as they are.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheEdit {
    fields: IndexMap<String, String>,
}

impl CacheEdit {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter
    pub fn with(mut self, field: &str, value: impl Into<String>) -> Self {
        self.set(field, value);
        self
    }

    pub fn set(&mut self, field: &str, value: impl Into<String>) {
        self.fields.insert(field.to_string(), value.into());
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    fn description_edit(&self) -> DescriptionEdit {
        DescriptionEdit {
            language: self.get("language").map(str::to_string),
            full: self.get("description").map(str::to_string),
            short: self.get("short_description").map(str::to_string),
            hint: self.get("hint").map(str::to_string),
        }
    }
}

/// Everything a cache edit is validated against
pub struct EditContext<'a> {
    /// Snapshot read before validation
    pub cache: &'a Cache,
    pub actor: UserId,
    /// Node id of this site; foreign listings are never edited
    pub node_id: u32,
    pub site_name: &'a str,
    pub policy: &'a dyn BranchPolicy,
    pub capabilities: &'a dyn Capabilities,
    pub catalog: &'a dyn AttributeCatalog,
    pub sanitizer: &'a dyn HtmlSanitizer,
    pub messages: Messages<'a>,
    /// Upper-case languages that currently have a description
    pub description_languages: &'a [String],
    /// Languages to prefer as the default description language
    pub language_priority: &'a [String],
    pub now: DateTime<Utc>,
}

/// Result of validating a cache edit
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StagedEdit {
    pub writes: WriteSet,
    pub problems: Problems,
}

impl StagedEdit {
    /// Writes are only ever committed when no problem was found
    pub fn is_committable(&self) -> bool {
        self.problems.is_empty() && !self.writes.is_empty()
    }
}

/// Validate `edit` against the snapshot in `ctx`
pub fn validate_cache_edit(ctx: &EditContext<'_>, edit: &CacheEdit) -> Result<StagedEdit> {
    let cache = ctx.cache;
    if cache.node != ctx.node_id {
        return Err(Error::ConsistencyFault(format!(
            "the database contains the geocache '{}' which has been imported from node {}",
            cache.code, cache.node
        )));
    }
    if !cache.is_owned_by(ctx.actor) {
        return Err(Error::Forbidden("Only own caches may be edited.".to_string()));
    }
    if let Some(field) = edit.fields.keys().find(|f| !EDITABLE_FIELDS.contains(&f.as_str())) {
        return Err(Error::invalid_because(
            field.as_str(),
            "not an editable cache field",
        ));
    }

    let mut staged = StagedEdit::default();
    let StagedEdit { writes, problems } = &mut staged;

    // name
    if let Some(name) = edit.get("name") {
        let old_name = edit
            .get("old_name")
            .ok_or_else(|| Error::MissingParameter("old_name".to_string()))?;
        if old_name != cache.name {
            return Err(Error::invalid_because(
                "old_name",
                format!("'{}' does not match the cache name.", old_name),
            ));
        }
        if name != cache.name {
            set(writes, cache, CacheField::Name(name.to_string()));
        }
    }

    // type
    let new_type = match edit.get("type") {
        Some(raw) => {
            let parsed = CacheType::from_name(raw)
                .filter(|t| ctx.capabilities.cache_types().contains(t))
                .ok_or_else(|| Error::invalid("type"))?;
            if parsed != cache.cache_type {
                set(writes, cache, CacheField::Type(parsed));
            }
            parsed
        }
        None => cache.cache_type,
    };
    let type_changed = new_type != cache.cache_type;
    let sizes = ctx.capabilities.sizes_for(new_type);

    // location
    if let Some(raw) = edit.get("location") {
        let coords = Coords::parse(raw).ok_or_else(|| Error::invalid("location"))?;
        if !(-90.0..=90.0).contains(&coords.lat) {
            problems.record(
                "location",
                ctx.messages.text("Latitude degrees must range between -90 and 90."),
            );
        } else if !(-180.0..=180.0).contains(&coords.lon) {
            problems.record(
                "location",
                ctx.messages.text("Longitude degrees must range between -180 and 180."),
            );
        } else if coords.lat == 0.0 && coords.lon == 0.0 {
            problems.record(
                "location",
                ctx.messages.text("Latitude and longitude must not both be zero."),
            );
        } else if coords != cache.location {
            set(writes, cache, CacheField::Location(coords));
        }
    }

    // size, depends on type
    if let Some(raw) = edit.get("size") {
        let size = CacheSize::from_name(raw)
            .filter(|s| ctx.capabilities.cache_sizes().contains(s))
            .ok_or_else(|| Error::invalid("size"))?;
        if !sizes.contains(&size) {
            problems.record(
                "size",
                ctx.messages.text("This size is not available for this type of cache."),
            );
        } else if size != cache.size {
            set(writes, cache, CacheField::Size(size));
        }
    } else if type_changed && !sizes.contains(&cache.size) {
        match sizes.as_slice() {
            [only] => set(writes, cache, CacheField::Size(*only)),
            _ => problems.record("type", ctx.messages.text("Cache type does not match cache size.")),
        }
    }

    // difficulty, terrain
    for property in ["difficulty", "terrain"] {
        let Some(raw) = edit.get(property) else {
            continue;
        };
        let rating = parse_half_stars(raw).ok_or_else(|| Error::invalid(property))?;
        let current = if property == "difficulty" {
            cache.difficulty
        } else {
            cache.terrain
        };
        if rating != current {
            let field = if property == "difficulty" {
                CacheField::Difficulty(rating)
            } else {
                CacheField::Terrain(rating)
            };
            set(writes, cache, field);
        }
    }

    // trip_time, trip_distance
    for property in ["trip_time", "trip_distance"] {
        let Some(raw) = edit.get(property) else {
            continue;
        };
        if !TRIP_FORMAT.is_match(raw) {
            return Err(Error::invalid(property));
        }
        let is_time = property == "trip_time";
        let current = if is_time {
            cache.trip_time
        } else {
            cache.trip_distance
        };
        let max_value = current
            .unwrap_or(0.0)
            .max(if is_time { MAX_TRIP_HOURS } else { MAX_TRIP_KM });
        let value = if raw == "null" {
            None
        } else {
            Some(raw.parse::<f64>().map_err(|_| Error::invalid(property))?)
        };
        match value {
            Some(v) if !(MIN_TRIP..=max_value).contains(&v) => {
                let msgid = if is_time {
                    "Invalid trip time; must range between 1 minute and %d hours."
                } else {
                    "Invalid trip distance; must range between 0.01 and %d km."
                };
                problems.record(property, ctx.messages.format(msgid, &[&max_value.floor()]));
            }
            _ if value == current => {}
            _ => {
                let field = if is_time {
                    CacheField::TripTime(value)
                } else {
                    CacheField::TripDistance(value)
                };
                set(writes, cache, field);
            }
        }
    }

    // passwd, depends on type
    if let Some(passwd) = edit.get("passwd") {
        let max_len = ctx.capabilities.password_max_length(new_type);
        if !passwd.is_empty() && ctx.policy.password_forbidden(new_type, cache.date_created) {
            problems.record(
                "passwd",
                ctx.messages.format(
                    "%s does not allow log passwords for traditional caches.",
                    &[&ctx.site_name],
                ),
            );
        } else if passwd.len() > max_len {
            problems.record(
                "passwd",
                ctx.messages.format(
                    "The password must not be longer than %d characters.",
                    &[&max_len],
                ),
            );
        } else if passwd != cache.password {
            set(writes, cache, CacheField::Password(passwd.to_string()));
        }
    } else if type_changed
        && ctx.policy.clears_password_on_type_change(new_type)
        && !cache.password.is_empty()
    {
        set(writes, cache, CacheField::Password(String::new()));
    }

    // gc_code
    if let Some(raw) = edit.get("gc_code") {
        if raw.is_empty() {
            return Err(Error::invalid_because(
                "gc_code",
                "Must not be empty. Supply 'null' if you want to remove the GC code.",
            ));
        }
        let gc_code = if raw == "null" { "" } else { raw }.replace('O', "0");
        if !GC_CODE_FORMAT.is_match(&gc_code) {
            problems.record("gc_code", ctx.messages.text("Invalid GC code"));
        } else if gc_code != cache.gc_code {
            set(writes, cache, CacheField::GcCode(gc_code));
        }
    }

    // attributes
    if let Some(raw) = edit.get("attributes") {
        let delta = attributes::reconcile(
            &cache.attributes,
            raw,
            ctx.catalog,
            &ctx.messages,
            problems,
        )?;
        for code in delta.add {
            if !cache.attributes.contains(&code) {
                writes.push(PendingWrite::AddAttribute {
                    cache: cache.id,
                    code,
                });
            }
        }
        for code in delta.remove {
            if cache.attributes.contains(&code) {
                writes.push(PendingWrite::RemoveAttribute {
                    cache: cache.id,
                    code,
                });
            }
        }
    }

    // descriptions and hint
    description::stage(ctx, &edit.description_edit(), writes, problems)?;

    if !writes.is_empty() && ctx.policy.touches_last_modified() {
        writes.push(PendingWrite::TouchCache {
            cache: cache.id,
            at: ctx.now,
        });
    }
    Ok(staged)
}

fn set(writes: &mut WriteSet, cache: &Cache, field: CacheField) {
    writes.push(PendingWrite::SetCacheField {
        cache: cache.id,
        field,
    });
}

fn parse_half_stars(raw: &str) -> Option<HalfStars> {
    if !HALF_STAR_FORMAT.is_match(raw) {
        return None;
    }
    HalfStars::from_stars(raw.parse().ok()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::branch::{DePolicy, PlPolicy};
    use crate::cache::CacheStatus;
    use crate::testing::Fixture;
    use chrono::TimeZone;

    fn validate(fx: &Fixture, edit: &CacheEdit) -> Result<StagedEdit> {
        validate_cache_edit(&fx.edit_context(), edit)
    }

    fn fields(staged: &StagedEdit) -> Vec<CacheField> {
        staged
            .writes
            .iter()
            .filter_map(|w| match w {
                PendingWrite::SetCacheField { field, .. } => Some(field.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_foreign_node_is_consistency_fault() {
        let mut fx = Fixture::new();
        fx.cache.node = 9;
        let result = validate(&fx, &CacheEdit::new().with("difficulty", "2"));
        assert!(matches!(result, Err(Error::ConsistencyFault(_))));
    }

    #[test]
    fn test_only_owner_may_edit() {
        let mut fx = Fixture::new();
        fx.actor = UserId(999);
        let result = validate(&fx, &CacheEdit::new().with("difficulty", "2"));
        assert!(matches!(result, Err(Error::Forbidden(_))));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let fx = Fixture::new();
        let result = validate(&fx, &CacheEdit::new().with("owner", "1"));
        assert!(matches!(
            result,
            Err(Error::InvalidParameter { param, .. }) if param == "owner"
        ));
    }

    #[test]
    fn test_name_needs_old_name() {
        let fx = Fixture::new();
        let result = validate(&fx, &CacheEdit::new().with("name", "New"));
        assert_eq!(result, Err(Error::MissingParameter("old_name".into())));

        let result = validate(
            &fx,
            &CacheEdit::new().with("name", "New").with("old_name", "Wrong"),
        );
        assert!(matches!(result, Err(Error::InvalidParameter { param, .. }) if param == "old_name"));

        let staged = validate(
            &fx,
            &CacheEdit::new()
                .with("name", "New")
                .with("old_name", fx.cache.name.clone()),
        )
        .expect("valid edit");
        assert_eq!(fields(&staged), vec![CacheField::Name("New".into())]);
    }

    #[test]
    fn test_type_change_forces_single_size() {
        let mut fx = Fixture::new();
        fx.cache.cache_type = CacheType::Multi;
        fx.cache.size = CacheSize::Large;
        let staged = validate(&fx, &CacheEdit::new().with("type", "Moving")).expect("valid edit");
        assert!(staged.problems.is_empty());
        assert_eq!(
            fields(&staged),
            vec![
                CacheField::Type(CacheType::Moving),
                CacheField::Size(CacheSize::Small)
            ]
        );
        assert!(staged.is_committable());
    }

    #[test]
    fn test_type_change_with_ambiguous_size() {
        let mut fx = Fixture::new();
        fx.cache.cache_type = CacheType::Traditional;
        fx.cache.size = CacheSize::Large;
        let staged = validate(&fx, &CacheEdit::new().with("type", "Event")).expect("valid edit");
        assert!(staged.problems.has("type"));
        assert!(!staged.is_committable());
    }

    #[test]
    fn test_size_not_available_for_type() {
        let fx = Fixture::new();
        let staged = validate(&fx, &CacheEdit::new().with("size", "none")).expect("valid edit");
        assert!(staged.problems.has("size"));

        let result = validate(&fx, &CacheEdit::new().with("size", "huge"));
        assert!(matches!(result, Err(Error::InvalidParameter { param, .. }) if param == "size"));
    }

    #[test]
    fn test_invalid_type_is_hard_error() {
        let fx = Fixture::new();
        let result = validate(&fx, &CacheEdit::new().with("type", "Podcast"));
        assert!(matches!(result, Err(Error::InvalidParameter { param, .. }) if param == "type"));
    }

    #[test]
    fn test_location_ranges() {
        let fx = Fixture::new();
        let staged = validate(&fx, &CacheEdit::new().with("location", "91|10")).expect("valid");
        assert_eq!(
            staged.problems.messages_for("location"),
            ["Latitude degrees must range between -90 and 90.".to_string()]
        );
        let staged = validate(&fx, &CacheEdit::new().with("location", "0|0")).expect("valid");
        assert!(staged.problems.has("location"));
        let staged = validate(&fx, &CacheEdit::new().with("location", "50.5|-181")).expect("valid");
        assert!(staged.problems.has("location"));

        let result = validate(&fx, &CacheEdit::new().with("location", "north"));
        assert!(matches!(result, Err(Error::InvalidParameter { param, .. }) if param == "location"));

        let staged = validate(&fx, &CacheEdit::new().with("location", "50.5|19.25")).expect("valid");
        assert_eq!(
            fields(&staged),
            vec![CacheField::Location(Coords::new(50.5, 19.25))]
        );
    }

    #[test]
    fn test_difficulty_and_terrain() {
        let fx = Fixture::new();
        let staged = validate(
            &fx,
            &CacheEdit::new().with("difficulty", "3.5").with("terrain", "1"),
        )
        .expect("valid");
        // terrain is already 1 star
        assert_eq!(
            fields(&staged),
            vec![CacheField::Difficulty(HalfStars::from_doubled(7).unwrap())]
        );

        for bad in ["5.5", "0.5", "2.25", "three", "1.3"] {
            let result = validate(&fx, &CacheEdit::new().with("terrain", bad));
            assert!(
                matches!(&result, Err(Error::InvalidParameter { param, .. }) if param == "terrain"),
                "{} accepted",
                bad
            );
        }
    }

    #[test]
    fn test_trip_time_window() {
        let mut fx = Fixture::new();
        let staged = validate(&fx, &CacheEdit::new().with("trip_time", "1000")).expect("valid");
        assert_eq!(
            staged.problems.messages_for("trip_time"),
            ["Invalid trip time; must range between 1 minute and 999 hours.".to_string()]
        );

        let staged = validate(&fx, &CacheEdit::new().with("trip_distance", "0.001")).expect("valid");
        assert!(staged.problems.has("trip_distance"));

        let result = validate(&fx, &CacheEdit::new().with("trip_time", "-1"));
        assert!(matches!(result, Err(Error::InvalidParameter { param, .. }) if param == "trip_time"));

        // values entered elsewhere above the limit are retained
        fx.cache.trip_time = Some(1500.0);
        let staged = validate(&fx, &CacheEdit::new().with("trip_time", "1200")).expect("valid");
        assert_eq!(fields(&staged), vec![CacheField::TripTime(Some(1200.0))]);

        let staged = validate(&fx, &CacheEdit::new().with("trip_time", "null")).expect("valid");
        assert_eq!(fields(&staged), vec![CacheField::TripTime(None)]);
    }

    #[test]
    fn test_password_rules_on_pl() {
        let mut fx = Fixture::with_policy(Box::new(PlPolicy));
        fx.cache.cache_type = CacheType::Traditional;
        fx.cache.date_created = Utc.with_ymd_and_hms(2015, 3, 1, 0, 0, 0).unwrap();
        let staged = validate(&fx, &CacheEdit::new().with("passwd", "secret")).expect("valid");
        assert_eq!(
            staged.problems.messages_for("passwd"),
            ["Opencaching.TEST does not allow log passwords for traditional caches.".to_string()]
        );

        // clearing is always fine
        fx.cache.password = "old".into();
        let staged = validate(&fx, &CacheEdit::new().with("passwd", "")).expect("valid");
        assert!(staged.problems.is_empty());
        assert_eq!(fields(&staged), vec![CacheField::Password(String::new())]);
    }

    #[test]
    fn test_password_length() {
        let fx = Fixture::new();
        let staged = validate(
            &fx,
            &CacheEdit::new().with("passwd", "x".repeat(fx.password_column_length + 1)),
        )
        .expect("valid");
        assert!(staged.problems.has("passwd"));

        // the column limit counts bytes
        let umlauts = "ä".repeat(fx.password_column_length / 2 + 1);
        assert!(umlauts.chars().count() <= fx.password_column_length);
        let staged = validate(&fx, &CacheEdit::new().with("passwd", umlauts)).expect("valid");
        assert!(staged.problems.has("passwd"));
    }

    #[test]
    fn test_type_change_clears_password_on_pl() {
        let mut fx = Fixture::with_policy(Box::new(PlPolicy));
        fx.cache.cache_type = CacheType::Quiz;
        fx.cache.size = CacheSize::Small;
        fx.cache.password = "pw".into();
        let staged = validate(&fx, &CacheEdit::new().with("type", "Multi")).expect("valid");
        assert!(fields(&staged).contains(&CacheField::Password(String::new())));

        let mut fx = Fixture::with_policy(Box::new(DePolicy));
        fx.cache.cache_type = CacheType::Quiz;
        fx.cache.size = CacheSize::Small;
        fx.cache.password = "pw".into();
        let staged = validate(&fx, &CacheEdit::new().with("type", "Multi")).expect("valid");
        assert!(!fields(&staged).contains(&CacheField::Password(String::new())));
    }

    #[test]
    fn test_gc_code() {
        let fx = Fixture::new();
        let result = validate(&fx, &CacheEdit::new().with("gc_code", ""));
        assert!(matches!(result, Err(Error::InvalidParameter { param, .. }) if param == "gc_code"));

        let staged = validate(&fx, &CacheEdit::new().with("gc_code", "GC1O2")).expect("valid");
        assert_eq!(fields(&staged), vec![CacheField::GcCode("GC102".into())]);

        let staged = validate(&fx, &CacheEdit::new().with("gc_code", "GCI")).expect("valid");
        assert!(staged.problems.has("gc_code"));

        let mut fx = Fixture::new();
        fx.cache.gc_code = "GC12".into();
        let staged = validate(&fx, &CacheEdit::new().with("gc_code", "null")).expect("valid");
        assert_eq!(fields(&staged), vec![CacheField::GcCode(String::new())]);
    }

    #[test]
    fn test_attribute_writes_skip_noops() {
        let mut fx = Fixture::new();
        fx.cache.attributes.insert("A3".into());
        let staged = validate(&fx, &CacheEdit::new().with("attributes", "A3|A1|-A2")).expect("valid");
        let writes: Vec<_> = staged.writes.writes().to_vec();
        assert_eq!(
            writes,
            vec![PendingWrite::AddAttribute {
                cache: fx.cache.id,
                code: "A1".into()
            }]
        );
    }

    #[test]
    fn test_problems_block_every_field() {
        let fx = Fixture::new();
        let staged = validate(
            &fx,
            &CacheEdit::new().with("difficulty", "4").with("location", "95|0"),
        )
        .expect("valid");
        assert!(!staged.writes.is_empty());
        assert!(!staged.is_committable());
    }

    #[test]
    fn test_pl_touches_last_modified() {
        let fx = Fixture::with_policy(Box::new(PlPolicy));
        let staged = validate(&fx, &CacheEdit::new().with("difficulty", "4")).expect("valid");
        assert!(matches!(
            staged.writes.writes().last(),
            Some(PendingWrite::TouchCache { .. })
        ));

        let fx = Fixture::new();
        let staged = validate(&fx, &CacheEdit::new().with("difficulty", "4")).expect("valid");
        assert!(!staged
            .writes
            .iter()
            .any(|w| matches!(w, PendingWrite::TouchCache { .. })));

        // nothing changed, nothing to touch
        let fx = Fixture::with_policy(Box::new(PlPolicy));
        let staged = validate(&fx, &CacheEdit::new().with("difficulty", "1")).expect("valid");
        assert!(staged.writes.is_empty());
    }

    #[test]
    fn test_status_is_not_editable_here() {
        let fx = Fixture::new();
        assert_eq!(fx.cache.status, CacheStatus::Available);
        assert!(validate(&fx, &CacheEdit::new().with("status", "Archived")).is_err());
    }
}
