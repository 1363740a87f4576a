//! Geocache listing snapshot and its enumerated attributes

use crate::identity::{CacheId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Kind of geocache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CacheType {
    Traditional,
    Multi,
    Quiz,
    Virtual,
    Event,
    Webcam,
    Moving,
    Math,
    #[serde(rename = "Drive-In")]
    DriveIn,
    Own,
    Podcast,
    Other,
}

impl CacheType {
    /// Every known type, in catalog order
    pub const ALL: [CacheType; 12] = [
        CacheType::Traditional,
        CacheType::Multi,
        CacheType::Quiz,
        CacheType::Virtual,
        CacheType::Event,
        CacheType::Webcam,
        CacheType::Moving,
        CacheType::Math,
        CacheType::DriveIn,
        CacheType::Own,
        CacheType::Podcast,
        CacheType::Other,
    ];

    /// External name of the type
    pub fn name(&self) -> &'static str {
        match self {
            CacheType::Traditional => "Traditional",
            CacheType::Multi => "Multi",
            CacheType::Quiz => "Quiz",
            CacheType::Virtual => "Virtual",
            CacheType::Event => "Event",
            CacheType::Webcam => "Webcam",
            CacheType::Moving => "Moving",
            CacheType::Math => "Math",
            CacheType::DriveIn => "Drive-In",
            CacheType::Own => "Own",
            CacheType::Podcast => "Podcast",
            CacheType::Other => "Other",
        }
    }

    /// Parse an external name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.name() == name)
    }

    /// Stable numeric code used for storage
    pub fn code(&self) -> u8 {
        match self {
            CacheType::Other => 1,
            CacheType::Traditional => 2,
            CacheType::Multi => 3,
            CacheType::Virtual => 4,
            CacheType::Webcam => 5,
            CacheType::Event => 6,
            CacheType::Quiz => 7,
            CacheType::Math => 8,
            CacheType::Moving => 9,
            CacheType::DriveIn => 10,
            CacheType::Own => 11,
            CacheType::Podcast => 12,
        }
    }

    /// Inverse of [`CacheType::code`]
    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.code() == code)
    }

    /// Event caches are attended, not found
    pub fn is_event(&self) -> bool {
        matches!(self, CacheType::Event)
    }
}

impl fmt::Display for CacheType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Container size classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheSize {
    None,
    Nano,
    Micro,
    Small,
    Regular,
    Large,
    XLarge,
    Other,
}

impl CacheSize {
    /// Every known size, smallest first
    pub const ALL: [CacheSize; 8] = [
        CacheSize::None,
        CacheSize::Nano,
        CacheSize::Micro,
        CacheSize::Small,
        CacheSize::Regular,
        CacheSize::Large,
        CacheSize::XLarge,
        CacheSize::Other,
    ];

    /// External name of the size
    pub fn name(&self) -> &'static str {
        match self {
            CacheSize::None => "none",
            CacheSize::Nano => "nano",
            CacheSize::Micro => "micro",
            CacheSize::Small => "small",
            CacheSize::Regular => "regular",
            CacheSize::Large => "large",
            CacheSize::XLarge => "xlarge",
            CacheSize::Other => "other",
        }
    }

    /// Parse an external name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|s| s.name() == name)
    }

    /// Stable numeric code used for storage
    pub fn code(&self) -> u8 {
        match self {
            CacheSize::Other => 1,
            CacheSize::Micro => 2,
            CacheSize::Small => 3,
            CacheSize::Regular => 4,
            CacheSize::Large => 5,
            CacheSize::XLarge => 6,
            CacheSize::None => 7,
            CacheSize::Nano => 8,
        }
    }

    /// Inverse of [`CacheSize::code`]
    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|s| s.code() == code)
    }
}

impl fmt::Display for CacheSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Availability of a listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CacheStatus {
    Available,
    TemporarilyUnavailable,
    Archived,
}

impl CacheStatus {
    /// Stable numeric code used for storage
    pub fn code(&self) -> u8 {
        match self {
            CacheStatus::Available => 1,
            CacheStatus::TemporarilyUnavailable => 2,
            CacheStatus::Archived => 3,
        }
    }

    /// Inverse of [`CacheStatus::code`]
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(CacheStatus::Available),
            2 => Some(CacheStatus::TemporarilyUnavailable),
            3 => Some(CacheStatus::Archived),
            _ => None,
        }
    }
}

/// Difficulty or terrain rating in half-point steps, stored doubled (2..=10)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HalfStars(u8);

impl HalfStars {
    /// Lowest rating, 1 star
    pub const MIN: HalfStars = HalfStars(2);
    /// Highest rating, 5 stars
    pub const MAX: HalfStars = HalfStars(10);

    /// Build from the doubled value; `None` outside 2..=10
    pub fn from_doubled(doubled: u8) -> Option<Self> {
        (Self::MIN.0..=Self::MAX.0)
            .contains(&doubled)
            .then_some(HalfStars(doubled))
    }

    /// Build from a star value such as 1.5; `None` unless a half step in [1, 5]
    pub fn from_stars(stars: f64) -> Option<Self> {
        let doubled = stars * 2.0;
        if doubled.fract() != 0.0 || !(2.0..=10.0).contains(&doubled) {
            return None;
        }
        Some(HalfStars(doubled as u8))
    }

    /// The doubled value
    pub fn doubled(&self) -> u8 {
        self.0
    }

    /// The star value
    pub fn stars(&self) -> f64 {
        f64::from(self.0) / 2.0
    }
}

impl fmt::Display for HalfStars {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.stars())
    }
}

/// WGS84 coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coords {
    pub lat: f64,
    pub lon: f64,
}

impl Coords {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Parse the `"lat|lon"` wire format. Range is not checked here.
    pub fn parse(raw: &str) -> Option<Self> {
        let (lat, lon) = raw.split_once('|')?;
        let lat: f64 = lat.trim().parse().ok()?;
        let lon: f64 = lon.trim().parse().ok()?;
        if !lat.is_finite() || !lon.is_finite() {
            return None;
        }
        Some(Self { lat, lon })
    }
}

impl fmt::Display for Coords {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.lat, self.lon)
    }
}

/// Log-derived counters of a cache
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub founds: u32,
    pub notfounds: u32,
    pub notes: u32,
    pub last_found: Option<DateTime<Utc>>,
}

/// Running weighted-average rating of a cache
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RatingStats {
    pub score: f64,
    pub votes: u32,
}

/// Immutable snapshot of a cache listing, read once per request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cache {
    pub id: CacheId,
    /// Public listing code, e.g. `OP1234`
    pub code: String,
    /// Partition (site node) the listing belongs to
    pub node: u32,
    pub owner: UserId,
    pub name: String,
    pub cache_type: CacheType,
    pub size: CacheSize,
    pub status: CacheStatus,
    pub difficulty: HalfStars,
    pub terrain: HalfStars,
    pub location: Coords,
    /// Hours
    pub trip_time: Option<f64>,
    /// Kilometers
    pub trip_distance: Option<f64>,
    /// Log password; empty when none is required
    pub password: String,
    pub gc_code: String,
    pub attributes: BTreeSet<String>,
    pub stats: CacheStats,
    pub rating: RatingStats,
    /// Comma-separated upper-case languages that have descriptions
    pub desc_languages: String,
    pub default_desc_lang: String,
    pub date_created: DateTime<Utc>,
    pub date_hidden: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
}

impl Cache {
    /// Minimal listing, mostly for fixtures and imports
    pub fn new(
        id: CacheId,
        code: impl Into<String>,
        owner: UserId,
        cache_type: CacheType,
        created: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            code: code.into(),
            node: 0,
            owner,
            name: String::new(),
            cache_type,
            size: CacheSize::Regular,
            status: CacheStatus::Available,
            difficulty: HalfStars::MIN,
            terrain: HalfStars::MIN,
            location: Coords::new(52.0, 21.0),
            trip_time: None,
            trip_distance: None,
            password: String::new(),
            gc_code: String::new(),
            attributes: BTreeSet::new(),
            stats: CacheStats::default(),
            rating: RatingStats::default(),
            desc_languages: String::new(),
            default_desc_lang: String::new(),
            date_created: created,
            date_hidden: created,
            last_modified: created,
        }
    }

    /// Whether finds must quote the log password
    pub fn requires_password(&self) -> bool {
        !self.password.is_empty()
    }

    pub fn is_owned_by(&self, user: UserId) -> bool {
        self.owner == user
    }
}

/// Aggregate counters of a log author
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserStats {
    pub founds: u32,
    pub notfounds: u32,
    pub notes: u32,
}

/// User snapshot as far as log rules need it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub stats: UserStats,
}

impl User {
    pub fn new(id: UserId, username: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
            stats: UserStats::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_names_round_trip_through_codes() {
        for t in CacheType::ALL {
            assert_eq!(CacheType::from_name(t.name()), Some(t));
            assert_eq!(CacheType::from_code(t.code()), Some(t));
        }
        assert_eq!(CacheType::from_name("Drive-In"), Some(CacheType::DriveIn));
        assert_eq!(CacheType::from_name("traditional"), None);
    }

    #[test]
    fn test_size_serde_names() {
        let s: CacheSize = ron::from_str("xlarge").expect("deserialize");
        assert_eq!(s, CacheSize::XLarge);
        assert_eq!(CacheSize::from_name("small"), Some(CacheSize::Small));
    }

    #[test]
    fn test_half_stars() {
        assert_eq!(HalfStars::from_stars(1.5).map(|h| h.doubled()), Some(3));
        assert_eq!(HalfStars::from_stars(5.0), Some(HalfStars::MAX));
        assert!(HalfStars::from_stars(0.5).is_none());
        assert!(HalfStars::from_stars(1.3).is_none());
        assert!(HalfStars::from_stars(5.5).is_none());
        assert!(HalfStars::from_doubled(11).is_none());
        assert_eq!(HalfStars::from_doubled(4).map(|h| h.stars()), Some(2.0));
    }

    #[test]
    fn test_coords_parse() {
        assert_eq!(Coords::parse("54.5|-18.25"), Some(Coords::new(54.5, -18.25)));
        assert_eq!(Coords::parse("91|0"), Some(Coords::new(91.0, 0.0)));
        assert!(Coords::parse("54.5").is_none());
        assert!(Coords::parse("N54|E18").is_none());
        assert!(Coords::parse("NaN|1").is_none());
    }
}
