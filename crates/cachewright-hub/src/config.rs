//! Hub Configuration - lookup cache and recommendation settings
//!
//! Site-specific settings (branch, node, language priority) come from the
//! RON site files; this module covers what the coordinator itself tunes.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the Hub
///
/// # Example
///
/// ```
/// use cachewright_hub::HubConfig;
///
/// let config = HubConfig::default()
///     .with_recommendation_ratio(5)
///     .with_lookup_capacity(16);
/// assert_eq!(config.recommendation_ratio(), 5);
/// assert_eq!(config.lookup_capacity(), 16);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubConfig {
    /// Maximum number of entries per lookup cache
    lookup_capacity: u64,
    /// How long the language dictionary is kept
    language_ttl_secs: u64,
    /// Primary-language statistics are kept this long per counted owner
    primary_language_ttl_per_owner_secs: u64,
    /// One recommendation may be given per this many finds
    ///
    /// Clamped to at least 1.
    recommendation_ratio: u32,
}

impl HubConfig {
    pub fn lookup_capacity(&self) -> u64 {
        self.lookup_capacity
    }

    pub fn language_ttl(&self) -> Duration {
        Duration::from_secs(self.language_ttl_secs)
    }

    /// Lifetime of primary-language statistics computed from `owners` owners
    pub fn primary_language_ttl(&self, owners: usize) -> Duration {
        let owners = u64::try_from(owners).unwrap_or(u64::MAX);
        Duration::from_secs(owners.saturating_mul(self.primary_language_ttl_per_owner_secs))
    }

    pub fn recommendation_ratio(&self) -> u32 {
        self.recommendation_ratio
    }

    pub fn with_lookup_capacity(mut self, capacity: u64) -> Self {
        self.lookup_capacity = capacity;
        self
    }

    pub fn with_language_ttl(mut self, ttl: Duration) -> Self {
        self.language_ttl_secs = ttl.as_secs();
        self
    }

    pub fn with_recommendation_ratio(mut self, ratio: u32) -> Self {
        self.recommendation_ratio = ratio.max(1);
        self
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            lookup_capacity: 64,
            language_ttl_secs: 24 * 3600,
            primary_language_ttl_per_owner_secs: 250,
            recommendation_ratio: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = HubConfig::default();
        assert_eq!(config.language_ttl(), Duration::from_secs(86_400));
        assert_eq!(config.recommendation_ratio(), 10);
    }

    #[test]
    fn test_primary_language_ttl_grows_with_owners() {
        let config = HubConfig::default();
        assert_eq!(config.primary_language_ttl(0), Duration::ZERO);
        // ~10000 owners keep the statistics for about a month
        assert_eq!(config.primary_language_ttl(10_000), Duration::from_secs(2_500_000));
    }

    #[test]
    fn test_ratio_clamped_minimum() {
        let config = HubConfig::default().with_recommendation_ratio(0);
        assert_eq!(config.recommendation_ratio(), 1);
    }

    #[test]
    fn test_config_ron() {
        let config: HubConfig = ron::from_str(
            "(lookup_capacity: 8, language_ttl_secs: 60, primary_language_ttl_per_owner_secs: 1, recommendation_ratio: 3)",
        )
        .unwrap();
        assert_eq!(config.lookup_capacity(), 8);
        assert_eq!(config.language_ttl(), Duration::from_secs(60));
        assert_eq!(config.primary_language_ttl(5), Duration::from_secs(5));
    }
}
