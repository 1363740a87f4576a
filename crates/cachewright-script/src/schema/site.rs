//! Site settings schema

use cachewright_core::Branch;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Installation-wide settings of one site
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteSettings {
    /// `"oc.de"` or `"oc.pl"`
    pub branch: Branch,
    /// Partition every cache and log of this site belongs to
    #[serde(default)]
    pub node_id: u32,
    pub site_name: String,
    /// Fallback when no primary language can be derived
    #[serde(default = "default_site_language")]
    pub site_language: String,
    /// Root of derived per-user files (statistics pictures)
    #[serde(default)]
    pub var_dir: PathBuf,
    /// Length of the password column
    #[serde(default = "default_password_column_length")]
    pub password_column_length: usize,
    /// Upper-case language codes in default-description order; empty means
    /// the site's primary languages
    #[serde(default)]
    pub language_priority: Vec<String>,
    /// How far in the future a log date may lie
    #[serde(default = "default_future_grace_secs")]
    pub future_grace_secs: i64,
}

fn default_site_language() -> String {
    "en".to_string()
}

fn default_password_column_length() -> usize {
    20
}

fn default_future_grace_secs() -> i64 {
    300
}

impl SiteSettings {
    pub fn new(branch: Branch, site_name: impl Into<String>) -> Self {
        Self {
            branch,
            node_id: 0,
            site_name: site_name.into(),
            site_language: default_site_language(),
            var_dir: PathBuf::new(),
            password_column_length: default_password_column_length(),
            language_priority: Vec::new(),
            future_grace_secs: default_future_grace_secs(),
        }
    }
}
