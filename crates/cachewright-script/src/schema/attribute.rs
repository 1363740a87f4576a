//! Attribute catalog schema

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// One attribute of the catalog, e.g. `A13` "Dogs allowed"
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributeDef {
    /// Catalog code (`A1`, `A2`, ...)
    pub code: String,
    /// Display names by lower-case language code
    pub names: IndexMap<String, String>,
    /// Whether owners may add it to a cache
    #[serde(default = "default_addable")]
    pub addable: bool,
    /// Codes that must not be set together with this one
    #[serde(default)]
    pub incompatible: Vec<String>,
}

fn default_addable() -> bool {
    true
}

/// A collection of attribute definitions
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AttributeDefs {
    pub attributes: Vec<AttributeDef>,
}
