//! Translated message schema

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Translations of one English message id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageDef {
    pub id: String,
    /// Translated text by lower-case language code
    pub translations: IndexMap<String, String>,
}
