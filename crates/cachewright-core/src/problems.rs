//! Soft validation problems
//!
//! A problem blocks the commit of an edit but does not abort the request:
//! every field is still examined and the caller receives the full,
//! field-keyed message set for form re-display.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Field-keyed collection of validation messages, in discovery order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Problems {
    entries: IndexMap<String, Vec<String>>,
}

impl Problems {
    /// Create an empty collection
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a message for a field
    pub fn record(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.entries
            .entry(field.into())
            .or_default()
            .push(message.into());
    }

    /// Whether a field has at least one message
    pub fn has(&self, field: &str) -> bool {
        self.entries.contains_key(field)
    }

    /// Messages recorded for a field
    pub fn messages_for(&self, field: &str) -> &[String] {
        self.entries.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Total number of messages across all fields
    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    /// Check if nothing was recorded
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over fields and their messages
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Merge another collection into this one
    pub fn extend(&mut self, other: Problems) {
        for (field, messages) in other.entries {
            self.entries.entry(field).or_default().extend(messages);
        }
    }

    /// Flatten to one message per field, joining multiple messages with a space
    pub fn to_field_map(&self) -> IndexMap<String, String> {
        self.entries
            .iter()
            .map(|(k, v)| (k.clone(), v.join(" ")))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_query() {
        let mut problems = Problems::new();
        assert!(problems.is_empty());

        problems.record("size", "This size is not available for this type of cache.");
        problems.record("attributes", "one");
        problems.record("attributes", "two");

        assert!(problems.has("size"));
        assert!(!problems.has("type"));
        assert_eq!(problems.len(), 3);
        assert_eq!(problems.messages_for("attributes"), ["one", "two"]);
        assert!(problems.messages_for("type").is_empty());
    }

    #[test]
    fn test_field_map_keeps_order() {
        let mut problems = Problems::new();
        problems.record("passwd", "too long");
        problems.record("location", "bad");
        problems.record("passwd", "again");

        let map = problems.to_field_map();
        let keys: Vec<&str> = map.keys().map(String::as_str).collect();
        assert_eq!(keys, ["passwd", "location"]);
        assert_eq!(map["passwd"], "too long again");
    }

    #[test]
    fn test_problems_serialization() {
        let mut problems = Problems::new();
        problems.record("gc_code", "Invalid GC code");

        let serialized = ron::to_string(&problems).expect("serialize");
        let deserialized: Problems = ron::from_str(&serialized).expect("deserialize");
        assert_eq!(deserialized, problems);
    }
}
