//! Attribute reconciliation
//!
//! Owners send a signed delta such as `A1|-A17`, never a full set. Codes the
//! delta does not mention are left alone, including ones the catalog does not
//! know about (yet).

use crate::error::{Error, Result};
use crate::i18n::Messages;
use crate::problems::Problems;
use crate::services::{AttributeCatalog, AttributeInfo};
use indexmap::IndexMap;
use std::collections::{BTreeSet, HashSet};

/// Codes to link and unlink
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributeDelta {
    pub add: Vec<String>,
    pub remove: Vec<String>,
}

impl AttributeDelta {
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty()
    }

    /// `(current − remove) ∪ add`
    pub fn effective(&self, current: &BTreeSet<String>) -> BTreeSet<String> {
        current
            .iter()
            .filter(|code| !self.remove.contains(code))
            .chain(self.add.iter())
            .cloned()
            .collect()
    }
}

/// Parse and check an attribute delta against the catalog
///
/// Unknown codes and contradicting operations are hard errors. Codes the
/// catalog marks as not addable and incompatible pairs are recorded under
/// `attributes` in `problems`.
pub fn reconcile(
    current: &BTreeSet<String>,
    raw: &str,
    catalog: &dyn AttributeCatalog,
    messages: &Messages<'_>,
    problems: &mut Problems,
) -> Result<AttributeDelta> {
    let mut delta = AttributeDelta::default();
    let mut known: IndexMap<String, AttributeInfo> = IndexMap::new();

    for token in raw.split('|') {
        let (remove, code) = match token.strip_prefix('-') {
            Some(code) => (true, code),
            None => (false, token),
        };
        let info = catalog
            .attribute(code, messages.langprefs())
            .ok_or_else(|| {
                Error::invalid_because("attributes", format!("Invalid A-Code: '{}'", code))
            })?;

        if remove {
            push_unique(&mut delta.remove, code);
        } else if info.addable {
            push_unique(&mut delta.add, code);
        } else {
            problems.record(
                "attributes",
                messages.format(
                    "The attribute '%s' cannot be added to a cache.",
                    &[&info.name],
                ),
            );
        }
        known.insert(code.to_string(), info);
    }

    let contradicting: Vec<&str> = delta
        .add
        .iter()
        .filter(|code| delta.remove.contains(code))
        .map(String::as_str)
        .collect();
    if !contradicting.is_empty() {
        return Err(Error::invalid_because(
            "attributes",
            format!("Contradicting operations for {}", contradicting.join(" and ")),
        ));
    }

    let effective = delta.effective(current);
    let mut reported: HashSet<(String, String)> = HashSet::new();
    for code in &delta.add {
        let Some(info) = known.get(code) else {
            continue;
        };
        for other in &info.incompatible {
            if !effective.contains(other) {
                continue;
            }
            let pair = if code < other {
                (code.clone(), other.clone())
            } else {
                (other.clone(), code.clone())
            };
            if !reported.insert(pair) {
                continue;
            }
            let other_name = known
                .get(other)
                .map(|i| i.name.clone())
                .or_else(|| {
                    catalog
                        .attribute(other, messages.langprefs())
                        .map(|i| i.name)
                })
                .unwrap_or_else(|| other.clone());
            problems.record(
                "attributes",
                messages.format(
                    "The attributes '%s' and '%s' contradict.",
                    &[&info.name, &other_name],
                ),
            );
        }
    }

    Ok(delta)
}

fn push_unique(codes: &mut Vec<String>, code: &str) {
    if !codes.iter().any(|c| c == code) {
        codes.push(code.to_string());
    }
}
