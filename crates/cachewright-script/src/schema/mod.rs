//! Schema definitions for RON site files

pub mod attribute;
pub mod capability;
pub mod message;
pub mod site;

pub use attribute::AttributeDef;
pub use capability::{CapabilityDefs, LanguageDef};
pub use message::MessageDef;
pub use site::SiteSettings;

use indexmap::IndexMap;

/// Best entry of a per-language map for the given preferences
///
/// Falls back to English, then to the first entry.
pub fn pick_best_language<'a>(
    texts: &'a IndexMap<String, String>,
    langprefs: &[String],
) -> Option<&'a str> {
    langprefs
        .iter()
        .find_map(|lang| texts.get(&lang.to_lowercase()))
        .or_else(|| texts.get("en"))
        .or_else(|| texts.values().next())
        .map(String::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pick_best_language() {
        let texts: IndexMap<String, String> = [("pl", "Polski"), ("en", "Polish")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        assert_eq!(pick_best_language(&texts, &["DE".into(), "PL".into()]), Some("Polski"));
        assert_eq!(pick_best_language(&texts, &["de".into()]), Some("Polish"));

        let only_pl: IndexMap<String, String> =
            [("pl".to_string(), "Polski".to_string())].into_iter().collect();
        assert_eq!(pick_best_language(&only_pl, &[]), Some("Polski"));
        assert_eq!(pick_best_language(&IndexMap::new(), &[]), None);
    }
}
