//! Loaded definitions as the collaborators the validators consume

use crate::loader::SiteDefs;
use crate::schema::pick_best_language;
use cachewright_core::{
    AttributeCatalog, AttributeInfo, CacheSize, CacheType, Capabilities, Translator,
};
use indexmap::IndexMap;

/// Language names picked for `langprefs`, sorted by name
pub fn localize_languages(
    dictionary: &IndexMap<String, IndexMap<String, String>>,
    langprefs: &[String],
) -> IndexMap<String, String> {
    let mut localized: Vec<(String, String)> = dictionary
        .iter()
        .map(|(code, names)| {
            let name = pick_best_language(names, langprefs).unwrap_or(code.as_str());
            (code.clone(), name.to_string())
        })
        .collect();
    localized.sort_by(|a, b| a.1.cmp(&b.1));
    localized.into_iter().collect()
}

impl AttributeCatalog for SiteDefs {
    fn attribute(&self, code: &str, langprefs: &[String]) -> Option<AttributeInfo> {
        let def = self.get_attribute(code)?;
        Some(AttributeInfo {
            code: def.code.clone(),
            name: pick_best_language(&def.names, langprefs)
                .unwrap_or(code)
                .to_string(),
            addable: def.addable,
            incompatible: def.incompatible.clone(),
        })
    }
}

impl Capabilities for SiteDefs {
    fn cache_types(&self) -> Vec<CacheType> {
        self.capabilities.cache_types.clone()
    }

    fn cache_sizes(&self) -> Vec<CacheSize> {
        self.capabilities.cache_sizes.clone()
    }

    fn sizes_for(&self, cache_type: CacheType) -> Vec<CacheSize> {
        self.capabilities.sizes_for(cache_type)
    }

    fn password_max_length(&self, cache_type: CacheType) -> usize {
        self.policy()
            .password_max_length(cache_type, self.settings.password_column_length)
    }

    fn languages(&self, langprefs: &[String]) -> IndexMap<String, String> {
        localize_languages(&self.languages, langprefs)
    }
}

impl Translator for SiteDefs {
    fn translate(&self, msgid: &str, langprefs: &[String]) -> String {
        let Some(message) = self.get_message(msgid) else {
            return msgid.to_string();
        };
        for lang in langprefs {
            let lang = lang.to_lowercase();
            if lang == "en" {
                break;
            }
            if let Some(text) = message.translations.get(&lang) {
                return text.clone();
            }
        }
        msgid.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::Loader;

    fn defs(branch: &str) -> SiteDefs {
        let mut loader = Loader::new();
        loader
            .load_site_str(&format!(
                r#"(site: (branch: "{}", site_name: "Test", password_column_length: 20))"#,
                branch
            ))
            .unwrap();
        loader
            .load_capabilities_str(
                r#"
                (
                    cache_types: ["Traditional", "Multi"],
                    cache_sizes: ["none", "small", "regular"],
                    languages: [
                        (code: "pl", names: { "en": "Polish", "pl": "polski" }),
                        (code: "de", names: { "en": "German", "pl": "niemiecki" }),
                    ],
                )
                "#,
            )
            .unwrap();
        loader
            .load_attributes_str(
                r#"
                (
                    attributes: [
                        (code: "A1", names: { "en": "Dogs allowed", "pl": "Psy dozwolone" }, incompatible: ["A2"]),
                        (code: "A2", names: { "en": "No dogs" }, addable: false),
                    ]
                )
                "#,
            )
            .unwrap();
        loader
            .load_messages_str(
                r#"
                (
                    messages: [
                        (id: "Please enter some text.", translations: { "pl": "Wpisz tekst." }),
                    ]
                )
                "#,
            )
            .unwrap();
        loader.finish().unwrap()
    }

    #[test]
    fn test_attribute_catalog() {
        let defs = defs("oc.pl");
        let a1 = defs.attribute("A1", &["pl".into()]).unwrap();
        assert_eq!(a1.name, "Psy dozwolone");
        assert!(a1.addable);
        assert_eq!(a1.incompatible, vec!["A2"]);
        assert!(!defs.attribute("A2", &[]).unwrap().addable);
        assert!(defs.attribute("A9", &[]).is_none());
    }

    #[test]
    fn test_password_length_follows_branch() {
        assert_eq!(defs("oc.pl").password_max_length(CacheType::Traditional), 0);
        assert_eq!(defs("oc.pl").password_max_length(CacheType::Multi), 20);
        assert_eq!(defs("oc.de").password_max_length(CacheType::Traditional), 20);
    }

    #[test]
    fn test_languages_sorted_by_localized_name() {
        let defs = defs("oc.pl");
        let en: Vec<_> = defs.languages(&["en".into()]).into_iter().collect();
        assert_eq!(
            en,
            vec![
                ("de".to_string(), "German".to_string()),
                ("pl".to_string(), "Polish".to_string())
            ]
        );
        let pl: Vec<_> = defs.languages(&["pl".into()]).into_values().collect();
        assert_eq!(pl, vec!["niemiecki", "polski"]);
    }

    #[test]
    fn test_translation_falls_back_to_message_id() {
        let defs = defs("oc.pl");
        assert_eq!(defs.translate("Please enter some text.", &["pl".into()]), "Wpisz tekst.");
        assert_eq!(
            defs.translate("Please enter some text.", &["en".into(), "pl".into()]),
            "Please enter some text."
        );
        assert_eq!(defs.translate("Unknown", &["pl".into()]), "Unknown");
    }
}
