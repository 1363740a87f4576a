//! RON site file loader

use crate::error::{Error, Result};
use crate::schema::attribute::AttributeDefs;
use crate::schema::capability::ResolvedCapabilities;
use crate::schema::{AttributeDef, CapabilityDefs, MessageDef, SiteSettings};
use cachewright_core::BranchPolicy;
use indexmap::IndexMap;
use std::fs;
use std::path::Path;

/// Loaded site definitions
#[derive(Debug, Clone)]
pub struct SiteDefs {
    pub settings: SiteSettings,
    pub capabilities: ResolvedCapabilities,
    /// Language names by language code, then by the language they are written in
    pub languages: IndexMap<String, IndexMap<String, String>>,
    /// Attribute catalog by code
    pub attributes: IndexMap<String, AttributeDef>,
    /// Translations by English message id
    pub messages: IndexMap<String, MessageDef>,
}

impl SiteDefs {
    /// Policy of the configured branch
    pub fn policy(&self) -> Box<dyn BranchPolicy> {
        self.settings.branch.policy()
    }

    /// Get an attribute definition
    pub fn get_attribute(&self, code: &str) -> Option<&AttributeDef> {
        self.attributes.get(code)
    }

    /// Get the translations of a message
    pub fn get_message(&self, id: &str) -> Option<&MessageDef> {
        self.messages.get(id)
    }
}

/// Loader for RON site files
#[derive(Default)]
pub struct Loader {
    settings: Option<SiteSettings>,
    capabilities: Option<CapabilityDefs>,
    attributes: IndexMap<String, AttributeDef>,
    messages: IndexMap<String, MessageDef>,
}

impl Loader {
    /// Create a new loader
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a single RON file
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;

        // Determine the kind from the filename, then from the content
        let filename = path.file_name().and_then(|n| n.to_str()).unwrap_or("");

        if filename.contains("site") || content.contains("site:") {
            self.load_site_str(&content)
        } else if filename.contains("capabilit") || content.contains("cache_types:") {
            self.load_capabilities_str(&content)
        } else if filename.contains("attribute") || content.contains("attributes:") {
            self.load_attributes_str(&content)
        } else if filename.contains("message") || content.contains("messages:") {
            self.load_messages_str(&content)
        } else {
            Err(Error::InvalidSchema(format!(
                "Could not tell what {:?} defines",
                path
            )))
        }
    }

    /// Load site settings from a RON string
    pub fn load_site_str(&mut self, content: &str) -> Result<()> {
        #[derive(serde::Deserialize)]
        struct SiteFile {
            site: SiteSettings,
        }

        let file: SiteFile = ron::from_str(content)?;
        if self.settings.is_some() {
            return Err(Error::DuplicateDefinition("site".to_string()));
        }
        self.settings = Some(file.site);
        Ok(())
    }

    /// Load capability tables from a RON string
    pub fn load_capabilities_str(&mut self, content: &str) -> Result<()> {
        let file: CapabilityDefs = ron::from_str(content)?;
        if self.capabilities.is_some() {
            return Err(Error::DuplicateDefinition("capabilities".to_string()));
        }
        self.capabilities = Some(file);
        Ok(())
    }

    /// Load attribute definitions from a RON string
    pub fn load_attributes_str(&mut self, content: &str) -> Result<()> {
        let file: AttributeDefs = ron::from_str(content)?;
        for attribute in file.attributes {
            let code = attribute.code.clone();
            if self.attributes.contains_key(&code) {
                return Err(Error::DuplicateDefinition(code));
            }
            self.attributes.insert(code, attribute);
        }
        Ok(())
    }

    /// Load message translations from a RON string
    pub fn load_messages_str(&mut self, content: &str) -> Result<()> {
        #[derive(serde::Deserialize)]
        struct MessageFile {
            messages: Vec<MessageDef>,
        }

        let file: MessageFile = ron::from_str(content)?;
        for message in file.messages {
            let id = message.id.clone();
            if self.messages.contains_key(&id) {
                return Err(Error::DuplicateDefinition(id));
            }
            self.messages.insert(id, message);
        }
        Ok(())
    }

    /// Load all RON files from a directory
    pub fn load_directory(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if !path.is_dir() {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("Not a directory: {:?}", path),
            )));
        }

        let mut entries = fs::read_dir(path)?.collect::<std::io::Result<Vec<_>>>()?;
        entries.sort_by_key(|e| e.path());
        for entry in entries {
            let file_path = entry.path();
            if file_path.extension().map(|e| e == "ron").unwrap_or(false) {
                self.load_file(&file_path)?;
            } else if file_path.is_dir() {
                self.load_directory(&file_path)?;
            }
        }

        Ok(())
    }

    /// Finish loading; site settings and capabilities are required
    pub fn finish(self) -> Result<SiteDefs> {
        let settings = self
            .settings
            .ok_or_else(|| Error::MissingField("site".to_string()))?;
        let defs = self
            .capabilities
            .ok_or_else(|| Error::MissingField("capabilities".to_string()))?;
        let capabilities = defs.resolve()?;

        let mut languages = IndexMap::new();
        for language in defs.languages {
            let code = language.code.to_lowercase();
            if languages.contains_key(&code) {
                return Err(Error::DuplicateDefinition(format!("language {}", code)));
            }
            languages.insert(code, language.names);
        }

        Ok(SiteDefs {
            settings,
            capabilities,
            languages,
            attributes: self.attributes,
            messages: self.messages,
        })
    }
}
