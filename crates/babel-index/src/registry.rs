use std::collections::HashMap;
use std::path::Path;

use crate::config::LanguageConfig;
use crate::{Error, Result};

/// Routes files to language configurations by extension.
#[derive(Debug, Default)]
pub struct ParserRegistry {
    configs: HashMap<&'static str, LanguageConfig>,
    extension_map: HashMap<String, &'static str>,
}

impl ParserRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a language. Errors when an extension is already claimed
    /// by a different config.
    pub fn register(&mut self, config: LanguageConfig) -> Result<()> {
        for ext in config.extensions {
            let ext_lower = ext.to_lowercase();
            if let Some(existing) = self.extension_map.get(&ext_lower)
                && *existing != config.name
            {
                return Err(Error::ExtensionConflict {
                    extension: ext_lower,
                    existing: existing.to_string(),
                    incoming: config.name.to_string(),
                });
            }
        }

        for ext in config.extensions {
            self.extension_map.insert(ext.to_lowercase(), config.name);
        }
        self.configs.insert(config.name, config);
        Ok(())
    }

    pub fn unregister(&mut self, name: &str) -> bool {
        let Some(config) = self.configs.remove(name) else {
            return false;
        };
        for ext in config.extensions {
            let ext_lower = ext.to_lowercase();
            if self.extension_map.get(&ext_lower).copied() == Some(config.name) {
                self.extension_map.remove(&ext_lower);
            }
        }
        true
    }

    /// Config handling this file's extension, if any.
    pub fn config_for(&self, path: &Path) -> Option<&LanguageConfig> {
        let ext = format!(".{}", path.extension()?.to_str()?.to_lowercase());
        let name = self.extension_map.get(&ext)?;
        self.configs.get(name)
    }

    pub fn config_by_name(&self, name: &str) -> Option<&LanguageConfig> {
        self.configs.get(name)
    }

    pub fn supported_extensions(&self) -> Vec<String> {
        let mut extensions: Vec<String> = self.extension_map.keys().cloned().collect();
        extensions.sort();
        extensions
    }

    pub fn supported_languages(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.configs.keys().copied().collect();
        names.sort();
        names
    }

    pub fn is_supported(&self, path: &Path) -> bool {
        self.config_for(path).is_some()
    }

    pub fn len(&self) -> usize {
        self.configs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }
}
