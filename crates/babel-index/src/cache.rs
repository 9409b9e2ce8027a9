use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::Result;
use babel_types::Symbol;

/// On-disk symbol cache (`.babel/symbol_cache.json`).
///
/// Derived state: safe to delete, rebuilt by a full index. Per-file
/// content hashes drive incremental updates; `git_hash` records the
/// repository state the last full index saw.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SymbolCache {
    #[serde(default)]
    pub git_hash: String,
    /// file path -> content hash at extraction time
    #[serde(default)]
    pub files: BTreeMap<String, String>,
    #[serde(default)]
    pub symbols: Vec<Symbol>,
}

impl SymbolCache {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Replace all symbols belonging to one file.
    pub fn replace_file(&mut self, file_path: &str, content_hash: String, symbols: Vec<Symbol>) {
        self.symbols.retain(|s| s.file_path != file_path);
        self.symbols.extend(symbols);
        self.files.insert(file_path.to_string(), content_hash);
    }

    /// Drop files (and their symbols) that no longer exist on disk.
    pub fn retain_files(&mut self, existing: &std::collections::HashSet<String>) {
        self.files.retain(|path, _| existing.contains(path));
        self.symbols.retain(|s| existing.contains(&s.file_path));
    }

    pub fn file_hash(&self, file_path: &str) -> Option<&str> {
        self.files.get(file_path).map(|s| s.as_str())
    }
}
