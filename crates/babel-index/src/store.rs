use std::collections::HashSet;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::cache::SymbolCache;
use crate::exclusions::ExclusionRegistry;
use crate::extractor::TreeSitterExtractor;
use crate::registry::ParserRegistry;
use crate::{Error, Result};
use babel_core::{token_match_score, tokenize_text};
use babel_types::{Symbol, SymbolType};

/// The code symbol index: extraction, cache, and token-scored query.
pub struct SymbolIndex {
    registry: ParserRegistry,
    exclusions: ExclusionRegistry,
    extractor: TreeSitterExtractor,
    cache_path: PathBuf,
    cache: SymbolCache,
    include_tests: bool,
}

impl SymbolIndex {
    /// Open an index backed by `cache_path`, loading any prior cache.
    pub fn open(cache_path: impl Into<PathBuf>, registry: ParserRegistry) -> Result<Self> {
        let cache_path = cache_path.into();
        let cache = SymbolCache::load(&cache_path)?;
        Ok(Self {
            registry,
            exclusions: ExclusionRegistry::new(),
            extractor: TreeSitterExtractor::new(),
            cache_path,
            cache,
            include_tests: false,
        })
    }

    pub fn with_tests_included(mut self, include_tests: bool) -> Self {
        self.include_tests = include_tests;
        self
    }

    pub fn registry(&self) -> &ParserRegistry {
        &self.registry
    }

    pub fn exclusions_mut(&mut self) -> &mut ExclusionRegistry {
        &mut self.exclusions
    }

    pub fn symbols(&self) -> &[Symbol] {
        &self.cache.symbols
    }

    /// Extract symbols from one file and fold them into the cache.
    /// Errors on unsupported extensions and oversize files; the tree
    /// walkers filter those out before calling in.
    pub fn index_file(&mut self, root: &Path, path: &Path, git_hash: &str) -> Result<usize> {
        let Some(config) = self.registry.config_for(path) else {
            return Err(Error::UnsupportedLanguage(path.display().to_string()));
        };
        let max_size = config.max_file_size;

        let content = std::fs::read_to_string(path)?;
        if content.len() > max_size {
            return Err(Error::FileTooLarge {
                path: path.display().to_string(),
                size: content.len(),
            });
        }

        let rel_path = path.strip_prefix(root).unwrap_or(path).to_path_buf();
        let symbols = self
            .extractor
            .extract(&self.registry, &rel_path, &content, git_hash);
        let count = symbols.len();

        self.cache.replace_file(
            &rel_path.to_string_lossy(),
            content_hash(&content),
            symbols,
        );
        Ok(count)
    }

    /// Index every supported file under `root`. Returns the number of
    /// files extracted. Oversize files are skipped, not fatal.
    pub fn index_tree(&mut self, root: &Path, git_hash: &str) -> Result<usize> {
        let mut indexed = 0;
        for path in self.discover_files(root) {
            match self.index_file(root, &path, git_hash) {
                Ok(_) => indexed += 1,
                Err(Error::FileTooLarge { path, size }) => {
                    warn!(path = %path, size, "skipping oversize file");
                }
                Err(Error::UnsupportedLanguage(_)) => {}
                Err(err) => return Err(err),
            }
        }

        self.cache.git_hash = git_hash.to_string();
        self.prune_deleted(root);
        self.cache.save(&self.cache_path)?;
        Ok(indexed)
    }

    /// Re-extract only files whose content changed since the cache was
    /// written, plus files the cache has never seen. Returns the
    /// changed file set.
    pub fn incremental_update(&mut self, root: &Path, git_hash: &str) -> Result<Vec<String>> {
        let mut changed = Vec::new();

        for path in self.discover_files(root) {
            let rel = path
                .strip_prefix(root)
                .unwrap_or(&path)
                .to_string_lossy()
                .to_string();

            let content = match std::fs::read_to_string(&path) {
                Ok(content) => content,
                Err(_) => continue,
            };
            let hash = content_hash(&content);

            if self.cache.file_hash(&rel) == Some(hash.as_str()) {
                continue;
            }

            match self.index_file(root, &path, git_hash) {
                Ok(_) => changed.push(rel),
                Err(Error::FileTooLarge { .. }) | Err(Error::UnsupportedLanguage(_)) => {}
                Err(err) => return Err(err),
            }
        }

        self.cache.git_hash = git_hash.to_string();
        self.prune_deleted(root);
        self.cache.save(&self.cache_path)?;
        debug!(changed = changed.len(), "incremental index update");
        Ok(changed)
    }

    /// Token-scored lookup. Exact and substring token hits rank
    /// matches; ties break on qualified name for determinism.
    pub fn query(&self, name: &str, kind: Option<SymbolType>) -> Vec<&Symbol> {
        let query_tokens = tokenize_text(name);
        if query_tokens.is_empty() {
            return Vec::new();
        }

        let mut scored: Vec<(&Symbol, f64)> = self
            .cache
            .symbols
            .iter()
            .filter(|s| kind.is_none_or(|k| s.symbol_type == k))
            .map(|s| (s, token_match_score(&query_tokens, &s.name)))
            .filter(|(_, score)| *score > 0.0)
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.qualified_name.cmp(&b.0.qualified_name))
        });
        scored.into_iter().map(|(s, _)| s).collect()
    }

    /// Exact-name lookup, case-insensitive, simple or qualified.
    pub fn find_by_name(&self, name: &str) -> Option<&Symbol> {
        let lower = name.to_lowercase();
        self.cache.symbols.iter().find(|s| {
            s.name.to_lowercase() == lower || s.qualified_name.to_lowercase().ends_with(&lower)
        })
    }

    fn discover_files(&self, root: &Path) -> Vec<PathBuf> {
        let mut files = Vec::new();
        for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let Some(config) = self.registry.config_for(path) else {
                continue;
            };
            let rel = path.strip_prefix(root).unwrap_or(path);
            if self
                .exclusions
                .is_excluded(rel, config.grammar, self.include_tests)
            {
                continue;
            }
            files.push(path.to_path_buf());
        }
        files.sort();
        files
    }

    fn prune_deleted(&mut self, root: &Path) {
        let existing: HashSet<String> = self
            .discover_files(root)
            .iter()
            .map(|p| {
                p.strip_prefix(root)
                    .unwrap_or(p)
                    .to_string_lossy()
                    .to_string()
            })
            .collect();
        self.cache.retain_files(&existing);
    }
}

fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())[..16].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::default_registry;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn index_in(temp: &TempDir) -> SymbolIndex {
        SymbolIndex::open(
            temp.path().join(".babel/symbol_cache.json"),
            default_registry(),
        )
        .unwrap()
    }

    #[test]
    fn test_index_tree_and_query() {
        let temp = TempDir::new().unwrap();
        write(
            temp.path(),
            "src/profile.py",
            "class UserProfile:\n    def load(self):\n        pass\n",
        );
        write(temp.path(), "src/util.py", "def helper():\n    pass\n");

        let mut index = index_in(&temp);
        let indexed = index.index_tree(temp.path(), "aaaa1111").unwrap();
        assert_eq!(indexed, 2);

        let hits = index.query("UserProfile", None);
        assert!(!hits.is_empty());
        assert_eq!(hits[0].name, "UserProfile");

        // Kind filter
        let classes = index.query("user profile", Some(SymbolType::Class));
        assert_eq!(classes.len(), 1);
    }

    #[test]
    fn test_incremental_touches_only_changed() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "a.py", "def one():\n    pass\n");
        write(temp.path(), "b.py", "def two():\n    pass\n");

        let mut index = index_in(&temp);
        index.index_tree(temp.path(), "hash1").unwrap();

        write(temp.path(), "b.py", "def two():\n    pass\n\ndef three():\n    pass\n");
        let changed = index.incremental_update(temp.path(), "hash2").unwrap();
        assert_eq!(changed, vec!["b.py".to_string()]);

        // Replaced, not duplicated
        let names: Vec<&str> = index
            .symbols()
            .iter()
            .filter(|s| s.file_path == "b.py")
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(names.len(), 2);
        assert!(names.contains(&"three"));

        // Untouched file keeps its original git hash
        let one = index
            .symbols()
            .iter()
            .find(|s| s.name == "one")
            .unwrap();
        assert_eq!(one.git_hash, "hash1");
    }

    #[test]
    fn test_deleted_files_pruned() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "gone.py", "def f():\n    pass\n");

        let mut index = index_in(&temp);
        index.index_tree(temp.path(), "h").unwrap();
        assert_eq!(index.symbols().len(), 1);

        std::fs::remove_file(temp.path().join("gone.py")).unwrap();
        index.incremental_update(temp.path(), "h2").unwrap();
        assert!(index.symbols().is_empty());
    }

    #[test]
    fn test_excluded_dirs_not_indexed() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "src/ok.py", "def ok():\n    pass\n");
        write(
            temp.path(),
            "node_modules/pkg/index.js",
            "function skipped() {}\n",
        );

        let mut index = index_in(&temp);
        index.index_tree(temp.path(), "h").unwrap();
        assert!(index.symbols().iter().all(|s| !s.file_path.contains("node_modules")));
    }

    #[test]
    fn test_cache_survives_reopen() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "m.py", "def persisted():\n    pass\n");

        {
            let mut index = index_in(&temp);
            index.index_tree(temp.path(), "h").unwrap();
        }

        let reopened = index_in(&temp);
        assert_eq!(reopened.symbols().len(), 1);
        assert_eq!(reopened.symbols()[0].name, "persisted");
    }

    #[test]
    fn test_unsupported_language_error() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "data.bin", "junk");

        let mut index = index_in(&temp);
        let err = index
            .index_file(temp.path(), &temp.path().join("data.bin"), "h")
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedLanguage(_)));
    }
}
