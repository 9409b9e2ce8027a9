use std::collections::BTreeMap;
use std::path::Path;

use glob::Pattern;

/// Central registry of exclusion patterns for symbol indexing.
///
/// Three classes: common patterns applied to every language,
/// language-specific patterns, and test-file patterns that callers can
/// toggle. `get_patterns` is the single access point.
#[derive(Debug, Clone)]
pub struct ExclusionRegistry {
    common: Vec<String>,
    by_language: BTreeMap<String, Vec<String>>,
    test_patterns: Vec<String>,
}

const DEFAULT_COMMON: &[&str] = &[
    // Version control
    "**/.git/**",
    "**/.svn/**",
    "**/.hg/**",
    // IDE and editors
    "**/.idea/**",
    "**/.vscode/**",
    "**/*.swp",
    // Build artifacts
    "**/build/**",
    "**/dist/**",
    "**/out/**",
    "**/target/**",
    // Coverage and reports
    "**/coverage/**",
    "**/htmlcov/**",
    // Logs and temp
    "**/logs/**",
    "**/*.log",
    "**/tmp/**",
    "**/*.tmp",
];

const DEFAULT_TEST: &[&str] = &[
    "**/test_*.py",
    "**/*_test.py",
    "**/tests/**",
    "**/*.test.js",
    "**/*.test.ts",
    "**/*.spec.js",
    "**/*.spec.ts",
    "**/*_test.rs",
];

fn default_language_patterns() -> BTreeMap<String, Vec<String>> {
    let mut map = BTreeMap::new();
    map.insert(
        "python".to_string(),
        vec![
            "**/__pycache__/**",
            "**/*.pyc",
            "**/.venv/**",
            "**/venv/**",
            "**/site-packages/**",
            "**/.pytest_cache/**",
            "**/.mypy_cache/**",
            "**/*.egg-info/**",
        ]
        .into_iter()
        .map(String::from)
        .collect(),
    );
    map.insert(
        "javascript".to_string(),
        vec![
            "**/node_modules/**",
            "**/bower_components/**",
            "**/*.min.js",
            "**/*.bundle.js",
            "**/vendor/**",
        ]
        .into_iter()
        .map(String::from)
        .collect(),
    );
    map.insert(
        "typescript".to_string(),
        vec![
            "**/node_modules/**",
            "**/.next/**",
            "**/*.d.ts",
            "**/.turbo/**",
        ]
        .into_iter()
        .map(String::from)
        .collect(),
    );
    map.insert(
        "rust".to_string(),
        vec!["**/target/**"].into_iter().map(String::from).collect(),
    );
    map.insert("markdown".to_string(), Vec::new());
    map
}

impl Default for ExclusionRegistry {
    fn default() -> Self {
        Self {
            common: DEFAULT_COMMON.iter().map(|s| s.to_string()).collect(),
            by_language: default_language_patterns(),
            test_patterns: DEFAULT_TEST.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl ExclusionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// All patterns applying to one language. Test patterns are
    /// included unless `include_tests` asks to index them.
    pub fn get_patterns(&self, language: &str, include_tests: bool) -> Vec<String> {
        let mut patterns = self.common.clone();
        if let Some(specific) = self.by_language.get(&language.to_lowercase()) {
            patterns.extend(specific.iter().cloned());
        }
        if !include_tests {
            patterns.extend(self.test_patterns.iter().cloned());
        }
        patterns
    }

    pub fn add_common(&mut self, pattern: impl Into<String>) {
        self.common.push(pattern.into());
    }

    pub fn add_language(&mut self, language: &str, pattern: impl Into<String>) {
        self.by_language
            .entry(language.to_lowercase())
            .or_default()
            .push(pattern.into());
    }

    pub fn add_test_pattern(&mut self, pattern: impl Into<String>) {
        self.test_patterns.push(pattern.into());
    }

    pub fn common_patterns(&self) -> &[String] {
        &self.common
    }

    pub fn test_patterns(&self) -> &[String] {
        &self.test_patterns
    }

    pub fn languages(&self) -> Vec<&str> {
        self.by_language.keys().map(|s| s.as_str()).collect()
    }

    /// Reset all classes to defaults.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Should this (project-relative) path be skipped for a language?
    pub fn is_excluded(&self, rel_path: &Path, language: &str, include_tests: bool) -> bool {
        let path_str = rel_path.to_string_lossy();
        self.get_patterns(language, include_tests)
            .iter()
            .filter_map(|p| Pattern::new(p).ok())
            .any(|pattern| pattern.matches(&path_str))
    }
}
