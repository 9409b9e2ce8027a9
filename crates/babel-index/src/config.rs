use std::path::Path;

use babel_types::SymbolType;
use tree_sitter::Node;

/// Custom name extraction from an AST node.
pub type NameExtractor = fn(Node, &str) -> Option<String>;
/// Custom qualified name construction: (file, name, parent) -> qname.
pub type QualifiedNameBuilder = fn(&Path, &str, Option<&str>) -> String;
/// Custom visibility classification: (node, name, source) -> "public" | "private".
pub type VisibilityDetector = fn(Node, &str, &str) -> &'static str;
/// Custom signature extraction.
pub type SignatureExtractor = fn(Node, &str) -> String;
/// Custom docstring extraction.
pub type DocstringExtractor = fn(Node, &str) -> String;

/// Maps one AST node type to one Babel symbol type.
#[derive(Debug, Clone)]
pub struct SymbolQuery {
    /// Tree-sitter node kind (e.g. "function_definition")
    pub node_type: &'static str,
    pub symbol_type: SymbolType,
    /// AST field carrying the symbol name
    pub name_field: &'static str,
    pub capture_signature: bool,
    pub capture_docstring: bool,
}

impl SymbolQuery {
    pub fn new(node_type: &'static str, symbol_type: SymbolType) -> Self {
        Self {
            node_type,
            symbol_type,
            name_field: "name",
            capture_signature: true,
            capture_docstring: true,
        }
    }
}

/// Everything needed to parse one language. New languages are added by
/// registering a config, not by changing extraction code. Hooks are
/// plain function pointers so configs stay static data.
#[derive(Clone)]
pub struct LanguageConfig {
    pub name: &'static str,
    /// Grammar identifier; "markdown" selects the regex path
    pub grammar: &'static str,
    pub extensions: &'static [&'static str],

    pub symbol_queries: Vec<SymbolQuery>,
    /// Skip files larger than this many bytes
    pub max_file_size: usize,

    pub name_extractor: Option<NameExtractor>,
    pub qualified_name_builder: Option<QualifiedNameBuilder>,
    pub visibility_detector: Option<VisibilityDetector>,
    pub signature_extractor: Option<SignatureExtractor>,
    pub docstring_extractor: Option<DocstringExtractor>,
}

impl LanguageConfig {
    pub fn new(
        name: &'static str,
        grammar: &'static str,
        extensions: &'static [&'static str],
        symbol_queries: Vec<SymbolQuery>,
    ) -> Self {
        Self {
            name,
            grammar,
            extensions,
            symbol_queries,
            max_file_size: 300_000,
            name_extractor: None,
            qualified_name_builder: None,
            visibility_detector: None,
            signature_extractor: None,
            docstring_extractor: None,
        }
    }

    pub fn matches_extension(&self, ext: &str) -> bool {
        let ext = ext.to_lowercase();
        self.extensions.iter().any(|e| e.eq_ignore_ascii_case(&ext))
    }
}

impl std::fmt::Debug for LanguageConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LanguageConfig")
            .field("name", &self.name)
            .field("grammar", &self.grammar)
            .field("extensions", &self.extensions)
            .field("queries", &self.symbol_queries.len())
            .field("max_file_size", &self.max_file_size)
            .finish()
    }
}
