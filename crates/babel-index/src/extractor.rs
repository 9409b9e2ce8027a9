use std::collections::HashMap;
use std::path::Path;

use tracing::debug;
use tree_sitter::{Language, Node, Parser};

use crate::config::{LanguageConfig, SymbolQuery};
use crate::markdown::extract_markdown;
use crate::registry::ParserRegistry;
use babel_types::{Symbol, SymbolType};

/// Extracts symbols from source code by walking the tree-sitter AST,
/// driven entirely by [`LanguageConfig`] queries.
pub struct TreeSitterExtractor {
    parsers: HashMap<&'static str, Parser>,
}

impl TreeSitterExtractor {
    pub fn new() -> Self {
        Self {
            parsers: HashMap::new(),
        }
    }

    fn grammar_language(grammar: &str) -> Option<Language> {
        match grammar {
            "python" => Some(tree_sitter_python::LANGUAGE.into()),
            "javascript" => Some(tree_sitter_javascript::LANGUAGE.into()),
            "typescript" => Some(tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()),
            "rust" => Some(tree_sitter_rust::LANGUAGE.into()),
            _ => None,
        }
    }

    fn parser_for(&mut self, grammar: &'static str) -> Option<&mut Parser> {
        if !self.parsers.contains_key(grammar) {
            let language = Self::grammar_language(grammar)?;
            let mut parser = Parser::new();
            if parser.set_language(&language).is_err() {
                return None;
            }
            self.parsers.insert(grammar, parser);
        }
        self.parsers.get_mut(grammar)
    }

    /// Extract symbols from one file's content.
    ///
    /// Unknown grammars and parse failures yield no symbols rather than
    /// an error; a missing parser must never sink an index run.
    pub fn extract(
        &mut self,
        registry: &ParserRegistry,
        file_path: &Path,
        content: &str,
        git_hash: &str,
    ) -> Vec<Symbol> {
        let Some(config) = registry.config_for(file_path) else {
            return Vec::new();
        };

        if content.len() > config.max_file_size {
            return Vec::new();
        }

        // Markdown is regex by design; no grammar dependency
        if config.grammar == "markdown" {
            return extract_markdown(file_path, content, git_hash);
        }

        let config = config.clone();
        let Some(parser) = self.parser_for(config.grammar) else {
            debug!(grammar = config.grammar, "parser unavailable, skipping file");
            return Vec::new();
        };

        let Some(tree) = parser.parse(content, None) else {
            return Vec::new();
        };

        let mut symbols = Vec::new();
        walk_tree(
            tree.root_node(),
            &config,
            file_path,
            content,
            git_hash,
            &mut symbols,
            None,
        );
        symbols
    }
}

impl Default for TreeSitterExtractor {
    fn default() -> Self {
        Self::new()
    }
}

fn walk_tree(
    node: Node,
    config: &LanguageConfig,
    file_path: &Path,
    content: &str,
    git_hash: &str,
    symbols: &mut Vec<Symbol>,
    parent_symbol: Option<&str>,
) {
    for query in &config.symbol_queries {
        if node.kind() == query.node_type {
            if let Some(symbol) =
                extract_symbol(node, query, config, file_path, content, git_hash, parent_symbol)
            {
                let is_container = symbol.symbol_type == SymbolType::Class;
                let qualified = symbol.qualified_name.clone();
                symbols.push(symbol);

                // Functions nested in a class become its methods
                if is_container {
                    let mut cursor = node.walk();
                    for child in node.children(&mut cursor) {
                        walk_tree(
                            child,
                            config,
                            file_path,
                            content,
                            git_hash,
                            symbols,
                            Some(&qualified),
                        );
                    }
                    return;
                }
            }
        }
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        walk_tree(
            child,
            config,
            file_path,
            content,
            git_hash,
            symbols,
            parent_symbol,
        );
    }
}

fn extract_symbol(
    node: Node,
    query: &SymbolQuery,
    config: &LanguageConfig,
    file_path: &Path,
    content: &str,
    git_hash: &str,
    parent_symbol: Option<&str>,
) -> Option<Symbol> {
    let name = config
        .name_extractor
        .and_then(|extract| extract(node, content))
        .or_else(|| field_text(node, query.name_field, content))
        .or_else(|| first_identifier_text(node, content))?;

    let qualified_name = match config.qualified_name_builder {
        Some(build) => build(file_path, &name, parent_symbol),
        None => default_qualified_name(file_path, &name, parent_symbol),
    };

    let signature = if query.capture_signature {
        match config.signature_extractor {
            Some(extract) => extract(node, content),
            None => default_signature(node, content),
        }
    } else {
        String::new()
    };

    let docstring = if query.capture_docstring {
        match config.docstring_extractor {
            Some(extract) => extract(node, content),
            None => default_docstring(node, content),
        }
    } else {
        String::new()
    };

    let visibility = match config.visibility_detector {
        Some(detect) => detect(node, &name, content).to_string(),
        None => {
            if name.starts_with('_') {
                "private".to_string()
            } else {
                "public".to_string()
            }
        }
    };

    // A function under a class parent is a method
    let symbol_type = if parent_symbol.is_some() && query.symbol_type == SymbolType::Function {
        SymbolType::Method
    } else {
        query.symbol_type
    };

    Some(Symbol {
        symbol_type,
        name,
        qualified_name,
        file_path: file_path.to_string_lossy().to_string(),
        line_start: node.start_position().row + 1,
        line_end: node.end_position().row + 1,
        signature,
        docstring: docstring.chars().take(200).collect(),
        parent_symbol: parent_symbol.unwrap_or("").to_string(),
        visibility,
        git_hash: git_hash.to_string(),
    })
}

fn field_text(node: Node, field: &str, content: &str) -> Option<String> {
    let child = node.child_by_field_name(field)?;
    child.utf8_text(content.as_bytes()).ok().map(String::from)
}

fn first_identifier_text(node: Node, content: &str) -> Option<String> {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind().contains("identifier") {
            return child.utf8_text(content.as_bytes()).ok().map(String::from);
        }
    }
    None
}

/// Default qualified name: `path.to.module.Parent.Name`.
fn default_qualified_name(file_path: &Path, name: &str, parent_symbol: Option<&str>) -> String {
    if let Some(parent) = parent_symbol {
        return format!("{}.{}", parent, name);
    }
    let module = file_path
        .with_extension("")
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect::<Vec<_>>()
        .join(".");
    format!("{}.{}", module, name)
}

/// Default signature: first non-empty line of the node, bounded.
fn default_signature(node: Node, content: &str) -> String {
    let text = &content[node.start_byte()..node.end_byte()];
    let first_line = text.lines().next().unwrap_or("").trim();
    first_line.chars().take(200).collect()
}

/// Default docstring: a string literal opening the body block.
fn default_docstring(node: Node, content: &str) -> String {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if matches!(child.kind(), "block" | "body" | "statement_block") {
            if let Some(first) = child.child(0)
                && matches!(first.kind(), "expression_statement" | "string")
            {
                let text = first.utf8_text(content.as_bytes()).unwrap_or("");
                let cleaned = text.trim().trim_matches(|c| c == '"' || c == '\'').trim();
                return cleaned.lines().next().unwrap_or("").chars().take(200).collect();
            }
        }
    }
    String::new()
}
