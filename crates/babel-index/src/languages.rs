use babel_types::SymbolType;
use tree_sitter::Node;

use crate::config::{LanguageConfig, SymbolQuery};

/// Python: classes, functions; functions inside a class become methods
/// during the walk.
pub fn python_config() -> LanguageConfig {
    LanguageConfig::new(
        "Python",
        "python",
        &[".py"],
        vec![
            SymbolQuery::new("class_definition", SymbolType::Class),
            SymbolQuery::new("function_definition", SymbolType::Function),
        ],
    )
}

/// JavaScript: classes, functions and class methods.
pub fn javascript_config() -> LanguageConfig {
    LanguageConfig::new(
        "JavaScript",
        "javascript",
        &[".js", ".jsx", ".mjs"],
        vec![
            SymbolQuery::new("class_declaration", SymbolType::Class),
            SymbolQuery::new("function_declaration", SymbolType::Function),
            SymbolQuery::new("method_definition", SymbolType::Method),
        ],
    )
}

/// TypeScript adds interfaces, type aliases and enums on top of the
/// JavaScript shapes.
pub fn typescript_config() -> LanguageConfig {
    LanguageConfig::new(
        "TypeScript",
        "typescript",
        &[".ts", ".tsx"],
        vec![
            SymbolQuery::new("class_declaration", SymbolType::Class),
            SymbolQuery::new("function_declaration", SymbolType::Function),
            SymbolQuery::new("method_definition", SymbolType::Method),
            SymbolQuery::new("interface_declaration", SymbolType::Interface),
            SymbolQuery::new("type_alias_declaration", SymbolType::Type),
            SymbolQuery::new("enum_declaration", SymbolType::Enum),
        ],
    )
}

/// Rust: visibility comes from the `pub` keyword rather than naming.
pub fn rust_config() -> LanguageConfig {
    let mut config = LanguageConfig::new(
        "Rust",
        "rust",
        &[".rs"],
        vec![
            SymbolQuery::new("function_item", SymbolType::Function),
            SymbolQuery::new("struct_item", SymbolType::Type),
            SymbolQuery::new("enum_item", SymbolType::Enum),
            SymbolQuery::new("trait_item", SymbolType::Interface),
        ],
    );
    config.visibility_detector = Some(rust_visibility);
    config
}

fn rust_visibility(node: Node, _name: &str, source: &str) -> &'static str {
    let text = &source[node.start_byte()..node.end_byte()];
    if text.trim_start().starts_with("pub") {
        "public"
    } else {
        "private"
    }
}

/// Markdown is extracted by heading regex, not a grammar. The grammar
/// name "markdown" routes the extractor to the regex path; headings
/// keep their `[TAG-123]` anchors as stable section ids.
pub fn markdown_config() -> LanguageConfig {
    LanguageConfig::new("Markdown", "markdown", &[".md", ".markdown"], Vec::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_routing_tables() {
        assert!(python_config().matches_extension(".py"));
        assert!(python_config().matches_extension(".PY"));
        assert!(!python_config().matches_extension(".rs"));
        assert!(typescript_config().matches_extension(".tsx"));
        assert!(markdown_config().matches_extension(".md"));
    }
}
