use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of an extracted code symbol.
///
/// `Document`/`Section`/`Subsection` come from Markdown heading levels;
/// the rest from language grammars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolType {
    Class,
    Function,
    Method,
    Interface,
    Type,
    Enum,
    Document,
    Section,
    Subsection,
    Id,
    Variable,
    Animation,
}

impl SymbolType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SymbolType::Class => "class",
            SymbolType::Function => "function",
            SymbolType::Method => "method",
            SymbolType::Interface => "interface",
            SymbolType::Type => "type",
            SymbolType::Enum => "enum",
            SymbolType::Document => "document",
            SymbolType::Section => "section",
            SymbolType::Subsection => "subsection",
            SymbolType::Id => "id",
            SymbolType::Variable => "variable",
            SymbolType::Animation => "animation",
        }
    }
}

impl fmt::Display for SymbolType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One extracted code symbol, uniquely keyed by
/// `(file_path, qualified_name)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Symbol {
    pub symbol_type: SymbolType,
    pub name: String,
    pub qualified_name: String,
    pub file_path: String,
    pub line_start: usize,
    pub line_end: usize,
    #[serde(default)]
    pub signature: String,
    #[serde(default)]
    pub docstring: String,
    #[serde(default)]
    pub parent_symbol: String,
    #[serde(default = "default_visibility")]
    pub visibility: String,
    #[serde(default)]
    pub git_hash: String,
}

fn default_visibility() -> String {
    "public".to_string()
}

impl Symbol {
    /// Identity key within the index
    pub fn key(&self) -> (String, String) {
        (self.file_path.clone(), self.qualified_name.clone())
    }
}
