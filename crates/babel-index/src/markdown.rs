use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

use babel_types::{Symbol, SymbolType};

static HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(#{1,3})\s+(.+)$").unwrap());
static ANCHOR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[([A-Z]+-\d+)\]").unwrap());
static SLUG_STRIP: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s-]").unwrap());
static SLUG_SEP: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\s-]+").unwrap());

/// Extract document structure from Markdown by heading level:
/// `#` document, `##` section, `###` subsection. Headings inside fenced
/// code blocks are ignored. An explicit `[TAG-123]` anchor becomes the
/// section id; otherwise a slug of the heading text does.
pub fn extract_markdown(file_path: &Path, content: &str, git_hash: &str) -> Vec<Symbol> {
    let doc_name = file_path
        .with_extension("")
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect::<Vec<_>>()
        .join(".");

    let lines: Vec<&str> = content.lines().collect();
    let mut symbols = Vec::new();
    let mut in_code_block = false;

    for (idx, line) in lines.iter().enumerate() {
        let line_num = idx + 1;

        if line.trim_start().starts_with("```") {
            in_code_block = !in_code_block;
            continue;
        }
        if in_code_block {
            continue;
        }

        let Some(captures) = HEADING.captures(line) else {
            continue;
        };

        let level = captures[1].len();
        let heading_text = captures[2].trim().trim_end_matches('#').trim().to_string();

        let symbol_type = match level {
            1 => SymbolType::Document,
            2 => SymbolType::Section,
            3 => SymbolType::Subsection,
            _ => continue,
        };

        let section_id = match ANCHOR.captures(&heading_text) {
            Some(anchor) => anchor[1].to_string(),
            None => {
                let lowercased = heading_text.to_lowercase();
                let slug = SLUG_STRIP.replace_all(&lowercased, "");
                let slug = SLUG_SEP.replace_all(&slug, "_");
                slug.chars().take(50).collect()
            }
        };

        // Section runs until the next heading of equal or higher level
        let mut end_line = lines.len();
        for (next_idx, next_line) in lines.iter().enumerate().skip(line_num) {
            if let Some(next) = HEADING.captures(next_line)
                && next[1].len() <= level
            {
                end_line = next_idx;
                break;
            }
        }

        // First following paragraph line serves as the docstring
        let mut docstring = String::new();
        for next_line in lines.iter().skip(line_num).take(5) {
            let trimmed = next_line.trim();
            if !trimmed.is_empty() && !trimmed.starts_with('#') && !trimmed.starts_with("```") {
                docstring = trimmed.chars().take(200).collect();
                break;
            }
        }

        symbols.push(Symbol {
            symbol_type,
            name: heading_text.clone(),
            qualified_name: format!("{}.{}", doc_name, section_id),
            file_path: file_path.to_string_lossy().to_string(),
            line_start: line_num,
            line_end: end_line,
            signature: format!("{} {}", "#".repeat(level), heading_text),
            docstring,
            parent_symbol: String::new(),
            visibility: "public".to_string(),
            git_hash: git_hash.to_string(),
        });
    }

    symbols
}
