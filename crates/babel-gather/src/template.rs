use std::collections::HashMap;
use std::path::Path;

use chrono::Utc;
use once_cell::sync::Lazy;
use serde_json::Value;

use crate::plan::{GatherPlan, SourceType};
use crate::result::GatherResult;

/// Extension to code-block language mapping.
static EXTENSION_LANG_MAP: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        (".py", "python"),
        (".js", "javascript"),
        (".ts", "typescript"),
        (".tsx", "typescript"),
        (".jsx", "javascript"),
        (".rs", "rust"),
        (".go", "go"),
        (".java", "java"),
        (".rb", "ruby"),
        (".php", "php"),
        (".c", "c"),
        (".h", "c"),
        (".cpp", "cpp"),
        (".hpp", "cpp"),
        (".cs", "csharp"),
        (".swift", "swift"),
        (".kt", "kotlin"),
        (".scala", "scala"),
        (".sh", "bash"),
        (".bash", "bash"),
        (".zsh", "zsh"),
        (".fish", "fish"),
        (".sql", "sql"),
        (".json", "json"),
        (".yaml", "yaml"),
        (".yml", "yaml"),
        (".toml", "toml"),
        (".xml", "xml"),
        (".html", "html"),
        (".css", "css"),
        (".scss", "scss"),
        (".less", "less"),
        (".md", "markdown"),
        (".rst", "rst"),
        (".txt", "text"),
        (".ini", "ini"),
        (".cfg", "ini"),
        (".conf", "ini"),
        (".env", "bash"),
        (".dockerfile", "dockerfile"),
    ])
});

/// Code-block language hint from a source reference, empty if unknown.
pub fn get_language_hint(source_ref: &str) -> &'static str {
    if !source_ref.contains('/') && !source_ref.contains('\\') {
        return "";
    }
    let ext = Path::new(source_ref)
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
        .unwrap_or_default();
    EXTENSION_LANG_MAP.get(ext.as_str()).copied().unwrap_or("")
}

static BANNER: Lazy<String> = Lazy::new(|| "═".repeat(60));
static RULE: Lazy<String> = Lazy::new(|| "─".repeat(60));

/// Renders gathered results into the structured corpus document:
/// banner, header, manifest table, indexed corpus, closing banner.
/// Chunk-aware; the closing banner is identical across chunks.
pub struct ContextTemplate<'a> {
    plan: &'a GatherPlan,
    chunk_number: usize,
    total_chunks: usize,
}

impl<'a> ContextTemplate<'a> {
    pub fn new(plan: &'a GatherPlan, chunk_number: usize, total_chunks: usize) -> Self {
        Self {
            plan,
            chunk_number,
            total_chunks,
        }
    }

    pub fn render(&self, results: &[GatherResult]) -> String {
        [
            self.render_banner(),
            self.render_header(results),
            self.render_manifest(results),
            self.render_corpus(results),
            self.render_footer(),
        ]
        .join("\n")
    }

    fn render_banner(&self) -> String {
        format!(
            "{}\nCONTEXT GATHER: {}\n{}\n",
            *BANNER, self.plan.operation, *BANNER
        )
    }

    fn render_header(&self, results: &[GatherResult]) -> String {
        let total_kb: f64 = results.iter().map(|r| r.size_bytes as f64).sum::<f64>() / 1024.0;
        let failed = results.iter().filter(|r| r.failed()).count();

        let mut header = format!("## HEADER\n- Intent: {}", self.plan.intent);
        if self.total_chunks > 1 {
            header.push_str(&format!(
                "\n- Chunk: {} of {}",
                self.chunk_number, self.total_chunks
            ));
        }
        header.push_str(&format!(
            "\n- Total Size: {:.1} KB across {} sources",
            total_kb,
            results.len()
        ));
        header.push_str(&format!(
            "\n- Gathered: {}",
            Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
        ));
        if failed > 0 {
            header.push_str(&format!(
                "\n- Warnings: {} source(s) failed to gather",
                failed
            ));
        }
        header.push('\n');
        header
    }

    fn render_manifest(&self, results: &[GatherResult]) -> String {
        let mut lines = vec![
            "## MANIFEST".to_string(),
            String::new(),
            "| # | Type | Source | Size | Status |".to_string(),
            "|---|------|--------|------|--------|".to_string(),
        ];

        for (i, result) in results.iter().enumerate() {
            let status = if result.success { "✓" } else { "✗" };
            let size = if result.size_bytes > 0 {
                format!("{:.1}KB", result.size_kb())
            } else {
                "-".to_string()
            };
            let source_ref = truncate_ref(&result.source_ref, 40);
            lines.push(format!(
                "| {} | {} | {} | {} | {} |",
                i + 1,
                result.source_type.as_str(),
                source_ref,
                size,
                status
            ));
        }

        lines.push(String::new());
        lines.join("\n")
    }

    fn render_corpus(&self, results: &[GatherResult]) -> String {
        let mut lines = vec![
            RULE.clone(),
            "## CORPUS".to_string(),
            RULE.clone(),
            String::new(),
        ];

        let total = results.len();
        for (i, result) in results.iter().enumerate() {
            lines.push(self.render_source(result, i + 1, total));
            lines.push(String::new());
        }

        lines.join("\n")
    }

    fn render_source(&self, result: &GatherResult, index: usize, total: usize) -> String {
        let header = format!(
            "### [{}/{}] {}: {}",
            index,
            total,
            result.source_type.as_str().to_uppercase(),
            result.source_ref
        );

        let mut meta_parts = Vec::new();
        if result.line_count > 0 {
            meta_parts.push(format!("Lines: {}", result.line_count));
        }
        if result.size_bytes > 0 {
            meta_parts.push(format!("Size: {:.1}KB", result.size_kb()));
        }
        if result.duration_ms > 0.0 {
            meta_parts.push(format!("Time: {:.0}ms", result.duration_ms));
        }
        let meta_line = if meta_parts.is_empty() {
            String::new()
        } else {
            format!("- {}", meta_parts.join(" | "))
        };

        if result.failed() {
            return format!(
                "{}\n{}\n- **ERROR**: {}\n",
                header,
                meta_line,
                result.error.as_deref().unwrap_or("unknown")
            );
        }

        let lang = content_language(result);
        let mut content = result.content.clone();
        if !content.is_empty() && !content.ends_with('\n') {
            content.push('\n');
        }

        format!("{}\n{}\n```{}\n{}```\n", header, meta_line, lang, content)
    }

    fn render_footer(&self) -> String {
        format!("{}\nEND CONTEXT GATHER\n{}\n", *BANNER, *BANNER)
    }
}

fn content_language(result: &GatherResult) -> &'static str {
    match result.source_type {
        SourceType::File => get_language_hint(&result.source_ref),
        SourceType::Bash => "bash",
        // Grep mixes file types; glob is bare paths; symbol carries its
        // own metadata header
        SourceType::Grep | SourceType::Glob | SourceType::Symbol => "",
    }
}

fn truncate_ref(source_ref: &str, max: usize) -> String {
    if source_ref.chars().count() <= max {
        return source_ref.to_string();
    }
    let tail: String = source_ref
        .chars()
        .rev()
        .take(max - 3)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    format!("...{}", tail)
}

/// Render one chunk's results as the corpus document.
pub fn render_context(
    plan: &GatherPlan,
    results: &[GatherResult],
    chunk_number: usize,
    total_chunks: usize,
) -> String {
    ContextTemplate::new(plan, chunk_number, total_chunks).render(results)
}

/// JSON alternative output: a plain list of result records.
pub fn render_json(results: &[GatherResult]) -> Value {
    serde_json::to_value(results).unwrap_or(Value::Null)
}
