use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::plan::SourceType;

/// Result of one gather operation. Frozen once produced: the struct is
/// only ever constructed whole, by the gather primitives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatherResult {
    pub source_type: SourceType,
    /// What was requested: path, pattern, command or symbol name
    pub source_ref: String,

    /// Gathered content; empty on error
    #[serde(default)]
    pub content: String,

    /// Size tracking for chunking decisions
    #[serde(default)]
    pub size_bytes: u64,
    #[serde(default)]
    pub line_count: usize,

    #[serde(default = "default_success")]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default)]
    pub duration_ms: f64,
    #[serde(default)]
    pub gathered_at: String,

    /// Type-specific metadata
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

fn default_success() -> bool {
    true
}

impl GatherResult {
    pub fn ok(
        source_type: SourceType,
        source_ref: impl Into<String>,
        content: String,
        duration_ms: f64,
        metadata: Map<String, Value>,
    ) -> Self {
        let size_bytes = content.len() as u64;
        let line_count = count_lines(&content);
        Self {
            source_type,
            source_ref: source_ref.into(),
            content,
            size_bytes,
            line_count,
            success: true,
            error: None,
            duration_ms,
            gathered_at: Utc::now().to_rfc3339(),
            metadata,
        }
    }

    pub fn error_result(
        source_type: SourceType,
        source_ref: impl Into<String>,
        error: impl Into<String>,
        duration_ms: f64,
    ) -> Self {
        Self {
            source_type,
            source_ref: source_ref.into(),
            content: String::new(),
            size_bytes: 0,
            line_count: 0,
            success: false,
            error: Some(error.into()),
            duration_ms,
            gathered_at: Utc::now().to_rfc3339(),
            metadata: Map::new(),
        }
    }

    pub fn failed(&self) -> bool {
        !self.success
    }

    pub fn size_kb(&self) -> f64 {
        self.size_bytes as f64 / 1024.0
    }

    /// One-line summary for manifest display.
    pub fn summary(&self) -> String {
        let status = if self.success { "✓" } else { "✗" };
        let size = if self.size_bytes > 0 {
            format!("{:.1}KB", self.size_kb())
        } else {
            "-".to_string()
        };
        format!(
            "{} {}: {} ({})",
            status,
            self.source_type.as_str(),
            self.source_ref,
            size
        )
    }
}

pub(crate) fn count_lines(content: &str) -> usize {
    if content.is_empty() {
        return 0;
    }
    let newlines = content.matches('\n').count();
    if content.ends_with('\n') {
        newlines
    } else {
        newlines + 1
    }
}
