use serde::{Deserialize, Serialize};

/// Types of sources that can be gathered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    /// Read file content
    File,
    /// Search for a pattern
    Grep,
    /// Execute a command
    Bash,
    /// Find files matching a pattern
    Glob,
    /// Load a code symbol by name
    Symbol,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::File => "file",
            SourceType::Grep => "grep",
            SourceType::Bash => "bash",
            SourceType::Glob => "glob",
            SourceType::Symbol => "symbol",
        }
    }
}

/// Priority levels for chunking decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourcePriority {
    /// Must be in the first chunk
    Critical = 0,
    /// Prefer early chunks
    High = 1,
    Normal = 2,
    /// May land in trailing chunks
    Low = 3,
}

/// Optional, type-specific source parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceParams {
    /// grep: directory or file to search (default ".")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// grep: maximum matches to return
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_matches: Option<usize>,
    /// grep/symbol: context lines around matches
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_lines: Option<usize>,
    /// bash: execution timeout in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<f64>,
    /// bash: working directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    /// glob: base directory for the pattern
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_path: Option<String>,
    /// symbol: project directory holding the symbol cache
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_dir: Option<String>,
}

/// Specification for a single source to gather. Produced during
/// planning, executed during the parallel phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatherSource {
    pub source_type: SourceType,
    /// Path, pattern, command or symbol name
    pub reference: String,

    #[serde(default)]
    pub params: SourceParams,

    /// Chunking hints
    #[serde(default = "default_priority")]
    pub priority: SourcePriority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,

    /// Populated by the broker before execution
    #[serde(default)]
    pub estimated_size_bytes: u64,
}

fn default_priority() -> SourcePriority {
    SourcePriority::Normal
}

impl GatherSource {
    fn new(source_type: SourceType, reference: impl Into<String>) -> Self {
        Self {
            source_type,
            reference: reference.into(),
            params: SourceParams::default(),
            priority: SourcePriority::Normal,
            group: None,
            estimated_size_bytes: 0,
        }
    }

    pub fn file(path: impl Into<String>) -> Self {
        Self::new(SourceType::File, path)
    }

    pub fn grep(pattern: impl Into<String>, path: impl Into<String>) -> Self {
        let mut source = Self::new(SourceType::Grep, pattern);
        source.params.path = Some(path.into());
        source
    }

    pub fn bash(command: impl Into<String>) -> Self {
        let mut source = Self::new(SourceType::Bash, command);
        source.params.timeout_secs = Some(30.0);
        source
    }

    pub fn glob(pattern: impl Into<String>) -> Self {
        Self::new(SourceType::Glob, pattern)
    }

    pub fn symbol(name: impl Into<String>, project_dir: Option<String>) -> Self {
        let mut source = Self::new(SourceType::Symbol, name);
        source.params.project_dir = project_dir;
        source
    }

    pub fn with_priority(mut self, priority: SourcePriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }
}

/// Complete specification for one context gather operation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatherPlan {
    /// What task this supports
    pub operation: String,
    /// Why this context is needed
    pub intent: String,

    #[serde(default)]
    pub sources: Vec<GatherSource>,

    /// Which planner produced this
    #[serde(default)]
    pub created_by: String,
}

impl GatherPlan {
    pub fn new(operation: impl Into<String>, intent: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            intent: intent.into(),
            sources: Vec::new(),
            created_by: String::new(),
        }
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    pub fn total_estimated_size(&self) -> u64 {
        self.sources.iter().map(|s| s.estimated_size_bytes).sum()
    }

    pub fn sources_by_type(&self, source_type: SourceType) -> Vec<&GatherSource> {
        self.sources
            .iter()
            .filter(|s| s.source_type == source_type)
            .collect()
    }

    pub fn add_file(mut self, path: impl Into<String>) -> Self {
        self.sources.push(GatherSource::file(path));
        self
    }

    pub fn add_grep(mut self, pattern: impl Into<String>, path: impl Into<String>) -> Self {
        self.sources.push(GatherSource::grep(pattern, path));
        self
    }

    pub fn add_bash(mut self, command: impl Into<String>) -> Self {
        self.sources.push(GatherSource::bash(command));
        self
    }

    pub fn add_glob(mut self, pattern: impl Into<String>) -> Self {
        self.sources.push(GatherSource::glob(pattern));
        self
    }

    pub fn add_symbol(mut self, name: impl Into<String>) -> Self {
        self.sources.push(GatherSource::symbol(name, None));
        self
    }

    pub fn add_source(mut self, source: GatherSource) -> Self {
        self.sources.push(source);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fluent_plan_building() {
        let plan = GatherPlan::new("Fix caching bug", "Understand cache implementation")
            .add_file("src/cache.py")
            .add_grep("CacheError", ".")
            .add_bash("echo hi");

        assert_eq!(plan.source_count(), 3);
        assert_eq!(plan.sources_by_type(SourceType::File).len(), 1);
        assert_eq!(plan.sources[2].params.timeout_secs, Some(30.0));
    }

    #[test]
    fn test_serde_round_trip() {
        let plan = GatherPlan::new("op", "intent").add_source(
            GatherSource::grep("pattern", "src")
                .with_priority(SourcePriority::High)
                .with_group("cache"),
        );

        let encoded = serde_json::to_string(&plan).unwrap();
        let back: GatherPlan = serde_json::from_str(&encoded).unwrap();
        assert_eq!(back.sources[0], plan.sources[0]);
    }

    #[test]
    fn test_priority_ordering() {
        assert!(SourcePriority::Critical < SourcePriority::High);
        assert!(SourcePriority::Normal < SourcePriority::Low);
    }
}
