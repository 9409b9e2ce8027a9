use std::collections::BTreeMap;
use std::path::Path;

use crate::functions::{estimate_file_size, estimate_grep_size};
use crate::plan::{GatherPlan, GatherSource, SourceType};

/// Safe default context size for most downstream consumers.
pub const DEFAULT_CONTEXT_LIMIT_KB: u64 = 100;
/// Header, manifest and formatting overhead reserved per chunk.
const TEMPLATE_OVERHEAD_BYTES: u64 = 2048;

const BASH_ESTIMATE: u64 = 5 * 1024;
const GLOB_ESTIMATE: u64 = 2 * 1024;
const MIN_ESTIMATE: u64 = 1024;

/// Chunking strategy selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChunkStrategy {
    /// Fill until full, then start a new chunk
    SizeBased,
    /// Group related sources, keep groups together
    #[default]
    CoherenceBased,
    /// Global priority sort, then size packing
    PriorityBased,
}

/// A group of sources that fits within the context limit.
#[derive(Debug, Default)]
pub struct Chunk {
    pub sources: Vec<GatherSource>,
    pub estimated_size: u64,
}

impl Chunk {
    fn add(&mut self, source: GatherSource) {
        self.estimated_size += source.estimated_size_bytes;
        self.sources.push(source);
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    pub fn estimated_size_kb(&self) -> f64 {
        self.estimated_size as f64 / 1024.0
    }
}

/// Decides how to split a plan's sources across context-sized chunks
/// while keeping related sources together.
pub struct ChunkBroker {
    context_limit: u64,
    strategy: ChunkStrategy,
}

impl ChunkBroker {
    pub fn new(context_limit_kb: u64, strategy: ChunkStrategy) -> Self {
        Self {
            context_limit: context_limit_kb * 1024 - TEMPLATE_OVERHEAD_BYTES,
            strategy,
        }
    }

    /// Estimate sizes, then chunk according to strategy.
    pub fn plan_chunks(&self, plan: &GatherPlan) -> Vec<Chunk> {
        if plan.sources.is_empty() {
            return Vec::new();
        }

        let mut sources = plan.sources.clone();
        estimate_sizes(&mut sources);

        match self.strategy {
            ChunkStrategy::SizeBased => self.chunk_by_size(sources),
            ChunkStrategy::CoherenceBased => self.chunk_by_coherence(sources),
            ChunkStrategy::PriorityBased => self.chunk_by_priority(sources),
        }
    }

    pub fn estimate_chunk_count(&self, plan: &GatherPlan) -> usize {
        let mut sources = plan.sources.clone();
        estimate_sizes(&mut sources);
        let total: u64 = sources.iter().map(|s| s.estimated_size_bytes).sum();
        std::cmp::max(1, total.div_ceil(self.context_limit) as usize)
    }

    pub fn fits_in_single_chunk(&self, plan: &GatherPlan) -> bool {
        let mut sources = plan.sources.clone();
        estimate_sizes(&mut sources);
        let total: u64 = sources.iter().map(|s| s.estimated_size_bytes).sum();
        total <= self.context_limit
    }

    fn chunk_by_size(&self, sources: Vec<GatherSource>) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        let mut current = Chunk::default();

        for source in sources {
            if current.estimated_size + source.estimated_size_bytes > self.context_limit
                && !current.sources.is_empty()
            {
                chunks.push(std::mem::take(&mut current));
            }
            current.add(source);
        }

        if !current.sources.is_empty() {
            chunks.push(current);
        }
        chunks
    }

    fn chunk_by_coherence(&self, sources: Vec<GatherSource>) -> Vec<Chunk> {
        // Group by affinity, order groups, then pack within size limit
        let mut groups: BTreeMap<GroupKey, Vec<GatherSource>> = BTreeMap::new();
        for source in sources {
            groups.entry(group_key(&source)).or_default().push(source);
        }

        let mut ordered: Vec<(GroupKey, Vec<GatherSource>)> = groups.into_iter().collect();
        for (_, group) in ordered.iter_mut() {
            group.sort_by_key(|s| s.priority);
        }
        // Groups sort by their most urgent member; groups from the same
        // directory stay adjacent; search and meta groups trail so
        // their results can reference earlier content
        ordered.sort_by_key(|(key, group)| {
            let min_priority = group.iter().map(|s| s.priority).min();
            let dir_hint = group
                .iter()
                .filter(|s| s.source_type == SourceType::File)
                .map(|s| {
                    Path::new(&s.reference)
                        .parent()
                        .unwrap_or(Path::new(""))
                        .to_string_lossy()
                        .to_string()
                })
                .min()
                .unwrap_or_default();
            (min_priority, key.rank, dir_hint, key.label.clone())
        });

        // Pack group-wise: a group that no longer fits opens the next
        // chunk, so affinity pairs stay together unless a single group
        // alone exceeds the limit
        let mut chunks = Vec::new();
        let mut current = Chunk::default();
        for (_, group) in ordered {
            let group_size: u64 = group.iter().map(|s| s.estimated_size_bytes).sum();
            if !current.sources.is_empty()
                && current.estimated_size + group_size > self.context_limit
            {
                chunks.push(std::mem::take(&mut current));
            }
            for source in group {
                if !current.sources.is_empty()
                    && current.estimated_size + source.estimated_size_bytes > self.context_limit
                {
                    chunks.push(std::mem::take(&mut current));
                }
                current.add(source);
            }
        }
        if !current.sources.is_empty() {
            chunks.push(current);
        }
        chunks
    }

    fn chunk_by_priority(&self, mut sources: Vec<GatherSource>) -> Vec<Chunk> {
        sources.sort_by_key(|s| s.priority);
        self.chunk_by_size(sources)
    }
}

impl Default for ChunkBroker {
    fn default() -> Self {
        Self::new(DEFAULT_CONTEXT_LIMIT_KB, ChunkStrategy::default())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct GroupKey {
    /// 0 = content groups, 1 = meta (bash/glob), 2 = search (grep)
    rank: u8,
    label: String,
}

/// Affinity rules: explicit group tag, test paired with its
/// implementation, same directory, search and meta groups by type.
fn group_key(source: &GatherSource) -> GroupKey {
    if let Some(group) = &source.group {
        return GroupKey {
            rank: 0,
            label: format!("explicit:{}", group),
        };
    }

    match source.source_type {
        SourceType::File => {
            // Pair a test file with its implementation: strip test and
            // spec affixes so both land under one key
            let path = Path::new(&source.reference);
            let stem = path
                .file_stem()
                .map(|n| n.to_string_lossy().to_lowercase())
                .unwrap_or_default();
            let stripped = stem
                .trim_start_matches("test_")
                .trim_start_matches("spec_")
                .trim_end_matches("_test")
                .trim_end_matches("_spec");
            GroupKey {
                rank: 0,
                label: format!("pair:{}", stripped),
            }
        }
        SourceType::Symbol => GroupKey {
            rank: 0,
            label: "symbols".to_string(),
        },
        SourceType::Bash => GroupKey {
            rank: 1,
            label: "meta:commands".to_string(),
        },
        SourceType::Glob => GroupKey {
            rank: 1,
            label: "meta:glob".to_string(),
        },
        SourceType::Grep => GroupKey {
            rank: 2,
            label: "search:grep".to_string(),
        },
    }
}

fn estimate_sizes(sources: &mut [GatherSource]) {
    for source in sources.iter_mut() {
        if source.estimated_size_bytes > 0 {
            continue;
        }
        source.estimated_size_bytes = match source.source_type {
            SourceType::File => estimate_file_size(&source.reference),
            SourceType::Grep => {
                let path = source.params.path.as_deref().unwrap_or(".");
                estimate_grep_size(&source.reference, path)
            }
            SourceType::Bash => BASH_ESTIMATE,
            SourceType::Glob => GLOB_ESTIMATE,
            SourceType::Symbol => 0,
        };
        if source.estimated_size_bytes == 0 {
            source.estimated_size_bytes = MIN_ESTIMATE;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::SourcePriority;

    fn sized(mut source: GatherSource, size: u64) -> GatherSource {
        source.estimated_size_bytes = size;
        source
    }

    #[test]
    fn test_size_based_respects_limit() {
        // 100KB limit, four 40KB sources: 2 per chunk
        let plan = GatherPlan::new("op", "intent")
            .add_source(sized(GatherSource::file("a.py"), 40 * 1024))
            .add_source(sized(GatherSource::file("b.py"), 40 * 1024))
            .add_source(sized(GatherSource::file("c.py"), 40 * 1024))
            .add_source(sized(GatherSource::file("d.py"), 40 * 1024));

        let broker = ChunkBroker::new(100, ChunkStrategy::SizeBased);
        let chunks = broker.plan_chunks(&plan);

        assert_eq!(chunks.len(), 2);
        for chunk in &chunks {
            assert!(chunk.estimated_size <= 100 * 1024 - 2048);
        }
    }

    #[test]
    fn test_coherence_pairs_test_with_impl() {
        let plan = GatherPlan::new("op", "intent")
            .add_source(sized(GatherSource::file("src/cache.py"), 30 * 1024))
            .add_source(sized(GatherSource::file("other/unrelated.py"), 60 * 1024))
            .add_source(sized(GatherSource::file("tests/test_cache.py"), 30 * 1024));

        let broker = ChunkBroker::new(100, ChunkStrategy::CoherenceBased);
        let chunks = broker.plan_chunks(&plan);

        // cache.py and test_cache.py share an affinity group, so they
        // land in the same chunk
        let chunk_of = |name: &str| {
            chunks
                .iter()
                .position(|c| c.sources.iter().any(|s| s.reference.contains(name)))
                .unwrap()
        };
        assert_eq!(chunk_of("src/cache.py"), chunk_of("test_cache.py"));
    }

    #[test]
    fn test_coherence_grep_goes_last() {
        let plan = GatherPlan::new("op", "intent")
            .add_source(sized(GatherSource::grep("Error", "."), 10 * 1024))
            .add_source(sized(GatherSource::file("a.py"), 10 * 1024))
            .add_source(sized(GatherSource::bash("ls"), 1024));

        let broker = ChunkBroker::new(100, ChunkStrategy::CoherenceBased);
        let chunks = broker.plan_chunks(&plan);
        let last_chunk = chunks.last().unwrap();
        assert_eq!(
            last_chunk.sources.last().unwrap().source_type,
            SourceType::Grep
        );
    }

    #[test]
    fn test_oversized_plan_splits_into_multiple_chunks() {
        // Total is 2x the limit: coherence strategy must produce at
        // least 2 chunks, each within the limit
        let mut plan = GatherPlan::new("op", "intent");
        for n in 0..10 {
            plan = plan.add_source(sized(
                GatherSource::file(format!("mod{}/file{}.py", n, n)),
                20 * 1024,
            ));
        }

        let broker = ChunkBroker::new(100, ChunkStrategy::CoherenceBased);
        let chunks = broker.plan_chunks(&plan);

        assert!(chunks.len() >= 2);
        for chunk in &chunks {
            assert!(chunk.estimated_size <= 100 * 1024 - 2048);
        }
    }

    #[test]
    fn test_priority_based_orders_globally() {
        let plan = GatherPlan::new("op", "intent")
            .add_source(
                sized(GatherSource::file("low.py"), 1024)
                    .with_priority(SourcePriority::Low),
            )
            .add_source(
                sized(GatherSource::file("critical.py"), 1024)
                    .with_priority(SourcePriority::Critical),
            );

        let broker = ChunkBroker::new(100, ChunkStrategy::PriorityBased);
        let chunks = broker.plan_chunks(&plan);
        assert_eq!(chunks[0].sources[0].reference, "critical.py");
    }

    #[test]
    fn test_empty_plan_yields_no_chunks() {
        let broker = ChunkBroker::default();
        assert!(broker.plan_chunks(&GatherPlan::new("op", "i")).is_empty());
    }

    #[test]
    fn test_estimates_have_minimum() {
        let plan = GatherPlan::new("op", "intent").add_symbol("SomeClass");
        let broker = ChunkBroker::default();
        let chunks = broker.plan_chunks(&plan);
        assert_eq!(chunks[0].sources[0].estimated_size_bytes, 1024);
    }
}
