use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::warn;

use crate::Result;
use crate::functions::{gather_bash, gather_file, gather_glob, gather_grep, gather_symbol};
use crate::plan::{GatherPlan, GatherSource, SourcePriority, SourceType};
use crate::result::GatherResult;
use crate::safety::SafetyRegistry;
use babel_orchestrator::{Priority, TaskOrchestrator, io_task};

const GATHER_TIMEOUT: Duration = Duration::from_secs(30);
const COLLECT_SLACK: Duration = Duration::from_secs(5);

/// Parallel context gathering over the orchestrator's I/O pool.
///
/// Every source runs as an I/O task with the LLM flag off, so nothing
/// here competes for LLM quota. Results come back in plan order no
/// matter how execution interleaves, and without an orchestrator the
/// gatherer degrades to sequential execution with identical output.
pub struct ContextGatherer {
    orchestrator: Option<Arc<TaskOrchestrator>>,
    safety: SafetyRegistry,
}

impl ContextGatherer {
    pub fn new(orchestrator: Option<Arc<TaskOrchestrator>>) -> Self {
        Self {
            orchestrator,
            safety: SafetyRegistry::new(),
        }
    }

    pub fn sequential() -> Self {
        Self::new(None)
    }

    pub fn safety_mut(&mut self) -> &mut SafetyRegistry {
        &mut self.safety
    }

    /// Gather every source in a plan, in plan order.
    pub fn gather(&self, plan: &GatherPlan) -> Result<Vec<GatherResult>> {
        self.gather_sources(&plan.sources)
    }

    /// Gather from an explicit source list, preserving its order.
    ///
    /// The safety gate runs before anything executes: one rejected bash
    /// source fails the whole call with no subprocess spawned.
    pub fn gather_sources(&self, sources: &[GatherSource]) -> Result<Vec<GatherResult>> {
        if sources.is_empty() {
            return Ok(Vec::new());
        }

        let bash_commands: Vec<&str> = sources
            .iter()
            .filter(|s| s.source_type == SourceType::Bash)
            .map(|s| s.reference.as_str())
            .collect();
        self.safety.check_commands(bash_commands)?;

        if let Some(orchestrator) = &self.orchestrator
            && orchestrator.enabled()
        {
            match self.gather_parallel(orchestrator, sources) {
                Ok(results) => return Ok(results),
                Err(err) => {
                    warn!(error = %err, "parallel gather failed, falling back to sequential");
                }
            }
        }

        Ok(self.gather_sequential(sources))
    }

    fn gather_parallel(
        &self,
        orchestrator: &TaskOrchestrator,
        sources: &[GatherSource],
    ) -> std::result::Result<Vec<GatherResult>, babel_orchestrator::Error> {
        let tasks: Vec<_> = sources
            .iter()
            .enumerate()
            .map(|(i, source)| {
                let source = source.clone();
                let name = format!("gather_{}_{}", source.source_type.as_str(), i);
                io_task(move || {
                    let result = execute_source(&source);
                    serde_json::to_value(result).map_err(|err| err.to_string())
                })
                .llm_call(false)
                .with_priority(map_priority(source_priority(sources, i)))
                .with_timeout(GATHER_TIMEOUT)
                .with_name(name)
            })
            .collect();

        let handles = orchestrator.submit_batch(tasks)?;

        let mut results = Vec::with_capacity(sources.len());
        for (source, handle) in sources.iter().zip(handles) {
            let task_result = handle.wait_for(GATHER_TIMEOUT + COLLECT_SLACK);
            let result = if task_result.success() {
                task_result
                    .result
                    .and_then(|value| decode_result(value))
                    .unwrap_or_else(|| {
                        GatherResult::error_result(
                            source.source_type,
                            &source.reference,
                            "Malformed gather result",
                            0.0,
                        )
                    })
            } else {
                GatherResult::error_result(
                    source.source_type,
                    &source.reference,
                    task_result
                        .error
                        .unwrap_or_else(|| "Task failed".to_string()),
                    task_result.duration_ms.unwrap_or(0.0),
                )
            };
            results.push(result);
        }

        Ok(results)
    }

    fn gather_sequential(&self, sources: &[GatherSource]) -> Vec<GatherResult> {
        sources.iter().map(execute_source).collect()
    }
}

fn source_priority(sources: &[GatherSource], index: usize) -> SourcePriority {
    sources
        .get(index)
        .map(|s| s.priority)
        .unwrap_or(SourcePriority::Normal)
}

fn decode_result(value: Value) -> Option<GatherResult> {
    serde_json::from_value(value).ok()
}

fn map_priority(priority: SourcePriority) -> Priority {
    match priority {
        SourcePriority::Critical => Priority::Critical,
        SourcePriority::High => Priority::High,
        SourcePriority::Normal => Priority::Normal,
        SourcePriority::Low => Priority::Background,
    }
}

/// Run one source through its gather primitive.
fn execute_source(source: &GatherSource) -> GatherResult {
    match source.source_type {
        SourceType::File => gather_file(&source.reference),
        SourceType::Grep => gather_grep(
            &source.reference,
            source.params.path.as_deref().unwrap_or("."),
            source.params.max_matches.unwrap_or(100),
            source.params.context_lines.unwrap_or(0),
        ),
        SourceType::Bash => gather_bash(
            &source.reference,
            Duration::from_secs_f64(source.params.timeout_secs.unwrap_or(30.0)),
            source.params.cwd.as_deref(),
        ),
        SourceType::Glob => gather_glob(
            &source.reference,
            source.params.base_path.as_deref().unwrap_or("."),
        ),
        SourceType::Symbol => gather_symbol(
            &source.reference,
            source.params.project_dir.as_deref(),
            source.params.context_lines.unwrap_or(5),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use babel_orchestrator::OrchestratorConfig;
    use tempfile::TempDir;

    fn parallel_gatherer() -> ContextGatherer {
        let orchestrator = TaskOrchestrator::new(OrchestratorConfig {
            enabled: true,
            io_workers: 4,
            cpu_workers: 1,
            ..OrchestratorConfig::default()
        })
        .unwrap();
        ContextGatherer::new(Some(Arc::new(orchestrator)))
    }

    #[test]
    fn test_results_in_plan_order() {
        let temp = TempDir::new().unwrap();
        for name in ["a", "b", "c"] {
            std::fs::write(temp.path().join(format!("{}.txt", name)), name).unwrap();
        }

        let plan = GatherPlan::new("op", "intent")
            .add_file(temp.path().join("c.txt").to_string_lossy().to_string())
            .add_file(temp.path().join("a.txt").to_string_lossy().to_string())
            .add_bash("echo hi")
            .add_file(temp.path().join("b.txt").to_string_lossy().to_string());

        let gatherer = parallel_gatherer();
        let results = gatherer.gather(&plan).unwrap();

        assert_eq!(results.len(), 4);
        assert!(results[0].source_ref.ends_with("c.txt"));
        assert!(results[1].source_ref.ends_with("a.txt"));
        assert_eq!(results[2].source_type, SourceType::Bash);
        assert!(results[3].source_ref.ends_with("b.txt"));
        assert_eq!(results[0].content, "c");
    }

    #[test]
    fn test_parallel_and_sequential_identical_content() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("x.txt"), "stable content").unwrap();
        let plan = GatherPlan::new("op", "intent")
            .add_file(temp.path().join("x.txt").to_string_lossy().to_string())
            .add_file("/missing/file.txt".to_string());

        let parallel = parallel_gatherer().gather(&plan).unwrap();
        let sequential = ContextGatherer::sequential().gather(&plan).unwrap();

        assert_eq!(parallel.len(), sequential.len());
        for (p, s) in parallel.iter().zip(&sequential) {
            assert_eq!(p.content, s.content);
            assert_eq!(p.success, s.success);
        }
    }

    #[test]
    fn test_safety_gate_blocks_mutation_bash() {
        let plan = GatherPlan::new("op", "intent").add_bash("babel capture 'x'");

        let gatherer = ContextGatherer::sequential();
        let err = gatherer.gather(&plan).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("REJECTED"));
        assert!(message.contains("mutation"));
    }

    #[test]
    fn test_failures_are_inline_results() {
        let plan = GatherPlan::new("op", "intent").add_file("/not/here.txt".to_string());
        let results = parallel_gatherer().gather(&plan).unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].failed());
        assert!(results[0].error.as_ref().unwrap().contains("File not found"));
    }

    #[test]
    fn test_llm_limiter_not_engaged_by_gather() {
        let temp = TempDir::new().unwrap();
        for n in 0..6 {
            std::fs::write(temp.path().join(format!("f{}.txt", n)), "data").unwrap();
        }
        let mut plan = GatherPlan::new("op", "intent");
        for n in 0..6 {
            plan = plan.add_file(temp.path().join(format!("f{}.txt", n)).to_string_lossy().to_string());
        }

        let orchestrator = Arc::new(
            TaskOrchestrator::new(OrchestratorConfig {
                enabled: true,
                io_workers: 4,
                cpu_workers: 1,
                llm_concurrent: 1,
                ..OrchestratorConfig::default()
            })
            .unwrap(),
        );
        let gatherer = ContextGatherer::new(Some(Arc::clone(&orchestrator)));
        let results = gatherer.gather(&plan).unwrap();
        assert!(results.iter().all(|r| r.success));
        // Gathering never takes an LLM permit
        // (verified through the orchestrator's own accounting)
        let summary = orchestrator.metrics_summary();
        assert!(summary["tasks"]["submitted"].as_u64().unwrap() >= 6);
    }
}
