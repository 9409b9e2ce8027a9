//! Parallel task execution for Babel.
//!
//! Routes heterogeneous work through typed pools under priority and
//! rate constraints, aggregates results through a single writer so the
//! event log keeps exactly one logical writer per journal, and exposes
//! metrics. With parallelism disabled the same API runs everything
//! synchronously.

mod aggregator;
mod config;
mod error;
mod metrics;
mod pools;
mod scheduler;
mod task;

pub use aggregator::{AggregatorStats, BatchWriter, ResultAggregator};
pub use config::OrchestratorConfig;
pub use error::{Error, Result};
pub use metrics::{LatencyHistogram, MetricsCollector};
pub use pools::{CompletionHook, CpuPool, IoPool, PoolStats, RateLimiter, TaskHandle};
pub use scheduler::{PriorityScheduler, Scheduled, SchedulerStats};
pub use task::{
    CpuFn, IoFn, Priority, Task, TaskKind, TaskMeta, TaskResult, TaskStatus, cpu_task, io_task,
};

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use once_cell::sync::OnceCell;
use serde_json::{Value, json};
use tracing::warn;

struct Runtime {
    io_pool: IoPool,
    cpu_pool: CpuPool,
    aggregator: Arc<ResultAggregator>,
    metrics: Arc<MetricsCollector>,
}

/// Central coordinator for parallel task execution.
///
/// Thread-safe. Components initialize lazily on first use; with
/// `enabled = false` nothing is spawned and every call executes
/// synchronously behind the identical surface.
pub struct TaskOrchestrator {
    config: OrchestratorConfig,
    runtime: OnceCell<Runtime>,
    shut_down: AtomicBool,
}

impl TaskOrchestrator {
    pub fn new(config: OrchestratorConfig) -> Result<Self> {
        config.validate().map_err(Error::Config)?;
        Ok(Self {
            config,
            runtime: OnceCell::new(),
            shut_down: AtomicBool::new(false),
        })
    }

    /// Build from `BABEL_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::new(OrchestratorConfig::from_env())
    }

    pub fn enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    fn runtime(&self) -> Option<&Runtime> {
        if !self.config.enabled {
            return None;
        }
        Some(self.runtime.get_or_init(|| {
            let aggregator = Arc::new(ResultAggregator::new());
            let metrics = Arc::new(MetricsCollector::new());

            let hook: CompletionHook = {
                let aggregator = Arc::clone(&aggregator);
                let metrics = Arc::clone(&metrics);
                Arc::new(move |meta, result| {
                    metrics.record_task_completed(result, meta.kind);
                    aggregator.submit(result.clone());
                })
            };

            Runtime {
                io_pool: IoPool::new(&self.config, Arc::clone(&hook)),
                cpu_pool: CpuPool::new(&self.config, hook),
                aggregator,
                metrics,
            }
        }))
    }

    /// Submit one task, routed by kind. Returns a handle that resolves
    /// to the task's result.
    pub fn submit(&self, task: Task) -> Result<TaskHandle> {
        if self.shut_down.load(Ordering::SeqCst) {
            return Err(Error::ShutDown);
        }

        let Some(runtime) = self.runtime() else {
            return Ok(self.execute_sequential(task));
        };

        runtime.metrics.record_task_submitted(&task.meta);

        let rejected = match task.meta.kind {
            TaskKind::IoBound => runtime.io_pool.submit(task),
            TaskKind::CpuBound => runtime.cpu_pool.submit(task),
        };

        match rejected {
            Ok(handle) => Ok(handle),
            Err(task) if self.config.fallback_sequential => {
                warn!(task_id = %task.meta.id, "pool rejected task; falling back to sequential");
                Ok(self.execute_sequential(task))
            }
            Err(_) => Err(Error::ShutDown),
        }
    }

    /// Submit a batch. Enqueueing is atomic per pool, so relative
    /// priority within the batch is respected; handles come back in
    /// input order.
    pub fn submit_batch(&self, tasks: Vec<Task>) -> Result<Vec<TaskHandle>> {
        if self.shut_down.load(Ordering::SeqCst) {
            return Err(Error::ShutDown);
        }

        let Some(runtime) = self.runtime() else {
            return Ok(tasks
                .into_iter()
                .map(|task| self.execute_sequential(task))
                .collect());
        };

        for task in &tasks {
            runtime.metrics.record_task_submitted(&task.meta);
        }

        // Partition by pool, remembering each task's input position
        let mut io_tasks = Vec::new();
        let mut io_slots = Vec::new();
        let mut cpu_tasks = Vec::new();
        let mut cpu_slots = Vec::new();
        let total = tasks.len();
        for (slot, task) in tasks.into_iter().enumerate() {
            match task.meta.kind {
                TaskKind::IoBound => {
                    io_slots.push(slot);
                    io_tasks.push(task);
                }
                TaskKind::CpuBound => {
                    cpu_slots.push(slot);
                    cpu_tasks.push(task);
                }
            }
        }

        let mut handles: Vec<Option<TaskHandle>> = (0..total).map(|_| None).collect();

        if !io_tasks.is_empty() {
            let batch = runtime
                .io_pool
                .submit_batch(io_tasks)
                .map_err(|_| Error::ShutDown)?;
            for (slot, handle) in io_slots.into_iter().zip(batch) {
                handles[slot] = Some(handle);
            }
        }
        if !cpu_tasks.is_empty() {
            let batch = runtime
                .cpu_pool
                .submit_batch(cpu_tasks)
                .map_err(|_| Error::ShutDown)?;
            for (slot, handle) in cpu_slots.into_iter().zip(batch) {
                handles[slot] = Some(handle);
            }
        }

        Ok(handles.into_iter().flatten().collect())
    }

    /// Parallel map: apply `func` to each item, returning results in
    /// input order. A single failure aborts the map with the first
    /// encountered error.
    pub fn map_parallel(
        &self,
        func: CpuFn,
        items: Vec<Value>,
        kind: TaskKind,
        priority: Priority,
        timeout: Duration,
    ) -> Result<Vec<Value>> {
        if items.is_empty() {
            return Ok(Vec::new());
        }
        if self.shut_down.load(Ordering::SeqCst) {
            return Err(Error::ShutDown);
        }

        let Some(runtime) = self.runtime() else {
            // Sequential fallback: identical results, one at a time
            let mut results = Vec::with_capacity(items.len());
            for item in items {
                results.push(func(item).map_err(Error::TaskFailed)?);
            }
            return Ok(results);
        };

        if kind == TaskKind::CpuBound {
            return runtime
                .cpu_pool
                .map(func, items, timeout)
                .map_err(Error::TaskFailed);
        }

        let tasks: Vec<Task> = items
            .into_iter()
            .map(|item| {
                io_task(move || func(item))
                    .with_priority(priority)
                    .with_timeout(timeout)
            })
            .collect();

        let handles = self.submit_batch(tasks)?;
        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            let result = handle.wait();
            if result.success() {
                results.push(result.result.unwrap_or(Value::Null));
            } else {
                return Err(Error::TaskFailed(
                    result.error.unwrap_or_else(|| "Task failed".to_string()),
                ));
            }
        }
        Ok(results)
    }

    /// Drain completed results from the aggregator.
    pub fn drain_results(&self, timeout: Duration) -> Vec<TaskResult> {
        match self.runtime.get() {
            Some(runtime) => runtime.aggregator.drain(timeout),
            None => Vec::new(),
        }
    }

    /// Collect results for specific task ids, blocking until all
    /// complete or the timeout passes.
    pub fn collect_results(
        &self,
        task_ids: &[String],
        timeout: Duration,
    ) -> HashMap<String, TaskResult> {
        match self.runtime.get() {
            Some(runtime) => runtime.aggregator.collect_by_task_ids(task_ids, timeout),
            None => HashMap::new(),
        }
    }

    /// The aggregator feeding the single writer.
    pub fn aggregator(&self) -> Option<&ResultAggregator> {
        self.runtime.get().map(|r| r.aggregator.as_ref())
    }

    /// Snapshot of metrics, config and pool stats.
    pub fn metrics_summary(&self) -> Value {
        let Some(runtime) = self.runtime.get() else {
            return json!({ "enabled": false });
        };

        // Refresh gauges before the snapshot
        let io_pending = runtime.io_pool.pending_by_priority();
        let cpu_pending = runtime.cpu_pool.pending_by_priority();
        let combined = [
            io_pending[0] + cpu_pending[0],
            io_pending[1] + cpu_pending[1],
            io_pending[2] + cpu_pending[2],
            io_pending[3] + cpu_pending[3],
        ];
        runtime.metrics.set_queue_depths(combined);
        runtime
            .metrics
            .set_active_workers("io", runtime.io_pool.stats().active_tasks);
        runtime
            .metrics
            .set_active_workers("cpu", runtime.cpu_pool.stats().active_tasks);

        let mut summary = runtime.metrics.summary();
        summary["enabled"] = json!(true);
        summary["config"] = serde_json::to_value(&self.config).unwrap_or(Value::Null);
        summary["io_pool"] = serde_json::to_value(runtime.io_pool.stats()).unwrap_or(Value::Null);
        summary["cpu_pool"] = serde_json::to_value(runtime.cpu_pool.stats()).unwrap_or(Value::Null);
        summary
    }

    /// Tasks per second (submitted, completed) over a window.
    pub fn throughput(&self, window_seconds: f64) -> (f64, f64) {
        match self.runtime.get() {
            Some(runtime) => runtime.metrics.throughput(window_seconds),
            None => (0.0, 0.0),
        }
    }

    pub fn pending_count(&self) -> usize {
        match self.runtime.get() {
            Some(runtime) => {
                let io: usize = runtime.io_pool.pending_by_priority().iter().sum();
                let cpu: usize = runtime.cpu_pool.pending_by_priority().iter().sum();
                io + cpu
            }
            None => 0,
        }
    }

    /// Shut down. With `wait`, in-flight work finishes; with
    /// `cancel_pending`, unstarted tasks come back so the caller can
    /// resubmit them later.
    pub fn shutdown(&self, wait: bool, cancel_pending: bool) -> Vec<Task> {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return Vec::new();
        }

        let Some(runtime) = self.runtime.get() else {
            return Vec::new();
        };

        let mut cancelled = runtime.io_pool.shutdown(wait, cancel_pending);
        cancelled.extend(runtime.cpu_pool.shutdown(wait, cancel_pending));
        cancelled
    }

    /// Run one task synchronously, returning a pre-completed handle.
    /// The surface is identical to the parallel path.
    fn execute_sequential(&self, task: Task) -> TaskHandle {
        let meta = task.meta.clone();
        let started_at = Utc::now();

        let outcome = catch_unwind(AssertUnwindSafe(|| task.body.run()));
        let result = match outcome {
            Ok(Ok(value)) => TaskResult::completed(&meta.id, value, started_at),
            Ok(Err(error)) => TaskResult::failure(&meta.id, error, started_at),
            Err(_) => TaskResult::failure(&meta.id, "Task panicked", started_at),
        };

        if let Some(runtime) = self.runtime.get() {
            runtime.metrics.record_task_completed(&result, meta.kind);
            runtime.aggregator.submit(result.clone());
        }

        TaskHandle::ready(result)
    }
}

impl Drop for TaskOrchestrator {
    fn drop(&mut self) {
        // Leaked worker threads would outlive the channels they serve
        self.shutdown(false, true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn orchestrator(enabled: bool) -> TaskOrchestrator {
        let config = OrchestratorConfig {
            enabled,
            io_workers: 2,
            cpu_workers: 2,
            ..OrchestratorConfig::default()
        };
        TaskOrchestrator::new(config).unwrap()
    }

    #[test]
    fn test_submit_and_wait() {
        let orch = orchestrator(true);
        let handle = orch.submit(io_task(|| Ok(json!(42)))).unwrap();
        let result = handle.wait();
        assert!(result.success());
        assert_eq!(result.result.unwrap(), json!(42));
        orch.shutdown(true, false);
    }

    #[test]
    fn test_disabled_mode_same_surface() {
        let orch = orchestrator(false);
        let handle = orch.submit(io_task(|| Ok(json!("seq")))).unwrap();
        let result = handle.wait();
        assert!(result.success());
        assert_eq!(result.result.unwrap(), json!("seq"));

        // Failures surface in the result, not as panics
        let handle = orch.submit(io_task(|| Err("nope".to_string()))).unwrap();
        assert!(handle.wait().failed());
    }

    #[test]
    fn test_submit_after_shutdown_errors() {
        let orch = orchestrator(true);
        orch.shutdown(true, false);
        assert!(matches!(
            orch.submit(io_task(|| Ok(Value::Null))),
            Err(Error::ShutDown)
        ));
    }

    #[test]
    fn test_map_parallel_input_order() {
        fn negate(v: Value) -> std::result::Result<Value, String> {
            Ok(json!(-v.as_i64().unwrap_or(0)))
        }

        let orch = orchestrator(true);
        let results = orch
            .map_parallel(
                negate,
                vec![json!(1), json!(2), json!(3)],
                TaskKind::IoBound,
                Priority::Normal,
                Duration::from_secs(5),
            )
            .unwrap();
        assert_eq!(results, vec![json!(-1), json!(-2), json!(-3)]);
        orch.shutdown(true, false);
    }

    #[test]
    fn test_map_parallel_first_error_aborts() {
        fn fail_on_two(v: Value) -> std::result::Result<Value, String> {
            if v == json!(2) {
                Err("two is bad".to_string())
            } else {
                Ok(v)
            }
        }

        let orch = orchestrator(true);
        let err = orch
            .map_parallel(
                fail_on_two,
                vec![json!(1), json!(2), json!(3)],
                TaskKind::CpuBound,
                Priority::Normal,
                Duration::from_secs(5),
            )
            .unwrap_err();
        assert!(matches!(err, Error::TaskFailed(_)));
        orch.shutdown(true, false);
    }

    #[test]
    fn test_parallel_and_sequential_agree() {
        fn add_ten(v: Value) -> std::result::Result<Value, String> {
            Ok(json!(v.as_i64().unwrap_or(0) + 10))
        }
        let items = vec![json!(1), json!(2), json!(3)];

        let parallel = orchestrator(true);
        let with_pools = parallel
            .map_parallel(
                add_ten,
                items.clone(),
                TaskKind::CpuBound,
                Priority::Normal,
                Duration::from_secs(5),
            )
            .unwrap();
        parallel.shutdown(true, false);

        let sequential = orchestrator(false);
        let without_pools = sequential
            .map_parallel(
                add_ten,
                items,
                TaskKind::CpuBound,
                Priority::Normal,
                Duration::from_secs(5),
            )
            .unwrap();

        assert_eq!(with_pools, without_pools);
    }

    #[test]
    fn test_metrics_summary_shape() {
        let orch = orchestrator(true);
        orch.submit(io_task(|| Ok(Value::Null))).unwrap().wait();
        let summary = orch.metrics_summary();
        assert_eq!(summary["enabled"], json!(true));
        assert!(summary["tasks"]["submitted"].as_u64().unwrap() >= 1);
        orch.shutdown(true, false);
    }

    #[test]
    fn test_results_reach_aggregator() {
        let orch = orchestrator(true);
        let handle = orch.submit(io_task(|| Ok(json!("agg")))).unwrap();
        handle.wait();

        let drained = orch.drain_results(Duration::from_millis(500));
        assert_eq!(drained.len(), 1);
        assert!(drained[0].success());
        orch.shutdown(true, false);
    }
}
