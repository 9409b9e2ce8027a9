use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

use serde::Serialize;
use serde_json::{Value, json};

use crate::task::{Priority, TaskKind, TaskMeta, TaskResult, TaskStatus};

/// Latency histogram with fixed buckets:
/// <10 / <50 / <100 / <500 / <1000 / <5000 / >=5000 ms.
#[derive(Debug, Clone, Serialize)]
pub struct LatencyHistogram {
    pub count: u64,
    pub sum_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub buckets: [u64; 7],
}

impl Default for LatencyHistogram {
    fn default() -> Self {
        Self {
            count: 0,
            sum_ms: 0.0,
            min_ms: f64::INFINITY,
            max_ms: 0.0,
            buckets: [0; 7],
        }
    }
}

impl LatencyHistogram {
    pub const BUCKET_LABELS: [&'static str; 7] = [
        "lt_10ms", "lt_50ms", "lt_100ms", "lt_500ms", "lt_1s", "lt_5s", "gt_5s",
    ];

    pub fn record(&mut self, duration_ms: f64) {
        self.count += 1;
        self.sum_ms += duration_ms;
        self.min_ms = self.min_ms.min(duration_ms);
        self.max_ms = self.max_ms.max(duration_ms);

        let bucket = if duration_ms < 10.0 {
            0
        } else if duration_ms < 50.0 {
            1
        } else if duration_ms < 100.0 {
            2
        } else if duration_ms < 500.0 {
            3
        } else if duration_ms < 1000.0 {
            4
        } else if duration_ms < 5000.0 {
            5
        } else {
            6
        };
        self.buckets[bucket] += 1;
    }

    pub fn avg_ms(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        self.sum_ms / self.count as f64
    }

    fn to_value(&self) -> Value {
        let buckets: HashMap<&str, u64> = Self::BUCKET_LABELS
            .iter()
            .copied()
            .zip(self.buckets.iter().copied())
            .collect();
        json!({
            "count": self.count,
            "avg_ms": round2(self.avg_ms()),
            "min_ms": if self.min_ms.is_finite() { round2(self.min_ms) } else { 0.0 },
            "max_ms": round2(self.max_ms),
            "buckets": buckets,
        })
    }
}

#[derive(Default)]
struct MetricsInner {
    submitted: HashMap<String, u64>,
    completed: HashMap<String, u64>,
    errors: HashMap<String, u64>,
    latency: HashMap<String, LatencyHistogram>,
    queue_depth: HashMap<String, usize>,
    active_workers: HashMap<String, usize>,
}

/// Thread-safe metrics for orchestrator observability. Every task emits
/// timing; counters are keyed by kind and priority.
pub struct MetricsCollector {
    inner: Mutex<MetricsInner>,
    start_time: Instant,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MetricsInner::default()),
            start_time: Instant::now(),
        }
    }

    pub fn record_task_submitted(&self, meta: &TaskMeta) {
        let mut inner = self.inner.lock().unwrap();
        let key = format!("{}:{}", meta.kind.as_str(), meta.priority.as_str());
        *inner.submitted.entry(key).or_insert(0) += 1;
        *inner.submitted.entry("total".to_string()).or_insert(0) += 1;
    }

    pub fn record_task_completed(&self, result: &TaskResult, kind: TaskKind) {
        let mut inner = self.inner.lock().unwrap();

        let status = match result.status {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        };
        *inner
            .completed
            .entry(format!("{}:{}", kind.as_str(), status))
            .or_insert(0) += 1;
        *inner
            .completed
            .entry(format!("total:{}", status))
            .or_insert(0) += 1;

        if let Some(duration_ms) = result.duration_ms {
            inner
                .latency
                .entry(kind.as_str().to_string())
                .or_default()
                .record(duration_ms);
            inner
                .latency
                .entry("all".to_string())
                .or_default()
                .record(duration_ms);
        }

        if result.failed() {
            *inner
                .errors
                .entry(format!("{}:failed", kind.as_str()))
                .or_insert(0) += 1;
            *inner.errors.entry("total:failed".to_string()).or_insert(0) += 1;
        }
    }

    pub fn record_error(&self, kind: TaskKind, error_kind: &str) {
        let mut inner = self.inner.lock().unwrap();
        *inner
            .errors
            .entry(format!("{}:{}", kind.as_str(), error_kind))
            .or_insert(0) += 1;
        *inner.errors.entry("total".to_string()).or_insert(0) += 1;
    }

    pub fn set_queue_depth(&self, priority: Priority, depth: usize) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .queue_depth
            .insert(priority.as_str().to_string(), depth);
    }

    pub fn set_queue_depths(&self, depths: [usize; 4]) {
        let mut inner = self.inner.lock().unwrap();
        for (priority, depth) in Priority::ALL.iter().zip(depths) {
            inner
                .queue_depth
                .insert(priority.as_str().to_string(), depth);
        }
    }

    pub fn set_active_workers(&self, pool: &str, count: usize) {
        let mut inner = self.inner.lock().unwrap();
        inner.active_workers.insert(pool.to_string(), count);
    }

    /// Snapshot of all metrics for display.
    pub fn summary(&self) -> Value {
        let inner = self.inner.lock().unwrap();
        let uptime = self.start_time.elapsed().as_secs_f64();

        let submitted = inner.submitted.get("total").copied().unwrap_or(0);
        let completed: u64 = inner
            .completed
            .iter()
            .filter(|(k, _)| k.starts_with("total:"))
            .map(|(_, v)| v)
            .sum();
        let failed = inner.errors.get("total:failed").copied().unwrap_or(0);

        let success_rate = if completed > 0 {
            (completed - failed.min(completed)) as f64 / completed as f64 * 100.0
        } else {
            100.0
        };

        json!({
            "uptime_seconds": round2(uptime),
            "tasks": {
                "submitted": submitted,
                "completed": completed,
                "failed": failed,
                "success_rate": round2(success_rate),
            },
            "latency": inner
                .latency
                .iter()
                .map(|(k, h)| (k.clone(), h.to_value()))
                .collect::<HashMap<String, Value>>(),
            "queues": inner.queue_depth.clone(),
            "workers": inner.active_workers.clone(),
        })
    }

    /// Tasks per second over the given window (bounded by uptime).
    pub fn throughput(&self, window_seconds: f64) -> (f64, f64) {
        let inner = self.inner.lock().unwrap();
        let uptime = self.start_time.elapsed().as_secs_f64();
        let window = uptime.min(window_seconds);
        if window <= 0.0 {
            return (0.0, 0.0);
        }

        let submitted = inner.submitted.get("total").copied().unwrap_or(0);
        let completed = inner.completed.get("total:completed").copied().unwrap_or(0);
        (
            round2(submitted as f64 / window),
            round2(completed as f64 / window),
        )
    }

    pub fn reset(&self) {
        let mut inner = self.inner.lock().unwrap();
        *inner = MetricsInner::default();
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn meta(kind: TaskKind, priority: Priority) -> TaskMeta {
        TaskMeta {
            id: "t1".into(),
            kind,
            priority,
            timeout_secs: 60.0,
            retries: 0,
            is_llm_call: false,
            name: String::new(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_histogram_buckets() {
        let mut hist = LatencyHistogram::default();
        hist.record(5.0);
        hist.record(75.0);
        hist.record(7500.0);

        assert_eq!(hist.count, 3);
        assert_eq!(hist.buckets[0], 1);
        assert_eq!(hist.buckets[2], 1);
        assert_eq!(hist.buckets[6], 1);
        assert_eq!(hist.min_ms, 5.0);
        assert_eq!(hist.max_ms, 7500.0);
    }

    #[test]
    fn test_counters_by_kind_and_priority() {
        let metrics = MetricsCollector::new();
        metrics.record_task_submitted(&meta(TaskKind::IoBound, Priority::High));
        metrics.record_task_submitted(&meta(TaskKind::CpuBound, Priority::Normal));

        let summary = metrics.summary();
        assert_eq!(summary["tasks"]["submitted"], 2);
    }

    #[test]
    fn test_completion_feeds_latency() {
        let metrics = MetricsCollector::new();
        let result = TaskResult::completed("t1", json!(null), Utc::now());
        metrics.record_task_completed(&result, TaskKind::IoBound);

        let summary = metrics.summary();
        assert_eq!(summary["latency"]["io"]["count"], 1);
        assert_eq!(summary["latency"]["all"]["count"], 1);
    }

    #[test]
    fn test_failed_counts_as_error() {
        let metrics = MetricsCollector::new();
        let result = TaskResult::failure("t1", "oops", Utc::now());
        metrics.record_task_completed(&result, TaskKind::IoBound);

        let summary = metrics.summary();
        assert_eq!(summary["tasks"]["failed"], 1);
    }

    #[test]
    fn test_queue_depth_gauges() {
        let metrics = MetricsCollector::new();
        metrics.set_queue_depths([1, 2, 3, 4]);
        let summary = metrics.summary();
        assert_eq!(summary["queues"]["CRITICAL"], 1);
        assert_eq!(summary["queues"]["BACKGROUND"], 4);
    }
}
