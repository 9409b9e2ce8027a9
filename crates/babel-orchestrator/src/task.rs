use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// Classification for routing to the appropriate worker pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// LLM calls, file I/O, subprocess, network
    IoBound,
    /// Parsing, similarity, hashing-heavy work
    CpuBound,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::IoBound => "io",
            TaskKind::CpuBound => "cpu",
        }
    }
}

/// Scheduling priority. Lower value dispatches earlier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    /// User is waiting, blocking operation
    Critical = 0,
    /// User-facing, but not blocking
    High = 1,
    /// Batch operations
    Normal = 2,
    /// Cache warming, prefetch
    Background = 3,
}

impl Priority {
    pub const ALL: [Priority; 4] = [
        Priority::Critical,
        Priority::High,
        Priority::Normal,
        Priority::Background,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Critical => "CRITICAL",
            Priority::High => "HIGH",
            Priority::Normal => "NORMAL",
            Priority::Background => "BACKGROUND",
        }
    }

    pub fn index(&self) -> usize {
        *self as usize
    }
}

/// Task lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// An I/O task body: arbitrary blocking closure, run once on a worker
/// thread.
pub type IoFn = Box<dyn FnOnce() -> std::result::Result<Value, String> + Send + 'static>;

/// A CPU task body: a plain function over JSON values. The signature is
/// the serializability contract: input and output marshal as JSON, and
/// a `fn` pointer carries no captured environment.
pub type CpuFn = fn(Value) -> std::result::Result<Value, String>;

pub(crate) enum TaskBody {
    Io(IoFn),
    Cpu { func: CpuFn, input: Value },
}

impl TaskBody {
    pub(crate) fn run(self) -> std::result::Result<Value, String> {
        match self {
            TaskBody::Io(f) => f(),
            TaskBody::Cpu { func, input } => func(input),
        }
    }
}

/// Everything about a task except its body. Cheap to clone; survives
/// after the body has been shipped to a worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskMeta {
    pub id: String,
    pub kind: TaskKind,
    pub priority: Priority,
    /// Hard limit; exceeding it reports the task as failed
    pub timeout_secs: f64,
    pub retries: u32,
    /// Rate limiter applies only when true
    pub is_llm_call: bool,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl TaskMeta {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs_f64(self.timeout_secs)
    }
}

/// Unit of parallelizable work. Immutable after submission.
pub struct Task {
    pub meta: TaskMeta,
    pub(crate) body: TaskBody,
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task").field("meta", &self.meta).finish()
    }
}

impl Task {
    fn new(kind: TaskKind, body: TaskBody, default_timeout: f64) -> Self {
        Self {
            meta: TaskMeta {
                id: uuid::Uuid::new_v4().simple().to_string()[..12].to_string(),
                kind,
                priority: Priority::Normal,
                timeout_secs: default_timeout,
                retries: 0,
                is_llm_call: false,
                name: String::new(),
                created_at: Utc::now(),
            },
            body,
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.meta.priority = priority;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.meta.timeout_secs = timeout.as_secs_f64();
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.meta.name = name.into();
        self
    }

    pub fn llm_call(mut self, is_llm_call: bool) -> Self {
        self.meta.is_llm_call = is_llm_call;
        self
    }
}

/// Create an I/O-bound task (LLM, file, subprocess, network).
pub fn io_task(
    f: impl FnOnce() -> std::result::Result<Value, String> + Send + 'static,
) -> Task {
    Task::new(TaskKind::IoBound, TaskBody::Io(Box::new(f)), 60.0)
}

/// Create a CPU-bound task. The body must be a plain `fn` over JSON
/// values so it can marshal across a worker boundary.
pub fn cpu_task(func: CpuFn, input: Value) -> Task {
    Task::new(TaskKind::CpuBound, TaskBody::Cpu { func, input }, 30.0)
}

/// Outcome of task execution. Serializable for cross-boundary
/// communication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: String,
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<f64>,

    #[serde(default = "default_attempt")]
    pub attempt: u32,
}

fn default_attempt() -> u32 {
    1
}

impl TaskResult {
    pub fn success(&self) -> bool {
        self.status == TaskStatus::Completed
    }

    pub fn failed(&self) -> bool {
        self.status == TaskStatus::Failed
    }

    pub fn completed(task_id: impl Into<String>, result: Value, started_at: DateTime<Utc>) -> Self {
        let completed_at = Utc::now();
        Self {
            task_id: task_id.into(),
            status: TaskStatus::Completed,
            result: Some(result),
            error: None,
            started_at: Some(started_at.to_rfc3339()),
            completed_at: Some(completed_at.to_rfc3339()),
            duration_ms: Some(duration_ms(started_at, completed_at)),
            attempt: 1,
        }
    }

    pub fn failure(
        task_id: impl Into<String>,
        error: impl Into<String>,
        started_at: DateTime<Utc>,
    ) -> Self {
        let completed_at = Utc::now();
        Self {
            task_id: task_id.into(),
            status: TaskStatus::Failed,
            result: None,
            error: Some(error.into()),
            started_at: Some(started_at.to_rfc3339()),
            completed_at: Some(completed_at.to_rfc3339()),
            duration_ms: Some(duration_ms(started_at, completed_at)),
            attempt: 1,
        }
    }

    pub fn cancelled(task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            status: TaskStatus::Cancelled,
            result: None,
            error: Some("Cancelled before execution".to_string()),
            started_at: None,
            completed_at: None,
            duration_ms: None,
            attempt: 1,
        }
    }
}

fn duration_ms(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    (end - start).num_microseconds().unwrap_or(0) as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_priority_ordering() {
        assert!(Priority::Critical < Priority::High);
        assert!(Priority::High < Priority::Normal);
        assert!(Priority::Normal < Priority::Background);
    }

    #[test]
    fn test_io_task_defaults() {
        let task = io_task(|| Ok(json!(1)));
        assert_eq!(task.meta.kind, TaskKind::IoBound);
        assert_eq!(task.meta.priority, Priority::Normal);
        assert!(!task.meta.is_llm_call);
        assert_eq!(task.meta.id.len(), 12);
    }

    #[test]
    fn test_task_result_serializable() {
        let result = TaskResult::completed("abc", json!({"n": 7}), Utc::now());
        let encoded = serde_json::to_string(&result).unwrap();
        let back: TaskResult = serde_json::from_str(&encoded).unwrap();
        assert!(back.success());
        assert_eq!(back.result.unwrap()["n"], 7);
    }

    #[test]
    fn test_cpu_body_runs_fn_pointer() {
        fn double(v: Value) -> std::result::Result<Value, String> {
            Ok(json!(v.as_i64().unwrap_or(0) * 2))
        }
        let task = cpu_task(double, json!(21));
        assert_eq!(task.body.run().unwrap(), json!(42));
    }
}
