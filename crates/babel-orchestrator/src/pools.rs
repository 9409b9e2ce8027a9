use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use chrono::Utc;
use crossbeam_channel::{Receiver, Sender, bounded};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::config::OrchestratorConfig;
use crate::scheduler::{PriorityScheduler, Scheduled};
use crate::task::{CpuFn, Priority, Task, TaskMeta, TaskResult, TaskStatus, cpu_task};

/// Pool observability snapshot.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PoolStats {
    pub active_tasks: usize,
    pub completed_tasks: u64,
    pub failed_tasks: u64,
    pub total_duration_ms: f64,
}

impl PoolStats {
    pub fn avg_duration_ms(&self) -> f64 {
        if self.completed_tasks == 0 {
            return 0.0;
        }
        self.total_duration_ms / self.completed_tasks as f64
    }
}

/// Token bucket + semaphore composite for LLM API calls.
///
/// `max_concurrent` bounds outstanding permits; `rate_limit` bounds
/// request starts per second. Applied only to tasks flagged as LLM
/// calls; all other I/O bypasses this entirely.
pub struct RateLimiter {
    permits: Mutex<usize>,
    available: Condvar,
    pacing: Mutex<Instant>,
    min_interval: Duration,
    engaged: Mutex<u64>,
}

impl RateLimiter {
    pub fn new(max_concurrent: usize, rate_limit: f64) -> Self {
        let min_interval = if rate_limit > 0.0 {
            Duration::from_secs_f64(1.0 / rate_limit)
        } else {
            Duration::ZERO
        };
        Self {
            permits: Mutex::new(max_concurrent),
            available: Condvar::new(),
            pacing: Mutex::new(
                Instant::now()
                    .checked_sub(min_interval)
                    .unwrap_or_else(Instant::now),
            ),
            min_interval,
            engaged: Mutex::new(0),
        }
    }

    /// Acquire a permit, blocking up to `timeout`. Returns false when
    /// the timeout expires first.
    pub fn acquire(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;

        let mut permits = self.permits.lock().unwrap();
        while *permits == 0 {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (next, result) = self
                .available
                .wait_timeout(permits, deadline - now)
                .unwrap();
            permits = next;
            if result.timed_out() && *permits == 0 {
                return false;
            }
        }
        *permits -= 1;
        drop(permits);

        // Pace request starts to the configured rate
        {
            let mut last = self.pacing.lock().unwrap();
            let elapsed = last.elapsed();
            if elapsed < self.min_interval {
                std::thread::sleep(self.min_interval - elapsed);
            }
            *last = Instant::now();
        }

        *self.engaged.lock().unwrap() += 1;
        true
    }

    pub fn release(&self) {
        let mut permits = self.permits.lock().unwrap();
        *permits += 1;
        self.available.notify_one();
    }

    /// How many times a permit has been granted. Used to verify that
    /// non-LLM workloads never engage the limiter.
    pub fn engaged_count(&self) -> u64 {
        *self.engaged.lock().unwrap()
    }
}

/// Handle to an in-flight task. The pool-side sender is dropped when
/// the worker finishes, so waiting never outlives the task.
pub struct TaskHandle {
    pub task_id: String,
    timeout: Duration,
    rx: Receiver<TaskResult>,
}

impl TaskHandle {
    pub(crate) fn new(task_id: String, timeout: Duration, rx: Receiver<TaskResult>) -> Self {
        Self {
            task_id,
            timeout,
            rx,
        }
    }

    /// Pre-completed handle for sequential execution.
    pub(crate) fn ready(result: TaskResult) -> Self {
        let (tx, rx) = bounded(1);
        let task_id = result.task_id.clone();
        let _ = tx.send(result);
        Self {
            task_id,
            timeout: Duration::from_secs(0),
            rx,
        }
    }

    /// Block until the task completes or its timeout expires. A timeout
    /// is reported as a failed result, never a panic.
    pub fn wait(&self) -> TaskResult {
        self.wait_for(self.timeout)
    }

    /// Block up to an explicit duration.
    pub fn wait_for(&self, timeout: Duration) -> TaskResult {
        match self.rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(_) => TaskResult {
                task_id: self.task_id.clone(),
                status: TaskStatus::Failed,
                result: None,
                error: Some(format!(
                    "Task timed out after {:.1}s",
                    timeout.as_secs_f64()
                )),
                started_at: None,
                completed_at: None,
                duration_ms: None,
                attempt: 1,
            },
        }
    }

    /// Non-blocking poll.
    pub fn try_wait(&self) -> Option<TaskResult> {
        self.rx.try_recv().ok()
    }
}

/// Completion hook invoked by workers for every finished task.
pub type CompletionHook = Arc<dyn Fn(&TaskMeta, &TaskResult) + Send + Sync>;

pub(crate) struct Job {
    pub task: Task,
    pub reply: Sender<TaskResult>,
}

impl Scheduled for Job {
    fn priority(&self) -> Priority {
        self.task.meta.priority
    }
}

struct PoolShared {
    scheduler: PriorityScheduler<Job>,
    stats: Mutex<PoolStats>,
    on_complete: CompletionHook,
    rate_limiter: Option<Arc<RateLimiter>>,
}

impl PoolShared {
    fn worker_loop(&self) {
        while let Some(job) = self.scheduler.get(None) {
            self.execute(job);
        }
        // get() returned None: scheduler is shut down and drained
    }

    fn execute(&self, job: Job) {
        let Job { task, reply } = job;
        let meta = task.meta.clone();
        let started_at = Utc::now();

        {
            let mut stats = self.stats.lock().unwrap();
            stats.active_tasks += 1;
        }

        // Only tasks flagged as LLM calls ever touch the limiter
        let limiter = if meta.is_llm_call {
            self.rate_limiter.as_deref()
        } else {
            None
        };
        if let Some(limiter) = limiter
            && !limiter.acquire(meta.timeout())
        {
            let result = TaskResult::failure(&meta.id, "Rate limit timeout", started_at);
            self.finish(&meta, result, reply);
            return;
        }

        let outcome = catch_unwind(AssertUnwindSafe(|| task.body.run()));

        if let Some(limiter) = limiter {
            limiter.release();
        }

        let result = match outcome {
            Ok(Ok(value)) => TaskResult::completed(&meta.id, value, started_at),
            Ok(Err(error)) => TaskResult::failure(&meta.id, error, started_at),
            Err(_) => TaskResult::failure(&meta.id, "Task panicked", started_at),
        };
        self.finish(&meta, result, reply);
    }

    fn finish(&self, meta: &TaskMeta, result: TaskResult, reply: Sender<TaskResult>) {
        {
            let mut stats = self.stats.lock().unwrap();
            stats.active_tasks = stats.active_tasks.saturating_sub(1);
            if result.success() {
                stats.completed_tasks += 1;
                stats.total_duration_ms += result.duration_ms.unwrap_or(0.0);
            } else {
                stats.failed_tasks += 1;
            }
        }

        (self.on_complete)(meta, &result);
        // The caller may have stopped waiting; that is not an error
        let _ = reply.send(result);
    }
}

/// Fixed-size worker pool fed by a priority scheduler.
///
/// One construction serves both pool kinds: the I/O pool carries the
/// rate limiter for LLM-flagged tasks, the CPU pool does not.
pub struct WorkerPool {
    shared: Arc<PoolShared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    shut_down: AtomicBool,
    name: &'static str,
}

impl WorkerPool {
    fn spawn(
        name: &'static str,
        workers: usize,
        rate_limiter: Option<Arc<RateLimiter>>,
        on_complete: CompletionHook,
    ) -> Self {
        let shared = Arc::new(PoolShared {
            scheduler: PriorityScheduler::new(),
            stats: Mutex::new(PoolStats::default()),
            on_complete,
            rate_limiter,
        });

        let handles = (0..workers)
            .map(|n| {
                let shared = Arc::clone(&shared);
                std::thread::Builder::new()
                    .name(format!("babel-{}-{}", name, n))
                    .spawn(move || shared.worker_loop())
                    .expect("failed to spawn worker thread")
            })
            .collect();

        Self {
            shared,
            workers: Mutex::new(handles),
            shut_down: AtomicBool::new(false),
            name,
        }
    }

    /// Submit a task. Errors with the task back when shut down.
    pub fn submit(&self, task: Task) -> Result<TaskHandle, Task> {
        if self.shut_down.load(Ordering::SeqCst) {
            return Err(task);
        }

        let (tx, rx) = bounded(1);
        let handle = TaskHandle::new(task.meta.id.clone(), task.meta.timeout(), rx);
        match self.shared.scheduler.submit(Job { task, reply: tx }) {
            Ok(()) => Ok(handle),
            Err(job) => Err(job.task),
        }
    }

    /// Submit a batch atomically: all tasks are enqueued before any
    /// worker wakes, so relative priority within the batch holds.
    pub fn submit_batch(&self, tasks: Vec<Task>) -> Result<Vec<TaskHandle>, Vec<Task>> {
        if self.shut_down.load(Ordering::SeqCst) {
            return Err(tasks);
        }

        let mut handles = Vec::with_capacity(tasks.len());
        let mut jobs = Vec::with_capacity(tasks.len());
        for task in tasks {
            let (tx, rx) = bounded(1);
            handles.push(TaskHandle::new(task.meta.id.clone(), task.meta.timeout(), rx));
            jobs.push(Job { task, reply: tx });
        }

        match self.shared.scheduler.submit_batch(jobs) {
            Ok(()) => Ok(handles),
            Err(jobs) => Err(jobs.into_iter().map(|j| j.task).collect()),
        }
    }

    pub fn stats(&self) -> PoolStats {
        self.shared.stats.lock().unwrap().clone()
    }

    pub fn pending_count(&self) -> usize {
        self.shared.scheduler.pending_count()
    }

    pub fn pending_by_priority(&self) -> [usize; 4] {
        self.shared.scheduler.pending_by_priority()
    }

    pub fn worker_count(&self) -> usize {
        self.workers.lock().unwrap().len()
    }

    /// Stop accepting work. With `cancel_pending`, unstarted tasks come
    /// back to the caller with a cancelled result pushed to each
    /// waiting handle. With `wait`, in-flight work finishes first.
    pub fn shutdown(&self, wait: bool, cancel_pending: bool) -> Vec<Task> {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return Vec::new();
        }

        let cancelled_jobs = self.shared.scheduler.shutdown(cancel_pending);
        let mut cancelled = Vec::with_capacity(cancelled_jobs.len());
        for job in cancelled_jobs {
            let _ = job.reply.send(TaskResult::cancelled(&job.task.meta.id));
            cancelled.push(job.task);
        }

        if wait {
            let mut workers = self.workers.lock().unwrap();
            for handle in workers.drain(..) {
                let _ = handle.join();
            }
        }

        debug!(pool = self.name, cancelled = cancelled.len(), "pool shut down");
        cancelled
    }
}

/// Thread pool for I/O-bound work: file reads, subprocess, network and
/// LLM calls. Blocking inside one worker never stalls the others.
pub struct IoPool {
    pool: WorkerPool,
    rate_limiter: Arc<RateLimiter>,
}

impl IoPool {
    pub fn new(config: &OrchestratorConfig, on_complete: CompletionHook) -> Self {
        let rate_limiter = Arc::new(RateLimiter::new(
            config.llm_concurrent,
            config.llm_rate_limit,
        ));
        let pool = WorkerPool::spawn(
            "io",
            config.io_workers,
            Some(Arc::clone(&rate_limiter)),
            on_complete,
        );
        Self { pool, rate_limiter }
    }

    pub fn submit(&self, task: Task) -> Result<TaskHandle, Task> {
        self.pool.submit(task)
    }

    pub fn submit_batch(&self, tasks: Vec<Task>) -> Result<Vec<TaskHandle>, Vec<Task>> {
        self.pool.submit_batch(tasks)
    }

    pub fn stats(&self) -> PoolStats {
        self.pool.stats()
    }

    pub fn pending_by_priority(&self) -> [usize; 4] {
        self.pool.pending_by_priority()
    }

    pub fn worker_count(&self) -> usize {
        self.pool.worker_count()
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    pub fn shutdown(&self, wait: bool, cancel_pending: bool) -> Vec<Task> {
        self.pool.shutdown(wait, cancel_pending)
    }
}

/// Thread pool for CPU-bound work. Task bodies are plain functions
/// over JSON values, so inputs and outputs always marshal cleanly.
pub struct CpuPool {
    pool: WorkerPool,
}

impl CpuPool {
    pub fn new(config: &OrchestratorConfig, on_complete: CompletionHook) -> Self {
        Self {
            pool: WorkerPool::spawn("cpu", config.cpu_workers, None, on_complete),
        }
    }

    pub fn submit(&self, task: Task) -> Result<TaskHandle, Task> {
        self.pool.submit(task)
    }

    pub fn submit_batch(&self, tasks: Vec<Task>) -> Result<Vec<TaskHandle>, Vec<Task>> {
        self.pool.submit_batch(tasks)
    }

    /// Pool-native parallel map: apply `func` to every item, blocking
    /// until all finish. Results come back in input order; the first
    /// failure aborts the map.
    pub fn map(
        &self,
        func: CpuFn,
        items: Vec<Value>,
        timeout: Duration,
    ) -> Result<Vec<Value>, String> {
        if items.is_empty() {
            return Ok(Vec::new());
        }

        let mut handles = Vec::with_capacity(items.len());
        for item in items {
            let task = cpu_task(func, item).with_timeout(timeout);
            match self.pool.submit(task) {
                Ok(handle) => handles.push(handle),
                Err(_) => return Err("Pool is shut down".to_string()),
            }
        }

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            let result = handle.wait();
            if result.success() {
                results.push(result.result.unwrap_or(Value::Null));
            } else {
                return Err(result.error.unwrap_or_else(|| "Task failed".to_string()));
            }
        }
        Ok(results)
    }

    pub fn stats(&self) -> PoolStats {
        self.pool.stats()
    }

    pub fn pending_by_priority(&self) -> [usize; 4] {
        self.pool.pending_by_priority()
    }

    pub fn worker_count(&self) -> usize {
        self.pool.worker_count()
    }

    pub fn shutdown(&self, wait: bool, cancel_pending: bool) -> Vec<Task> {
        self.pool.shutdown(wait, cancel_pending)
    }
}
