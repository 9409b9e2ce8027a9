use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, unbounded};
use serde::Serialize;
use tracing::debug;

use crate::task::TaskResult;

// NOTE: Single Writer
//
// Workers on any thread push results here; exactly one consumer drains
// them. That consumer is the only path to the journal writer, which is
// what keeps every journal append serial no matter how many workers
// run. The aggregator holds results; it never touches the journals
// itself.

/// Aggregator observability snapshot.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AggregatorStats {
    pub results_received: u64,
    pub results_processed: u64,
    pub batches_committed: u64,
    pub errors: u64,
}

impl AggregatorStats {
    pub fn pending(&self) -> u64 {
        self.results_received - self.results_processed
    }
}

type ResultCallback = Box<dyn Fn(&TaskResult) + Send>;

/// Collects results from parallel workers into a single drain point.
pub struct ResultAggregator {
    tx: Sender<TaskResult>,
    rx: Receiver<TaskResult>,
    stats: Mutex<AggregatorStats>,
    callbacks: Mutex<Vec<ResultCallback>>,
}

impl ResultAggregator {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self {
            tx,
            rx,
            stats: Mutex::new(AggregatorStats::default()),
            callbacks: Mutex::new(Vec::new()),
        }
    }

    /// Submit a result. Callable from any worker thread.
    pub fn submit(&self, result: TaskResult) {
        self.stats.lock().unwrap().results_received += 1;
        // Receiver lives as long as self, so this cannot fail
        let _ = self.tx.send(result);
    }

    /// Sender end for wiring workers directly to the aggregator.
    pub fn sender(&self) -> Sender<TaskResult> {
        self.tx.clone()
    }

    /// Drain everything currently available. Waits up to `timeout` for
    /// the first result, then takes whatever is queued.
    pub fn drain(&self, timeout: Duration) -> Vec<TaskResult> {
        let mut results = Vec::new();

        if let Ok(first) = self.rx.recv_timeout(timeout) {
            self.process(&first);
            results.push(first);
            while let Ok(next) = self.rx.try_recv() {
                self.process(&next);
                results.push(next);
            }
        }

        results
    }

    /// Drain exactly `count` results, blocking until available or the
    /// deadline passes.
    pub fn drain_blocking(&self, count: usize, timeout: Duration) -> Vec<TaskResult> {
        let deadline = Instant::now() + timeout;
        let mut results = Vec::with_capacity(count);

        while results.len() < count {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            match self.rx.recv_timeout(deadline - now) {
                Ok(result) => {
                    self.process(&result);
                    results.push(result);
                }
                Err(_) => break,
            }
        }

        results
    }

    /// Collect results for specific task ids, blocking until all are
    /// seen or the deadline passes. Unrelated results are processed
    /// and dropped.
    pub fn collect_by_task_ids(
        &self,
        task_ids: &[String],
        timeout: Duration,
    ) -> HashMap<String, TaskResult> {
        let deadline = Instant::now() + timeout;
        let mut remaining: std::collections::HashSet<&str> =
            task_ids.iter().map(|s| s.as_str()).collect();
        let mut collected = HashMap::new();

        while !remaining.is_empty() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            match self.rx.recv_timeout(deadline - now) {
                Ok(result) => {
                    self.process(&result);
                    if remaining.remove(result.task_id.as_str()) {
                        collected.insert(result.task_id.clone(), result);
                    }
                }
                Err(_) => break,
            }
        }

        collected
    }

    /// Register an observer invoked for each drained result.
    /// Observers must not block; they run on the drain path.
    pub fn add_callback(&self, callback: impl Fn(&TaskResult) + Send + 'static) {
        self.callbacks.lock().unwrap().push(Box::new(callback));
    }

    pub fn pending_count(&self) -> usize {
        self.rx.len()
    }

    pub fn stats(&self) -> AggregatorStats {
        self.stats.lock().unwrap().clone()
    }

    /// Discard everything queued. Returns the number cleared.
    pub fn clear(&self) -> usize {
        let mut cleared = 0;
        while self.rx.try_recv().is_ok() {
            cleared += 1;
        }
        cleared
    }

    fn process(&self, result: &TaskResult) {
        self.stats.lock().unwrap().results_processed += 1;
        let callbacks = self.callbacks.lock().unwrap();
        for callback in callbacks.iter() {
            callback(result);
        }
    }
}

impl Default for ResultAggregator {
    fn default() -> Self {
        Self::new()
    }
}

type WriteFn = Box<dyn Fn(&[TaskResult]) + Send>;

/// The one permitted writer: a dedicated thread that batches drained
/// results by count or interval and hands each batch to `write_fn`.
pub struct BatchWriter {
    tx: Sender<TaskResult>,
    shutdown: Arc<AtomicBool>,
    thread: Mutex<Option<JoinHandle<()>>>,
    stats: Arc<Mutex<AggregatorStats>>,
}

impl BatchWriter {
    pub fn start(write_fn: WriteFn, batch_size: usize, flush_interval: Duration) -> Self {
        let (tx, rx) = unbounded::<TaskResult>();
        let shutdown = Arc::new(AtomicBool::new(false));
        let stats = Arc::new(Mutex::new(AggregatorStats::default()));

        let thread = {
            let shutdown = Arc::clone(&shutdown);
            let stats = Arc::clone(&stats);
            std::thread::Builder::new()
                .name("babel-batch-writer".to_string())
                .spawn(move || {
                    writer_loop(rx, write_fn, batch_size, flush_interval, shutdown, stats)
                })
                .expect("failed to spawn writer thread")
        };

        Self {
            tx,
            shutdown,
            thread: Mutex::new(Some(thread)),
            stats,
        }
    }

    /// Queue a result for batched writing. Callable from any thread.
    pub fn submit(&self, result: TaskResult) {
        self.stats.lock().unwrap().results_received += 1;
        let _ = self.tx.send(result);
    }

    pub fn stats(&self) -> AggregatorStats {
        self.stats.lock().unwrap().clone()
    }

    /// Stop the writer thread, flushing everything still queued.
    pub fn stop(&self, timeout: Duration) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.thread.lock().unwrap().take() {
            let deadline = Instant::now() + timeout;
            while !handle.is_finished() && Instant::now() < deadline {
                std::thread::sleep(Duration::from_millis(10));
            }
            if handle.is_finished() {
                let _ = handle.join();
            }
        }
    }
}

fn writer_loop(
    rx: Receiver<TaskResult>,
    write_fn: WriteFn,
    batch_size: usize,
    flush_interval: Duration,
    shutdown: Arc<AtomicBool>,
    stats: Arc<Mutex<AggregatorStats>>,
) {
    let mut buffer: Vec<TaskResult> = Vec::new();
    let mut last_flush = Instant::now();

    let flush = |buffer: &mut Vec<TaskResult>, last_flush: &mut Instant| {
        if buffer.is_empty() {
            return;
        }
        write_fn(buffer);
        stats.lock().unwrap().batches_committed += 1;
        debug!(batch = buffer.len(), "writer batch committed");
        buffer.clear();
        *last_flush = Instant::now();
    };

    while !shutdown.load(Ordering::SeqCst) {
        if let Ok(result) = rx.recv_timeout(Duration::from_millis(100)) {
            stats.lock().unwrap().results_processed += 1;
            buffer.push(result);
        }

        let should_flush = buffer.len() >= batch_size
            || (!buffer.is_empty() && last_flush.elapsed() >= flush_interval);
        if should_flush {
            flush(&mut buffer, &mut last_flush);
        }
    }

    // Final drain and flush on shutdown
    while let Ok(result) = rx.try_recv() {
        stats.lock().unwrap().results_processed += 1;
        buffer.push(result);
    }
    flush(&mut buffer, &mut last_flush);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskStatus;
    use serde_json::json;

    fn result(id: &str) -> TaskResult {
        TaskResult::completed(id, json!(null), chrono::Utc::now())
    }

    #[test]
    fn test_submit_and_drain() {
        let aggregator = ResultAggregator::new();
        aggregator.submit(result("a"));
        aggregator.submit(result("b"));

        let drained = aggregator.drain(Duration::from_millis(100));
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].task_id, "a");
        assert_eq!(drained[1].task_id, "b");
    }

    #[test]
    fn test_drain_preserves_arrival_order() {
        let aggregator = ResultAggregator::new();
        for n in 0..10 {
            aggregator.submit(result(&format!("t{}", n)));
        }
        let drained = aggregator.drain(Duration::from_millis(50));
        let ids: Vec<_> = drained.iter().map(|r| r.task_id.clone()).collect();
        let expected: Vec<_> = (0..10).map(|n| format!("t{}", n)).collect();
        assert_eq!(ids, expected);
    }

    #[test]
    fn test_collect_by_task_ids() {
        let aggregator = ResultAggregator::new();
        aggregator.submit(result("keep"));
        aggregator.submit(result("ignore"));

        let collected = aggregator
            .collect_by_task_ids(&["keep".to_string()], Duration::from_millis(100));
        assert_eq!(collected.len(), 1);
        assert!(collected.contains_key("keep"));
    }

    #[test]
    fn test_callbacks_invoked_on_drain() {
        let aggregator = ResultAggregator::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        {
            let seen = Arc::clone(&seen);
            aggregator.add_callback(move |r| seen.lock().unwrap().push(r.task_id.clone()));
        }

        aggregator.submit(result("x"));
        aggregator.drain(Duration::from_millis(50));
        assert_eq!(seen.lock().unwrap().as_slice(), &["x".to_string()]);
    }

    #[test]
    fn test_batch_writer_single_writer_batches() {
        let written: Arc<Mutex<Vec<Vec<String>>>> = Arc::new(Mutex::new(Vec::new()));
        let writer = {
            let written = Arc::clone(&written);
            BatchWriter::start(
                Box::new(move |batch| {
                    written
                        .lock()
                        .unwrap()
                        .push(batch.iter().map(|r| r.task_id.clone()).collect());
                }),
                3,
                Duration::from_millis(50),
            )
        };

        for n in 0..7 {
            writer.submit(result(&format!("r{}", n)));
        }
        writer.stop(Duration::from_secs(2));

        let written = written.lock().unwrap();
        let flat: Vec<String> = written.iter().flatten().cloned().collect();
        let expected: Vec<String> = (0..7).map(|n| format!("r{}", n)).collect();
        // Every result written exactly once, in arrival order
        assert_eq!(flat, expected);
        // And batching actually happened
        assert!(written.len() >= 2);

        let stats = writer.stats();
        assert_eq!(stats.results_received, 7);
        assert_eq!(stats.results_processed, 7);
    }

    #[test]
    fn test_clear_discards_pending() {
        let aggregator = ResultAggregator::new();
        aggregator.submit(TaskResult {
            task_id: "z".into(),
            status: TaskStatus::Completed,
            result: None,
            error: None,
            started_at: None,
            completed_at: None,
            duration_ms: None,
            attempt: 1,
        });
        assert_eq!(aggregator.clear(), 1);
        assert_eq!(aggregator.pending_count(), 0);
    }
}
