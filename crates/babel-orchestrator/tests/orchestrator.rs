use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use babel_orchestrator::{
    BatchWriter, OrchestratorConfig, Priority, PriorityScheduler, Scheduled, TaskKind,
    TaskOrchestrator, cpu_task, io_task,
};
use serde_json::{Value, json};

fn orchestrator_with(io_workers: usize, llm_concurrent: usize) -> TaskOrchestrator {
    TaskOrchestrator::new(OrchestratorConfig {
        enabled: true,
        io_workers,
        cpu_workers: 2,
        llm_concurrent,
        llm_rate_limit: 100.0,
        ..OrchestratorConfig::default()
    })
    .unwrap()
}

#[derive(Debug)]
struct Labeled(&'static str, Priority);

impl Scheduled for Labeled {
    fn priority(&self) -> Priority {
        self.1
    }
}

#[test]
fn test_priority_queue_drains_in_strict_order() {
    let scheduler = PriorityScheduler::new();
    scheduler.submit(Labeled("bg-1", Priority::Background)).unwrap();
    scheduler.submit(Labeled("n-1", Priority::Normal)).unwrap();
    scheduler.submit(Labeled("c-1", Priority::Critical)).unwrap();
    scheduler.submit(Labeled("h-1", Priority::High)).unwrap();
    scheduler.submit(Labeled("c-2", Priority::Critical)).unwrap();
    scheduler.submit(Labeled("n-2", Priority::Normal)).unwrap();

    let drained: Vec<&str> = std::iter::from_fn(|| scheduler.get_nowait())
        .map(|item| item.0)
        .collect();
    assert_eq!(drained, vec!["c-1", "c-2", "h-1", "n-1", "n-2", "bg-1"]);
}

#[test]
fn test_rate_limiter_does_not_delay_plain_io() {
    // One saturated LLM lane, many plain I/O tasks: the I/O tasks must
    // finish on their own clock and never touch the limiter.
    let orch = orchestrator_with(4, 1);

    let slow_llm = orch
        .submit(
            io_task(|| {
                std::thread::sleep(Duration::from_millis(400));
                Ok(json!("llm"))
            })
            .llm_call(true),
        )
        .unwrap();

    let started = Instant::now();
    let io_handles: Vec<_> = (0..12)
        .map(|n| orch.submit(io_task(move || Ok(json!(n)))).unwrap())
        .collect();
    for handle in io_handles {
        assert!(handle.wait().success());
    }
    let io_elapsed = started.elapsed();

    assert!(
        io_elapsed < Duration::from_millis(300),
        "plain I/O stalled behind the LLM lane: {:?}",
        io_elapsed
    );
    assert!(slow_llm.wait().success());
    orch.shutdown(true, false);
}

#[test]
fn test_single_writer_no_interleaving() {
    // Many producers, one writer: the write function must never be
    // reentered, no matter how tasks complete.
    let in_write = Arc::new(AtomicBool::new(false));
    let overlaps = Arc::new(AtomicUsize::new(0));
    let written = Arc::new(AtomicUsize::new(0));

    let writer = {
        let in_write = Arc::clone(&in_write);
        let overlaps = Arc::clone(&overlaps);
        let written = Arc::clone(&written);
        BatchWriter::start(
            Box::new(move |batch| {
                if in_write.swap(true, Ordering::SeqCst) {
                    overlaps.fetch_add(1, Ordering::SeqCst);
                }
                std::thread::sleep(Duration::from_millis(2));
                written.fetch_add(batch.len(), Ordering::SeqCst);
                in_write.store(false, Ordering::SeqCst);
            }),
            4,
            Duration::from_millis(20),
        )
    };

    let orch = orchestrator_with(8, 3);
    let handles: Vec<_> = (0..40)
        .map(|n| orch.submit(io_task(move || Ok(json!(n)))).unwrap())
        .collect();
    for handle in handles {
        let result = handle.wait();
        writer.submit(result);
    }

    writer.stop(Duration::from_secs(5));
    assert_eq!(written.load(Ordering::SeqCst), 40);
    assert_eq!(overlaps.load(Ordering::SeqCst), 0);
    orch.shutdown(true, false);
}

#[test]
fn test_parallel_gather_faster_than_sum_of_parts() {
    // Ten sleeping tasks across four workers should take far less than
    // the serial sum of their durations.
    let orch = orchestrator_with(4, 3);

    let started = Instant::now();
    let handles: Vec<_> = (0..10)
        .map(|_| {
            orch.submit(io_task(|| {
                std::thread::sleep(Duration::from_millis(50));
                Ok(Value::Null)
            }))
            .unwrap()
        })
        .collect();
    for handle in handles {
        assert!(handle.wait().success());
    }
    let elapsed = started.elapsed();

    // Serial would be ~500ms; four workers should land near 150ms
    assert!(
        elapsed < Duration::from_millis(400),
        "no parallel speedup: {:?}",
        elapsed
    );
    orch.shutdown(true, false);
}

#[test]
fn test_degraded_mode_equivalent_output() {
    fn classify(v: Value) -> Result<Value, String> {
        let n = v.as_i64().ok_or("not a number")?;
        Ok(json!(if n % 2 == 0 { "even" } else { "odd" }))
    }

    let items: Vec<Value> = (0..16).map(|n| json!(n)).collect();

    let enabled = orchestrator_with(4, 3);
    let parallel = enabled
        .map_parallel(
            classify,
            items.clone(),
            TaskKind::CpuBound,
            Priority::Normal,
            Duration::from_secs(5),
        )
        .unwrap();
    enabled.shutdown(true, false);

    let disabled = TaskOrchestrator::new(OrchestratorConfig::disabled()).unwrap();
    let sequential = disabled
        .map_parallel(
            classify,
            items,
            TaskKind::CpuBound,
            Priority::Normal,
            Duration::from_secs(5),
        )
        .unwrap();

    assert_eq!(parallel, sequential);
}

#[test]
fn test_timeout_reports_failed_result() {
    let orch = orchestrator_with(1, 3);
    let handle = orch
        .submit(
            io_task(|| {
                std::thread::sleep(Duration::from_millis(500));
                Ok(Value::Null)
            })
            .with_timeout(Duration::from_millis(50)),
        )
        .unwrap();

    let result = handle.wait();
    assert!(result.failed());
    assert!(result.error.unwrap().contains("timed out"));
    orch.shutdown(false, true);
}

#[test]
fn test_shutdown_returns_cancelled_tasks_for_resubmission() {
    let orch = orchestrator_with(1, 3);
    // Occupy the single worker
    let _busy = orch
        .submit(io_task(|| {
            std::thread::sleep(Duration::from_millis(300));
            Ok(Value::Null)
        }))
        .unwrap();
    std::thread::sleep(Duration::from_millis(50));

    for _ in 0..4 {
        orch.submit(io_task(|| Ok(Value::Null))).unwrap();
    }

    let cancelled = orch.shutdown(true, true);
    assert_eq!(cancelled.len(), 4);
    for task in &cancelled {
        assert_eq!(task.meta.kind, TaskKind::IoBound);
    }
}

#[test]
fn test_cpu_tasks_marshal_json_values() {
    fn token_count(v: Value) -> Result<Value, String> {
        let text = v.as_str().ok_or("expected string")?;
        Ok(json!(text.split_whitespace().count()))
    }

    let orch = orchestrator_with(2, 3);
    let handle = orch
        .submit(cpu_task(token_count, json!("one two three")))
        .unwrap();
    let result = handle.wait();
    assert_eq!(result.result.unwrap(), json!(3));
    orch.shutdown(true, false);
}
