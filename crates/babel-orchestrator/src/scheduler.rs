use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::task::Priority;

/// Anything the scheduler can order.
pub trait Scheduled {
    fn priority(&self) -> Priority;
}

/// Scheduler observability snapshot.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SchedulerStats {
    pub total_submitted: u64,
    pub total_processed: u64,
    pub queue_depths: [usize; 4],
}

impl SchedulerStats {
    pub fn pending(&self) -> u64 {
        self.total_submitted - self.total_processed
    }
}

struct SchedulerState<T> {
    queues: [VecDeque<T>; 4],
    shutdown: bool,
    submitted: u64,
    processed: u64,
}

impl<T> SchedulerState<T> {
    fn has_items(&self) -> bool {
        self.queues.iter().any(|q| !q.is_empty())
    }

    fn pop_highest(&mut self) -> Option<T> {
        for queue in self.queues.iter_mut() {
            if let Some(item) = queue.pop_front() {
                self.processed += 1;
                return Some(item);
            }
        }
        None
    }
}

/// Four FIFO queues keyed by priority. Strictly higher priority wins at
/// dispatch time; within a priority, FIFO. All operations are
/// thread-safe; a condition variable wakes waiters on enqueue and on
/// shutdown.
pub struct PriorityScheduler<T: Scheduled> {
    state: Mutex<SchedulerState<T>>,
    not_empty: Condvar,
}

impl<T: Scheduled> PriorityScheduler<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SchedulerState {
                queues: [
                    VecDeque::new(),
                    VecDeque::new(),
                    VecDeque::new(),
                    VecDeque::new(),
                ],
                shutdown: false,
                submitted: 0,
                processed: 0,
            }),
            not_empty: Condvar::new(),
        }
    }

    /// Enqueue one item. Errors after shutdown.
    pub fn submit(&self, item: T) -> Result<(), T> {
        let mut state = self.state.lock().unwrap();
        if state.shutdown {
            return Err(item);
        }
        let index = item.priority().index();
        state.queues[index].push_back(item);
        state.submitted += 1;
        self.not_empty.notify_one();
        Ok(())
    }

    /// Enqueue a batch atomically: every item lands before any waiter
    /// wakes, so relative priority within the batch is respected.
    pub fn submit_batch(&self, items: Vec<T>) -> Result<(), Vec<T>> {
        let mut state = self.state.lock().unwrap();
        if state.shutdown {
            return Err(items);
        }
        for item in items {
            let index = item.priority().index();
            state.queues[index].push_back(item);
            state.submitted += 1;
        }
        self.not_empty.notify_all();
        Ok(())
    }

    /// Take the earliest item from the highest non-empty queue.
    ///
    /// Blocks until an item is available, the timeout expires, or the
    /// scheduler shuts down. `None` means timeout or drained shutdown.
    pub fn get(&self, timeout: Option<Duration>) -> Option<T> {
        let mut state = self.state.lock().unwrap();
        let deadline = timeout.map(|t| Instant::now() + t);

        while !state.has_items() && !state.shutdown {
            match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return None;
                    }
                    let (next, result) = self
                        .not_empty
                        .wait_timeout(state, deadline - now)
                        .unwrap();
                    state = next;
                    if result.timed_out() && !state.has_items() {
                        return None;
                    }
                }
                None => {
                    state = self.not_empty.wait(state).unwrap();
                }
            }
        }

        state.pop_highest()
    }

    /// Take the next item without blocking.
    pub fn get_nowait(&self) -> Option<T> {
        self.state.lock().unwrap().pop_highest()
    }

    /// Inspect the next item in dispatch order without removing it.
    pub fn peek<R>(&self, inspect: impl FnOnce(&T) -> R) -> Option<R> {
        let state = self.state.lock().unwrap();
        state
            .queues
            .iter()
            .find_map(|q| q.front())
            .map(inspect)
    }

    pub fn pending_count(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.queues.iter().map(|q| q.len()).sum()
    }

    pub fn pending_by_priority(&self) -> [usize; 4] {
        let state = self.state.lock().unwrap();
        [
            state.queues[0].len(),
            state.queues[1].len(),
            state.queues[2].len(),
            state.queues[3].len(),
        ]
    }

    pub fn stats(&self) -> SchedulerStats {
        let state = self.state.lock().unwrap();
        SchedulerStats {
            total_submitted: state.submitted,
            total_processed: state.processed,
            queue_depths: [
                state.queues[0].len(),
                state.queues[1].len(),
                state.queues[2].len(),
                state.queues[3].len(),
            ],
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.state.lock().unwrap().shutdown
    }

    /// Stop accepting work and wake all waiters. With `cancel_pending`,
    /// drains and returns the unstarted items.
    pub fn shutdown(&self, cancel_pending: bool) -> Vec<T> {
        let mut state = self.state.lock().unwrap();
        state.shutdown = true;

        let mut cancelled = Vec::new();
        if cancel_pending {
            for queue in state.queues.iter_mut() {
                cancelled.extend(queue.drain(..));
            }
        }

        self.not_empty.notify_all();
        cancelled
    }
}

impl<T: Scheduled> Default for PriorityScheduler<T> {
    fn default() -> Self {
        Self::new()
    }
}
