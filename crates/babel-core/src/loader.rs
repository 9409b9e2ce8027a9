use std::collections::HashSet;

use crate::Result;
use crate::log::DualEventLog;
use babel_types::Event;

/// Advisory token budget for hydration. Estimated at roughly four
/// characters per token; the budget is never exceeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenBudget {
    pub max_tokens: usize,
}

impl TokenBudget {
    pub fn new(max_tokens: usize) -> Self {
        Self { max_tokens }
    }

    /// Estimate the token cost of one event record.
    pub fn cost_of(event: &Event) -> usize {
        let chars = event.data.to_string().len() + event.id.len() + 32;
        chars.div_ceil(4)
    }
}

impl Default for TokenBudget {
    fn default() -> Self {
        // Comfortable default for interactive queries
        Self { max_tokens: 4000 }
    }
}

/// Outcome of a budgeted load.
#[derive(Debug)]
pub struct LoadResult {
    pub events: Vec<Event>,
    /// False when the budget cut hydration short
    pub complete: bool,
    pub tokens_used: usize,
}

/// Hydrates events on demand within a token budget.
///
/// Only what is explicitly requested gets read; the budget bounds how
/// much of the request is honored, in request order.
#[derive(Debug, Default)]
pub struct Loader {
    budget: TokenBudget,
}

impl Loader {
    pub fn new(budget: TokenBudget) -> Self {
        Self { budget }
    }

    pub fn budget(&self) -> TokenBudget {
        self.budget
    }

    /// Load the requested events from both journals, preserving request
    /// order, stopping before the budget would be exceeded.
    pub fn load_events(&self, log: &DualEventLog, ids: &[String]) -> Result<LoadResult> {
        let wanted: HashSet<&str> = ids.iter().map(|s| s.as_str()).collect();

        let mut found: Vec<Event> = Vec::new();
        for event in log.stream_ordered()? {
            if wanted.contains(event.id.as_str()) {
                found.push(event);
            }
        }

        // Preserve request order
        let mut by_request: Vec<Event> = Vec::with_capacity(found.len());
        for id in ids {
            if let Some(pos) = found.iter().position(|e| &e.id == id) {
                by_request.push(found.swap_remove(pos));
            }
        }

        let mut events = Vec::new();
        let mut tokens_used = 0usize;
        let mut complete = true;

        for event in by_request {
            let cost = TokenBudget::cost_of(&event);
            if tokens_used + cost > self.budget.max_tokens {
                complete = false;
                break;
            }
            tokens_used += cost;
            events.push(event);
        }

        Ok(LoadResult {
            events,
            complete,
            tokens_used,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use babel_types::{EventType, Scope};
    use serde_json::json;
    use tempfile::TempDir;

    fn setup(texts: &[&str]) -> (TempDir, DualEventLog, Vec<String>) {
        let temp = TempDir::new().unwrap();
        let log = DualEventLog::open(
            temp.path().join("shared/events.jsonl"),
            temp.path().join("local/events.jsonl"),
        )
        .unwrap();

        let mut ids = Vec::new();
        for text in texts {
            let event = Event::new(EventType::Captured, json!({ "text": text }), Scope::Shared);
            ids.push(log.append(&event).unwrap());
        }
        (temp, log, ids)
    }

    #[test]
    fn test_load_within_budget() {
        let (_temp, log, ids) = setup(&["one", "two", "three"]);
        let loader = Loader::new(TokenBudget::new(10_000));

        let result = loader.load_events(&log, &ids).unwrap();
        assert!(result.complete);
        assert_eq!(result.events.len(), 3);
        // Request order preserved
        let loaded: Vec<_> = result.events.iter().map(|e| e.id.clone()).collect();
        assert_eq!(loaded, ids);
    }

    #[test]
    fn test_budget_never_exceeded() {
        let (_temp, log, ids) = setup(&["aaaa", "bbbb", "cccc", "dddd"]);
        let loader = Loader::new(TokenBudget::new(30));

        let result = loader.load_events(&log, &ids).unwrap();
        assert!(!result.complete);
        assert!(result.events.len() < 4);
        assert!(result.tokens_used <= 30);
    }

    #[test]
    fn test_missing_ids_skipped() {
        let (_temp, log, mut ids) = setup(&["only"]);
        ids.push("ffffffff".to_string());

        let loader = Loader::new(TokenBudget::default());
        let result = loader.load_events(&log, &ids).unwrap();
        assert_eq!(result.events.len(), 1);
        assert!(result.complete);
    }
}
