use std::collections::BTreeMap;

use serde::Serialize;

use babel_types::Event;

/// One ranked hit from a `why` query.
#[derive(Debug)]
pub struct WhyMatch {
    pub event: Event,
    pub score: f64,
}

/// Result of a `why` query: ranked events within the token budget.
#[derive(Debug)]
pub struct WhyResult {
    pub matches: Vec<WhyMatch>,
    /// False when the budget cut hydration short
    pub complete: bool,
}

/// Snapshot of the project's reasoning state.
#[derive(Debug, Default, Serialize)]
pub struct StatusReport {
    /// Active purpose summary, if declared
    pub purpose: Option<String>,
    /// Node counts by type (active and otherwise)
    pub nodes_by_type: BTreeMap<String, usize>,
    pub open_questions: usize,
    pub open_tensions: usize,
    pub deprecated: usize,
    pub event_count: usize,
}
