use anyhow::Result;
use tracing::{debug, warn};

use crate::projector::{GraphProjector, payload_fingerprint};
use babel_core::EventLog;

/// What a sync pass over the shared journal found.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    /// Events newly projected this pass
    pub replayed: usize,
    /// Known ids replayed with identical payloads (skipped)
    pub duplicates: usize,
    /// Known ids replayed with conflicting payloads (quarantined)
    pub conflicts: Vec<String>,
}

/// Re-read a journal after a third-party merge and fold whatever is new
/// into the projector.
///
/// A known id with an identical payload is a benign duplicate. A known
/// id with a different payload is never overwritten: it becomes a
/// tension node and the original projection stands.
pub fn sync_journal(log: &EventLog, projector: &mut GraphProjector) -> Result<SyncOutcome> {
    let mut outcome = SyncOutcome::default();

    for event in log.stream()? {
        let event = event?;

        if projector.has_applied(&event.id) {
            let incoming = payload_fingerprint(&event);
            match projector.applied_fingerprint(&event.id) {
                Some(existing) if existing == incoming => {
                    outcome.duplicates += 1;
                }
                _ => {
                    warn!(id = %event.id, "conflicting duplicate id in journal");
                    let description = format!(
                        "conflicting event id {} arrived via merge with a different payload",
                        event.id
                    );
                    let tension_id = projector.quarantine(&event.id, description);
                    outcome.conflicts.push(tension_id);
                }
            }
            continue;
        }

        projector.project(&event);
        outcome.replayed += 1;
    }

    debug!(
        replayed = outcome.replayed,
        duplicates = outcome.duplicates,
        conflicts = outcome.conflicts.len(),
        "sync pass complete"
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use babel_types::{Event, EventType, NodeType, Scope};
    use serde_json::json;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_sync_replays_new_events() {
        let temp = TempDir::new().unwrap();
        let log = babel_core::EventLog::open(temp.path().join("events.jsonl"), Scope::Shared)
            .unwrap();
        log.append(&Event::new(
            EventType::PurposeDeclared,
            json!({"what": "preserve intent"}),
            Scope::Shared,
        ))
        .unwrap();

        let mut projector = GraphProjector::new();
        let outcome = sync_journal(&log, &mut projector).unwrap();

        assert_eq!(outcome.replayed, 1);
        assert!(outcome.conflicts.is_empty());
        assert_eq!(projector.graph().node_count(), 1);
    }

    #[test]
    fn test_sync_skips_identical_duplicates() {
        let temp = TempDir::new().unwrap();
        let log = babel_core::EventLog::open(temp.path().join("events.jsonl"), Scope::Shared)
            .unwrap();
        log.append(&Event::new(
            EventType::QuestionRaised,
            json!({"question": "why dual scope?"}),
            Scope::Shared,
        ))
        .unwrap();

        let mut projector = GraphProjector::new();
        sync_journal(&log, &mut projector).unwrap();
        let outcome = sync_journal(&log, &mut projector).unwrap();

        assert_eq!(outcome.replayed, 0);
        assert_eq!(outcome.duplicates, 1);
        assert!(outcome.conflicts.is_empty());
    }

    #[test]
    fn test_sync_quarantines_conflicting_payload() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("events.jsonl");
        let log = babel_core::EventLog::open(&path, Scope::Shared).unwrap();

        let event = Event::new(
            EventType::QuestionRaised,
            json!({"question": "original"}),
            Scope::Shared,
        );
        log.append(&event).unwrap();

        let mut projector = GraphProjector::new();
        sync_journal(&log, &mut projector).unwrap();

        // A third-party merge smuggles in the same id with new data
        let mut tampered = event.clone();
        tampered.data = json!({"question": "tampered"});
        let line = serde_json::to_string(&tampered).unwrap();
        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .unwrap();
        writeln!(file, "{}", line).unwrap();

        let reopened = babel_core::EventLog::open(&path, Scope::Shared).unwrap();
        let outcome = sync_journal(&reopened, &mut projector).unwrap();

        assert_eq!(outcome.conflicts.len(), 1);
        let tension = projector.graph().get_node(&outcome.conflicts[0]).unwrap();
        assert_eq!(tension.node_type, NodeType::Tension);
        // Original projection stands
        let question_id = format!("question_{}", event.id);
        let question = projector.graph().get_node(&question_id).unwrap();
        assert_eq!(question.content.summary, "original");
    }
}
