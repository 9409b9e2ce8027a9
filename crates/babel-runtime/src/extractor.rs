use std::path::PathBuf;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::Result;
use babel_types::{ArtifactContent, ArtifactType, Proposal};

/// Summary of an existing artifact, injected into extraction context
/// so the extractor can avoid proposing duplicates.
#[derive(Debug, Clone)]
pub struct ExistingArtifact {
    pub artifact_id: String,
    pub artifact_type: ArtifactType,
    pub summary: String,
}

/// The extraction contract: turn captured text into artifact
/// proposals. Extractors propose; they never write to the log.
pub trait Extractor {
    fn extract(
        &self,
        text: &str,
        source_id: &str,
        existing: &[ExistingArtifact],
    ) -> Vec<Proposal>;
}

/// Keyword-heuristic extractor: the degraded-mode fallback when no LLM
/// is reachable, and the deterministic workhorse for tests.
#[derive(Debug, Default)]
pub struct MockExtractor;

impl MockExtractor {
    pub fn new() -> Self {
        Self
    }
}

const DECISION_MARKERS: &[&str] = &["decided", "we chose", "we'll use", "going with", "use "];
const CONSTRAINT_MARKERS: &[&str] = &["must", "cannot", "never", "only", "required"];
const PRINCIPLE_MARKERS: &[&str] = &["always", "prefer", "by default", "principle"];

impl Extractor for MockExtractor {
    fn extract(
        &self,
        text: &str,
        source_id: &str,
        existing: &[ExistingArtifact],
    ) -> Vec<Proposal> {
        let lower = text.to_lowercase();

        let artifact_type = if DECISION_MARKERS.iter().any(|m| lower.contains(m)) {
            ArtifactType::Decision
        } else if CONSTRAINT_MARKERS.iter().any(|m| lower.contains(m)) {
            ArtifactType::Constraint
        } else if PRINCIPLE_MARKERS.iter().any(|m| lower.contains(m)) {
            ArtifactType::Principle
        } else {
            return Vec::new();
        };

        let summary: String = text.trim().chars().take(120).collect();

        // Skip near-duplicates of what the graph already holds
        let summary_lower = summary.to_lowercase();
        if existing
            .iter()
            .any(|artifact| artifact.summary.to_lowercase() == summary_lower)
        {
            return Vec::new();
        }

        vec![Proposal {
            source_id: source_id.to_string(),
            artifact_type,
            content: ArtifactContent {
                summary,
                what: None,
                why: None,
                domain: None,
            },
            confidence: 0.4,
            rationale: "keyword heuristic (offline mode)".to_string(),
        }]
    }
}

/// One extraction request waiting for a reachable host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedExtraction {
    pub text: String,
    pub source_id: String,
    pub queued_at: String,
}

/// Persistent queue of extraction requests for offline operation.
///
/// Deliberately not append-only: this is a work queue, not history.
/// Drained entries are gone.
#[derive(Debug)]
pub struct OfflineQueue {
    path: PathBuf,
    entries: Vec<QueuedExtraction>,
}

impl OfflineQueue {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            serde_json::from_str(&content)?
        } else {
            Vec::new()
        };
        Ok(Self { path, entries })
    }

    pub fn enqueue(&mut self, text: impl Into<String>, source_id: impl Into<String>) -> Result<()> {
        self.entries.push(QueuedExtraction {
            text: text.into(),
            source_id: source_id.into(),
            queued_at: Utc::now().to_rfc3339(),
        });
        self.save()
    }

    /// Take everything queued, leaving the queue empty on disk.
    pub fn drain(&mut self) -> Result<Vec<QueuedExtraction>> {
        let drained = std::mem::take(&mut self.entries);
        self.save()?;
        Ok(drained)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(&self.entries)?;
        std::fs::write(&self.path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_mock_extractor_classifies() {
        let extractor = MockExtractor::new();
        let proposals = extractor.extract("We decided to use sqlite", "ev1", &[]);
        assert_eq!(proposals.len(), 1);
        assert_eq!(proposals[0].artifact_type, ArtifactType::Decision);
        assert_eq!(proposals[0].source_id, "ev1");

        let proposals = extractor.extract("Events must never be mutated", "ev2", &[]);
        assert_eq!(proposals[0].artifact_type, ArtifactType::Constraint);

        let proposals = extractor.extract("random chatter", "ev3", &[]);
        assert!(proposals.is_empty());
    }

    #[test]
    fn test_mock_extractor_skips_duplicates() {
        let extractor = MockExtractor::new();
        let existing = vec![ExistingArtifact {
            artifact_id: "decision_x".into(),
            artifact_type: ArtifactType::Decision,
            summary: "We decided to use sqlite".into(),
        }];
        let proposals = extractor.extract("We decided to use sqlite", "ev1", &existing);
        assert!(proposals.is_empty());
    }

    #[test]
    fn test_offline_queue_persists_and_drains() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("extraction_queue.json");

        {
            let mut queue = OfflineQueue::open(&path).unwrap();
            queue.enqueue("captured while offline", "ev9").unwrap();
            assert_eq!(queue.len(), 1);
        }

        let mut reopened = OfflineQueue::open(&path).unwrap();
        assert_eq!(reopened.len(), 1);

        let drained = reopened.drain().unwrap();
        assert_eq!(drained[0].source_id, "ev9");
        assert!(reopened.is_empty());

        // Drain is durable
        let after = OfflineQueue::open(&path).unwrap();
        assert!(after.is_empty());
    }
}
