use chrono::{DateTime, Utc};
use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::scope::Scope;

// NOTE: Event Schema Goals
//
// 1. Append-only history: once written, the tuple
//    (id, type, data, created_at, scope, parent_ids) never changes.
//    Corrections are new events; deprecation is a status transition in
//    the derived graph, never an edit here.
//
// 2. Content addressing: ids derive from (timestamp, type, payload hash)
//    so two writers producing the same event agree on its identity, and
//    a conflicting reuse of an id is detectable at sync time.
//
// 3. Forward compatibility: unknown event types round-trip verbatim.
//    A newer client's journal must survive being read by an older one.

/// Discriminator for event records.
///
/// The wire form is the SCREAMING_SNAKE tag; tags this build does not
/// know collapse into `Unknown` carrying the original string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventType {
    ProjectCreated,
    PurposeDeclared,
    Captured,
    StructureProposed,
    ArtifactConfirmed,
    QuestionRaised,
    QuestionResolved,
    ChallengeRaised,
    Endorsed,
    EvidenceAttached,
    Deprecated,
    LinkCreated,
    CommitCaptured,
    Unknown(String),
}

impl EventType {
    pub fn as_str(&self) -> &str {
        match self {
            EventType::ProjectCreated => "PROJECT_CREATED",
            EventType::PurposeDeclared => "PURPOSE_DECLARED",
            EventType::Captured => "CAPTURED",
            EventType::StructureProposed => "STRUCTURE_PROPOSED",
            EventType::ArtifactConfirmed => "ARTIFACT_CONFIRMED",
            EventType::QuestionRaised => "QUESTION_RAISED",
            EventType::QuestionResolved => "QUESTION_RESOLVED",
            EventType::ChallengeRaised => "CHALLENGE_RAISED",
            EventType::Endorsed => "ENDORSED",
            EventType::EvidenceAttached => "EVIDENCE_ATTACHED",
            EventType::Deprecated => "DEPRECATED",
            EventType::LinkCreated => "LINK_CREATED",
            EventType::CommitCaptured => "COMMIT_CAPTURED",
            EventType::Unknown(tag) => tag.as_str(),
        }
    }

    pub fn parse(tag: &str) -> EventType {
        match tag {
            "PROJECT_CREATED" => EventType::ProjectCreated,
            "PURPOSE_DECLARED" => EventType::PurposeDeclared,
            "CAPTURED" => EventType::Captured,
            "STRUCTURE_PROPOSED" => EventType::StructureProposed,
            "ARTIFACT_CONFIRMED" => EventType::ArtifactConfirmed,
            "QUESTION_RAISED" => EventType::QuestionRaised,
            "QUESTION_RESOLVED" => EventType::QuestionResolved,
            "CHALLENGE_RAISED" => EventType::ChallengeRaised,
            "ENDORSED" => EventType::Endorsed,
            "EVIDENCE_ATTACHED" => EventType::EvidenceAttached,
            "DEPRECATED" => EventType::Deprecated,
            "LINK_CREATED" => EventType::LinkCreated,
            "COMMIT_CAPTURED" => EventType::CommitCaptured,
            other => EventType::Unknown(other.to_string()),
        }
    }
}

impl Serialize for EventType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EventType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tag = String::deserialize(deserializer)?;
        Ok(EventType::parse(&tag))
    }
}

/// One immutable record in a journal.
///
/// Maps 1:1 to one JSON line on disk. `data` is kept as raw JSON here;
/// the typed view lives in [`crate::EventPayload`], decoded on demand so
/// that unknown payload shapes are preserved byte-for-byte.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Content-addressed short hash, stable across machines
    pub id: String,

    /// Event discriminator
    #[serde(rename = "type")]
    pub event_type: EventType,

    /// Opaque payload; shape is selected by `event_type`
    pub data: Value,

    /// Creation timestamp (UTC, RFC3339 on disk)
    pub created_at: DateTime<Utc>,

    /// Which journal this event belongs to
    pub scope: Scope,

    /// Causal context: ids of events this one builds on
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parent_ids: Vec<String>,
}

impl Event {
    /// Build a new event, deriving the content-addressed id.
    pub fn new(event_type: EventType, data: Value, scope: Scope) -> Self {
        let created_at = Utc::now();
        let id = crate::util::event_id(&created_at, &event_type, &data);
        Self {
            id,
            event_type,
            data,
            created_at,
            scope,
            parent_ids: Vec::new(),
        }
    }

    /// Build a new event with explicit causal parents.
    pub fn with_parents(
        event_type: EventType,
        data: Value,
        scope: Scope,
        parent_ids: Vec<String>,
    ) -> Self {
        let mut event = Self::new(event_type, data, scope);
        event.parent_ids = parent_ids;
        event
    }

    /// Decode the typed payload view of `data`.
    pub fn payload(&self) -> crate::EventPayload {
        crate::EventPayload::decode(&self.event_type, &self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_round_trip() {
        let known = EventType::ArtifactConfirmed;
        let json = serde_json::to_string(&known).unwrap();
        assert_eq!(json, "\"ARTIFACT_CONFIRMED\"");
        let back: EventType = serde_json::from_str(&json).unwrap();
        assert_eq!(back, known);
    }

    #[test]
    fn test_unknown_event_type_preserved() {
        let back: EventType = serde_json::from_str("\"FUTURE_THING\"").unwrap();
        assert_eq!(back, EventType::Unknown("FUTURE_THING".to_string()));
        assert_eq!(serde_json::to_string(&back).unwrap(), "\"FUTURE_THING\"");
    }

    #[test]
    fn test_event_serialization() {
        let event = Event::new(
            EventType::Captured,
            serde_json::json!({"text": "we chose sqlite"}),
            Scope::Shared,
        );

        let json = serde_json::to_string(&event).unwrap();
        let back: Event = serde_json::from_str(&json).unwrap();

        assert_eq!(back.id, event.id);
        assert_eq!(back.event_type, EventType::Captured);
        assert_eq!(back.scope, Scope::Shared);
        assert_eq!(back.data["text"], "we chose sqlite");
    }

    #[test]
    fn test_event_id_is_content_addressed() {
        let data = serde_json::json!({"text": "same"});
        let a = Event::new(EventType::Captured, data.clone(), Scope::Shared);
        // Same payload at a different instant yields a different id
        let b = Event::new(EventType::Captured, data, Scope::Shared);
        assert_eq!(a.id.len(), 8);
        assert!(a.id.chars().all(|c| c.is_ascii_hexdigit()));
        // ids may collide only if created_at matches to the nanosecond
        if a.created_at != b.created_at {
            assert_ne!(a.id, b.id);
        }
    }
}
