use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::event::EventType;
use crate::graph::NodeType;

/// Kinds of confirmable artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactType {
    Decision,
    Constraint,
    Principle,
    Requirement,
}

impl ArtifactType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactType::Decision => "decision",
            ArtifactType::Constraint => "constraint",
            ArtifactType::Principle => "principle",
            ArtifactType::Requirement => "requirement",
        }
    }

    pub fn node_type(&self) -> NodeType {
        match self {
            ArtifactType::Decision => NodeType::Decision,
            ArtifactType::Constraint => NodeType::Constraint,
            ArtifactType::Principle => NodeType::Principle,
            ArtifactType::Requirement => NodeType::Requirement,
        }
    }
}

/// Structured content of an artifact payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArtifactContent {
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub what: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub why: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
}

/// Typed view of an event's `data` field.
///
/// Decoding is forgiving by design: a payload that does not match its
/// expected shape, or an event type this build does not know, becomes
/// `Unknown` with the raw value intact. Projection skips what it cannot
/// read instead of failing a replay.
#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    ProjectCreated {
        need: String,
    },
    PurposeDeclared {
        what: String,
        why: Option<String>,
    },
    Captured {
        text: String,
    },
    StructureProposed {
        artifact_type: ArtifactType,
        content: ArtifactContent,
        confidence: f64,
        rationale: String,
        source_id: Option<String>,
    },
    ArtifactConfirmed {
        proposal_id: String,
        artifact_type: ArtifactType,
        content: ArtifactContent,
        purpose_id: Option<String>,
    },
    QuestionRaised {
        question: String,
    },
    QuestionResolved {
        question_id: String,
        resolution: String,
    },
    ChallengeRaised {
        target_id: String,
        challenge: String,
    },
    Endorsed {
        artifact_id: String,
    },
    EvidenceAttached {
        artifact_id: String,
        evidence: String,
    },
    Deprecated {
        target_id: String,
        reason: Option<String>,
    },
    LinkCreated {
        source_id: String,
        target_id: String,
        relation: String,
    },
    CommitCaptured {
        commit_hash: String,
        message: String,
        artifact_ids: Vec<String>,
    },
    Unknown {
        raw: Value,
    },
}

// Serde mirror structs for the payload shapes. Kept private; the public
// surface is the enum plus `decode`.

#[derive(Deserialize)]
struct ProjectCreatedData {
    need: String,
}

#[derive(Deserialize)]
struct PurposeDeclaredData {
    what: String,
    #[serde(default)]
    why: Option<String>,
}

#[derive(Deserialize)]
struct CapturedData {
    text: String,
}

#[derive(Deserialize)]
struct StructureProposedData {
    artifact_type: ArtifactType,
    content: ArtifactContent,
    #[serde(default)]
    confidence: f64,
    #[serde(default)]
    rationale: String,
    #[serde(default)]
    source_id: Option<String>,
}

#[derive(Deserialize)]
struct ArtifactConfirmedData {
    proposal_id: String,
    artifact_type: ArtifactType,
    content: ArtifactContent,
    #[serde(default)]
    purpose_id: Option<String>,
}

#[derive(Deserialize)]
struct QuestionRaisedData {
    question: String,
}

#[derive(Deserialize)]
struct QuestionResolvedData {
    question_id: String,
    resolution: String,
}

#[derive(Deserialize)]
struct ChallengeRaisedData {
    target_id: String,
    challenge: String,
}

#[derive(Deserialize)]
struct EndorsedData {
    artifact_id: String,
}

#[derive(Deserialize)]
struct EvidenceAttachedData {
    artifact_id: String,
    evidence: String,
}

#[derive(Deserialize)]
struct DeprecatedData {
    target_id: String,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Deserialize)]
struct LinkCreatedData {
    source_id: String,
    target_id: String,
    relation: String,
}

#[derive(Deserialize)]
struct CommitCapturedData {
    commit_hash: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    artifact_ids: Vec<String>,
}

impl EventPayload {
    /// Decode a raw `data` value against its event type.
    pub fn decode(event_type: &EventType, data: &Value) -> EventPayload {
        fn parse<T: serde::de::DeserializeOwned>(data: &Value) -> Option<T> {
            serde_json::from_value(data.clone()).ok()
        }

        let unknown = || EventPayload::Unknown { raw: data.clone() };

        match event_type {
            EventType::ProjectCreated => parse::<ProjectCreatedData>(data)
                .map(|d| EventPayload::ProjectCreated { need: d.need })
                .unwrap_or_else(unknown),
            EventType::PurposeDeclared => parse::<PurposeDeclaredData>(data)
                .map(|d| EventPayload::PurposeDeclared {
                    what: d.what,
                    why: d.why,
                })
                .unwrap_or_else(unknown),
            EventType::Captured => parse::<CapturedData>(data)
                .map(|d| EventPayload::Captured { text: d.text })
                .unwrap_or_else(unknown),
            EventType::StructureProposed => parse::<StructureProposedData>(data)
                .map(|d| EventPayload::StructureProposed {
                    artifact_type: d.artifact_type,
                    content: d.content,
                    confidence: d.confidence,
                    rationale: d.rationale,
                    source_id: d.source_id,
                })
                .unwrap_or_else(unknown),
            EventType::ArtifactConfirmed => parse::<ArtifactConfirmedData>(data)
                .map(|d| EventPayload::ArtifactConfirmed {
                    proposal_id: d.proposal_id,
                    artifact_type: d.artifact_type,
                    content: d.content,
                    purpose_id: d.purpose_id,
                })
                .unwrap_or_else(unknown),
            EventType::QuestionRaised => parse::<QuestionRaisedData>(data)
                .map(|d| EventPayload::QuestionRaised {
                    question: d.question,
                })
                .unwrap_or_else(unknown),
            EventType::QuestionResolved => parse::<QuestionResolvedData>(data)
                .map(|d| EventPayload::QuestionResolved {
                    question_id: d.question_id,
                    resolution: d.resolution,
                })
                .unwrap_or_else(unknown),
            EventType::ChallengeRaised => parse::<ChallengeRaisedData>(data)
                .map(|d| EventPayload::ChallengeRaised {
                    target_id: d.target_id,
                    challenge: d.challenge,
                })
                .unwrap_or_else(unknown),
            EventType::Endorsed => parse::<EndorsedData>(data)
                .map(|d| EventPayload::Endorsed {
                    artifact_id: d.artifact_id,
                })
                .unwrap_or_else(unknown),
            EventType::EvidenceAttached => parse::<EvidenceAttachedData>(data)
                .map(|d| EventPayload::EvidenceAttached {
                    artifact_id: d.artifact_id,
                    evidence: d.evidence,
                })
                .unwrap_or_else(unknown),
            EventType::Deprecated => parse::<DeprecatedData>(data)
                .map(|d| EventPayload::Deprecated {
                    target_id: d.target_id,
                    reason: d.reason,
                })
                .unwrap_or_else(unknown),
            EventType::LinkCreated => parse::<LinkCreatedData>(data)
                .map(|d| EventPayload::LinkCreated {
                    source_id: d.source_id,
                    target_id: d.target_id,
                    relation: d.relation,
                })
                .unwrap_or_else(unknown),
            EventType::CommitCaptured => parse::<CommitCapturedData>(data)
                .map(|d| EventPayload::CommitCaptured {
                    commit_hash: d.commit_hash,
                    message: d.message,
                    artifact_ids: d.artifact_ids,
                })
                .unwrap_or_else(unknown),
            EventType::Unknown(_) => unknown(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_purpose() {
        let payload = EventPayload::decode(
            &EventType::PurposeDeclared,
            &json!({"what": "preserve intent", "why": "answer why later"}),
        );
        match payload {
            EventPayload::PurposeDeclared { what, why } => {
                assert_eq!(what, "preserve intent");
                assert_eq!(why.as_deref(), Some("answer why later"));
            }
            other => panic!("wrong payload: {:?}", other),
        }
    }

    #[test]
    fn test_malformed_payload_degrades_to_unknown() {
        let raw = json!({"unexpected": true});
        let payload = EventPayload::decode(&EventType::PurposeDeclared, &raw);
        assert_eq!(payload, EventPayload::Unknown { raw });
    }

    #[test]
    fn test_unknown_type_preserves_raw() {
        let raw = json!({"anything": [1, 2, 3]});
        let payload = EventPayload::decode(&EventType::Unknown("FUTURE".into()), &raw);
        assert_eq!(payload, EventPayload::Unknown { raw });
    }
}
