use std::collections::HashMap;

use sha2::{Digest, Sha256};
use tracing::warn;

use crate::graph::KnowledgeGraph;
use babel_types::{
    Edge, EdgeRelation, Event, EventPayload, Node, NodeContent, NodeStatus, NodeType,
};

// NOTE: Projection as a fold
//
// The graph is fold(events, empty, apply). Rebuild, partial replay and
// sync-merge all reduce to re-running the fold, which is what makes the
// determinism guarantee checkable: same ordered input, same graph.
//
// Integrity violations never raise. A node id claimed by two events
// with incompatible types becomes a tension node and the fold moves on.

/// What one event contributed to the graph.
#[derive(Debug, Default)]
pub struct ProjectionDelta {
    pub nodes_added: Vec<String>,
    pub edges_added: usize,
    pub status_changes: Vec<(String, NodeStatus)>,
}

/// Deterministically folds events into the knowledge graph.
pub struct GraphProjector {
    graph: KnowledgeGraph,
    /// event id -> payload fingerprint, for sync duplicate detection
    applied: HashMap<String, String>,
    /// proposal event id -> proposal node id
    proposals: HashMap<String, String>,
    active_purpose: Option<String>,
}

impl GraphProjector {
    pub fn new() -> Self {
        Self {
            graph: KnowledgeGraph::new(),
            applied: HashMap::new(),
            proposals: HashMap::new(),
            active_purpose: None,
        }
    }

    pub fn graph(&self) -> &KnowledgeGraph {
        &self.graph
    }

    pub fn active_purpose(&self) -> Option<&str> {
        self.active_purpose.as_deref()
    }

    pub fn has_applied(&self, event_id: &str) -> bool {
        self.applied.contains_key(event_id)
    }

    pub fn applied_fingerprint(&self, event_id: &str) -> Option<&str> {
        self.applied.get(event_id).map(|s| s.as_str())
    }

    /// Drop all derived state and replay the given ordered sequence.
    pub fn rebuild<'a>(&mut self, events: impl IntoIterator<Item = &'a Event>) {
        self.graph.clear();
        self.applied.clear();
        self.proposals.clear();
        self.active_purpose = None;
        for event in events {
            self.project(event);
        }
    }

    /// Apply one event. Re-applying an already-applied event id is a
    /// no-op (projection is idempotent per event).
    pub fn project(&mut self, event: &Event) -> ProjectionDelta {
        let mut delta = ProjectionDelta::default();

        if self.applied.contains_key(&event.id) {
            return delta;
        }
        self.applied
            .insert(event.id.clone(), payload_fingerprint(event));

        match event.payload() {
            EventPayload::ProjectCreated { need } => {
                let id = format!("project_{}", event.id);
                self.add_node(
                    &mut delta,
                    Node::new(
                        id,
                        NodeType::Project,
                        NodeContent::summary(need),
                        &event.id,
                        event.scope,
                    ),
                    event,
                );
            }

            EventPayload::PurposeDeclared { what, why } => {
                let id = format!("purpose_{}", event.id);
                let content = NodeContent {
                    summary: what.clone(),
                    what: Some(what),
                    why,
                    domain: None,
                };
                let node = Node::new(
                    id.clone(),
                    NodeType::Purpose,
                    content,
                    &event.id,
                    event.scope,
                );
                if self.add_node(&mut delta, node, event) {
                    self.active_purpose = Some(id);
                }
            }

            EventPayload::Captured { .. } => {
                // Raw capture text lives in the log only; structure
                // arrives later through proposals and confirmations.
            }

            EventPayload::StructureProposed { content, .. } => {
                let id = format!("proposal_{}", event.id);
                let node = Node::new(
                    id.clone(),
                    NodeType::Proposal,
                    NodeContent {
                        summary: content.summary,
                        what: content.what,
                        why: content.why,
                        domain: content.domain,
                    },
                    &event.id,
                    event.scope,
                );
                if self.add_node(&mut delta, node, event) {
                    self.proposals.insert(event.id.clone(), id);
                }
            }

            EventPayload::ArtifactConfirmed {
                proposal_id,
                artifact_type,
                content,
                purpose_id,
            } => {
                let id = format!("{}_{}", artifact_type.as_str(), event.id);
                let node = Node::new(
                    id.clone(),
                    artifact_type.node_type(),
                    NodeContent {
                        summary: content.summary,
                        what: content.what,
                        why: content.why,
                        domain: content.domain,
                    },
                    &event.id,
                    event.scope,
                );
                if !self.add_node(&mut delta, node, event) {
                    return delta;
                }

                // The pending proposal, if projected, is now superseded
                if let Some(proposal_node_id) = self.proposals.get(&proposal_id)
                    && let Some(previous) = self
                        .graph
                        .set_status(proposal_node_id, NodeStatus::Superseded)
                {
                    if previous != NodeStatus::Superseded {
                        delta
                            .status_changes
                            .push((proposal_node_id.clone(), NodeStatus::Superseded));
                    }
                }

                // Link to the purpose it informs
                let purpose = purpose_id.or_else(|| self.active_purpose.clone());
                if let Some(purpose) = purpose {
                    if self
                        .graph
                        .insert_edge(Edge {
                            source_id: id,
                            target_id: purpose,
                            relation: EdgeRelation::Informs,
                            origin_event_id: event.id.clone(),
                        })
                    {
                        delta.edges_added += 1;
                    }
                }
            }

            EventPayload::LinkCreated {
                source_id,
                target_id,
                relation,
            } => match EdgeRelation::parse(&relation) {
                Some(relation) => {
                    if self.graph.insert_edge(Edge {
                        source_id,
                        target_id,
                        relation,
                        origin_event_id: event.id.clone(),
                    }) {
                        delta.edges_added += 1;
                    }
                }
                None => {
                    warn!(event_id = %event.id, relation = %relation, "unknown link relation skipped");
                }
            },

            EventPayload::Endorsed { artifact_id } => {
                if let Some(node) = self.graph.node_mut(&artifact_id) {
                    node.consensus = true;
                }
            }

            EventPayload::EvidenceAttached { artifact_id, .. } => {
                if let Some(node) = self.graph.node_mut(&artifact_id) {
                    node.evidence = true;
                }
            }

            EventPayload::ChallengeRaised {
                target_id,
                challenge,
            } => {
                let id = format!("tension_{}", event.id);
                let node = Node::new(
                    id.clone(),
                    NodeType::Tension,
                    NodeContent::summary(challenge),
                    &event.id,
                    event.scope,
                );
                if self.add_node(&mut delta, node, event)
                    && self.graph.insert_edge(Edge {
                        source_id: id,
                        target_id,
                        relation: EdgeRelation::Challenges,
                        origin_event_id: event.id.clone(),
                    })
                {
                    delta.edges_added += 1;
                }
            }

            EventPayload::QuestionRaised { question } => {
                let id = format!("question_{}", event.id);
                self.add_node(
                    &mut delta,
                    Node::new(
                        id,
                        NodeType::Question,
                        NodeContent::summary(question),
                        &event.id,
                        event.scope,
                    ),
                    event,
                );
            }

            EventPayload::QuestionResolved {
                question_id,
                resolution,
            } => {
                if let Some(previous) = self.graph.set_status(&question_id, NodeStatus::Resolved) {
                    if previous != NodeStatus::Resolved {
                        delta
                            .status_changes
                            .push((question_id.clone(), NodeStatus::Resolved));
                    }
                    if let Some(node) = self.graph.node_mut(&question_id) {
                        node.content.why = Some(resolution);
                    }
                }
            }

            EventPayload::Deprecated { target_id, .. } => {
                if let Some(previous) = self.graph.set_status(&target_id, NodeStatus::Deprecated) {
                    if previous != NodeStatus::Deprecated {
                        delta
                            .status_changes
                            .push((target_id, NodeStatus::Deprecated));
                    }
                }
            }

            EventPayload::CommitCaptured {
                commit_hash,
                message,
                artifact_ids,
            } => {
                let id = format!("commit_{}", event.id);
                let content = NodeContent {
                    summary: message,
                    what: Some(commit_hash),
                    why: None,
                    domain: None,
                };
                if self.add_node(
                    &mut delta,
                    Node::new(id.clone(), NodeType::Commit, content, &event.id, event.scope),
                    event,
                ) {
                    for artifact_id in artifact_ids {
                        if self.graph.insert_edge(Edge {
                            source_id: artifact_id,
                            target_id: id.clone(),
                            relation: EdgeRelation::LinksToCommit,
                            origin_event_id: event.id.clone(),
                        }) {
                            delta.edges_added += 1;
                        }
                    }
                }
            }

            EventPayload::Unknown { .. } => {
                // Forward compatibility: unknown events are preserved in
                // the log and contribute nothing to the graph.
            }
        }

        delta
    }

    /// Record an integrity violation as a first-class tension node.
    /// Used by sync when a shared journal replays a known id with a
    /// different payload, and internally for node type conflicts.
    pub fn quarantine(&mut self, event_id: &str, description: String) -> String {
        let id = format!("tension_{}", event_id);
        warn!(event_id = %event_id, "quarantined as tension: {}", description);
        self.graph.upsert_node(Node::new(
            id.clone(),
            NodeType::Tension,
            NodeContent::summary(description),
            event_id,
            babel_types::Scope::Shared,
        ));
        id
    }

    /// Insert a node unless its id is already claimed by an
    /// incompatible type; in that case the conflict is surfaced as a
    /// tension and the fold continues. Returns true when inserted.
    fn add_node(&mut self, delta: &mut ProjectionDelta, node: Node, event: &Event) -> bool {
        if let Some(existing) = self.graph.get_node(&node.id) {
            if existing.node_type != node.node_type {
                let description = format!(
                    "projection conflict: node {} is {} but event {} projects {}",
                    node.id,
                    existing.node_type,
                    event.id,
                    node.node_type
                );
                let tension_id = self.quarantine(&event.id, description);
                delta.nodes_added.push(tension_id);
                return false;
            }
            // Same id, same type: already projected, nothing to do
            return false;
        }

        delta.nodes_added.push(node.id.clone());
        self.graph.upsert_node(node);
        true
    }
}

impl Default for GraphProjector {
    fn default() -> Self {
        Self::new()
    }
}

/// Fingerprint of (type, data), used to distinguish a benign duplicate
/// replay from a conflicting reuse of an id.
pub(crate) fn payload_fingerprint(event: &Event) -> String {
    let mut hasher = Sha256::new();
    hasher.update(event.event_type.as_str().as_bytes());
    hasher.update(b"|");
    hasher.update(event.data.to_string().as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use babel_types::{EventType, Scope};
    use serde_json::json;

    fn purpose_event() -> Event {
        Event::new(
            EventType::PurposeDeclared,
            json!({"what": "preserve intent", "why": "answer why later"}),
            Scope::Shared,
        )
    }

    #[test]
    fn test_purpose_projection() {
        let mut projector = GraphProjector::new();
        let event = purpose_event();
        let delta = projector.project(&event);

        assert_eq!(delta.nodes_added.len(), 1);
        let node = projector.graph().get_node(&delta.nodes_added[0]).unwrap();
        assert_eq!(node.node_type, NodeType::Purpose);
        assert_eq!(node.content.what.as_deref(), Some("preserve intent"));
        assert_eq!(node.origin_event_id, event.id);
        assert_eq!(projector.active_purpose(), Some(delta.nodes_added[0].as_str()));
    }

    #[test]
    fn test_project_is_idempotent_per_event() {
        let mut projector = GraphProjector::new();
        let event = purpose_event();
        projector.project(&event);
        let delta = projector.project(&event);

        assert!(delta.nodes_added.is_empty());
        assert_eq!(projector.graph().node_count(), 1);
    }

    #[test]
    fn test_link_created_idempotent() {
        let mut projector = GraphProjector::new();
        let data = json!({"source_id": "a", "target_id": "b", "relation": "supports"});
        for _ in 0..3 {
            let event = Event::new(EventType::LinkCreated, data.clone(), Scope::Shared);
            projector.project(&event);
        }
        // Distinct events, one logical edge
        assert_eq!(projector.graph().edge_count(), 1);
    }

    #[test]
    fn test_deprecation_is_status_not_delete() {
        let mut projector = GraphProjector::new();
        let confirm = Event::new(
            EventType::ArtifactConfirmed,
            json!({
                "proposal_id": "none",
                "artifact_type": "decision",
                "content": {"summary": "use sqlite"}
            }),
            Scope::Shared,
        );
        let delta = projector.project(&confirm);
        let node_id = delta.nodes_added[0].clone();

        let deprecate = Event::new(
            EventType::Deprecated,
            json!({"target_id": node_id}),
            Scope::Shared,
        );
        let delta = projector.project(&deprecate);

        assert_eq!(delta.status_changes, vec![(node_id.clone(), NodeStatus::Deprecated)]);
        let node = projector.graph().get_node(&node_id).unwrap();
        assert_eq!(node.status, NodeStatus::Deprecated);
        assert_eq!(node.content.summary, "use sqlite");
    }

    #[test]
    fn test_endorse_and_evidence_set_validation_bits() {
        let mut projector = GraphProjector::new();
        let confirm = Event::new(
            EventType::ArtifactConfirmed,
            json!({
                "proposal_id": "none",
                "artifact_type": "principle",
                "content": {"summary": "fail loudly"}
            }),
            Scope::Shared,
        );
        let node_id = projector.project(&confirm).nodes_added[0].clone();

        projector.project(&Event::new(
            EventType::Endorsed,
            json!({"artifact_id": node_id}),
            Scope::Shared,
        ));
        projector.project(&Event::new(
            EventType::EvidenceAttached,
            json!({"artifact_id": node_id, "evidence": "incident 42"}),
            Scope::Shared,
        ));

        let node = projector.graph().get_node(&node_id).unwrap();
        assert!(node.consensus);
        assert!(node.evidence);
    }

    #[test]
    fn test_challenge_creates_tension_with_edge() {
        let mut projector = GraphProjector::new();
        let challenge = Event::new(
            EventType::ChallengeRaised,
            json!({"target_id": "decision_x", "challenge": "does not scale"}),
            Scope::Shared,
        );
        let delta = projector.project(&challenge);

        let tension = projector.graph().get_node(&delta.nodes_added[0]).unwrap();
        assert_eq!(tension.node_type, NodeType::Tension);
        let edges = projector
            .graph()
            .get_edges(&tension.id, crate::Direction::Outgoing);
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].relation, EdgeRelation::Challenges);
        assert_eq!(edges[0].target_id, "decision_x");
    }

    #[test]
    fn test_rebuild_determinism() {
        let events = vec![
            purpose_event(),
            Event::new(
                EventType::ArtifactConfirmed,
                json!({
                    "proposal_id": "none",
                    "artifact_type": "decision",
                    "content": {"summary": "use sqlite"}
                }),
                Scope::Shared,
            ),
            Event::new(
                EventType::QuestionRaised,
                json!({"question": "what about writes?"}),
                Scope::Local,
            ),
        ];

        let mut a = GraphProjector::new();
        a.rebuild(events.iter());
        let mut b = GraphProjector::new();
        b.rebuild(events.iter());

        assert_eq!(a.graph().snapshot(), b.graph().snapshot());
    }
}
