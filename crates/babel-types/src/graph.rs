use serde::{Deserialize, Serialize};
use std::fmt;

use crate::scope::Scope;

/// Kind of a derived graph node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Project,
    Purpose,
    Proposal,
    Decision,
    Constraint,
    Principle,
    Requirement,
    Tension,
    Question,
    Memo,
    Topic,
    Symbol,
    Commit,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Project => "project",
            NodeType::Purpose => "purpose",
            NodeType::Proposal => "proposal",
            NodeType::Decision => "decision",
            NodeType::Constraint => "constraint",
            NodeType::Principle => "principle",
            NodeType::Requirement => "requirement",
            NodeType::Tension => "tension",
            NodeType::Question => "question",
            NodeType::Memo => "memo",
            NodeType::Topic => "topic",
            NodeType::Symbol => "symbol",
            NodeType::Commit => "commit",
        }
    }

    /// Confirmed reasoning artifacts (as opposed to structural nodes)
    pub fn is_artifact(&self) -> bool {
        matches!(
            self,
            NodeType::Purpose
                | NodeType::Decision
                | NodeType::Constraint
                | NodeType::Principle
                | NodeType::Requirement
        )
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a node. Never deleted, only transitioned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Active,
    Superseded,
    Deprecated,
    Resolved,
}

impl NodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeStatus::Active => "active",
            NodeStatus::Superseded => "superseded",
            NodeStatus::Deprecated => "deprecated",
            NodeStatus::Resolved => "resolved",
        }
    }
}

/// Structured node content.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeContent {
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub what: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub why: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
}

impl NodeContent {
    pub fn summary(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            ..Default::default()
        }
    }
}

/// A derived graph node. Exists iff at least one confirming event
/// projects it; its id derives from that event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub node_type: NodeType,
    pub content: NodeContent,
    pub origin_event_id: String,
    pub scope: Scope,
    pub status: NodeStatus,

    /// Validation bits: set by ENDORSED / EVIDENCE_ATTACHED events
    #[serde(default)]
    pub consensus: bool,
    #[serde(default)]
    pub evidence: bool,
}

impl Node {
    pub fn new(
        id: impl Into<String>,
        node_type: NodeType,
        content: NodeContent,
        origin_event_id: impl Into<String>,
        scope: Scope,
    ) -> Self {
        Self {
            id: id.into(),
            node_type,
            content,
            origin_event_id: origin_event_id.into(),
            scope,
            status: NodeStatus::Active,
            consensus: false,
            evidence: false,
        }
    }
}

/// Relation carried by a derived edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeRelation {
    Supports,
    Informs,
    Challenges,
    Resolves,
    Supersedes,
    AppliesTo,
    LinksToCommit,
}

impl EdgeRelation {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeRelation::Supports => "supports",
            EdgeRelation::Informs => "informs",
            EdgeRelation::Challenges => "challenges",
            EdgeRelation::Resolves => "resolves",
            EdgeRelation::Supersedes => "supersedes",
            EdgeRelation::AppliesTo => "applies_to",
            EdgeRelation::LinksToCommit => "links_to_commit",
        }
    }

    pub fn parse(s: &str) -> Option<EdgeRelation> {
        match s {
            "supports" => Some(EdgeRelation::Supports),
            "informs" => Some(EdgeRelation::Informs),
            "challenges" => Some(EdgeRelation::Challenges),
            "resolves" => Some(EdgeRelation::Resolves),
            "supersedes" => Some(EdgeRelation::Supersedes),
            "applies_to" => Some(EdgeRelation::AppliesTo),
            "links_to_commit" => Some(EdgeRelation::LinksToCommit),
            _ => None,
        }
    }
}

impl fmt::Display for EdgeRelation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A derived edge. Set-valued per (source, target, relation): applying
/// the same link twice yields one edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub source_id: String,
    pub target_id: String,
    pub relation: EdgeRelation,
    pub origin_event_id: String,
}

impl Edge {
    /// Identity key used for idempotent insertion
    pub fn key(&self) -> (String, String, EdgeRelation) {
        (self.source_id.clone(), self.target_id.clone(), self.relation)
    }
}
