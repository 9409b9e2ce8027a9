use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{Connection, params};

use crate::graph::KnowledgeGraph;
use babel_types::{Edge, EdgeRelation, Node, NodeContent, NodeStatus, NodeType, Scope};

// NOTE: Cache Design
//
// The journals are the source of truth; graph.db is only a projection
// cache so reopening a project does not replay the full history. The
// cache can be dropped at any time and rebuilt from the log, which is
// why the schema stays flat and migration-free: on any mismatch, wipe
// and refold.

/// SQLite-backed persistence for the projected graph.
pub struct GraphCache {
    conn: Connection,
}

impl GraphCache {
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open graph cache: {}", db_path.display()))?;
        let cache = Self { conn };
        cache.init_schema()?;
        Ok(cache)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let cache = Self { conn };
        cache.init_schema()?;
        Ok(cache)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS nodes (
                id TEXT PRIMARY KEY,
                node_type TEXT NOT NULL,
                content TEXT NOT NULL,
                origin_event_id TEXT NOT NULL,
                scope TEXT NOT NULL,
                status TEXT NOT NULL,
                consensus INTEGER DEFAULT 0,
                evidence INTEGER DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS edges (
                source_id TEXT NOT NULL,
                target_id TEXT NOT NULL,
                relation TEXT NOT NULL,
                origin_event_id TEXT NOT NULL,
                PRIMARY KEY (source_id, target_id, relation)
            );

            CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_nodes_type ON nodes(node_type);
            CREATE INDEX IF NOT EXISTS idx_edges_source ON edges(source_id);
            CREATE INDEX IF NOT EXISTS idx_edges_target ON edges(target_id);
            "#,
        )?;
        Ok(())
    }

    /// Replace the cached projection with the given graph.
    pub fn save(&mut self, graph: &KnowledgeGraph, applied_events: usize) -> Result<()> {
        let tx = self.conn.transaction()?;

        tx.execute("DELETE FROM nodes", [])?;
        tx.execute("DELETE FROM edges", [])?;

        for node in graph.nodes() {
            tx.execute(
                r#"
                INSERT INTO nodes
                    (id, node_type, content, origin_event_id, scope, status, consensus, evidence)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
                params![
                    node.id,
                    node.node_type.as_str(),
                    serde_json::to_string(&node.content)?,
                    node.origin_event_id,
                    node.scope.as_str(),
                    node.status.as_str(),
                    node.consensus as i64,
                    node.evidence as i64,
                ],
            )?;
        }

        for edge in graph.edges() {
            tx.execute(
                r#"
                INSERT OR IGNORE INTO edges (source_id, target_id, relation, origin_event_id)
                VALUES (?1, ?2, ?3, ?4)
                "#,
                params![
                    edge.source_id,
                    edge.target_id,
                    edge.relation.as_str(),
                    edge.origin_event_id,
                ],
            )?;
        }

        tx.execute(
            "INSERT OR REPLACE INTO meta (key, value) VALUES ('applied_events', ?1)",
            params![applied_events.to_string()],
        )?;

        tx.commit()?;
        Ok(())
    }

    /// Load the cached projection. Returns the graph plus the applied
    /// event count it was saved at.
    pub fn load(&self) -> Result<(KnowledgeGraph, usize)> {
        let mut graph = KnowledgeGraph::new();

        let mut stmt = self.conn.prepare(
            "SELECT id, node_type, content, origin_event_id, scope, status, consensus, evidence
             FROM nodes",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, i64>(6)?,
                row.get::<_, i64>(7)?,
            ))
        })?;

        for row in rows {
            let (id, node_type, content, origin, scope, status, consensus, evidence) = row?;
            let node = Node {
                id,
                node_type: parse_node_type(&node_type)
                    .with_context(|| format!("unknown node type in cache: {}", node_type))?,
                content: serde_json::from_str::<NodeContent>(&content)?,
                origin_event_id: origin,
                scope: scope.parse::<Scope>().map_err(anyhow::Error::from)?,
                status: parse_status(&status)
                    .with_context(|| format!("unknown status in cache: {}", status))?,
                consensus: consensus != 0,
                evidence: evidence != 0,
            };
            graph.upsert_node(node);
        }

        let mut stmt = self.conn.prepare(
            "SELECT source_id, target_id, relation, origin_event_id FROM edges
             ORDER BY source_id, target_id, relation",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        for row in rows {
            let (source_id, target_id, relation, origin_event_id) = row?;
            let relation = EdgeRelation::parse(&relation)
                .with_context(|| format!("unknown relation in cache: {}", relation))?;
            graph.insert_edge(Edge {
                source_id,
                target_id,
                relation,
                origin_event_id,
            });
        }

        let applied: usize = self
            .conn
            .query_row(
                "SELECT value FROM meta WHERE key = 'applied_events'",
                [],
                |row| row.get::<_, String>(0),
            )
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);

        Ok((graph, applied))
    }
}

fn parse_node_type(s: &str) -> Option<NodeType> {
    match s {
        "project" => Some(NodeType::Project),
        "purpose" => Some(NodeType::Purpose),
        "proposal" => Some(NodeType::Proposal),
        "decision" => Some(NodeType::Decision),
        "constraint" => Some(NodeType::Constraint),
        "principle" => Some(NodeType::Principle),
        "requirement" => Some(NodeType::Requirement),
        "tension" => Some(NodeType::Tension),
        "question" => Some(NodeType::Question),
        "memo" => Some(NodeType::Memo),
        "topic" => Some(NodeType::Topic),
        "symbol" => Some(NodeType::Symbol),
        "commit" => Some(NodeType::Commit),
        _ => None,
    }
}

fn parse_status(s: &str) -> Option<NodeStatus> {
    match s {
        "active" => Some(NodeStatus::Active),
        "superseded" => Some(NodeStatus::Superseded),
        "deprecated" => Some(NodeStatus::Deprecated),
        "resolved" => Some(NodeStatus::Resolved),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projector::GraphProjector;
    use babel_types::{Event, EventType};
    use serde_json::json;

    #[test]
    fn test_save_load_round_trip() {
        let mut projector = GraphProjector::new();
        projector.project(&Event::new(
            EventType::PurposeDeclared,
            json!({"what": "preserve intent"}),
            Scope::Shared,
        ));
        projector.project(&Event::new(
            EventType::ArtifactConfirmed,
            json!({
                "proposal_id": "none",
                "artifact_type": "decision",
                "content": {"summary": "use sqlite", "why": "zero ops"}
            }),
            Scope::Shared,
        ));

        let mut cache = GraphCache::open_in_memory().unwrap();
        cache.save(projector.graph(), 2).unwrap();

        let (loaded, applied) = cache.load().unwrap();
        assert_eq!(applied, 2);
        assert_eq!(loaded.snapshot(), projector.graph().snapshot());
    }

    #[test]
    fn test_save_is_replace_not_merge() {
        let mut projector = GraphProjector::new();
        projector.project(&Event::new(
            EventType::QuestionRaised,
            json!({"question": "first"}),
            Scope::Local,
        ));

        let mut cache = GraphCache::open_in_memory().unwrap();
        cache.save(projector.graph(), 1).unwrap();

        let mut fresh = GraphProjector::new();
        fresh.project(&Event::new(
            EventType::QuestionRaised,
            json!({"question": "second"}),
            Scope::Local,
        ));
        cache.save(fresh.graph(), 1).unwrap();

        let (loaded, _) = cache.load().unwrap();
        assert_eq!(loaded.node_count(), 1);
        let node = loaded.nodes().next().unwrap();
        assert_eq!(node.content.summary, "second");
    }
}
