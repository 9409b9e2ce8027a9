use std::collections::{BTreeMap, HashSet, VecDeque};

use babel_types::{Edge, EdgeRelation, Node, NodeStatus, NodeType};

/// Edge traversal direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Outgoing,
    Incoming,
    Both,
}

/// The derived knowledge graph.
///
/// Owned by one projector; concurrent readers are fine, writes go
/// through projection. Nodes are kept in a BTreeMap so that iteration
/// order, and therefore any serialized snapshot, is deterministic.
#[derive(Debug, Default)]
pub struct KnowledgeGraph {
    nodes: BTreeMap<String, Node>,
    edges: Vec<Edge>,
    edge_keys: HashSet<(String, String, EdgeRelation)>,
}

impl KnowledgeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn get_node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn get_nodes_by_type(&self, node_type: NodeType) -> Vec<&Node> {
        self.nodes
            .values()
            .filter(|n| n.node_type == node_type)
            .collect()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Edges touching `id`, filtered by direction.
    pub fn get_edges(&self, id: &str, direction: Direction) -> Vec<&Edge> {
        self.edges
            .iter()
            .filter(|e| match direction {
                Direction::Outgoing => e.source_id == id,
                Direction::Incoming => e.target_id == id,
                Direction::Both => e.source_id == id || e.target_id == id,
            })
            .collect()
    }

    /// Breadth-first neighborhood of `id` up to `depth` hops, following
    /// only the given relations (all relations when empty). The start
    /// node itself is not returned.
    pub fn neighbors(&self, id: &str, relations: &[EdgeRelation], depth: usize) -> Vec<&Node> {
        let mut visited: HashSet<String> = HashSet::new();
        visited.insert(id.to_string());

        let mut queue: VecDeque<(String, usize)> = VecDeque::new();
        queue.push_back((id.to_string(), 0));

        let mut result_ids: Vec<String> = Vec::new();

        while let Some((current, hops)) = queue.pop_front() {
            if hops >= depth {
                continue;
            }
            for edge in &self.edges {
                if !relations.is_empty() && !relations.contains(&edge.relation) {
                    continue;
                }
                let next = if edge.source_id == current {
                    &edge.target_id
                } else if edge.target_id == current {
                    &edge.source_id
                } else {
                    continue;
                };
                if visited.insert(next.clone()) {
                    result_ids.push(next.clone());
                    queue.push_back((next.clone(), hops + 1));
                }
            }
        }

        result_ids
            .iter()
            .filter_map(|nid| self.nodes.get(nid))
            .collect()
    }

    /// Insert or replace a node.
    pub(crate) fn upsert_node(&mut self, node: Node) {
        self.nodes.insert(node.id.clone(), node);
    }

    /// Idempotent edge insertion. Returns true when the edge was new.
    pub(crate) fn insert_edge(&mut self, edge: Edge) -> bool {
        if self.edge_keys.insert(edge.key()) {
            self.edges.push(edge);
            true
        } else {
            false
        }
    }

    /// Transition a node's status. Returns the previous status.
    pub(crate) fn set_status(&mut self, id: &str, status: NodeStatus) -> Option<NodeStatus> {
        self.nodes.get_mut(id).map(|node| {
            let previous = node.status;
            node.status = status;
            previous
        })
    }

    pub(crate) fn node_mut(&mut self, id: &str) -> Option<&mut Node> {
        self.nodes.get_mut(id)
    }

    pub(crate) fn clear(&mut self) {
        self.nodes.clear();
        self.edges.clear();
        self.edge_keys.clear();
    }

    /// Canonical serialized form: nodes in id order, edges in
    /// (source, target, relation) order. Two graphs projected from the
    /// same event sequence produce identical snapshots, byte for byte.
    pub fn snapshot(&self) -> String {
        let nodes: Vec<&Node> = self.nodes.values().collect();
        let mut edges: Vec<&Edge> = self.edges.iter().collect();
        edges.sort_by(|a, b| {
            (&a.source_id, &a.target_id, a.relation.as_str()).cmp(&(
                &b.source_id,
                &b.target_id,
                b.relation.as_str(),
            ))
        });

        let value = serde_json::json!({
            "nodes": nodes,
            "edges": edges,
        });
        value.to_string()
    }
}
