//! The graph registry: node/connection ownership and mutation primitives.
//!
//! A [`Graph`] is an explicit store owned by whoever built it (an engine, a
//! session, a test); there is no module-level shared state, so independent
//! graphs coexist safely. Insertion order is tracked for both nodes and
//! connections: fan-out, router strategies, and path queries all iterate in
//! creation order, which keeps routing deterministic.

use std::sync::Arc;

use chrono::Utc;
use tracing::debug;

use super::connection::{ConnectOptions, Connection, connection_id};
use super::node::GraphNode;
use super::snapshot::{ConnectionSnapshot, GraphSnapshot, GraphState, NodeSnapshot, NodeView};
use crate::event_bus::{Event, EventEmitter, GraphEvent, NullEmitter};
use crate::types::NodeState;

/// Directed graph of typed nodes and prioritized connections.
///
/// Mutations keep the joint-ownership invariant: creating or removing a
/// connection updates the registry map and both endpoints' lists together,
/// and removing a node cascades over every incident connection, so no
/// dangling reference survives.
#[derive(Debug)]
pub struct Graph {
    nodes: rustc_hash::FxHashMap<String, GraphNode>,
    node_order: Vec<String>,
    connections: rustc_hash::FxHashMap<String, Connection>,
    connection_order: Vec<String>,
    template: Option<String>,
    emitter: Arc<dyn EventEmitter>,
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl Graph {
    pub fn new() -> Self {
        Self {
            nodes: rustc_hash::FxHashMap::default(),
            node_order: Vec::new(),
            connections: rustc_hash::FxHashMap::default(),
            connection_order: Vec::new(),
            template: None,
            emitter: Arc::new(NullEmitter),
        }
    }

    /// Graph whose mutations publish on the given emitter.
    pub fn with_emitter(emitter: Arc<dyn EventEmitter>) -> Self {
        Self {
            emitter,
            ..Self::new()
        }
    }

    pub fn set_emitter(&mut self, emitter: Arc<dyn EventEmitter>) {
        self.emitter = emitter;
    }

    fn emit(&self, event: Event) {
        // A closed bus must never fail a mutation.
        let _ = self.emitter.emit(event);
    }

    /// Add a node, returning its id. Re-adding an existing id replaces the
    /// node and cascades away its previous connections.
    pub fn add_node(&mut self, node: GraphNode) -> String {
        let id = node.id.clone();
        if self.nodes.contains_key(&id) {
            self.remove_node(&id);
        }
        let snapshot = NodeSnapshot::from(&node);
        self.node_order.push(id.clone());
        self.nodes.insert(id.clone(), node);
        debug!(node_id = %id, "node added");
        self.emit(Event::Graph(GraphEvent::NodeAdded { node: snapshot }));
        id
    }

    /// Remove a node and every connection incident to it. No-op on unknown
    /// ids.
    pub fn remove_node(&mut self, node_id: &str) {
        let Some(node) = self.nodes.get(node_id) else {
            return;
        };
        let incident: Vec<String> = node
            .inputs
            .iter()
            .chain(node.outputs.iter())
            .cloned()
            .collect();
        for conn_id in incident {
            self.remove_connection(&conn_id);
        }
        self.nodes.remove(node_id);
        self.node_order.retain(|id| id != node_id);
        debug!(node_id = %node_id, "node removed");
        self.emit(Event::Graph(GraphEvent::NodeRemoved {
            node_id: node_id.to_string(),
        }));
    }

    /// Create a connection between two existing nodes, returning its id.
    ///
    /// Returns `None` without mutating anything when either endpoint is
    /// missing; callers pre-validate. Connecting an already-connected ordered
    /// pair replaces the connection's fields in place, keeping its position
    /// in both endpoints' lists.
    pub fn connect(
        &mut self,
        source: &str,
        target: &str,
        options: ConnectOptions,
    ) -> Option<String> {
        if !self.nodes.contains_key(source) || !self.nodes.contains_key(target) {
            return None;
        }
        let connection = Connection::new(source, target, options);
        let id = connection.id.clone();
        let replacing = self.connections.contains_key(&id);
        let snapshot = ConnectionSnapshot::from(&connection);
        self.connections.insert(id.clone(), connection);
        if !replacing {
            self.connection_order.push(id.clone());
            if let Some(node) = self.nodes.get_mut(source) {
                node.outputs.push(id.clone());
            }
            if let Some(node) = self.nodes.get_mut(target) {
                node.inputs.push(id.clone());
            }
        }
        debug!(connection_id = %id, "connection created");
        self.emit(Event::Graph(GraphEvent::ConnectionCreated {
            connection: snapshot,
        }));
        Some(id)
    }

    /// Remove a connection from the registry and both endpoints. No-op on
    /// unknown ids.
    pub fn remove_connection(&mut self, connection_id: &str) {
        let Some(conn) = self.connections.remove(connection_id) else {
            return;
        };
        self.connection_order.retain(|id| id != connection_id);
        if let Some(source) = self.nodes.get_mut(&conn.source) {
            source.outputs.retain(|id| id != connection_id);
        }
        if let Some(target) = self.nodes.get_mut(&conn.target) {
            target.inputs.retain(|id| id != connection_id);
        }
        self.emit(Event::Graph(GraphEvent::ConnectionRemoved {
            connection_id: connection_id.to_string(),
        }));
    }

    pub fn node(&self, node_id: &str) -> Option<&GraphNode> {
        self.nodes.get(node_id)
    }

    pub(crate) fn node_mut(&mut self, node_id: &str) -> Option<&mut GraphNode> {
        self.nodes.get_mut(node_id)
    }

    /// Nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.node_order.iter().filter_map(|id| self.nodes.get(id))
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn connection(&self, connection_id: &str) -> Option<&Connection> {
        self.connections.get(connection_id)
    }

    /// Connections in creation order.
    pub fn connections(&self) -> impl Iterator<Item = &Connection> {
        self.connection_order
            .iter()
            .filter_map(|id| self.connections.get(id))
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// The connection for an ordered endpoint pair, if any.
    pub fn connection_between(&self, source: &str, target: &str) -> Option<&Connection> {
        self.connections.get(&connection_id(source, target))
    }

    /// Outgoing connections of a node, in creation order.
    pub fn output_connections(&self, node_id: &str) -> Vec<&Connection> {
        self.nodes
            .get(node_id)
            .map(|node| {
                node.outputs
                    .iter()
                    .filter_map(|id| self.connections.get(id))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Set a node's lifecycle state, refreshing `last_update`. Returns false
    /// on unknown ids.
    pub fn set_node_state(&mut self, node_id: &str, state: NodeState) -> bool {
        match self.nodes.get_mut(node_id) {
            Some(node) => {
                node.state = state;
                node.touch();
                true
            }
            None => false,
        }
    }

    /// Record a traversal over the pair's connection. Returns false when the
    /// connection is missing or inactive.
    pub(crate) fn use_connection(&mut self, source: &str, target: &str) -> bool {
        match self.connections.get_mut(&connection_id(source, target)) {
            Some(conn) if conn.active => {
                conn.last_used = Some(Utc::now());
                true
            }
            _ => false,
        }
    }

    /// Read-only projection for observers: node states plus peer ids.
    pub fn graph_state(&self) -> GraphState {
        let peer = |conn_id: &String, incoming: bool| -> Option<String> {
            self.connections.get(conn_id).map(|conn| {
                if incoming {
                    conn.source.clone()
                } else {
                    conn.target.clone()
                }
            })
        };
        GraphState {
            nodes: self
                .nodes()
                .map(|node| NodeView {
                    id: node.id.clone(),
                    kind: node.kind,
                    state: node.state,
                    inputs: node.inputs.iter().filter_map(|c| peer(c, true)).collect(),
                    outputs: node.outputs.iter().filter_map(|c| peer(c, false)).collect(),
                    last_update: node.last_update,
                })
                .collect(),
            connections: self.connections().map(ConnectionSnapshot::from).collect(),
        }
    }

    /// Serialize to the persisted snapshot shape. Node lifecycle state is
    /// not part of graph snapshots; session records add it separately.
    pub fn serialize(&self) -> GraphSnapshot {
        GraphSnapshot {
            nodes: self.nodes().map(NodeSnapshot::from).collect(),
            connections: self.connections().map(ConnectionSnapshot::from).collect(),
            template: self.template.clone(),
        }
    }

    /// Replace the graph's contents with a snapshot. Emits the same mutation
    /// events a manual rebuild would.
    pub fn deserialize(&mut self, snapshot: &GraphSnapshot) {
        self.nodes.clear();
        self.node_order.clear();
        self.connections.clear();
        self.connection_order.clear();
        self.template = snapshot.template.clone();

        for node_snap in &snapshot.nodes {
            self.add_node(GraphNode::from(node_snap));
        }
        for conn_snap in &snapshot.connections {
            let options = ConnectOptions {
                kind: conn_snap.kind.clone(),
                active: conn_snap.active,
                priority: conn_snap.priority,
                label: conn_snap.label.clone(),
                metadata: conn_snap.metadata.clone(),
            };
            if let Some(id) = self.connect(&conn_snap.source, &conn_snap.target, options)
                && let Some(conn) = self.connections.get_mut(&id)
            {
                if let Some(created_at) = conn_snap.created_at {
                    conn.created_at = created_at;
                }
                conn.last_used = conn_snap.last_used;
            }
        }
    }

    pub fn template(&self) -> Option<&str> {
        self.template.as_deref()
    }

    pub fn set_template(&mut self, template: Option<String>) {
        self.template = template;
    }

    /// Breadth-first search over outgoing connections; returns the first
    /// shortest path found (outputs visited in creation order), or `None`
    /// when the target is unreachable.
    pub fn find_path(&self, source: &str, target: &str) -> Option<Vec<String>> {
        let mut visited: rustc_hash::FxHashSet<String> = rustc_hash::FxHashSet::default();
        let mut queue: std::collections::VecDeque<Vec<String>> = std::collections::VecDeque::new();
        queue.push_back(vec![source.to_string()]);

        while let Some(path) = queue.pop_front() {
            let Some(node_id) = path.last() else {
                continue;
            };
            if node_id == target && self.nodes.contains_key(node_id) {
                return Some(path);
            }
            if !visited.insert(node_id.clone()) {
                continue;
            }
            let Some(node) = self.nodes.get(node_id) else {
                continue;
            };
            for conn_id in &node.outputs {
                if let Some(conn) = self.connections.get(conn_id) {
                    let mut next = path.clone();
                    next.push(conn.target.clone());
                    queue.push_back(next);
                }
            }
        }
        None
    }

    /// Depth-first enumeration of simple paths starting at `source`,
    /// including every prefix. Cycles are bounded by a visited set scoped to
    /// the current path, so a node may appear in many paths but never twice
    /// in one.
    pub fn all_paths(&self, source: &str) -> Vec<Vec<String>> {
        let mut paths = Vec::new();
        if self.nodes.contains_key(source) {
            let mut path = Vec::new();
            self.walk_paths(source, &mut path, &mut paths);
        }
        paths
    }

    fn walk_paths(&self, node_id: &str, path: &mut Vec<String>, out: &mut Vec<Vec<String>>) {
        if path.iter().any(|seen| seen == node_id) {
            return;
        }
        path.push(node_id.to_string());
        out.push(path.clone());
        if let Some(node) = self.nodes.get(node_id) {
            for conn_id in &node.outputs {
                if let Some(conn) = self.connections.get(conn_id) {
                    self.walk_paths(&conn.target, path, out);
                }
            }
        }
        path.pop();
    }
}
