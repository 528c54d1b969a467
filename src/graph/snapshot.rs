/*!
Serde-friendly snapshot shapes for the persisted graph format.

Explicit persistence structs decoupled from the in-memory registry
representation; conversion logic lives here so the registry and session
store stay lean. This module performs no I/O.

Wire shape:

```json
{
  "nodes": [{"id", "type", "x", "y", "label", "data"}],
  "connections": [{"id", "source", "target", "type", "active",
                   "priority", "label", "metadata"}],
  "template": null
}
```

Node `state` and connection timestamps are optional extensions: graph
snapshots omit them, session records carry them (a session must remember
which of its nodes were already connected or active).
*/

use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::connection::{Connection, connection_id};
use super::node::GraphNode;
use crate::types::{NodeKind, NodeState};

/// Complete persisted shape of a graph.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct GraphSnapshot {
    pub nodes: Vec<NodeSnapshot>,
    pub connections: Vec<ConnectionSnapshot>,
    /// Template the topology was seeded from, when any.
    #[serde(default)]
    pub template: Option<String>,
}

/// Persisted node record.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct NodeSnapshot {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub data: FxHashMap<String, Value>,
    /// Lifecycle state; present in session records, absent in plain graph
    /// snapshots.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<NodeState>,
}

impl NodeSnapshot {
    pub fn new(id: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            id: id.into(),
            kind,
            x: 0.0,
            y: 0.0,
            label: String::new(),
            data: FxHashMap::default(),
            state: None,
        }
    }

    #[must_use]
    pub fn with_data(mut self, key: impl Into<String>, value: Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    #[must_use]
    pub fn with_position(mut self, x: f64, y: f64) -> Self {
        self.x = x;
        self.y = y;
        self
    }

    /// String-typed `data` entry, if present.
    pub fn data_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str)
    }
}

impl From<&GraphNode> for NodeSnapshot {
    fn from(node: &GraphNode) -> Self {
        Self {
            id: node.id.clone(),
            kind: node.kind,
            x: node.x,
            y: node.y,
            label: node.label.clone(),
            data: node.data.clone(),
            state: None,
        }
    }
}

impl From<&NodeSnapshot> for GraphNode {
    fn from(snap: &NodeSnapshot) -> Self {
        let mut node = GraphNode::new(snap.id.clone(), snap.kind)
            .with_label(snap.label.clone())
            .with_position(snap.x, snap.y);
        node.data = snap.data.clone();
        node.state = snap.state.unwrap_or_default();
        node
    }
}

fn default_active() -> bool {
    true
}

/// Persisted connection record.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ConnectionSnapshot {
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub priority: i64,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub metadata: FxHashMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used: Option<DateTime<Utc>>,
}

impl ConnectionSnapshot {
    /// Fresh snapshot of an active `data` connection between two nodes.
    pub fn between(source: impl Into<String>, target: impl Into<String>) -> Self {
        let source = source.into();
        let target = target.into();
        Self {
            id: connection_id(&source, &target),
            source,
            target,
            kind: "data".to_string(),
            active: true,
            priority: 0,
            label: String::new(),
            metadata: FxHashMap::default(),
            created_at: None,
            last_used: None,
        }
    }

    #[must_use]
    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }
}

impl From<&Connection> for ConnectionSnapshot {
    fn from(conn: &Connection) -> Self {
        Self {
            id: conn.id.clone(),
            source: conn.source.clone(),
            target: conn.target.clone(),
            kind: conn.kind.clone(),
            active: conn.active,
            priority: conn.priority,
            label: conn.label.clone(),
            metadata: conn.metadata.clone(),
            created_at: Some(conn.created_at),
            last_used: conn.last_used,
        }
    }
}

/// Read-only projection of live registry state for observers.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct GraphState {
    pub nodes: Vec<NodeView>,
    pub connections: Vec<ConnectionSnapshot>,
}

/// Per-node slice of [`GraphState`]: lifecycle state plus peer ids.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct NodeView {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    pub state: NodeState,
    /// Peer node ids feeding this node.
    pub inputs: Vec<String>,
    /// Peer node ids this node feeds.
    pub outputs: Vec<String>,
    pub last_update: DateTime<Utc>,
}
