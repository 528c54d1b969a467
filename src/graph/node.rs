//! Typed vertices of the routing graph.

use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::types::{NodeKind, NodeState, RouterMode};

/// A typed vertex owned exclusively by the [`Graph`](super::Graph) that
/// created it.
///
/// The `data` map holds type-specific parameters opaque to the registry:
/// service identifier, router mode, round-robin cursor, key id. The execution
/// engine mutates `state` and `last_update` only; endpoint lists are
/// maintained by the registry as connections come and go.
#[derive(Clone, Debug)]
pub struct GraphNode {
    pub id: String,
    pub kind: NodeKind,
    /// Editor layout position, round-tripped opaquely.
    pub x: f64,
    pub y: f64,
    pub label: String,
    pub data: FxHashMap<String, Value>,
    /// Connection ids ending at this node, in creation order.
    pub(crate) inputs: Vec<String>,
    /// Connection ids starting at this node, in creation order.
    pub(crate) outputs: Vec<String>,
    pub state: NodeState,
    pub last_update: DateTime<Utc>,
}

impl GraphNode {
    pub fn new(id: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            id: id.into(),
            kind,
            x: 0.0,
            y: 0.0,
            label: String::new(),
            data: FxHashMap::default(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            state: NodeState::Idle,
            last_update: Utc::now(),
        }
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

    /// Insert one `data` entry, builder-style.
    #[must_use]
    pub fn with_data(mut self, key: impl Into<String>, value: Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    /// Incoming connection ids, oldest first.
    pub fn input_ids(&self) -> &[String] {
        &self.inputs
    }

    /// Outgoing connection ids, oldest first. Router strategies and fan-out
    /// both honor this order.
    pub fn output_ids(&self) -> &[String] {
        &self.outputs
    }

    /// String-typed `data` entry, if present.
    pub fn data_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str)
    }

    /// Router mode configured on this node; defaults to failover.
    pub fn router_mode(&self) -> RouterMode {
        self.data_str("mode")
            .and_then(RouterMode::parse)
            .unwrap_or_default()
    }

    pub(crate) fn touch(&mut self) {
        self.last_update = Utc::now();
    }
}
