//! Session record shapes, mirrored one-to-one by the persisted JSON files.

use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::graph::snapshot::{ConnectionSnapshot, NodeSnapshot};
use crate::types::{NodeKind, NodeState};

/// Lifecycle phase of a session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPhase {
    #[default]
    Created,
    Loaded,
    Starting,
    Active,
    Stopping,
    Stopped,
    Error,
}

/// Behavior switches fixed at creation time.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionOptions {
    pub auto_start: bool,
    pub persistent: bool,
    pub monitor_health: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            auto_start: false,
            persistent: true,
            monitor_health: true,
        }
    }
}

/// Running counters, persisted alongside the session.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionStats {
    pub requests: u64,
    pub errors: u64,
    pub rotations: u64,
    pub last_activity: Option<DateTime<Utc>>,
}

/// One managed session: identity, lifecycle phase, and its topology.
///
/// Only the session manager mutates these; everything else sees clones or
/// the [`SessionStatus`] projection.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub template: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub state: SessionPhase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub options: SessionOptions,
    pub stats: SessionStats,
    #[serde(default)]
    pub nodes: Vec<NodeSnapshot>,
    #[serde(default)]
    pub connections: Vec<ConnectionSnapshot>,
    #[serde(default)]
    pub template_config: FxHashMap<String, Value>,
}

impl Session {
    pub(crate) fn new(name: impl Into<String>, options: SessionOptions) -> Self {
        let now = Utc::now();
        Self {
            id: format!("session-{}", Uuid::new_v4()),
            name: name.into(),
            template: None,
            created_at: now,
            updated_at: now,
            state: SessionPhase::Created,
            error: None,
            options,
            stats: SessionStats::default(),
            nodes: Vec::new(),
            connections: Vec::new(),
            template_config: FxHashMap::default(),
        }
    }

    pub(crate) fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Nodes of one kind, in topology order.
    pub fn nodes_of_kind(&self, kind: NodeKind) -> impl Iterator<Item = &NodeSnapshot> {
        self.nodes.iter().filter(move |node| node.kind == kind)
    }

    pub(crate) fn set_node_state(&mut self, node_id: &str, state: NodeState) {
        if let Some(node) = self.nodes.iter_mut().find(|node| node.id == node_id) {
            node.state = Some(state);
        }
    }

    /// Condensed view of the session for status listings.
    pub fn status(&self) -> SessionStatus {
        let uptime_ms = if self.state == SessionPhase::Active {
            (Utc::now() - self.updated_at).num_milliseconds().max(0)
        } else {
            0
        };
        SessionStatus {
            id: self.id.clone(),
            name: self.name.clone(),
            state: self.state,
            template: self.template.clone(),
            nodes: self
                .nodes
                .iter()
                .map(|node| NodeStatus {
                    id: node.id.clone(),
                    kind: node.kind,
                    state: node.state.unwrap_or_default(),
                    label: node.label.clone(),
                })
                .collect(),
            connections: self.connections.len(),
            stats: self.stats.clone(),
            uptime_ms,
        }
    }
}

/// Projection returned by status queries and listings.
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub id: String,
    pub name: String,
    pub state: SessionPhase,
    pub template: Option<String>,
    pub nodes: Vec<NodeStatus>,
    pub connections: usize,
    pub stats: SessionStats,
    pub uptime_ms: i64,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct NodeStatus {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    pub state: NodeState,
    pub label: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn option_defaults_fill_missing_fields() {
        let options: SessionOptions = serde_json::from_value(json!({})).unwrap();
        assert!(!options.auto_start);
        assert!(options.persistent);
        assert!(options.monitor_health);
    }

    #[test]
    fn session_ids_carry_the_session_prefix() {
        let session = Session::new("test", SessionOptions::default());
        assert!(session.id.starts_with("session-"));
        assert_eq!(session.state, SessionPhase::Created);
    }

    #[test]
    fn status_reports_zero_uptime_unless_active() {
        let mut session = Session::new("test", SessionOptions::default());
        assert_eq!(session.status().uptime_ms, 0);
        session.state = SessionPhase::Active;
        session.updated_at = Utc::now() - chrono::Duration::seconds(5);
        assert!(session.status().uptime_ms >= 5_000);
    }

    #[test]
    fn record_round_trips_through_json() {
        let mut session = Session::new("round-trip", SessionOptions::default());
        session.nodes.push(
            NodeSnapshot::new("svc-1", NodeKind::Service).with_data("service", json!("openai")),
        );
        session.connections.push(ConnectionSnapshot::between("svc-1", "svc-1"));

        let text = serde_json::to_string_pretty(&session).unwrap();
        let back: Session = serde_json::from_str(&text).unwrap();
        assert_eq!(back, session);
    }
}
